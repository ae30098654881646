//! Capability and server status flags.

use bitflags::bitflags;

bitflags! {
    /// Client/server capability flags negotiated during the handshake.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct CapabilityFlags: u32 {
        /// New, longer passwords.
        const LONG_PASSWORD = 0x0000_0001;
        /// Report found rows instead of affected rows.
        const FOUND_ROWS = 0x0000_0002;
        /// Longer column flags.
        const LONG_FLAG = 0x0000_0004;
        /// A schema name may be sent on connect.
        const CONNECT_WITH_DB = 0x0000_0008;
        /// Compressed protocol.
        const COMPRESS = 0x0000_0020;
        /// LOAD DATA LOCAL is allowed.
        const LOCAL_FILES = 0x0000_0080;
        /// 4.1 protocol (OK/ERR carry status, warnings and SQL state).
        const PROTOCOL_41 = 0x0000_0200;
        /// TLS.
        const SSL = 0x0000_0800;
        /// Transaction status in OK packets.
        const TRANSACTIONS = 0x0000_2000;
        /// 4.1 authentication.
        const SECURE_CONNECTION = 0x0000_8000;
        /// Multiple statements per COM_QUERY.
        const MULTI_STATEMENTS = 0x0001_0000;
        /// Multiple result sets per command.
        const MULTI_RESULTS = 0x0002_0000;
        /// Multiple result sets from prepared statements.
        const PS_MULTI_RESULTS = 0x0004_0000;
        /// Pluggable authentication.
        const PLUGIN_AUTH = 0x0008_0000;
        /// Connection attributes.
        const CONNECT_ATTRS = 0x0010_0000;
        /// Length-encoded auth response.
        const PLUGIN_AUTH_LENENC_DATA = 0x0020_0000;
        /// Session state tracking in OK packets.
        const SESSION_TRACK = 0x0080_0000;
        /// OK packets replace EOF packets.
        const DEPRECATE_EOF = 0x0100_0000;
    }
}

bitflags! {
    /// MariaDB extended capability flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ExtendedCapabilityFlags: u32 {
        /// Progress reporting.
        const PROGRESS = 1 << 0;
        /// COM_MULTI.
        const COM_MULTI = 1 << 1;
        /// Bulk statement operations.
        const STMT_BULK_OPERATIONS = 1 << 2;
        /// Extended type information in column definitions.
        const EXTENDED_TYPE_INFO = 1 << 3;
        /// Prepared statement result metadata may be omitted on execute.
        const CACHE_METADATA = 1 << 4;
    }
}

bitflags! {
    /// Server status flags carried by OK and EOF packets.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct StatusFlags: u16 {
        /// A transaction is active.
        const IN_TRANS = 0x0001;
        /// Autocommit is enabled.
        const AUTOCOMMIT = 0x0002;
        /// More result sets follow.
        const MORE_RESULTS_EXISTS = 0x0008;
        /// No good index was used.
        const NO_GOOD_INDEX_USED = 0x0010;
        /// No index was used.
        const NO_INDEX_USED = 0x0020;
        /// A read-only cursor is open.
        const CURSOR_EXISTS = 0x0040;
        /// The last row of a cursor was sent.
        const LAST_ROW_SENT = 0x0080;
        /// A database was dropped.
        const DB_DROPPED = 0x0100;
        /// `NO_BACKSLASH_ESCAPES` SQL mode is active.
        const NO_BACKSLASH_ESCAPES = 0x0200;
        /// Metadata changed since prepare.
        const METADATA_CHANGED = 0x0400;
        /// The query was slow.
        const QUERY_WAS_SLOW = 0x0800;
        /// Output parameters follow.
        const PS_OUT_PARAMS = 0x1000;
        /// A read-only transaction is active.
        const IN_TRANS_READONLY = 0x2000;
        /// Session state changed.
        const SESSION_STATE_CHANGED = 0x4000;
    }
}

impl StatusFlags {
    /// Whether string literals must escape quotes by doubling them only.
    #[must_use]
    pub const fn no_backslash_escapes(self) -> bool {
        self.contains(Self::NO_BACKSLASH_ESCAPES)
    }

    /// Whether another result set follows the current one.
    #[must_use]
    pub const fn more_results(self) -> bool {
        self.contains(Self::MORE_RESULTS_EXISTS)
    }
}
