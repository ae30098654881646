//! Command opcodes.

use crate::error::ProtocolError;

/// Command opcode sent as the first payload byte of a client request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Command {
    /// Graceful disconnect.
    Quit = 0x01,
    /// Change the default schema.
    InitDb = 0x02,
    /// Text protocol query.
    Query = 0x03,
    /// Liveness round trip.
    Ping = 0x0e,
    /// Prepare a statement.
    StmtPrepare = 0x16,
    /// Execute a prepared statement.
    StmtExecute = 0x17,
    /// Stream a long parameter ahead of execute.
    StmtSendLongData = 0x18,
    /// Deallocate a prepared statement.
    StmtClose = 0x19,
    /// Reset a prepared statement's long data.
    StmtReset = 0x1a,
    /// Reset session state without re-authenticating.
    ResetConnection = 0x1f,
}

impl Command {
    /// Create a command from its opcode.
    pub fn from_u8(value: u8) -> Result<Self, ProtocolError> {
        match value {
            0x01 => Ok(Self::Quit),
            0x02 => Ok(Self::InitDb),
            0x03 => Ok(Self::Query),
            0x0e => Ok(Self::Ping),
            0x16 => Ok(Self::StmtPrepare),
            0x17 => Ok(Self::StmtExecute),
            0x18 => Ok(Self::StmtSendLongData),
            0x19 => Ok(Self::StmtClose),
            0x1a => Ok(Self::StmtReset),
            0x1f => Ok(Self::ResetConnection),
            _ => Err(ProtocolError::InvalidCommand(value)),
        }
    }

    /// Whether the server sends no reply to this command.
    #[must_use]
    pub const fn expects_no_reply(self) -> bool {
        matches!(self, Self::Quit | Self::StmtClose | Self::StmtSendLongData)
    }

    /// Short name used in logs.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Quit => "COM_QUIT",
            Self::InitDb => "COM_INIT_DB",
            Self::Query => "COM_QUERY",
            Self::Ping => "COM_PING",
            Self::StmtPrepare => "COM_STMT_PREPARE",
            Self::StmtExecute => "COM_STMT_EXECUTE",
            Self::StmtSendLongData => "COM_STMT_SEND_LONG_DATA",
            Self::StmtClose => "COM_STMT_CLOSE",
            Self::StmtReset => "COM_STMT_RESET",
            Self::ResetConnection => "COM_RESET_CONNECTION",
        }
    }
}
