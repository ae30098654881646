//! Session configuration.

use std::time::Duration;

use chrono::{FixedOffset, Offset, Utc};
use mysql_protocol::{CapabilityFlags, ExtendedCapabilityFlags, StatusFlags};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{Error, Result};

/// Configuration consumed by a session.
///
/// Parsing a DSN into this struct is the connector's job; the session only
/// reads it.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct Config {
    /// Deadline for every individual read on the transport.
    pub read_timeout: Option<Duration>,
    /// Deadline for every individual write on the transport.
    pub write_timeout: Option<Duration>,
    /// Largest packet the server accepts. `0` asks the server at
    /// establishment; sessions that skip establishment assume the default.
    pub max_allowed_packet: usize,
    /// Inline arguments into the statement text instead of refusing them.
    pub interpolate_params: bool,
    /// Check idle connections before reuse.
    pub check_conn_liveness: bool,
    /// Zone used to render instants as temporal literals.
    pub time_zone: FixedOffset,
    /// Truncate temporal values to a multiple of this before rendering.
    pub time_truncate: Option<Duration>,
    /// Session variables set once at establishment, in order.
    pub params: Vec<(String, String)>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            read_timeout: None,
            write_timeout: None,
            max_allowed_packet: mysql_protocol::DEFAULT_MAX_ALLOWED_PACKET,
            interpolate_params: false,
            check_conn_liveness: true,
            time_zone: Utc.fix(),
            time_truncate: None,
            params: Vec::new(),
        }
    }
}

impl Config {
    /// Create a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the per-read deadline.
    #[must_use]
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    /// Set the per-write deadline.
    #[must_use]
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = Some(timeout);
        self
    }

    /// Set the maximum packet size; `0` queries the server during
    /// [`Session::establish`](crate::Session::establish).
    #[must_use]
    pub fn max_allowed_packet(mut self, size: usize) -> Self {
        self.max_allowed_packet = size;
        self
    }

    /// Enable or disable client-side interpolation.
    #[must_use]
    pub fn interpolate_params(mut self, enabled: bool) -> Self {
        self.interpolate_params = enabled;
        self
    }

    /// Enable or disable the idle liveness probe.
    #[must_use]
    pub fn check_conn_liveness(mut self, enabled: bool) -> Self {
        self.check_conn_liveness = enabled;
        self
    }

    /// Set the zone for temporal literals.
    #[must_use]
    pub fn time_zone(mut self, zone: FixedOffset) -> Self {
        self.time_zone = zone;
        self
    }

    /// Truncate temporal values before rendering.
    #[must_use]
    pub fn time_truncate(mut self, step: Duration) -> Self {
        self.time_truncate = Some(step);
        self
    }

    /// Add a session variable, set once at establishment.
    #[must_use]
    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((name.into(), value.into()));
        self
    }

    /// Check the configuration for values a session cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.read_timeout.is_some_and(|t| t.is_zero()) {
            return Err(Error::Config("read_timeout must be non-zero".into()));
        }
        if self.write_timeout.is_some_and(|t| t.is_zero()) {
            return Err(Error::Config("write_timeout must be non-zero".into()));
        }
        if let Some((name, _)) = self.params.iter().find(|(name, _)| !is_variable_name(name)) {
            return Err(Error::Config(format!("invalid session variable name: {name:?}")));
        }
        Ok(())
    }
}

fn is_variable_name(name: &str) -> bool {
    static VARIABLE_RE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"^@{0,2}[A-Za-z_][A-Za-z0-9_$]*(\.[A-Za-z_][A-Za-z0-9_$]*)?$").unwrap()
    });
    VARIABLE_RE.is_match(name)
}

/// What the external handshake negotiated for a connection.
#[derive(Debug, Clone, Default)]
#[non_exhaustive]
pub struct Negotiated {
    /// Capability flags both peers support.
    pub capabilities: CapabilityFlags,
    /// MariaDB extended capability flags.
    pub ext_capabilities: ExtendedCapabilityFlags,
    /// Status flags from the handshake OK packet.
    pub status: StatusFlags,
    /// Whether the compressed protocol was switched on.
    pub compress: bool,
    /// Server thread id.
    pub connection_id: u32,
    /// Server version string.
    pub server_version: String,
}

impl Negotiated {
    /// Describe a negotiated connection.
    #[must_use]
    pub fn new(capabilities: CapabilityFlags) -> Self {
        Self {
            capabilities,
            ..Self::default()
        }
    }

    /// Set the extended capabilities.
    #[must_use]
    pub fn ext_capabilities(mut self, flags: ExtendedCapabilityFlags) -> Self {
        self.ext_capabilities = flags;
        self
    }

    /// Set the initial status flags.
    #[must_use]
    pub fn status(mut self, status: StatusFlags) -> Self {
        self.status = status;
        self
    }

    /// Mark the compressed protocol as active.
    #[must_use]
    pub fn compress(mut self, enabled: bool) -> Self {
        self.compress = enabled;
        self
    }

    /// Set the connection id.
    #[must_use]
    pub fn connection_id(mut self, id: u32) -> Self {
        self.connection_id = id;
        self
    }

    /// Set the server version.
    #[must_use]
    pub fn server_version(mut self, version: impl Into<String>) -> Self {
        self.server_version = version.into();
        self
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.max_allowed_packet, 64 << 20);
        assert!(!config.interpolate_params);
        assert!(config.check_conn_liveness);
        assert_eq!(config.time_zone.local_minus_utc(), 0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_keeps_param_order() {
        let config = Config::new()
            .param("sql_mode", "'ANSI_QUOTES'")
            .param("time_zone", "'+00:00'")
            .interpolate_params(true);
        let names: Vec<_> = config.params.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, ["sql_mode", "time_zone"]);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(Config::new().read_timeout(Duration::ZERO).validate().is_err());
        assert!(Config::new().param("a; DROP", "1").validate().is_err());
        assert!(Config::new().param("@@session.autocommit", "1").validate().is_ok());
        assert!(Config::new().param("1abc", "1").validate().is_err());
    }
}
