//! Connection lifecycle hooks for pooling layers.
//!
//! A pool decides what to do with a session through three questions:
//! is it still usable ([`is_valid`](ConnectionLifecycle::is_valid)), can it be
//! handed out again ([`reset`](ConnectionLifecycle::reset)), and does the
//! server still answer ([`health_check`](ConnectionLifecycle::health_check)).

use std::time::{Duration, Instant};

use mysql_codec::Transport;

use crate::cancel::CancelContext;
use crate::error::Result;
use crate::session::Session;

/// Trait for connection lifecycle management.
///
/// This uses native async traits; for trait objects see
/// [`DynConnectionLifecycle`].
#[allow(async_fn_in_trait)]
pub trait ConnectionLifecycle: Send + Sync {
    /// Round-trip to the server.
    async fn health_check(&mut self) -> Result<()>;

    /// Prepare an idle connection for reuse.
    ///
    /// Fails with [`Error::BadConnection`](crate::Error::BadConnection) when
    /// the connection must be discarded instead.
    async fn reset(&mut self) -> Result<()>;

    /// Cheap local check, no I/O.
    fn is_valid(&self) -> bool;
}

/// Async trait for connection lifecycle with trait object compatibility.
#[async_trait::async_trait]
pub trait DynConnectionLifecycle: Send + Sync {
    /// Round-trip to the server.
    async fn health_check(&mut self) -> Result<()>;

    /// Prepare an idle connection for reuse.
    async fn reset(&mut self) -> Result<()>;

    /// Cheap local check, no I/O.
    fn is_valid(&self) -> bool;
}

impl<T: Transport + Sync> ConnectionLifecycle for Session<T> {
    async fn health_check(&mut self) -> Result<()> {
        self.ping(&CancelContext::none()).await
    }

    async fn reset(&mut self) -> Result<()> {
        self.reset_for_reuse()
    }

    fn is_valid(&self) -> bool {
        Session::is_valid(self)
    }
}

#[async_trait::async_trait]
impl<T: Transport + Sync> DynConnectionLifecycle for Session<T> {
    async fn health_check(&mut self) -> Result<()> {
        self.ping(&CancelContext::none()).await
    }

    async fn reset(&mut self) -> Result<()> {
        self.reset_for_reuse()
    }

    fn is_valid(&self) -> bool {
        Session::is_valid(self)
    }
}

/// Health check result with timing information.
#[derive(Debug, Clone)]
pub struct HealthCheckResult {
    /// Whether the health check passed.
    pub healthy: bool,
    /// Time taken to complete the health check.
    pub latency: Duration,
    /// Error message if unhealthy.
    pub error: Option<String>,
}

impl HealthCheckResult {
    /// Create a successful health check result.
    #[must_use]
    pub fn healthy(latency: Duration) -> Self {
        Self {
            healthy: true,
            latency,
            error: None,
        }
    }

    /// Create a failed health check result.
    #[must_use]
    pub fn unhealthy(latency: Duration, error: impl Into<String>) -> Self {
        Self {
            healthy: false,
            latency,
            error: Some(error.into()),
        }
    }
}

/// Run a health check and time it.
pub async fn check_health<C: ConnectionLifecycle>(conn: &mut C) -> HealthCheckResult {
    let start = Instant::now();
    match conn.health_check().await {
        Ok(()) => HealthCheckResult::healthy(start.elapsed()),
        Err(e) => {
            tracing::debug!(error = %e, "health check failed");
            HealthCheckResult::unhealthy(start.elapsed(), e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_check_result() {
        let ok = HealthCheckResult::healthy(Duration::from_millis(3));
        assert!(ok.healthy);
        assert!(ok.error.is_none());

        let bad = HealthCheckResult::unhealthy(Duration::ZERO, "bad connection");
        assert!(!bad.healthy);
        assert_eq!(bad.error.as_deref(), Some("bad connection"));
    }
}
