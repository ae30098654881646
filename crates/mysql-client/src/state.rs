//! Result cursor bookkeeping.
//!
//! The protocol is half-duplex: a response must be read to its end before
//! the next command is written. A [`Rows`](crate::Rows) cursor that is
//! dropped early leaves the remainder on the wire; the session records where
//! in the response it stopped so the next command can drain it first.
//!
//! ```text
//!            result set header              terminator, no MORE_RESULTS
//!   Idle ─────────────────────▶ Rows ──────────────────────────────────▶ Idle
//!    ▲                           │ terminator with MORE_RESULTS
//!    │ OK without MORE_RESULTS   ▼
//!    └────────────────────── MoreResults ◀── OK with MORE_RESULTS
//! ```

/// How much of the current response is still unread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum PendingResult {
    /// The response was read completely.
    #[default]
    Idle,
    /// Rows of the current result set are unread.
    Rows,
    /// The current result is done but another one follows.
    MoreResults,
}

impl PendingResult {
    /// Whether unread response data remains.
    pub(crate) const fn is_pending(self) -> bool {
        !matches!(self, Self::Idle)
    }

    /// State after a result terminator with the given flag.
    pub(crate) const fn after_result(more_results: bool) -> Self {
        if more_results { Self::MoreResults } else { Self::Idle }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending() {
        assert!(!PendingResult::Idle.is_pending());
        assert!(PendingResult::Rows.is_pending());
        assert!(PendingResult::MoreResults.is_pending());
    }

    #[test]
    fn test_after_result() {
        assert_eq!(PendingResult::after_result(true), PendingResult::MoreResults);
        assert_eq!(PendingResult::after_result(false), PendingResult::Idle);
    }
}
