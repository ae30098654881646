//! Cooperative cancellation.
//!
//! Each session runs one watcher task for its whole lifetime. Before a
//! cancellable operation the session *arms* the watcher with the caller's
//! [`CancelContext`]; afterwards it sends *finished*. If the context fires
//! while armed, the watcher invalidates the session: it records the reason,
//! flips the closed flag and cancels the teardown token, which aborts any
//! I/O the session is blocked on.
//!
//! ```text
//!            Arm(ctx)                 ctx fires
//!   Idle ─────────────▶ Armed(ctx) ─────────────▶ invalidate, exit
//!    ▲                      │
//!    └──── Finished ────────┘
//!
//!   teardown (either state) ─▶ exit
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::CancelReason;

/// The caller's cancellation signal for one operation.
///
/// A context can fire through an explicit token, a deadline, or both. The
/// session only observes it; it never cancels a caller's token.
#[derive(Debug, Clone, Default)]
pub struct CancelContext {
    token: Option<CancellationToken>,
    deadline: Option<Instant>,
}

impl CancelContext {
    /// A context that never fires.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// A context that fires when `token` is cancelled.
    #[must_use]
    pub fn new(token: CancellationToken) -> Self {
        Self {
            token: Some(token),
            deadline: None,
        }
    }

    /// Also fire at `deadline`.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Also fire after `timeout` from now.
    #[must_use]
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Whether this context can ever fire.
    #[must_use]
    pub fn can_cancel(&self) -> bool {
        self.token.is_some() || self.deadline.is_some()
    }

    /// The reason this context has fired, if it has.
    #[must_use]
    pub fn reason(&self) -> Option<CancelReason> {
        if self.token.as_ref().is_some_and(CancellationToken::is_cancelled) {
            return Some(CancelReason::Canceled);
        }
        if self.deadline.is_some_and(|d| d <= Instant::now()) {
            return Some(CancelReason::DeadlineExceeded);
        }
        None
    }

    /// Wait until the context fires. Never completes for [`CancelContext::none`].
    pub async fn done(&self) -> CancelReason {
        let token = async {
            match &self.token {
                Some(token) => token.cancelled().await,
                None => std::future::pending().await,
            }
        };
        let deadline = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };
        tokio::select! {
            biased;
            () = token => CancelReason::Canceled,
            () = deadline => CancelReason::DeadlineExceeded,
        }
    }
}

impl From<CancellationToken> for CancelContext {
    fn from(token: CancellationToken) -> Self {
        Self::new(token)
    }
}

/// State shared between a session and its watcher.
#[derive(Debug)]
pub(crate) struct SessionShared {
    closed: AtomicBool,
    canceled: OnceLock<CancelReason>,
    teardown: CancellationToken,
    pub(crate) connection_id: u32,
}

impl SessionShared {
    pub(crate) fn new(connection_id: u32) -> Self {
        Self {
            closed: AtomicBool::new(false),
            canceled: OnceLock::new(),
            teardown: CancellationToken::new(),
            connection_id,
        }
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Flip the closed flag. Returns true for the single caller that made
    /// the transition.
    pub(crate) fn mark_closed(&self) -> bool {
        let first = self
            .closed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if first {
            self.teardown.cancel();
        }
        first
    }

    /// Record why the session was invalidated, then close it.
    pub(crate) fn cancel(&self, reason: CancelReason) {
        let _ = self.canceled.set(reason);
        self.mark_closed();
    }

    pub(crate) fn cancel_reason(&self) -> Option<CancelReason> {
        self.canceled.get().copied()
    }

    /// Token cancelled once the session is torn down.
    pub(crate) fn teardown(&self) -> &CancellationToken {
        &self.teardown
    }
}

/// A cloneable handle that closes a session from any task.
///
/// Closing through the handle marks the session closed and aborts whatever
/// I/O it is blocked on. The owner releases the transport the next time it
/// touches the session, or when the session is dropped.
#[derive(Debug, Clone)]
pub struct CloseHandle {
    shared: Arc<SessionShared>,
}

impl CloseHandle {
    pub(crate) fn new(shared: Arc<SessionShared>) -> Self {
        Self { shared }
    }

    /// Close the session. Safe to call any number of times.
    pub fn close(&self) {
        if self.shared.mark_closed() {
            tracing::debug!(conn_id = self.shared.connection_id, "session closed by handle");
        }
    }

    /// Whether the session is closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }
}

/// Message from a session to its watcher.
#[derive(Debug)]
pub(crate) enum WatchMessage {
    /// Watch this context until the operation finishes.
    Arm(CancelContext),
    /// The armed operation completed.
    Finished,
}

/// Sending half of the watcher mailbox.
pub(crate) type WatcherHandle = mpsc::UnboundedSender<WatchMessage>;

/// Start the watcher for a session on the current runtime.
///
/// Returns `None` outside a runtime; the session then runs unwatched.
pub(crate) fn spawn_watcher(shared: &Arc<SessionShared>) -> Option<WatcherHandle> {
    let runtime = tokio::runtime::Handle::try_current().ok()?;
    let (tx, rx) = mpsc::unbounded_channel();
    runtime.spawn(watch(Arc::clone(shared), rx));
    Some(tx)
}

async fn watch(shared: Arc<SessionShared>, mut mailbox: mpsc::UnboundedReceiver<WatchMessage>) {
    let mut armed: Option<CancelContext> = None;
    loop {
        match armed.take() {
            None => {
                tokio::select! {
                    biased;
                    () = shared.teardown.cancelled() => return,
                    message = mailbox.recv() => match message {
                        Some(WatchMessage::Arm(ctx)) => armed = Some(ctx),
                        Some(WatchMessage::Finished) => {}
                        None => return,
                    },
                }
            }
            Some(ctx) => {
                tokio::select! {
                    biased;
                    () = shared.teardown.cancelled() => return,
                    message = mailbox.recv() => match message {
                        Some(WatchMessage::Arm(next)) => armed = Some(next),
                        Some(WatchMessage::Finished) => {}
                        None => return,
                    },
                    reason = ctx.done() => {
                        tracing::warn!(
                            conn_id = shared.connection_id,
                            %reason,
                            "operation canceled, invalidating connection"
                        );
                        shared.cancel(reason);
                        return;
                    }
                }
            }
        }
    }
}
