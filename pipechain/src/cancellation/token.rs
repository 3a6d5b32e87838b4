//! Cancellation token shared by the coordinator and every stage supervisor.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// Why a pipeline is being shut down.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CancelReason {
    /// The overall pipeline deadline expired.
    Deadline,
    /// A stage could not be launched; upstream stages must be stopped.
    LaunchFailed {
        /// Index of the stage that failed to start.
        stage_index: usize,
    },
    /// The caller asked for the pipeline to stop.
    Requested {
        /// Caller-supplied reason.
        message: String,
    },
}

impl CancelReason {
    /// Creates a caller-initiated reason.
    #[must_use]
    pub fn requested(message: impl Into<String>) -> Self {
        Self::Requested {
            message: message.into(),
        }
    }
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Deadline => write!(f, "pipeline deadline expired"),
            Self::LaunchFailed { stage_index } => {
                write!(f, "stage {stage_index} failed to launch")
            }
            Self::Requested { message } => write!(f, "cancelled: {message}"),
        }
    }
}

/// A token for cooperative cancellation.
///
/// Cancellation is idempotent - only the first reason is kept.
#[derive(Default)]
pub struct CancellationToken {
    /// Whether cancellation has been requested.
    cancelled: AtomicBool,
    /// The reason for cancellation (first one wins).
    reason: RwLock<Option<CancelReason>>,
    /// Wakes tasks parked in [`CancellationToken::cancelled`].
    notify: Notify,
}

impl CancellationToken {
    /// Creates a new shareable cancellation token.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Requests cancellation.
    ///
    /// Returns true if this call was the one that cancelled the token.
    pub fn cancel(&self, reason: CancelReason) -> bool {
        let mut slot = self.reason.write();
        if self
            .cancelled
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }
        *slot = Some(reason);
        drop(slot);
        self.notify.notify_waiters();
        true
    }

    /// Returns whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Returns the cancellation reason, if any.
    #[must_use]
    pub fn reason(&self) -> Option<CancelReason> {
        self.reason.read().clone()
    }

    /// Waits until the token is cancelled and returns the reason.
    ///
    /// Returns immediately if the token is already cancelled.
    pub async fn cancelled(&self) -> CancelReason {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register before checking so a cancel between the check and the
            // await is not lost.
            notified.as_mut().enable();

            if let Some(reason) = self.reason() {
                return reason;
            }
            notified.await;
        }
    }
}

impl fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .field("reason", &self.reason())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_token_default_not_cancelled() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
        assert!(token.reason().is_none());
    }

    #[test]
    fn test_token_cancel() {
        let token = CancellationToken::new();
        assert!(token.cancel(CancelReason::requested("user pressed ctrl-c")));

        assert!(token.is_cancelled());
        assert_eq!(
            token.reason(),
            Some(CancelReason::requested("user pressed ctrl-c"))
        );
    }

    #[test]
    fn test_token_cancel_idempotent() {
        let token = CancellationToken::new();
        assert!(token.cancel(CancelReason::Deadline));
        assert!(!token.cancel(CancelReason::LaunchFailed { stage_index: 2 }));

        // First reason wins
        assert_eq!(token.reason(), Some(CancelReason::Deadline));
    }

    #[tokio::test]
    async fn test_cancelled_returns_immediately_when_already_cancelled() {
        let token = CancellationToken::new();
        token.cancel(CancelReason::Deadline);

        let reason = tokio::time::timeout(Duration::from_millis(100), token.cancelled())
            .await
            .expect("should not wait");
        assert_eq!(reason, CancelReason::Deadline);
    }

    #[tokio::test]
    async fn test_cancelled_wakes_all_waiters() {
        let token = CancellationToken::new();

        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let token = token.clone();
                tokio::spawn(async move { token.cancelled().await })
            })
            .collect();

        tokio::time::sleep(Duration::from_millis(20)).await;
        token.cancel(CancelReason::LaunchFailed { stage_index: 1 });

        for waiter in waiters {
            let reason = tokio::time::timeout(Duration::from_secs(1), waiter)
                .await
                .expect("waiter should wake")
                .unwrap();
            assert_eq!(reason, CancelReason::LaunchFailed { stage_index: 1 });
        }
    }

    #[test]
    fn test_reason_display() {
        assert_eq!(CancelReason::Deadline.to_string(), "pipeline deadline expired");
        assert_eq!(
            CancelReason::LaunchFailed { stage_index: 2 }.to_string(),
            "stage 2 failed to launch"
        );
    }
}
