//! # Operation Context
//!
//! [`OpContext`] is threaded through every wait. It carries the caller's cancellation
//! token and an optional absolute deadline. Deriving a child context can only tighten
//! the deadline, so a poll nested inside a larger lifecycle call always respects the
//! earliest enclosing deadline.

use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

#[derive(Debug, Clone, Default)]
pub struct OpContext {
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl OpContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps an externally owned token (e.g. one cancelled on shutdown).
    pub fn with_cancellation(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            deadline: None,
        }
    }

    /// Child context that expires after `timeout`, or earlier if `self` already does.
    /// A timeout too large to represent adds no deadline of its own.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(at) => self.with_deadline(at),
            None => Self {
                cancel: self.cancel.child_token(),
                deadline: self.deadline,
            },
        }
    }

    /// Child context with deadline `at`, or `self`'s deadline if that is earlier.
    pub fn with_deadline(&self, at: Instant) -> Self {
        let deadline = match self.deadline {
            Some(existing) => existing.min(at),
            None => at,
        };
        Self {
            cancel: self.cancel.child_token(),
            deadline: Some(deadline),
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Deadline for a wait that starts at `start` and may last `timeout`. `None` only when
    /// there is no outer deadline and `start + timeout` is not representable.
    pub fn deadline_for(&self, start: Instant, timeout: Duration) -> Option<Instant> {
        match (self.deadline, start.checked_add(timeout)) {
            (Some(outer), Some(own)) => Some(outer.min(own)),
            (outer, own) => outer.or(own),
        }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.cancel.cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_child_keeps_tighter_deadline() {
        let outer = OpContext::new().with_timeout(Duration::from_secs(10));
        let inner = outer.with_timeout(Duration::from_secs(60));
        assert_eq!(inner.deadline(), outer.deadline());

        let tighter = outer.with_timeout(Duration::from_secs(5));
        assert!(tighter.deadline() < outer.deadline());
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_for_uses_earliest() {
        let start = Instant::now();
        let ctx = OpContext::new().with_deadline(start + Duration::from_secs(3));
        assert_eq!(
            ctx.deadline_for(start, Duration::from_secs(30)),
            Some(start + Duration::from_secs(3))
        );
        assert_eq!(
            OpContext::new().deadline_for(start, Duration::from_secs(30)),
            Some(start + Duration::from_secs(30))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_unrepresentable_timeout_adds_no_deadline() {
        let start = Instant::now();
        assert_eq!(OpContext::new().with_timeout(Duration::MAX).deadline(), None);
        assert_eq!(OpContext::new().deadline_for(start, Duration::MAX), None);

        let outer = OpContext::new().with_timeout(Duration::from_secs(10));
        assert_eq!(outer.with_timeout(Duration::MAX).deadline(), outer.deadline());
        assert_eq!(outer.deadline_for(start, Duration::MAX), outer.deadline());
    }

    #[tokio::test]
    async fn test_cancelling_parent_cancels_child() {
        let parent = OpContext::new();
        let child = parent.with_timeout(Duration::from_secs(1));
        parent.cancel();
        assert!(child.is_cancelled());
        child.cancelled().await;
    }

    #[tokio::test]
    async fn test_external_token_cancels_context() {
        let shutdown = CancellationToken::new();
        let ctx = OpContext::with_cancellation(shutdown.clone()).with_timeout(Duration::from_secs(1));
        shutdown.cancel();
        assert!(ctx.is_cancelled());
    }
}
