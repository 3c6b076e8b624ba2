//! # Operation Poller
//!
//! [`OperationPoller::wait`] is the one suspension point of the engine: it repeatedly
//! asks the remote side for a status until that status lands in the target set.
//!
//! ## Loop
//!
//! 1. Sleep `initial_delay`.
//! 2. Fetch the status.
//!    - `NotFound` while the target set names a deletion status → [`PollOutcome::Gone`].
//!    - Any other fetch error → [`PollError::Transport`], immediately.
//!    - Status in `target` → [`PollOutcome::Reached`].
//!    - Status in `pending` → sleep `interval` (never longer) and go again.
//!    - Anything else → [`PollError::UnexpectedStatus`], immediately.
//! 3. Past the deadline while still pending → [`PollError::Timeout`].
//!
//! The deadline is the earlier of `start + policy.timeout` and the context deadline.
//! Every sleep and every fetch is raced against the context's cancellation token.

use crate::context::OpContext;
use crate::error::{PolicyError, PollError, RemoteError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

/// Statuses that mean the object no longer exists.
const GONE_STATUSES: &[&str] = &["DELETED", "TERMINATED"];

/// Floor for the poll interval so a zero interval cannot spin.
const MIN_INTERVAL: Duration = Duration::from_millis(10);

/// Upper bound for every [`PollPolicy`] duration.
pub const MAX_POLL_DURATION: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Anything a status fetch can return.
pub trait Observation {
    fn status(&self) -> &str;
}

impl Observation for String {
    fn status(&self) -> &str {
        self
    }
}

/// Timing of one wait. Immutable per call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PollPolicy {
    #[serde(rename = "initial_delay_ms", with = "crate::config::serde_millis")]
    pub initial_delay: Duration,
    #[serde(rename = "interval_ms", with = "crate::config::serde_millis")]
    pub interval: Duration,
    #[serde(rename = "timeout_secs", with = "crate::config::serde_secs")]
    pub timeout: Duration,
}

impl PollPolicy {
    pub const fn new(initial_delay: Duration, interval: Duration, timeout: Duration) -> Self {
        Self {
            initial_delay,
            interval,
            timeout,
        }
    }

    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.interval.is_zero() {
            return Err(PolicyError::ZeroInterval);
        }
        if self.timeout.is_zero() {
            return Err(PolicyError::ZeroTimeout);
        }
        for (field, value) in [
            ("initial_delay", self.initial_delay),
            ("interval", self.interval),
            ("timeout", self.timeout),
        ] {
            if value > MAX_POLL_DURATION {
                return Err(PolicyError::TooLong {
                    field,
                    value,
                    max: MAX_POLL_DURATION,
                });
            }
        }
        Ok(())
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::new(
            Duration::from_secs(1),
            Duration::from_secs(5),
            Duration::from_secs(20 * 60),
        )
    }
}

/// The vocabulary of remote statuses for one wait.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StatusSet {
    pending: BTreeSet<String>,
    target: BTreeSet<String>,
}

impl StatusSet {
    pub fn new<P, T, S>(pending: P, target: T) -> Self
    where
        P: IntoIterator<Item = S>,
        T: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            pending: pending.into_iter().map(Into::into).collect(),
            target: target.into_iter().map(Into::into).collect(),
        }
    }

    /// Wait for deletion: `NotFound` counts as reaching the target.
    pub fn deletion<P, S>(pending: P) -> Self
    where
        P: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            pending: pending.into_iter().map(Into::into).collect(),
            target: BTreeSet::from(["DELETED".to_string()]),
        }
    }

    pub fn is_pending(&self, status: &str) -> bool {
        self.pending.contains(status)
    }

    pub fn is_target(&self, status: &str) -> bool {
        self.target.contains(status)
    }

    /// Whether a vanished object satisfies this wait.
    pub fn accepts_gone(&self) -> bool {
        self.target
            .iter()
            .any(|t| GONE_STATUSES.iter().any(|g| t.eq_ignore_ascii_case(g)))
    }

    fn describe_target(&self) -> String {
        self.target.iter().cloned().collect::<Vec<_>>().join(", ")
    }
}

/// How a successful wait ended.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome<S> {
    /// The last observation, whose status is in the target set.
    Reached(S),
    /// The object disappeared and the target set accepts that.
    Gone,
}

impl<S> PollOutcome<S> {
    pub fn into_reached(self) -> Option<S> {
        match self {
            PollOutcome::Reached(s) => Some(s),
            PollOutcome::Gone => None,
        }
    }
}

/// Blocking wait-until-status-reached primitive.
///
/// Stateless apart from a label used in log fields; cheap to create per call.
#[derive(Debug, Clone)]
pub struct OperationPoller {
    subject: String,
}

impl OperationPoller {
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
        }
    }

    pub async fn wait<S, F, Fut>(
        &self,
        ctx: &OpContext,
        mut fetch: F,
        statuses: &StatusSet,
        policy: &PollPolicy,
    ) -> Result<PollOutcome<S>, PollError>
    where
        S: Observation,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<S, RemoteError>>,
    {
        let subject = self.subject.as_str();
        let start = Instant::now();
        let deadline = ctx.deadline_for(start, policy.timeout);
        let interval = policy.interval.max(MIN_INTERVAL);
        let mut attempts: u32 = 0;
        let mut last_status: Option<String> = None;

        debug!(subject, ?policy, "Waiting");
        if !policy.initial_delay.is_zero() {
            pause(ctx, wake_at(start, policy.initial_delay, deadline)).await?;
        }

        loop {
            attempts += 1;
            let observed = tokio::select! {
                biased;
                _ = ctx.cancelled() => {
                    info!(subject, attempts, "Wait cancelled");
                    return Err(PollError::Cancelled);
                }
                result = fetch() => result,
            };

            match observed {
                Err(e) if e.is_not_found() && statuses.accepts_gone() => {
                    info!(subject, attempts, "Gone");
                    return Ok(PollOutcome::Gone);
                }
                Err(e) => {
                    warn!(subject, attempts, error = %e, "Status fetch failed");
                    return Err(PollError::Transport(e));
                }
                Ok(observation) => {
                    let status = observation.status();
                    if statuses.is_target(status) {
                        info!(
                            subject,
                            status,
                            attempts,
                            elapsed_ms = start.elapsed().as_millis() as u64,
                            "Reached"
                        );
                        return Ok(PollOutcome::Reached(observation));
                    }
                    if !statuses.is_pending(status) {
                        warn!(subject, status, attempts, "Unexpected status");
                        return Err(PollError::UnexpectedStatus {
                            status: status.to_string(),
                            expected: statuses.describe_target(),
                        });
                    }
                    debug!(subject, status, attempts, "Pending");
                    last_status = Some(status.to_string());
                }
            }

            let now = Instant::now();
            if deadline.is_some_and(|deadline| now >= deadline) {
                let elapsed = now - start;
                warn!(
                    subject,
                    attempts,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Timed out"
                );
                return Err(PollError::Timeout {
                    elapsed,
                    attempts,
                    last_status,
                });
            }
            pause(ctx, wake_at(now, interval, deadline)).await?;
        }
    }
}

/// `from + by`, capped at the deadline. `None` when neither is representable.
fn wake_at(from: Instant, by: Duration, deadline: Option<Instant>) -> Option<Instant> {
    match (from.checked_add(by), deadline) {
        (Some(at), Some(deadline)) => Some(at.min(deadline)),
        (at, deadline) => at.or(deadline),
    }
}

/// Sleeps until `until`, or only until cancellation when there is no instant to wake at.
async fn pause(ctx: &OpContext, until: Option<Instant>) -> Result<(), PollError> {
    let Some(until) = until else {
        ctx.cancelled().await;
        return Err(PollError::Cancelled);
    };
    tokio::select! {
        biased;
        _ = ctx.cancelled() => Err(PollError::Cancelled),
        _ = sleep_until(until) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn policy(initial_ms: u64, interval_ms: u64, timeout_ms: u64) -> PollPolicy {
        PollPolicy::new(
            Duration::from_millis(initial_ms),
            Duration::from_millis(interval_ms),
            Duration::from_millis(timeout_ms),
        )
    }

    fn lifecycle_statuses() -> StatusSet {
        StatusSet::new(["CREATING", "UPDATING"], ["READY"])
    }

    /// Stub returning `pending` for `n` calls, then `done`.
    fn scripted(
        n: u32,
        calls: Arc<AtomicU32>,
    ) -> impl FnMut() -> std::future::Ready<Result<String, RemoteError>> {
        move || {
            let call = calls.fetch_add(1, Ordering::SeqCst);
            let status = if call < n { "CREATING" } else { "READY" };
            std::future::ready(Ok(status.to_string()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_reaches_target_after_pending_calls() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = policy(500, 1_000, 60_000);
        let start = Instant::now();

        let outcome = OperationPoller::new("kms/1")
            .wait(
                &OpContext::new(),
                scripted(3, calls.clone()),
                &lifecycle_statuses(),
                &policy,
            )
            .await
            .unwrap();

        assert_eq!(outcome, PollOutcome::Reached("READY".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert!(start.elapsed() >= policy.initial_delay + policy.interval * 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_while_pending() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = policy(0, 1_000, 10_000);
        let start = Instant::now();

        let err = OperationPoller::new("kms/1")
            .wait(
                &OpContext::new(),
                scripted(u32::MAX, calls.clone()),
                &lifecycle_statuses(),
                &policy,
            )
            .await
            .unwrap_err();

        match err {
            PollError::Timeout {
                elapsed,
                attempts,
                last_status,
            } => {
                assert!(elapsed >= policy.timeout);
                assert_eq!(attempts, calls.load(Ordering::SeqCst));
                assert_eq!(last_status.as_deref(), Some("CREATING"));
            }
            other => panic!("expected timeout, got {other:?}"),
        }
        assert!(start.elapsed() >= policy.timeout);
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_found_is_success_for_deletion() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let outcome = OperationPoller::new("kms/1")
            .wait(
                &OpContext::new(),
                move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    std::future::ready(Err::<String, _>(RemoteError::NotFound("kms/1".into())))
                },
                &StatusSet::deletion(["DELETING"]),
                &policy(0, 1_000, 10_000),
            )
            .await
            .unwrap();

        assert_eq!(outcome, PollOutcome::Gone);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_found_is_transport_error_outside_deletion() {
        let err = OperationPoller::new("kms/1")
            .wait(
                &OpContext::new(),
                || std::future::ready(Err::<String, _>(RemoteError::NotFound("kms/1".into()))),
                &lifecycle_statuses(),
                &policy(0, 1_000, 10_000),
            )
            .await
            .unwrap_err();

        assert_eq!(
            err,
            PollError::Transport(RemoteError::NotFound("kms/1".into()))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_unexpected_status_is_fatal_without_retry() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let err = OperationPoller::new("kms/1")
            .wait(
                &OpContext::new(),
                move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    std::future::ready(Ok::<_, RemoteError>("WEIRD_STATE".to_string()))
                },
                &lifecycle_statuses(),
                &policy(0, 1_000, 10_000),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, PollError::UnexpectedStatus { ref status, .. } if status == "WEIRD_STATE"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_error_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let err = OperationPoller::new("kms/1")
            .wait(
                &OpContext::new(),
                move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    std::future::ready(Err::<String, _>(RemoteError::Transport(
                        "connection reset".into(),
                    )))
                },
                &lifecycle_statuses(),
                &policy(0, 1_000, 10_000),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, PollError::Transport(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_interrupts_sleep() {
        let ctx = OpContext::new();
        let canceller = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(2)).await;
            canceller.cancel();
        });

        let start = Instant::now();
        let err = OperationPoller::new("kms/1")
            .wait(
                &ctx,
                || std::future::ready(Ok::<_, RemoteError>("CREATING".to_string())),
                &lifecycle_statuses(),
                &policy(0, 60_000, 3_600_000),
            )
            .await
            .unwrap_err();

        assert_eq!(err, PollError::Cancelled);
        assert!(start.elapsed() < Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_context_deadline_tightens_policy_timeout() {
        let ctx = OpContext::new().with_timeout(Duration::from_secs(5));
        let start = Instant::now();
        let err = OperationPoller::new("kms/1")
            .wait(
                &ctx,
                || std::future::ready(Ok::<_, RemoteError>("CREATING".to_string())),
                &lifecycle_statuses(),
                &policy(0, 1_000, 3_600_000),
            )
            .await
            .unwrap_err();

        assert!(err.is_timeout());
        assert!(start.elapsed() < Duration::from_secs(6));
    }

    #[test]
    fn test_status_set_gone_detection() {
        assert!(StatusSet::deletion(["DELETING"]).accepts_gone());
        assert!(StatusSet::new(["terminating"], ["terminated"]).accepts_gone());
        assert!(!StatusSet::new(["doing", "todo"], ["delivered"]).accepts_gone());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unbounded_timeout_does_not_overflow() {
        let huge = PollPolicy::new(Duration::from_millis(10), Duration::MAX, Duration::MAX);
        let calls = Arc::new(AtomicU32::new(0));

        let outcome = OperationPoller::new("kms/1")
            .wait(
                &OpContext::new().with_timeout(Duration::MAX),
                scripted(0, calls.clone()),
                &lifecycle_statuses(),
                &huge,
            )
            .await
            .unwrap();

        assert_eq!(outcome, PollOutcome::Reached("READY".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_policy_validation() {
        assert!(PollPolicy::default().validate().is_ok());
        assert_eq!(policy(0, 0, 1_000).validate(), Err(PolicyError::ZeroInterval));
        assert_eq!(policy(0, 1_000, 0).validate(), Err(PolicyError::ZeroTimeout));

        let too_long = PollPolicy::new(Duration::ZERO, Duration::from_secs(1), Duration::MAX);
        assert!(matches!(
            too_long.validate(),
            Err(PolicyError::TooLong { field: "timeout", .. })
        ));
        let at_limit = PollPolicy::new(Duration::ZERO, Duration::from_secs(1), MAX_POLL_DURATION);
        assert!(at_limit.validate().is_ok());
    }
}
