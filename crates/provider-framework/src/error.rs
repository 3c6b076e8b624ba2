//! # Engine Errors
//!
//! Error taxonomy shared by every engine component. Errors are layered:
//!
//! - [`RemoteError`]: what the control-plane collaborator reports. `NotFound` and
//!   `AlreadyTerminated` are distinguished outcomes, not just failures.
//! - [`PollError`]: what the [`OperationPoller`](crate::poller::OperationPoller)
//!   reports. `Timeout` is recoverable; `UnexpectedStatus` and `Transport` are not.
//! - [`ProviderError`]: what a lifecycle call reports to its caller.

use crate::lifecycle::PENDING_OPERATION_KEY;
use crate::reconcile::StateModel;
use crate::remote::OrderHandle;
use std::fmt::{self, Display};
use std::time::Duration;

/// Outcomes reported by a [`RemoteClient`](crate::remote::RemoteClient).
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum RemoteError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// The remote side reports the service is already decommissioned.
    #[error("Service already terminated: {0}")]
    AlreadyTerminated(String),

    /// The API answered with an error status.
    #[error("API error {code}: {message}")]
    Api { code: u16, message: String },

    /// The request never produced an API answer.
    #[error("Transport error: {0}")]
    Transport(String),
}

impl RemoteError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, RemoteError::NotFound(_))
    }

    /// True when the target no longer exists, whichever way the remote side phrased it.
    pub fn is_gone(&self) -> bool {
        matches!(
            self,
            RemoteError::NotFound(_) | RemoteError::AlreadyTerminated(_)
        )
    }
}

/// Errors returned by [`OperationPoller::wait`](crate::poller::OperationPoller::wait).
#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum PollError {
    /// Fetching the status failed. Never retried by the poller.
    #[error("status fetch failed: {0}")]
    Transport(#[source] RemoteError),

    /// The remote side reported a status outside both the pending and target sets.
    #[error("unexpected status '{status}' (waiting for one of [{expected}])")]
    UnexpectedStatus { status: String, expected: String },

    /// The deadline passed while the operation was still pending.
    #[error("timed out after {elapsed:?} ({attempts} status checks, last status {last_status:?})")]
    Timeout {
        elapsed: Duration,
        attempts: u32,
        last_status: Option<String>,
    },

    #[error("wait cancelled")]
    Cancelled,
}

impl PollError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, PollError::Timeout { .. })
    }
}

/// Rejected [`PollPolicy`](crate::poller::PollPolicy) values.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum PolicyError {
    #[error("poll interval must be greater than zero")]
    ZeroInterval,

    #[error("poll timeout must be greater than zero")]
    ZeroTimeout,

    #[error("{field} of {value:?} exceeds the maximum of {max:?}")]
    TooLong {
        field: &'static str,
        value: Duration,
        max: Duration,
    },
}

/// Errors raised while comparing differently formatted values.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("invalid ISO-8601 duration '{value}': {reason}")]
    InvalidDuration { value: String, reason: &'static str },

    #[error("invalid JSON document: {0}")]
    InvalidJson(String),
}

/// Errors raised by the [`ModelReconciler`](crate::reconcile::ModelReconciler).
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ReconcileError {
    #[error("field '{0}' is not part of the schema")]
    UnknownField(String),

    #[error("field '{0}' is computed and cannot be set in configuration")]
    ComputedFieldSet(String),
}

/// What an interrupted call left behind on the remote side, and how to find it again.
#[derive(Debug, Clone, PartialEq)]
pub enum Checkpoint {
    /// The object exists under this id.
    Resource(String),
    /// The object id is not known yet; the operation producing it is.
    Operation(String),
    /// A billable order that has not been delivered yet.
    Order(OrderHandle),
}

impl Checkpoint {
    /// The state to persist so the next run resumes from here.
    pub fn to_state(&self) -> StateModel {
        match self {
            Checkpoint::Resource(id) => StateModel::new().with("id", id.as_str()),
            Checkpoint::Operation(operation_id) => {
                StateModel::new().with(PENDING_OPERATION_KEY, operation_id.as_str())
            }
            Checkpoint::Order(handle) => StateModel::new()
                .with("order_id", handle.order_id)
                .with("plan_code", handle.plan_code.as_str()),
        }
    }
}

impl Display for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Checkpoint::Resource(id) => write!(f, "'{id}'"),
            Checkpoint::Operation(operation_id) => write!(f, "operation '{operation_id}'"),
            Checkpoint::Order(handle) => write!(f, "order {}", handle.order_id),
        }
    }
}

/// Errors returned by resource lifecycle calls.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Poll(#[from] PollError),

    #[error(transparent)]
    Reconcile(#[from] ReconcileError),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("invalid poll policy [{class}]: {source}")]
    Policy {
        class: &'static str,
        #[source]
        source: PolicyError,
    },

    /// The remote work was accepted but did not finish in time. The checkpoint must be
    /// persisted so the next run resumes instead of recreating.
    #[error(
        "{resource_type} {checkpoint} is still in progress on the remote side ({source}); \
         progress was preserved, retry the operation to resume waiting"
    )]
    Incomplete {
        resource_type: String,
        checkpoint: Checkpoint,
        /// What is known so far; persist it and mark the resource tainted.
        state: StateModel,
        #[source]
        source: PollError,
    },

    /// The workflow cannot proceed. When the remote side already holds something for this
    /// call, `state` names it so the caller can persist it rather than orphan it.
    #[error("{resource_type} operation failed: {source}")]
    Failed {
        resource_type: String,
        state: Option<StateModel>,
        #[source]
        source: PollError,
    },
}

impl ProviderError {
    /// Classifies a poll failure. Only a timeout with a checkpoint is resumable; every other
    /// failure is terminal but still carries the checkpoint's state.
    pub fn from_poll(resource_type: &str, checkpoint: Option<Checkpoint>, err: PollError) -> Self {
        match (err, checkpoint) {
            (err @ PollError::Timeout { .. }, Some(checkpoint)) => ProviderError::Incomplete {
                resource_type: resource_type.to_string(),
                state: checkpoint.to_state(),
                checkpoint,
                source: err,
            },
            (PollError::Transport(remote), _) => ProviderError::Remote(remote),
            (err, checkpoint) => ProviderError::Failed {
                resource_type: resource_type.to_string(),
                state: checkpoint.as_ref().map(Checkpoint::to_state),
                source: err,
            },
        }
    }

    pub fn is_incomplete(&self) -> bool {
        matches!(self, ProviderError::Incomplete { .. })
    }

    /// Lays `known` (e.g. the plan literals) underneath the carried state. Checkpoint
    /// fields already in the state win. Variants without state pass through.
    pub fn with_partial_state(self, known: StateModel) -> Self {
        match self {
            ProviderError::Incomplete {
                resource_type,
                checkpoint,
                state,
                source,
            } => ProviderError::Incomplete {
                resource_type,
                checkpoint,
                state: known.overlaid_with(state),
                source,
            },
            ProviderError::Failed {
                resource_type,
                state,
                source,
            } => ProviderError::Failed {
                resource_type,
                state: Some(known.overlaid_with(state.unwrap_or_default())),
                source,
            },
            other => other,
        }
    }

    /// The state to persist after a failed call, if the remote side holds anything.
    pub fn partial_state(&self) -> Option<&StateModel> {
        match self {
            ProviderError::Incomplete { state, .. } => Some(state),
            ProviderError::Failed { state, .. } => state.as_ref(),
            _ => None,
        }
    }
}
