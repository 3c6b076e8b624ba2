//! # Provider Framework
//!
//! Building blocks for declarative-infrastructure resource adapters: code that maps an
//! object owned by a remote control plane (a database, a KMS instance, a load balancer)
//! onto a local desired-state / actual-state model.
//!
//! Every such adapter repeats the same pattern:
//!
//! 1. **Mutate**: submit a request; the remote side does the work asynchronously and
//!    hands back an operation (or order) handle.
//! 2. **Wait**: poll that handle until it reaches a terminal status, surviving "not found"
//!    races, caller timeouts and cancellation without losing progress.
//! 3. **Reconcile**: merge what the user declared, what was persisted last time and what
//!    the remote side reports now, without clobbering user-managed fields and without
//!    perpetual diffs when the remote side normalizes values.
//!
//! This crate implements that pattern once, generically.
//!
//! ## Architecture Overview
//!
//! Components, leaves first:
//!
//! - **Collaborator seams** ([`RemoteClient`], [`OrderApi`], [`TerminationApi`]): the only
//!   I/O. HTTP, auth and pagination live behind them.
//! - **[`OperationPoller`]**: the wait-until-status-reached primitive. The one suspension point.
//! - **[`OrderProvisioner`]**: order → delivery → service lookup for billable resources.
//! - **[`TerminationWorkflow`]**: terminate → confirm decommissioning.
//! - **[`normalize`]**: semantic equality of differently formatted values (`P7D` == `P1W`).
//! - **[`ModelReconciler`]**: the three-way merge.
//! - **[`ResourceLifecycle`]**: create/read/update/delete wired from all of the above.
//!
//! ```text
//! lifecycle call ──► RemoteClient::submit ──► OperationHandle
//!                                                │
//!                              OperationPoller::wait (operation, then object)
//!                                                │
//!                 RemoteClient::fetch ──► ModelReconciler::merge ──► state to persist
//! ```
//!
//! ## Failure semantics
//!
//! | Error | Meaning | Caller reaction |
//! |-------|---------|-----------------|
//! | `PollError::Transport` | API or network failure | surface; retry the outer operation |
//! | `NotFound` | distinguished outcome | success for deletion waits, "gone" for reads |
//! | `PollError::UnexpectedStatus` | status outside the known vocabulary | fatal |
//! | `PollError::Timeout` | policy exceeded | persist partial state, resume later |
//! | `PollError::Cancelled` | caller aborted | stop; persist `Failed`'s partial state if any |
//!
//! A timeout while provisioning is **not** a failure. [`ProviderError::Incomplete`] and
//! [`ProvisionOutcome::Pending`] carry the identifier that must be persisted so the next
//! run resumes instead of creating (and paying for) a duplicate. A terminal
//! [`ProviderError::Failed`] raised after the remote side accepted work carries the same
//! [`Checkpoint`] state, so a cancelled create never orphans the object it started.
//!
//! ## Quick Start
//!
//! ```rust
//! use provider_framework::mock::MockRemote;
//! use provider_framework::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), ProviderError> {
//!     let schema = Schema::new()
//!         .field(FieldSpec::configurable("name"))
//!         .field(FieldSpec::configurable("rotation_period").with_format(FormatKind::Duration));
//!     let kind = ResourceKind::new("kms", "kms", schema);
//!
//!     let remote = MockRemote::new();
//!     remote.expect_submit("kms").return_ok(MutateOutcome::Completed(
//!         RemoteModel::new("kms-1", "READY")
//!             .with_attribute("name", "vault")
//!             .with_attribute("rotation_period", "P1W"),
//!     ));
//!
//!     let lifecycle = ResourceLifecycle::new(Arc::new(remote), ProviderConfig::default(), kind)?;
//!     let plan = PlanModel::new()
//!         .explicit("name", "vault")
//!         .explicit("rotation_period", "P7D");
//!     let applied = lifecycle.create(&OpContext::new(), &plan).await?;
//!
//!     // The remote side normalized the period; the user's literal is kept.
//!     assert_eq!(applied.state.get_str("rotation_period"), Some("P7D"));
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! Poll timing is data, passed explicitly ([`ProviderConfig`]); there is no process-wide
//! state. See [`config`] for the TOML layout.

pub mod config;
pub mod context;
pub mod error;
pub mod lifecycle;
pub mod mock;
pub mod normalize;
pub mod order;
pub mod poller;
pub mod reconcile;
pub mod remote;
pub mod termination;
pub mod tracing;

// Re-export core types for convenience
pub use config::ProviderConfig;
pub use context::OpContext;
pub use error::{
    Checkpoint, NormalizeError, PolicyError, PollError, ProviderError, ReconcileError, RemoteError,
};
pub use lifecycle::{Applied, ResourceKind, ResourceLifecycle};
pub use normalize::{canonicalize, equivalent, values_equivalent, Canonical, FormatKind, IsoDuration};
pub use order::{OrderProvisioner, ProvisionOutcome};
pub use poller::{
    Observation, OperationPoller, PollOutcome, PollPolicy, StatusSet, MAX_POLL_DURATION,
};
pub use reconcile::{
    AttributeChange, FieldSpec, MergeReport, ModelReconciler, PlanModel, Planned, Schema,
    StateModel,
};
pub use remote::{
    Attributes, MutateOutcome, MutateRequest, Mutation, OperationHandle, OperationKind,
    OperationStatus, OrderApi, OrderHandle, OrderRequest, OrderStatus, RemoteClient, RemoteModel,
    ServiceIdentifier, TerminationApi, TerminationConfirmation, TerminationReason,
};
pub use termination::{Termination, TerminationOutcome, TerminationWorkflow};
