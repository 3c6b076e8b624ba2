//! # Resource Lifecycle
//!
//! [`ResourceLifecycle`] is the generic create/read/update/delete driver. Every call
//! follows the same shape:
//!
//! ```text
//! submit ──► Completed(object) ─────────────────────────┐
//!        └─► Accepted(operation) ──► poll operation ──► poll object until ready
//!                                                         │
//!                          fetch ◄────────────────────────┘
//!                            │
//!                 merge(plan, prior, remote) ──► Applied
//! ```
//!
//! A resource type is described by data, not code: a [`ResourceKind`] carries the
//! collection name, the [`Schema`] and the status vocabularies.
//!
//! ## Timeouts
//!
//! Each call runs under a child [`OpContext`] whose deadline is the tighter of the
//! caller's and the per-class [`PollPolicy`] timeout from [`ProviderConfig`]. Once the
//! remote side has accepted work, every poll failure carries a [`Checkpoint`]: the object
//! id, or the pending operation when the id is not known yet. A timeout becomes
//! [`ProviderError::Incomplete`] and the next run calls [`ResourceLifecycle::resume`]
//! instead of creating a duplicate. Cancellation and unexpected statuses are terminal
//! [`ProviderError::Failed`], which still carries the same partial state.

use crate::config::ProviderConfig;
use crate::context::OpContext;
use crate::error::{Checkpoint, PollError, ProviderError, RemoteError};
use crate::poller::{OperationPoller, PollOutcome, PollPolicy, StatusSet};
use crate::reconcile::{ModelReconciler, PlanModel, Schema, StateModel};
use crate::remote::{
    MutateOutcome, MutateRequest, OperationHandle, OperationKind, OperationStatus, RemoteClient,
    RemoteModel,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// State key recording an operation whose target object id is not yet known.
pub const PENDING_OPERATION_KEY: &str = "pending_operation";

/// Everything the engine needs to know about one resource type.
#[derive(Debug, Clone)]
pub struct ResourceKind {
    pub name: String,
    pub collection: String,
    pub schema: Schema,
    /// Vocabulary of `GET <collection>/<id>/operation/<opId>`.
    pub operation: StatusSet,
    /// Vocabulary of the object itself while it settles after create/update.
    pub ready: StatusSet,
    /// Vocabulary of the object while it is being deleted.
    pub deleted: StatusSet,
}

impl ResourceKind {
    pub fn new(name: impl Into<String>, collection: impl Into<String>, schema: Schema) -> Self {
        Self {
            name: name.into(),
            collection: collection.into(),
            schema,
            operation: StatusSet::new(["todo", "doing"], ["done"]),
            ready: StatusSet::new(["CREATING", "UPDATING"], ["READY"]),
            deleted: StatusSet::deletion(["DELETING"]),
        }
    }

    pub fn with_operation_statuses(mut self, statuses: StatusSet) -> Self {
        self.operation = statuses;
        self
    }

    pub fn with_ready_statuses(mut self, statuses: StatusSet) -> Self {
        self.ready = statuses;
        self
    }

    pub fn with_deletion_statuses(mut self, statuses: StatusSet) -> Self {
        self.deleted = statuses;
        self
    }
}

/// Result of a successful create, update or resume.
#[derive(Debug, Clone, PartialEq)]
pub struct Applied {
    pub id: String,
    /// The state to persist; becomes the prior state of the next call.
    pub state: StateModel,
    /// Fields where the remote value disagreed with the plan and was surfaced.
    pub drifted: Vec<String>,
}

pub struct ResourceLifecycle<C: RemoteClient> {
    client: Arc<C>,
    config: ProviderConfig,
    kind: ResourceKind,
    reconciler: ModelReconciler,
    poller: OperationPoller,
}

impl<C: RemoteClient> ResourceLifecycle<C> {
    pub fn new(
        client: Arc<C>,
        config: ProviderConfig,
        kind: ResourceKind,
    ) -> Result<Self, ProviderError> {
        config.validate()?;
        Ok(Self {
            client,
            config,
            reconciler: ModelReconciler::new(kind.schema.clone()),
            poller: OperationPoller::new(kind.name.clone()),
            kind,
        })
    }

    #[instrument(skip_all, fields(resource_type = %self.kind.name))]
    pub async fn create(&self, ctx: &OpContext, plan: &PlanModel) -> Result<Applied, ProviderError> {
        self.reconciler.validate_plan(plan)?;
        let policy = self.config.create;
        let ctx = ctx.with_timeout(policy.timeout);

        let request = MutateRequest::create(&self.kind.collection, plan.explicit_attributes());
        let outcome = self.client.submit(request).await?;
        let partial = StateModel::from_attributes(plan.explicit_attributes());

        let remote = self.settle(&ctx, outcome, None, &policy, partial).await?;
        info!(id = %remote.id, "Created");
        self.finish(plan, &StateModel::new(), remote)
    }

    /// Refreshes `prior` from the remote side. `Ok(None)` means the object is gone and
    /// should be dropped from state.
    #[instrument(skip_all, fields(resource_type = %self.kind.name, id))]
    pub async fn read(
        &self,
        ctx: &OpContext,
        plan: &PlanModel,
        prior: &StateModel,
    ) -> Result<Option<StateModel>, ProviderError> {
        let id = self.require_id(prior)?;
        tracing::Span::current().record("id", id);

        let fetched = tokio::select! {
            biased;
            _ = ctx.cancelled() => {
                let checkpoint = Checkpoint::Resource(id.to_string());
                return Err(ProviderError::from_poll(&self.kind.name, Some(checkpoint), PollError::Cancelled));
            }
            result = self.client.fetch_optional(&self.kind.collection, id) => result?,
        };
        let Some(remote) = fetched else {
            info!("Remote object is gone; dropping from state");
            return Ok(None);
        };
        let merged = self.reconciler.merge(plan, prior, &remote.to_state())?;
        Ok(Some(merged))
    }

    /// Sends only the attributes that really change. Nothing to change means no request.
    #[instrument(skip_all, fields(resource_type = %self.kind.name, id))]
    pub async fn update(
        &self,
        ctx: &OpContext,
        plan: &PlanModel,
        prior: &StateModel,
    ) -> Result<Applied, ProviderError> {
        let id = self.require_id(prior)?.to_string();
        tracing::Span::current().record("id", id.as_str());

        let changes = self.reconciler.plan_changes(plan, prior)?;
        if changes.is_empty() {
            debug!("No changes to apply");
            return Ok(Applied {
                id,
                state: prior.clone(),
                drifted: Vec::new(),
            });
        }
        debug!(
            fields = ?changes.iter().map(|c| c.field.as_str()).collect::<Vec<_>>(),
            "Applying changes"
        );

        let policy = self.config.update;
        let ctx = ctx.with_timeout(policy.timeout);
        let body = changes
            .into_iter()
            .map(|change| (change.field, change.after))
            .collect();
        let outcome = self
            .client
            .submit(MutateRequest::update(&self.kind.collection, &id, body))
            .await?;

        let remote = self
            .settle(&ctx, outcome, Some(&id), &policy, prior.clone())
            .await?;
        info!("Updated");
        self.finish(plan, prior, remote)
    }

    /// Runs a resource-specific action (`POST <collection>/<id>/<action>`) and refreshes state.
    #[instrument(skip(self, ctx, plan, prior), fields(resource_type = %self.kind.name, id))]
    pub async fn perform(
        &self,
        ctx: &OpContext,
        plan: &PlanModel,
        prior: &StateModel,
        action: &str,
    ) -> Result<Applied, ProviderError> {
        let id = self.require_id(prior)?.to_string();
        tracing::Span::current().record("id", id.as_str());

        let policy = self.config.update;
        let ctx = ctx.with_timeout(policy.timeout);
        let outcome = self
            .client
            .submit(MutateRequest::action(&self.kind.collection, &id, action))
            .await?;

        let remote = self
            .settle(&ctx, outcome, Some(&id), &policy, prior.clone())
            .await?;
        info!("Action completed");
        self.finish(plan, prior, remote)
    }

    /// Deletes the object and waits until it is gone. Deleting something already gone succeeds.
    #[instrument(skip(self, ctx), fields(resource_type = %self.kind.name))]
    pub async fn delete(&self, ctx: &OpContext, id: &str) -> Result<(), ProviderError> {
        let policy = self.config.delete;
        let ctx = ctx.with_timeout(policy.timeout);

        let outcome = match self.client.delete(&self.kind.collection, id).await {
            Ok(outcome) => outcome,
            Err(e) if e.is_gone() => {
                info!("Already deleted");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        if let MutateOutcome::Accepted { operation, .. } = &outcome {
            self.wait_operation(&ctx, operation, &policy)
                .await
                .map_err(|e| self.poll_failed(Checkpoint::Resource(id.to_string()), e))?;
        }

        let collection = self.kind.collection.as_str();
        self.poller
            .wait(
                &ctx,
                || self.client.fetch(collection, id),
                &self.kind.deleted,
                &settle_policy(&policy),
            )
            .await
            .map_err(|e| self.poll_failed(Checkpoint::Resource(id.to_string()), e))?;
        info!("Deleted");
        Ok(())
    }

    /// Picks up a create or update that timed out, from the partial state it left behind.
    #[instrument(skip_all, fields(resource_type = %self.kind.name))]
    pub async fn resume(
        &self,
        ctx: &OpContext,
        plan: &PlanModel,
        partial: &StateModel,
    ) -> Result<Applied, ProviderError> {
        let policy = self.config.create;
        let ctx = ctx.with_timeout(policy.timeout);

        let id = match (partial.id(), partial.get_str(PENDING_OPERATION_KEY)) {
            (Some(id), _) => id.to_string(),
            (None, Some(operation_id)) => {
                let operation = OperationHandle::new(operation_id, OperationKind::Create);
                info!(%operation, "Resuming operation");
                self.operation_target(&ctx, &operation, None, &policy, partial)
                    .await?
            }
            (None, None) => {
                return Err(ProviderError::Config(format!(
                    "{} state has neither an id nor a pending operation to resume",
                    self.kind.name
                )))
            }
        };

        info!(%id, "Resuming");
        let remote = self.wait_ready(&ctx, &id, &policy, partial).await?;
        let prior = without_pending_operation(partial);
        self.finish(plan, &prior, remote)
    }

    fn require_id<'a>(&self, state: &'a StateModel) -> Result<&'a str, ProviderError> {
        state.id().ok_or_else(|| {
            ProviderError::Config(format!("{} state has no id", self.kind.name))
        })
    }

    fn poll_failed(&self, checkpoint: Checkpoint, err: PollError) -> ProviderError {
        ProviderError::from_poll(&self.kind.name, Some(checkpoint), err)
    }

    fn finish(
        &self,
        plan: &PlanModel,
        prior: &StateModel,
        remote: RemoteModel,
    ) -> Result<Applied, ProviderError> {
        let report = self
            .reconciler
            .merge_with_report(plan, prior, &remote.to_state())?;
        if !report.drifted.is_empty() {
            warn!(id = %remote.id, drifted = ?report.drifted, "Remote values differ from configuration");
        }
        Ok(Applied {
            id: remote.id,
            state: report.result,
            drifted: report.drifted,
        })
    }

    /// Turns a mutate outcome into a settled remote object.
    async fn settle(
        &self,
        ctx: &OpContext,
        outcome: MutateOutcome,
        known_id: Option<&str>,
        policy: &PollPolicy,
        partial: StateModel,
    ) -> Result<RemoteModel, ProviderError> {
        let id = match outcome {
            MutateOutcome::Completed(model) if self.kind.ready.is_target(&model.status) => {
                return Ok(model)
            }
            MutateOutcome::Completed(model) => model.id,
            MutateOutcome::Accepted {
                operation,
                resource_id,
            } => {
                info!(%operation, ?resource_id, "Operation accepted");
                let hint = resource_id.as_deref().or(known_id);
                self.operation_target(ctx, &operation, hint, policy, &partial)
                    .await?
            }
        };
        self.wait_ready(ctx, &id, policy, &partial).await
    }

    /// Waits for an operation and returns the id of the object it produced.
    async fn operation_target(
        &self,
        ctx: &OpContext,
        operation: &OperationHandle,
        hint: Option<&str>,
        policy: &PollPolicy,
        partial: &StateModel,
    ) -> Result<String, ProviderError> {
        let finished = match self.wait_operation(ctx, operation, policy).await {
            Ok(finished) => finished,
            Err(e) => {
                let checkpoint = match hint {
                    Some(id) => Checkpoint::Resource(id.to_string()),
                    None => Checkpoint::Operation(operation.id.clone()),
                };
                return Err(self.poll_failed(checkpoint, e).with_partial_state(partial.clone()));
            }
        };

        finished
            .and_then(|status| status.resource_id)
            .or_else(|| hint.map(str::to_string))
            .ok_or_else(|| {
                ProviderError::Remote(RemoteError::Api {
                    code: 500,
                    message: format!("operation {operation} finished without a resource id"),
                })
            })
    }

    async fn wait_operation(
        &self,
        ctx: &OpContext,
        operation: &OperationHandle,
        policy: &PollPolicy,
    ) -> Result<Option<OperationStatus>, PollError> {
        let collection = self.kind.collection.as_str();
        let outcome = self
            .poller
            .wait(
                ctx,
                || self.client.operation_status(collection, operation),
                &self.kind.operation,
                policy,
            )
            .await?;
        Ok(outcome.into_reached())
    }

    async fn wait_ready(
        &self,
        ctx: &OpContext,
        id: &str,
        policy: &PollPolicy,
        partial: &StateModel,
    ) -> Result<RemoteModel, ProviderError> {
        let collection = self.kind.collection.as_str();
        let outcome = self
            .poller
            .wait(
                ctx,
                || self.client.fetch(collection, id),
                &self.kind.ready,
                &settle_policy(policy),
            )
            .await;

        match outcome {
            Ok(PollOutcome::Reached(model)) => Ok(model),
            Ok(PollOutcome::Gone) => Err(RemoteError::NotFound(format!(
                "{}/{id}",
                self.kind.collection
            ))
            .into()),
            Err(e) => Err(self
                .poll_failed(Checkpoint::Resource(id.to_string()), e)
                .with_partial_state(partial.clone())),
        }
    }
}

/// The object is usually settled once its operation is; check right away.
fn settle_policy(policy: &PollPolicy) -> PollPolicy {
    PollPolicy {
        initial_delay: Duration::ZERO,
        ..*policy
    }
}

fn without_pending_operation(partial: &StateModel) -> StateModel {
    StateModel::from_attributes(
        partial
            .iter()
            .filter(|(name, _)| name.as_str() != PENDING_OPERATION_KEY)
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect(),
    )
}
