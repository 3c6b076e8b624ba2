use crate::control_plane::ControlPlaneClient;
use crate::model::{database, DatabaseConfig};
use provider_framework::{
    Applied, Checkpoint, OpContext, OrderHandle, OrderProvisioner, PollError, PollPolicy,
    ProviderConfig, ProviderError, ProvisionOutcome, ResourceLifecycle, StateModel,
    TerminationOutcome, TerminationReason, TerminationWorkflow,
};
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Databases are ordered, read and updated like any object, and decommissioned through
/// the termination protocol.
pub struct DatabaseClient {
    orders: OrderProvisioner<ControlPlaneClient>,
    termination: TerminationWorkflow<ControlPlaneClient>,
    records: ResourceLifecycle<ControlPlaneClient>,
    order_policy: PollPolicy,
}

impl DatabaseClient {
    pub fn new(client: Arc<ControlPlaneClient>, config: ProviderConfig) -> Result<Self, ProviderError> {
        let order_policy = config.order;
        Ok(Self {
            orders: OrderProvisioner::new(client.clone()),
            termination: TerminationWorkflow::new(client.clone()),
            records: ResourceLifecycle::new(client, config, database::kind())?,
            order_policy,
        })
    }

    /// Orders the database and waits for delivery. If delivery outlasts the order
    /// policy the error is `Incomplete`; if the wait is cancelled it is `Failed`. Either
    /// way its partial state holds the order id.
    #[instrument(skip_all, fields(plan_code = %config.plan_code))]
    pub async fn create(
        &self,
        ctx: &OpContext,
        config: &DatabaseConfig,
    ) -> Result<Applied, ProviderError> {
        let outcome = self
            .orders
            .provision_and_wait(ctx, &config.to_order(), &self.order_policy)
            .await?;
        self.finish_order(ctx, config, outcome).await
    }

    /// Continues a create that ended with an order id in its partial state, without
    /// ordering again.
    #[instrument(skip_all, fields(plan_code = %config.plan_code))]
    pub async fn resume(
        &self,
        ctx: &OpContext,
        config: &DatabaseConfig,
        partial: &StateModel,
    ) -> Result<Applied, ProviderError> {
        if partial.id().is_some() {
            return self.records.resume(ctx, &config.to_plan(), partial).await;
        }
        let order_id = partial
            .get("order_id")
            .and_then(|v| v.as_i64())
            .filter(|id| *id > 0)
            .ok_or_else(|| {
                ProviderError::Config("database state has neither an id nor an order id".into())
            })?;

        info!(order_id, "Resuming order");
        let handle = OrderHandle {
            order_id,
            plan_code: config.plan_code.clone(),
        };
        let outcome = self.orders.resume(ctx, handle, &self.order_policy).await?;
        self.finish_order(ctx, config, outcome).await
    }

    pub async fn read(
        &self,
        ctx: &OpContext,
        config: &DatabaseConfig,
        state: &StateModel,
    ) -> Result<Option<StateModel>, ProviderError> {
        self.records.read(ctx, &config.to_plan(), state).await
    }

    pub async fn update(
        &self,
        ctx: &OpContext,
        config: &DatabaseConfig,
        state: &StateModel,
    ) -> Result<Applied, ProviderError> {
        self.records.update(ctx, &config.to_plan(), state).await
    }

    /// Terminates and confirms. Running it again on a terminated service succeeds.
    #[instrument(skip(self, state))]
    pub async fn delete(
        &self,
        state: &StateModel,
        commentary: Option<String>,
    ) -> Result<TerminationOutcome, ProviderError> {
        let service_id = state
            .id()
            .ok_or_else(|| ProviderError::Config("database state has no id".into()))?;
        let outcome = self
            .termination
            .run(service_id, Some(TerminationReason::NotNeededAnymore), commentary)
            .await?;
        Ok(outcome)
    }

    async fn finish_order(
        &self,
        ctx: &OpContext,
        config: &DatabaseConfig,
        outcome: ProvisionOutcome,
    ) -> Result<Applied, ProviderError> {
        match outcome {
            ProvisionOutcome::Delivered { handle, service } => {
                let delivered = StateModel::new()
                    .with("id", service.0)
                    .with("order_id", handle.order_id);
                self.records.resume(ctx, &config.to_plan(), &delivered).await
            }
            ProvisionOutcome::Pending { handle, reason } => Err(pending(handle, reason)),
        }
    }
}

fn pending(handle: OrderHandle, reason: PollError) -> ProviderError {
    warn!(order_id = handle.order_id, "Delivery still pending; order id preserved");
    ProviderError::from_poll("database", Some(Checkpoint::Order(handle)), reason)
}
