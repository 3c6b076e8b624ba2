//! # Order Provisioner
//!
//! Billable resources are not created directly; they are **ordered**, and the service
//! appears once the order is delivered:
//!
//! ```text
//! place_order ──► orderId ──► poll status (todo | doing → delivered) ──► service_for_order
//! ```
//!
//! The order id is the only thing that survives a delivery timeout. [`ProvisionOutcome::Pending`]
//! hands it back so the caller can persist it and call [`OrderProvisioner::resume`] later
//! instead of placing (and paying for) a second order. Cancellation and unexpected order
//! statuses are terminal [`ProviderError::Failed`], which carries the order as
//! [`Checkpoint::Order`] state all the same.

use crate::context::OpContext;
use crate::error::{Checkpoint, PollError, ProviderError, RemoteError};
use crate::poller::{OperationPoller, PollOutcome, PollPolicy, StatusSet};
use crate::remote::{OrderApi, OrderHandle, OrderRequest, ServiceIdentifier};
use std::sync::Arc;
use tracing::{info, instrument, warn};

const ORDER_PENDING: [&str; 2] = ["todo", "doing"];
const ORDER_DELIVERED: &str = "delivered";

/// How [`OrderProvisioner::provision_and_wait`] ended.
#[derive(Debug, Clone, PartialEq)]
pub enum ProvisionOutcome {
    Delivered {
        handle: OrderHandle,
        service: ServiceIdentifier,
    },
    /// Delivery did not finish in time. Persist `handle`.
    Pending {
        handle: OrderHandle,
        reason: PollError,
    },
}

impl ProvisionOutcome {
    pub fn handle(&self) -> &OrderHandle {
        match self {
            ProvisionOutcome::Delivered { handle, .. } | ProvisionOutcome::Pending { handle, .. } => {
                handle
            }
        }
    }

    pub fn service(&self) -> Option<&ServiceIdentifier> {
        match self {
            ProvisionOutcome::Delivered { service, .. } => Some(service),
            ProvisionOutcome::Pending { .. } => None,
        }
    }
}

/// Places orders and waits for their delivery.
pub struct OrderProvisioner<C: OrderApi> {
    api: Arc<C>,
    poller: OperationPoller,
    statuses: StatusSet,
}

impl<C: OrderApi> OrderProvisioner<C> {
    pub fn new(api: Arc<C>) -> Self {
        Self {
            api,
            poller: OperationPoller::new("order"),
            statuses: StatusSet::new(ORDER_PENDING, [ORDER_DELIVERED]),
        }
    }

    /// Places the order. A non-positive order id from the API is rejected.
    #[instrument(skip(self, order), fields(plan_code = %order.plan_code))]
    pub async fn provision(&self, order: &OrderRequest) -> Result<OrderHandle, RemoteError> {
        let order_id = self.api.place_order(order).await?;
        if order_id <= 0 {
            warn!(order_id, "Order API returned an invalid order id");
            return Err(RemoteError::Api {
                code: 500,
                message: format!("invalid order id {order_id}"),
            });
        }
        info!(order_id, "Order placed");
        Ok(OrderHandle {
            order_id,
            plan_code: order.plan_code.clone(),
        })
    }

    /// Waits for delivery, then resolves the delivered service.
    #[instrument(skip(self, ctx, policy), fields(order_id = handle.order_id))]
    pub async fn await_delivery(
        &self,
        ctx: &OpContext,
        handle: &OrderHandle,
        policy: &PollPolicy,
    ) -> Result<ServiceIdentifier, PollError> {
        let order_id = handle.order_id;
        let outcome = self
            .poller
            .wait(
                ctx,
                || self.api.order_status(order_id),
                &self.statuses,
                policy,
            )
            .await?;

        if let PollOutcome::Gone = outcome {
            return Err(PollError::Transport(RemoteError::NotFound(format!(
                "order {order_id}"
            ))));
        }

        let service = self
            .api
            .service_for_order(order_id, &handle.plan_code)
            .await
            .map_err(PollError::Transport)?;
        info!(%service, "Order delivered");
        Ok(service)
    }

    /// Places the order and waits for it. A timeout is not an error here: the order id is
    /// returned in [`ProvisionOutcome::Pending`] so nothing is lost.
    pub async fn provision_and_wait(
        &self,
        ctx: &OpContext,
        order: &OrderRequest,
        policy: &PollPolicy,
    ) -> Result<ProvisionOutcome, ProviderError> {
        let handle = self.provision(order).await?;
        self.resume(ctx, handle, policy).await
    }

    /// Continues waiting on an order placed by an earlier run.
    pub async fn resume(
        &self,
        ctx: &OpContext,
        handle: OrderHandle,
        policy: &PollPolicy,
    ) -> Result<ProvisionOutcome, ProviderError> {
        match self.await_delivery(ctx, &handle, policy).await {
            Ok(service) => Ok(ProvisionOutcome::Delivered { handle, service }),
            Err(reason @ PollError::Timeout { .. }) => {
                warn!(
                    order_id = handle.order_id,
                    %reason,
                    "Order not yet delivered; keep the order id to resume"
                );
                Ok(ProvisionOutcome::Pending { handle, reason })
            }
            Err(err) => Err(ProviderError::from_poll(
                "order",
                Some(Checkpoint::Order(handle)),
                err,
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockRemote;
    use crate::remote::OrderStatus;
    use std::time::Duration;

    fn status(order_id: i64, status: &str) -> OrderStatus {
        OrderStatus {
            order_id,
            status: status.to_string(),
        }
    }

    fn policy() -> PollPolicy {
        PollPolicy::new(
            Duration::from_millis(10),
            Duration::from_millis(100),
            Duration::from_secs(1),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_provision_and_wait_delivers_service() {
        let mock = MockRemote::new();
        mock.expect_place_order().return_ok(42);
        mock.expect_order_status(42).return_ok(status(42, "todo"));
        mock.expect_order_status(42).return_ok(status(42, "doing"));
        mock.expect_order_status(42).return_ok(status(42, "delivered"));
        mock.expect_service_for_order(42)
            .return_ok(ServiceIdentifier("db-7".into()));

        let provisioner = OrderProvisioner::new(Arc::new(mock.clone()));
        let outcome = provisioner
            .provision_and_wait(&OpContext::new(), &OrderRequest::new("db-small"), &policy())
            .await
            .unwrap();

        assert_eq!(outcome.service(), Some(&ServiceIdentifier("db-7".into())));
        assert_eq!(outcome.handle().order_id, 42);
        mock.verify();
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_keeps_order_id() {
        let mock = MockRemote::new();
        mock.expect_place_order().return_ok(7);
        mock.expect_order_status(7)
            .return_ok_times(status(7, "doing"), 11);

        let provisioner = OrderProvisioner::new(Arc::new(mock.clone()));
        let outcome = provisioner
            .provision_and_wait(&OpContext::new(), &OrderRequest::new("db-small"), &policy())
            .await
            .unwrap();

        match outcome {
            ProvisionOutcome::Pending { handle, reason } => {
                assert_eq!(handle.order_id, 7);
                assert!(reason.is_timeout());
            }
            other => panic!("expected pending, got {other:?}"),
        }
        mock.verify();
    }

    #[tokio::test]
    async fn test_zero_order_id_is_rejected() {
        let mock = MockRemote::new();
        mock.expect_place_order().return_ok(0);

        let provisioner = OrderProvisioner::new(Arc::new(mock.clone()));
        let err = provisioner
            .provision(&OrderRequest::new("db-small"))
            .await
            .unwrap_err();

        assert!(matches!(err, RemoteError::Api { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_wait_is_terminal_but_keeps_order() {
        let mock = MockRemote::new();
        mock.expect_place_order().return_ok(12);

        let ctx = OpContext::new();
        ctx.cancel();
        let provisioner = OrderProvisioner::new(Arc::new(mock.clone()));
        let err = provisioner
            .provision_and_wait(&ctx, &OrderRequest::new("db-small"), &policy())
            .await
            .unwrap_err();

        assert!(matches!(err, ProviderError::Failed { source: PollError::Cancelled, .. }), "{err}");
        let state = err.partial_state().unwrap();
        assert_eq!(state.get("order_id"), Some(&serde_json::json!(12)));
        assert_eq!(state.get_str("plan_code"), Some("db-small"));
        mock.verify();
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_order_is_unknown_status() {
        let mock = MockRemote::new();
        mock.expect_order_status(9).return_ok(status(9, "cancelled"));

        let provisioner = OrderProvisioner::new(Arc::new(mock.clone()));
        let handle = OrderHandle {
            order_id: 9,
            plan_code: "db-small".into(),
        };
        let err = provisioner
            .resume(&OpContext::new(), handle, &policy())
            .await
            .unwrap_err();

        assert!(matches!(err, ProviderError::Failed { .. }));
    }
}
