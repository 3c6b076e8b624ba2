use super::message::{ControlRequest, Reply};
use super::state::Faults;
use async_trait::async_trait;
use provider_framework::{
    MutateOutcome, MutateRequest, OperationHandle, OperationStatus, OrderApi, OrderRequest,
    OrderStatus, RemoteClient, RemoteError, RemoteModel, ServiceIdentifier, TerminationApi,
    TerminationConfirmation,
};
use tokio::sync::{mpsc, oneshot};

/// Cloneable handle to the control-plane actor.
#[derive(Clone)]
pub struct ControlPlaneClient {
    sender: mpsc::Sender<ControlRequest>,
}

impl ControlPlaneClient {
    pub fn new(sender: mpsc::Sender<ControlRequest>) -> Self {
        Self { sender }
    }

    /// Replaces the active fault switches.
    pub async fn set_faults(&self, faults: Faults) -> Result<(), RemoteError> {
        self.call(|respond_to| ControlRequest::SetFaults { faults, respond_to })
            .await
    }

    pub async fn clear_faults(&self) -> Result<(), RemoteError> {
        self.set_faults(Faults::default()).await
    }

    async fn call<T, F>(&self, build: F) -> Result<T, RemoteError>
    where
        F: FnOnce(Reply<T>) -> ControlRequest,
    {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(build(respond_to))
            .await
            .map_err(|_| RemoteError::Transport("control plane is closed".into()))?;
        response
            .await
            .map_err(|_| RemoteError::Transport("control plane dropped the request".into()))?
    }
}

#[async_trait]
impl RemoteClient for ControlPlaneClient {
    async fn submit(&self, request: MutateRequest) -> Result<MutateOutcome, RemoteError> {
        self.call(|respond_to| ControlRequest::Submit {
            request,
            respond_to,
        })
        .await
    }

    async fn fetch(&self, collection: &str, id: &str) -> Result<RemoteModel, RemoteError> {
        self.call(|respond_to| ControlRequest::Fetch {
            collection: collection.to_string(),
            id: id.to_string(),
            respond_to,
        })
        .await
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<MutateOutcome, RemoteError> {
        self.call(|respond_to| ControlRequest::Delete {
            collection: collection.to_string(),
            id: id.to_string(),
            respond_to,
        })
        .await
    }

    async fn operation_status(
        &self,
        collection: &str,
        operation: &OperationHandle,
    ) -> Result<OperationStatus, RemoteError> {
        self.call(|respond_to| ControlRequest::OperationStatus {
            collection: collection.to_string(),
            operation_id: operation.id.clone(),
            respond_to,
        })
        .await
    }
}

#[async_trait]
impl OrderApi for ControlPlaneClient {
    async fn place_order(&self, order: &OrderRequest) -> Result<i64, RemoteError> {
        self.call(|respond_to| ControlRequest::PlaceOrder {
            order: order.clone(),
            respond_to,
        })
        .await
    }

    async fn order_status(&self, order_id: i64) -> Result<OrderStatus, RemoteError> {
        self.call(|respond_to| ControlRequest::OrderStatus {
            order_id,
            respond_to,
        })
        .await
    }

    async fn service_for_order(
        &self,
        order_id: i64,
        plan_code: &str,
    ) -> Result<ServiceIdentifier, RemoteError> {
        self.call(|respond_to| ControlRequest::ServiceForOrder {
            order_id,
            plan_code: plan_code.to_string(),
            respond_to,
        })
        .await
    }
}

#[async_trait]
impl TerminationApi for ControlPlaneClient {
    async fn terminate(&self, service_id: &str) -> Result<String, RemoteError> {
        self.call(|respond_to| ControlRequest::Terminate {
            service_id: service_id.to_string(),
            respond_to,
        })
        .await
    }

    async fn confirm_termination(
        &self,
        service_id: &str,
        confirmation: &TerminationConfirmation,
    ) -> Result<(), RemoteError> {
        self.call(|respond_to| ControlRequest::ConfirmTermination {
            service_id: service_id.to_string(),
            confirmation: confirmation.clone(),
            respond_to,
        })
        .await
    }
}
