use super::state::Faults;
use provider_framework::{
    MutateOutcome, MutateRequest, OperationStatus, OrderRequest, OrderStatus, RemoteError,
    RemoteModel, ServiceIdentifier, TerminationConfirmation,
};
use tokio::sync::oneshot;

/// One-shot reply channel carried by every request.
pub type Reply<T> = oneshot::Sender<Result<T, RemoteError>>;

/// Requests understood by the control-plane actor; one variant per API endpoint.
#[derive(Debug)]
pub enum ControlRequest {
    Submit {
        request: MutateRequest,
        respond_to: Reply<MutateOutcome>,
    },
    Fetch {
        collection: String,
        id: String,
        respond_to: Reply<RemoteModel>,
    },
    Delete {
        collection: String,
        id: String,
        respond_to: Reply<MutateOutcome>,
    },
    OperationStatus {
        collection: String,
        operation_id: String,
        respond_to: Reply<OperationStatus>,
    },
    PlaceOrder {
        order: OrderRequest,
        respond_to: Reply<i64>,
    },
    OrderStatus {
        order_id: i64,
        respond_to: Reply<OrderStatus>,
    },
    ServiceForOrder {
        order_id: i64,
        plan_code: String,
        respond_to: Reply<ServiceIdentifier>,
    },
    Terminate {
        service_id: String,
        respond_to: Reply<String>,
    },
    ConfirmTermination {
        service_id: String,
        confirmation: TerminationConfirmation,
        respond_to: Reply<()>,
    },
    SetFaults {
        faults: Faults,
        respond_to: Reply<()>,
    },
}
