//! # Simulated Control Plane
//!
//! A stand-in for a cloud provider's API, built as an actor: one task owns all state
//! ([`ControlPlaneState`]) and processes [`ControlRequest`]s sequentially, so no locks
//! are needed. [`ControlPlaneClient`] is the cloneable handle that implements the
//! engine's collaborator traits on top of the channel.
//!
//! ## Behaviour
//!
//! - Operations and orders advance **one step per status query**
//!   (`todo → doing → done`, `todo → doing → delivered`), so a poll loop observes
//!   every intermediate state.
//! - Duration fields are rewritten to whole weeks when possible (`P7D` → `P1W`).
//! - Write-only fields are stored but always read back as `""`.
//! - [`Faults`] make operations or orders hang, or inject a status outside the known
//!   vocabulary.
//!
//! ```rust
//! use provider_sample::control_plane::{CollectionRules, ControlPlane};
//! use provider_framework::{MutateOutcome, MutateRequest, RemoteClient};
//! use std::collections::HashMap;
//!
//! #[tokio::main]
//! async fn main() {
//!     let catalog = HashMap::from([("bucket".to_string(), CollectionRules::default())]);
//!     let (actor, client) = ControlPlane::new(catalog, 16);
//!     tokio::spawn(actor.run());
//!
//!     let outcome = client
//!         .submit(MutateRequest::create("bucket", Default::default()))
//!         .await
//!         .unwrap();
//!     assert!(matches!(outcome, MutateOutcome::Completed(_)));
//! }
//! ```

mod client;
mod message;
mod state;

pub use client::ControlPlaneClient;
pub use message::{ControlRequest, Reply};
pub use state::{CollectionRules, ControlPlaneState, Faults};

use provider_framework::RemoteError;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// The server half: owns the state and the receiving end of the channel.
pub struct ControlPlane {
    receiver: mpsc::Receiver<ControlRequest>,
    state: ControlPlaneState,
}

impl ControlPlane {
    pub fn new(
        catalog: HashMap<String, CollectionRules>,
        buffer_size: usize,
    ) -> (Self, ControlPlaneClient) {
        let (sender, receiver) = mpsc::channel(buffer_size);
        let actor = Self {
            receiver,
            state: ControlPlaneState::new(catalog),
        };
        (actor, ControlPlaneClient::new(sender))
    }

    /// Processes requests until every client has been dropped.
    pub async fn run(mut self) {
        info!("Control plane started");

        while let Some(msg) = self.receiver.recv().await {
            match msg {
                ControlRequest::Submit {
                    request,
                    respond_to,
                } => {
                    debug!(collection = %request.collection, mutation = ?request.mutation, "Submit");
                    let _ = respond_to.send(log_err(self.state.submit(request)));
                }
                ControlRequest::Fetch {
                    collection,
                    id,
                    respond_to,
                } => {
                    let result = self.state.fetch(&collection, &id);
                    debug!(%collection, %id, found = result.is_ok(), "Fetch");
                    let _ = respond_to.send(result);
                }
                ControlRequest::Delete {
                    collection,
                    id,
                    respond_to,
                } => {
                    debug!(%collection, %id, "Delete");
                    let _ = respond_to.send(log_err(self.state.delete(&collection, &id)));
                }
                ControlRequest::OperationStatus {
                    collection,
                    operation_id,
                    respond_to,
                } => {
                    let _ = respond_to.send(self.state.operation_status(&collection, &operation_id));
                }
                ControlRequest::PlaceOrder { order, respond_to } => {
                    debug!(?order, "Place order");
                    let _ = respond_to.send(log_err(self.state.place_order(order)));
                }
                ControlRequest::OrderStatus {
                    order_id,
                    respond_to,
                } => {
                    let _ = respond_to.send(self.state.order_status(order_id));
                }
                ControlRequest::ServiceForOrder {
                    order_id,
                    plan_code,
                    respond_to,
                } => {
                    let _ = respond_to.send(self.state.service_for_order(order_id, &plan_code));
                }
                ControlRequest::Terminate {
                    service_id,
                    respond_to,
                } => {
                    let _ = respond_to.send(self.state.terminate(&service_id));
                }
                ControlRequest::ConfirmTermination {
                    service_id,
                    confirmation,
                    respond_to,
                } => {
                    let _ = respond_to.send(log_err(
                        self.state.confirm_termination(&service_id, &confirmation),
                    ));
                }
                ControlRequest::SetFaults { faults, respond_to } => {
                    self.state.set_faults(faults);
                    let _ = respond_to.send(Ok(()));
                }
            }
        }

        info!("Control plane stopped");
    }
}

fn log_err<T>(result: Result<T, RemoteError>) -> Result<T, RemoteError> {
    if let Err(e) = &result {
        warn!(error = %e, "Request rejected");
    }
    result
}
