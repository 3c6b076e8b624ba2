//! # Remote Collaborator
//!
//! The engine never speaks HTTP. It talks to the control plane through the traits in
//! this module, which a REST client (or a simulator, or the [`mock`](crate::mock)) implements:
//!
//! - [`RemoteClient`]: `submit`, `fetch`, `delete`, plus operation status lookups.
//! - [`OrderApi`]: billable resources that are ordered and delivered.
//! - [`TerminationApi`]: the two-step terminate → confirm decommission protocol.
//!
//! Implementations must be safe for concurrent use; rate limiting and connection
//! pooling are their business, not the engine's.

use crate::error::RemoteError;
use crate::poller::Observation;
use crate::reconcile::StateModel;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt::Display;

/// Attribute bag carried by requests and remote objects.
pub type Attributes = Map<String, Value>;

/// What kind of asynchronous work an [`OperationHandle`] tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Create,
    Update,
    Delete,
    Order,
}

/// Identifies one unit of asynchronous work on the remote side.
///
/// Created when a mutating request is accepted; consumed by a single poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationHandle {
    pub id: String,
    pub kind: OperationKind,
}

impl OperationHandle {
    pub fn new(id: impl Into<String>, kind: OperationKind) -> Self {
        Self {
            id: id.into(),
            kind,
        }
    }
}

impl Display for OperationHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}/{}", self.kind, self.id)
    }
}

/// Progress report for an operation (`GET <collection>/<id>/operation/<opId>`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationStatus {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
}

/// A freshly fetched, authoritative remote object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteModel {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub attributes: Attributes,
}

impl RemoteModel {
    pub fn new(id: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: status.into(),
            attributes: Attributes::new(),
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Flattens the object into a state view; `id` and `status` become ordinary fields.
    pub fn to_state(&self) -> StateModel {
        let mut state = StateModel::from_attributes(self.attributes.clone());
        state.set("id", Value::String(self.id.clone()));
        state.set("status", Value::String(self.status.clone()));
        state
    }
}

/// The mutation a [`MutateRequest`] performs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    /// `POST <collection>`
    Create,
    /// `PUT <collection>/<id>`
    Update { id: String },
    /// `POST <collection>/<id>/<action>`
    Action { id: String, action: String },
}

/// A mutating request against one collection.
#[derive(Debug, Clone, PartialEq)]
pub struct MutateRequest {
    pub collection: String,
    pub mutation: Mutation,
    pub body: Attributes,
}

impl MutateRequest {
    pub fn create(collection: impl Into<String>, body: Attributes) -> Self {
        Self {
            collection: collection.into(),
            mutation: Mutation::Create,
            body,
        }
    }

    pub fn update(collection: impl Into<String>, id: impl Into<String>, body: Attributes) -> Self {
        Self {
            collection: collection.into(),
            mutation: Mutation::Update { id: id.into() },
            body,
        }
    }

    pub fn action(
        collection: impl Into<String>,
        id: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            collection: collection.into(),
            mutation: Mutation::Action {
                id: id.into(),
                action: action.into(),
            },
            body: Attributes::new(),
        }
    }
}

/// A mutation either completes inline or hands back an operation to poll.
#[derive(Debug, Clone, PartialEq)]
pub enum MutateOutcome {
    /// The remote side answered with the object itself; nothing to wait for.
    Completed(RemoteModel),
    /// The remote side accepted the work and will perform it asynchronously.
    Accepted {
        operation: OperationHandle,
        /// Identifier of the affected object when the API reveals it up front.
        resource_id: Option<String>,
    },
}

/// Core request/response surface of a control-plane API.
#[async_trait]
pub trait RemoteClient: Send + Sync {
    async fn submit(&self, request: MutateRequest) -> Result<MutateOutcome, RemoteError>;

    async fn fetch(&self, collection: &str, id: &str) -> Result<RemoteModel, RemoteError>;

    async fn delete(&self, collection: &str, id: &str) -> Result<MutateOutcome, RemoteError>;

    async fn operation_status(
        &self,
        collection: &str,
        operation: &OperationHandle,
    ) -> Result<OperationStatus, RemoteError>;

    /// Fetch an object, mapping `NotFound` to `None`.
    #[tracing::instrument(skip(self))]
    async fn fetch_optional(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<RemoteModel>, RemoteError> {
        match self.fetch(collection, id).await {
            Ok(model) => Ok(Some(model)),
            Err(e) if e.is_not_found() => {
                tracing::debug!("Remote object is gone");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

/// An order for a billable resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub plan_code: String,
    #[serde(default)]
    pub configuration: Attributes,
}

impl OrderRequest {
    pub fn new(plan_code: impl Into<String>) -> Self {
        Self {
            plan_code: plan_code.into(),
            configuration: Attributes::new(),
        }
    }

    pub fn with_configuration(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.configuration.insert(name.into(), value.into());
        self
    }
}

/// A placed order. `order_id` is what survives a delivery timeout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderHandle {
    pub order_id: i64,
    pub plan_code: String,
}

/// `GET /order/<orderId>/status`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderStatus {
    pub order_id: i64,
    pub status: String,
}

/// Identifier of the delivered service, known only once delivery completes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServiceIdentifier(pub String);

impl Display for ServiceIdentifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[async_trait]
pub trait OrderApi: Send + Sync {
    /// Place the order and return its id.
    async fn place_order(&self, order: &OrderRequest) -> Result<i64, RemoteError>;

    async fn order_status(&self, order_id: i64) -> Result<OrderStatus, RemoteError>;

    /// Resolve the service delivered for `(order_id, plan_code)`.
    async fn service_for_order(
        &self,
        order_id: i64,
        plan_code: &str,
    ) -> Result<ServiceIdentifier, RemoteError>;
}

/// Why a service is being decommissioned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TerminationReason {
    NotNeededAnymore,
    MigratedToAnotherProvider,
    Other,
}

/// Payload of the second step of the termination protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminationConfirmation {
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<TerminationReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commentary: Option<String>,
}

#[async_trait]
pub trait TerminationApi: Send + Sync {
    /// Request termination; returns the token that must be confirmed.
    ///
    /// Implementations report an already decommissioned service as
    /// [`RemoteError::NotFound`] or [`RemoteError::AlreadyTerminated`].
    async fn terminate(&self, service_id: &str) -> Result<String, RemoteError>;

    async fn confirm_termination(
        &self,
        service_id: &str,
        confirmation: &TerminationConfirmation,
    ) -> Result<(), RemoteError>;
}

impl Observation for OperationStatus {
    fn status(&self) -> &str {
        &self.status
    }
}

impl Observation for OrderStatus {
    fn status(&self) -> &str {
        &self.status
    }
}

impl Observation for RemoteModel {
    fn status(&self) -> &str {
        &self.status
    }
}
