//! In-memory model of the control plane. Owned exclusively by the actor task, so no locks.

use provider_framework::{
    Attributes, IsoDuration, MutateOutcome, MutateRequest, Mutation, OperationHandle,
    OperationKind, OperationStatus, OrderRequest, OrderStatus, RemoteError, RemoteModel,
    ServiceIdentifier, TerminationConfirmation,
};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, info};

const NANOS_PER_WEEK: i128 = 7 * 24 * 60 * 60 * 1_000_000_000;

/// How one collection behaves.
#[derive(Debug, Clone, Default)]
pub struct CollectionRules {
    /// Accepted on write, never returned on read.
    pub write_only: BTreeSet<String>,
    /// Duration fields the API rewrites to its preferred form (`P7D` → `P1W`).
    pub durations: BTreeSet<String>,
    /// Values filled in when the request leaves them out.
    pub defaults: Attributes,
    /// Domain used to build the computed `endpoint` attribute.
    pub endpoint_domain: Option<String>,
    /// Creates answer with an operation instead of the object.
    pub async_create: bool,
}

impl CollectionRules {
    pub fn write_only<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.write_only.extend(fields.into_iter().map(Into::into));
        self
    }

    pub fn durations<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.durations.extend(fields.into_iter().map(Into::into));
        self
    }

    pub fn default_value(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.defaults.insert(field.into(), value.into());
        self
    }

    pub fn endpoint_domain(mut self, domain: impl Into<String>) -> Self {
        self.endpoint_domain = Some(domain.into());
        self
    }

    pub fn async_create(mut self) -> Self {
        self.async_create = true;
        self
    }
}

/// Switches for simulating a misbehaving control plane.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Faults {
    /// Operations stop advancing at `doing`.
    pub stuck_operations: bool,
    /// Orders stop advancing at `doing`.
    pub stuck_orders: bool,
    /// The next operation status query answers with this status.
    pub next_operation_status: Option<String>,
}

#[derive(Debug)]
struct SimObject {
    collection: String,
    status: String,
    attributes: Attributes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Effect {
    Create,
    Delete,
    Action,
}

#[derive(Debug)]
struct SimOperation {
    collection: String,
    object_id: String,
    effect: Effect,
    action: Option<String>,
    step: usize,
}

const OPERATION_STEPS: [&str; 3] = ["todo", "doing", "done"];
const ORDER_STEPS: [&str; 3] = ["todo", "doing", "delivered"];

#[derive(Debug)]
struct SimOrder {
    request: OrderRequest,
    step: usize,
    service: Option<String>,
}

#[derive(Debug)]
struct SimService {
    order_id: i64,
    pending_token: Option<String>,
    terminated: bool,
}

/// Everything the simulated control plane knows.
#[derive(Debug, Default)]
pub struct ControlPlaneState {
    catalog: HashMap<String, CollectionRules>,
    objects: HashMap<String, SimObject>,
    operations: HashMap<String, SimOperation>,
    orders: HashMap<i64, SimOrder>,
    services: HashMap<String, SimService>,
    faults: Faults,
    next_id: u64,
    next_order_id: i64,
}

impl ControlPlaneState {
    pub fn new(catalog: HashMap<String, CollectionRules>) -> Self {
        Self {
            catalog,
            next_id: 1,
            next_order_id: 1001,
            ..Self::default()
        }
    }

    pub fn set_faults(&mut self, faults: Faults) {
        info!(?faults, "Faults updated");
        self.faults = faults;
    }

    pub fn submit(&mut self, request: MutateRequest) -> Result<MutateOutcome, RemoteError> {
        let rules = self.rules(&request.collection)?.clone();
        match request.mutation {
            Mutation::Create => {
                let id = format!("{}-{}", request.collection, self.bump());
                let mut attributes = rules.defaults.clone();
                attributes.extend(normalize(&rules, request.body));
                if let Some(domain) = &rules.endpoint_domain {
                    attributes.insert("endpoint".into(), Value::String(format!("https://{id}.{domain}")));
                }

                if rules.async_create {
                    self.objects.insert(
                        id.clone(),
                        SimObject {
                            collection: request.collection.clone(),
                            status: "CREATING".into(),
                            attributes,
                        },
                    );
                    let operation = self.start_operation(&request.collection, &id, Effect::Create, None);
                    info!(collection = %request.collection, %id, %operation, "Create accepted");
                    Ok(MutateOutcome::Accepted {
                        operation,
                        resource_id: None,
                    })
                } else {
                    self.objects.insert(
                        id.clone(),
                        SimObject {
                            collection: request.collection.clone(),
                            status: "READY".into(),
                            attributes,
                        },
                    );
                    info!(collection = %request.collection, %id, "Created");
                    self.model(&request.collection, &id).map(MutateOutcome::Completed)
                }
            }
            Mutation::Update { id } => {
                let object = self.object_mut(&request.collection, &id)?;
                object.attributes.extend(normalize(&rules, request.body));
                info!(collection = %request.collection, %id, "Updated");
                self.model(&request.collection, &id).map(MutateOutcome::Completed)
            }
            Mutation::Action { id, action } => {
                self.object_mut(&request.collection, &id)?;
                let operation =
                    self.start_operation(&request.collection, &id, Effect::Action, Some(action));
                Ok(MutateOutcome::Accepted {
                    operation,
                    resource_id: Some(id),
                })
            }
        }
    }

    pub fn fetch(&self, collection: &str, id: &str) -> Result<RemoteModel, RemoteError> {
        self.rules(collection)?;
        self.model(collection, id)
    }

    pub fn delete(&mut self, collection: &str, id: &str) -> Result<MutateOutcome, RemoteError> {
        self.rules(collection)?;
        let object = self.object_mut(collection, id)?;
        object.status = "DELETING".into();
        let operation = self.start_operation(collection, id, Effect::Delete, None);
        info!(collection, id, %operation, "Delete accepted");
        Ok(MutateOutcome::Accepted {
            operation,
            resource_id: Some(id.to_string()),
        })
    }

    /// Every query moves the operation one step forward.
    pub fn operation_status(
        &mut self,
        collection: &str,
        operation_id: &str,
    ) -> Result<OperationStatus, RemoteError> {
        if let Some(status) = self.faults.next_operation_status.take() {
            return Ok(OperationStatus {
                status,
                resource_id: None,
            });
        }

        let stuck = self.faults.stuck_operations;
        let operation = self
            .operations
            .get_mut(operation_id)
            .filter(|op| op.collection == collection)
            .ok_or_else(|| RemoteError::NotFound(format!("{collection}/operation/{operation_id}")))?;

        let status = OPERATION_STEPS[operation.step];
        let done = status == "done";
        if !done && !(stuck && status == "doing") {
            operation.step += 1;
        }
        let (object_id, effect, action) =
            (operation.object_id.clone(), operation.effect, operation.action.clone());
        debug!(collection, operation_id, status, "Operation status");

        if done {
            self.complete(&object_id, effect, action);
        }
        Ok(OperationStatus {
            status: status.to_string(),
            resource_id: done.then_some(object_id),
        })
    }

    pub fn place_order(&mut self, order: OrderRequest) -> Result<i64, RemoteError> {
        self.rules(plan_collection(&order.plan_code))?;
        let order_id = self.next_order_id;
        self.next_order_id += 1;
        info!(order_id, plan_code = %order.plan_code, "Order placed");
        self.orders.insert(
            order_id,
            SimOrder {
                request: order,
                step: 0,
                service: None,
            },
        );
        Ok(order_id)
    }

    pub fn order_status(&mut self, order_id: i64) -> Result<OrderStatus, RemoteError> {
        let stuck = self.faults.stuck_orders;
        let order = self
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| RemoteError::NotFound(format!("order/{order_id}")))?;

        let status = ORDER_STEPS[order.step];
        if status != "delivered" && !(stuck && status == "doing") {
            order.step += 1;
        }
        if status == "delivered" && order.service.is_none() {
            let request = order.request.clone();
            let service = format!("{}-{order_id}", request.plan_code);
            order.service = Some(service.clone());
            self.deliver(order_id, &service, request);
        }
        Ok(OrderStatus {
            order_id,
            status: status.to_string(),
        })
    }

    pub fn service_for_order(
        &self,
        order_id: i64,
        plan_code: &str,
    ) -> Result<ServiceIdentifier, RemoteError> {
        self.orders
            .get(&order_id)
            .filter(|order| order.request.plan_code == plan_code)
            .and_then(|order| order.service.clone())
            .map(ServiceIdentifier)
            .ok_or_else(|| RemoteError::NotFound(format!("order/{order_id}/service/{plan_code}")))
    }

    pub fn terminate(&mut self, service_id: &str) -> Result<String, RemoteError> {
        let token = format!("tok-{}", self.bump());
        let service = self.service_mut(service_id)?;
        service.pending_token = Some(token.clone());
        info!(service_id, "Termination requested");
        Ok(token)
    }

    pub fn confirm_termination(
        &mut self,
        service_id: &str,
        confirmation: &TerminationConfirmation,
    ) -> Result<(), RemoteError> {
        let service = self.service_mut(service_id)?;
        if service.pending_token.as_deref() != Some(confirmation.token.as_str()) {
            return Err(RemoteError::Api {
                code: 400,
                message: format!("invalid termination token for {service_id}"),
            });
        }
        service.pending_token = None;
        service.terminated = true;
        let order_id = service.order_id;
        self.objects.remove(service_id);
        info!(service_id, order_id, reason = ?confirmation.reason, "Service terminated");
        Ok(())
    }

    fn bump(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn rules(&self, collection: &str) -> Result<&CollectionRules, RemoteError> {
        self.catalog.get(collection).ok_or_else(|| RemoteError::Api {
            code: 404,
            message: format!("unknown collection '{collection}'"),
        })
    }

    fn object_mut(&mut self, collection: &str, id: &str) -> Result<&mut SimObject, RemoteError> {
        self.objects
            .get_mut(id)
            .filter(|object| object.collection == collection)
            .ok_or_else(|| RemoteError::NotFound(format!("{collection}/{id}")))
    }

    fn service_mut(&mut self, service_id: &str) -> Result<&mut SimService, RemoteError> {
        let service = self
            .services
            .get_mut(service_id)
            .ok_or_else(|| RemoteError::NotFound(format!("service/{service_id}")))?;
        if service.terminated {
            return Err(RemoteError::AlreadyTerminated(service_id.to_string()));
        }
        Ok(service)
    }

    /// The object as the API would return it: write-only fields are blanked.
    fn model(&self, collection: &str, id: &str) -> Result<RemoteModel, RemoteError> {
        let object = self
            .objects
            .get(id)
            .filter(|object| object.collection == collection)
            .ok_or_else(|| RemoteError::NotFound(format!("{collection}/{id}")))?;
        let rules = self.rules(collection)?;

        let mut model = RemoteModel::new(id, object.status.clone());
        for (name, value) in &object.attributes {
            let echoed = if rules.write_only.contains(name) {
                Value::String(String::new())
            } else {
                value.clone()
            };
            model.attributes.insert(name.clone(), echoed);
        }
        Ok(model)
    }

    fn start_operation(
        &mut self,
        collection: &str,
        object_id: &str,
        effect: Effect,
        action: Option<String>,
    ) -> OperationHandle {
        let id = format!("op-{}", self.bump());
        self.operations.insert(
            id.clone(),
            SimOperation {
                collection: collection.to_string(),
                object_id: object_id.to_string(),
                effect,
                action,
                step: 0,
            },
        );
        let kind = match effect {
            Effect::Create => OperationKind::Create,
            Effect::Delete => OperationKind::Delete,
            Effect::Action => OperationKind::Update,
        };
        OperationHandle::new(id, kind)
    }

    fn complete(&mut self, object_id: &str, effect: Effect, action: Option<String>) {
        match effect {
            Effect::Create => {
                if let Some(object) = self.objects.get_mut(object_id) {
                    object.status = "READY".into();
                }
            }
            Effect::Delete => {
                if self.objects.remove(object_id).is_some() {
                    info!(id = object_id, "Deleted");
                }
            }
            Effect::Action => {
                if let (Some(object), Some(action)) = (self.objects.get_mut(object_id), action) {
                    object
                        .attributes
                        .insert("last_action".into(), Value::String(action));
                }
            }
        }
    }

    /// The delivered service shows up as an object in the plan's collection.
    fn deliver(&mut self, order_id: i64, service: &str, request: OrderRequest) {
        let collection = plan_collection(&request.plan_code).to_string();
        let Some(rules) = self.catalog.get(&collection).cloned() else {
            return;
        };
        let mut attributes = rules.defaults.clone();
        attributes.extend(normalize(&rules, request.configuration));
        attributes.insert("plan_code".into(), Value::String(request.plan_code.clone()));
        attributes.insert("order_id".into(), Value::from(order_id));
        if let Some(domain) = &rules.endpoint_domain {
            attributes.insert("endpoint".into(), Value::String(format!("https://{service}.{domain}")));
        }

        self.objects.insert(
            service.to_string(),
            SimObject {
                collection,
                status: "READY".into(),
                attributes,
            },
        );
        self.services.insert(
            service.to_string(),
            SimService {
                order_id,
                pending_token: None,
                terminated: false,
            },
        );
        info!(order_id, service, "Order delivered");
    }
}

/// Plan codes are `<collection>-<size>`; the collection part decides where the service lands.
fn plan_collection(plan_code: &str) -> &str {
    plan_code
        .split_once('-')
        .map_or(plan_code, |(collection, _)| collection)
}

fn normalize(rules: &CollectionRules, body: Attributes) -> Attributes {
    body.into_iter()
        .map(|(name, value)| {
            let value = match value {
                Value::String(text) if rules.durations.contains(&name) => {
                    Value::String(prefer_weeks(&text))
                }
                other => other,
            };
            (name, value)
        })
        .collect()
}

/// Rewrites whole-week durations the way the API does (`P14D` → `P2W`).
fn prefer_weeks(text: &str) -> String {
    match text.parse::<IsoDuration>() {
        Ok(d) if !d.is_calendar_relative() && d.nanos() > 0 && d.nanos() % NANOS_PER_WEEK == 0 => {
            format!("P{}W", d.nanos() / NANOS_PER_WEEK)
        }
        _ => text.to_string(),
    }
}
