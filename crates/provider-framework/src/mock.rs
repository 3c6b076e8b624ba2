//! # Mock Remote & Testing Guide
//!
//! [`MockRemote`] implements [`RemoteClient`], [`OrderApi`] and [`TerminationApi`] entirely
//! in memory. Expectations are queued in call order; each call pops the next expectation,
//! checks that it is the call that was expected and returns the canned response.
//!
//! ## When to use the mock vs the simulated control plane
//!
//! | Feature | MockRemote | Simulated control plane |
//! |---------|------------|-------------------------|
//! | **Speed** | Instant | Fast (spawns an actor) |
//! | **Determinism** | Exact call sequence | Status advances per query |
//! | **State** | None (expectations) | Real objects, orders, services |
//! | **Use Case** | Poll/merge/lifecycle logic | End-to-end flows |
//! | **Error Injection** | Easy (`return_err`) | Fault switches |
//!
//! ## Example
//!
//! ```rust
//! use provider_framework::mock::MockRemote;
//! use provider_framework::{RemoteClient, RemoteError, RemoteModel};
//!
//! #[tokio::main]
//! async fn main() {
//!     let mock = MockRemote::new();
//!     mock.expect_fetch("kms", "k-1")
//!         .return_ok(RemoteModel::new("k-1", "READY"));
//!     mock.expect_fetch("kms", "k-2")
//!         .return_err(RemoteError::NotFound("kms/k-2".into()));
//!
//!     assert_eq!(mock.fetch("kms", "k-1").await.unwrap().status, "READY");
//!     assert!(mock.fetch_optional("kms", "k-2").await.unwrap().is_none());
//!     mock.verify();
//! }
//! ```
//!
//! An unexpected call, or a call that does not match the head of the queue, panics.

use crate::error::RemoteError;
use crate::remote::{
    MutateOutcome, MutateRequest, OperationHandle, OperationStatus, OrderApi, OrderRequest,
    OrderStatus, RemoteClient, RemoteModel, ServiceIdentifier, TerminationApi,
    TerminationConfirmation,
};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex};

// =============================================================================
// EXPECTATIONS
// =============================================================================

/// The call an expectation is waiting for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpectedCall {
    Submit { collection: String },
    Fetch { collection: String, id: String },
    Delete { collection: String, id: String },
    OperationStatus { collection: String, operation_id: String },
    PlaceOrder,
    OrderStatus { order_id: i64 },
    ServiceForOrder { order_id: i64 },
    Terminate { service_id: String },
    ConfirmTermination { service_id: String },
}

#[derive(Debug)]
enum Response {
    Mutate(Result<MutateOutcome, RemoteError>),
    Model(Result<RemoteModel, RemoteError>),
    Operation(Result<OperationStatus, RemoteError>),
    OrderId(Result<i64, RemoteError>),
    Order(Result<OrderStatus, RemoteError>),
    Service(Result<ServiceIdentifier, RemoteError>),
    Token(Result<String, RemoteError>),
    Unit(Result<(), RemoteError>),
}

struct Expectation {
    call: ExpectedCall,
    response: Response,
}

type Queue = Arc<Mutex<VecDeque<Expectation>>>;

/// Maps a typed result into the response slot of one expectation kind.
pub trait MockResponse: Sized {
    #[doc(hidden)]
    fn wrap(result: Result<Self, RemoteError>) -> ResponseSlot;
}

#[doc(hidden)]
pub struct ResponseSlot(Response);

macro_rules! mock_response {
    ($ty:ty, $variant:ident) => {
        impl MockResponse for $ty {
            fn wrap(result: Result<Self, RemoteError>) -> ResponseSlot {
                ResponseSlot(Response::$variant(result))
            }
        }
    };
}

mock_response!(MutateOutcome, Mutate);
mock_response!(RemoteModel, Model);
mock_response!(OperationStatus, Operation);
mock_response!(i64, OrderId);
mock_response!(OrderStatus, Order);
mock_response!(ServiceIdentifier, Service);
mock_response!(String, Token);
mock_response!((), Unit);

/// Fluent builder returned by every `expect_*` method.
#[must_use = "an expectation does nothing until return_ok or return_err is called"]
pub struct ExpectationBuilder<T: MockResponse> {
    call: ExpectedCall,
    expectations: Queue,
    _response: PhantomData<T>,
}

impl<T: MockResponse> ExpectationBuilder<T> {
    pub fn return_ok(self, value: T) {
        self.push(Ok(value));
    }

    pub fn return_err(self, error: RemoteError) {
        self.push(Err(error));
    }

    fn push(self, result: Result<T, RemoteError>) {
        let ResponseSlot(response) = T::wrap(result);
        self.expectations.lock().unwrap().push_back(Expectation {
            call: self.call,
            response,
        });
    }
}

impl<T: MockResponse + Clone> ExpectationBuilder<T> {
    /// Queues the same successful response `times` times.
    pub fn return_ok_times(self, value: T, times: usize) {
        let mut queue = self.expectations.lock().unwrap();
        for _ in 0..times {
            let ResponseSlot(response) = T::wrap(Ok(value.clone()));
            queue.push_back(Expectation {
                call: self.call.clone(),
                response,
            });
        }
    }
}

// =============================================================================
// MOCK REMOTE
// =============================================================================

/// In-memory stand-in for a control-plane API.
#[derive(Clone, Default)]
pub struct MockRemote {
    expectations: Queue,
    submitted: Arc<Mutex<Vec<MutateRequest>>>,
    confirmations: Arc<Mutex<Vec<TerminationConfirmation>>>,
}

impl MockRemote {
    pub fn new() -> Self {
        Self::default()
    }

    fn expect<T: MockResponse>(&self, call: ExpectedCall) -> ExpectationBuilder<T> {
        ExpectationBuilder {
            call,
            expectations: self.expectations.clone(),
            _response: PhantomData,
        }
    }

    pub fn expect_submit(&self, collection: &str) -> ExpectationBuilder<MutateOutcome> {
        self.expect(ExpectedCall::Submit {
            collection: collection.to_string(),
        })
    }

    pub fn expect_fetch(&self, collection: &str, id: &str) -> ExpectationBuilder<RemoteModel> {
        self.expect(ExpectedCall::Fetch {
            collection: collection.to_string(),
            id: id.to_string(),
        })
    }

    pub fn expect_delete(&self, collection: &str, id: &str) -> ExpectationBuilder<MutateOutcome> {
        self.expect(ExpectedCall::Delete {
            collection: collection.to_string(),
            id: id.to_string(),
        })
    }

    pub fn expect_operation_status(
        &self,
        collection: &str,
        operation_id: &str,
    ) -> ExpectationBuilder<OperationStatus> {
        self.expect(ExpectedCall::OperationStatus {
            collection: collection.to_string(),
            operation_id: operation_id.to_string(),
        })
    }

    pub fn expect_place_order(&self) -> ExpectationBuilder<i64> {
        self.expect(ExpectedCall::PlaceOrder)
    }

    pub fn expect_order_status(&self, order_id: i64) -> ExpectationBuilder<OrderStatus> {
        self.expect(ExpectedCall::OrderStatus { order_id })
    }

    pub fn expect_service_for_order(&self, order_id: i64) -> ExpectationBuilder<ServiceIdentifier> {
        self.expect(ExpectedCall::ServiceForOrder { order_id })
    }

    pub fn expect_terminate(&self, service_id: &str) -> ExpectationBuilder<String> {
        self.expect(ExpectedCall::Terminate {
            service_id: service_id.to_string(),
        })
    }

    pub fn expect_confirm_termination(&self, service_id: &str) -> ExpectationBuilder<()> {
        self.expect(ExpectedCall::ConfirmTermination {
            service_id: service_id.to_string(),
        })
    }

    /// Requests passed to `submit`, in call order.
    pub fn submitted(&self) -> Vec<MutateRequest> {
        self.submitted.lock().unwrap().clone()
    }

    /// Confirmations passed to `confirm_termination`, in call order.
    pub fn confirmations(&self) -> Vec<TerminationConfirmation> {
        self.confirmations.lock().unwrap().clone()
    }

    /// Number of expectations not yet consumed.
    pub fn remaining(&self) -> usize {
        self.expectations.lock().unwrap().len()
    }

    /// Verifies that all expectations were met.
    pub fn verify(&self) {
        let remaining = self.remaining();
        if remaining != 0 {
            panic!("Not all expectations were met. {remaining} remaining");
        }
    }

    fn next(&self, call: ExpectedCall) -> Response {
        let expectation = self.expectations.lock().unwrap().pop_front();
        match expectation {
            Some(expectation) if expectation.call == call => expectation.response,
            Some(expectation) => panic!(
                "Unexpected request: got {call:?}, expected {:?}",
                expectation.call
            ),
            None => panic!("Unexpected request: got {call:?}, no expectations left"),
        }
    }
}

fn mismatch(call: &str, response: Response) -> ! {
    panic!("Expectation mismatch: {call} cannot answer with {response:?}")
}

#[async_trait]
impl RemoteClient for MockRemote {
    async fn submit(&self, request: MutateRequest) -> Result<MutateOutcome, RemoteError> {
        let call = ExpectedCall::Submit {
            collection: request.collection.clone(),
        };
        self.submitted.lock().unwrap().push(request);
        match self.next(call) {
            Response::Mutate(result) => result,
            other => mismatch("submit", other),
        }
    }

    async fn fetch(&self, collection: &str, id: &str) -> Result<RemoteModel, RemoteError> {
        match self.next(ExpectedCall::Fetch {
            collection: collection.to_string(),
            id: id.to_string(),
        }) {
            Response::Model(result) => result,
            other => mismatch("fetch", other),
        }
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<MutateOutcome, RemoteError> {
        match self.next(ExpectedCall::Delete {
            collection: collection.to_string(),
            id: id.to_string(),
        }) {
            Response::Mutate(result) => result,
            other => mismatch("delete", other),
        }
    }

    async fn operation_status(
        &self,
        collection: &str,
        operation: &OperationHandle,
    ) -> Result<OperationStatus, RemoteError> {
        match self.next(ExpectedCall::OperationStatus {
            collection: collection.to_string(),
            operation_id: operation.id.clone(),
        }) {
            Response::Operation(result) => result,
            other => mismatch("operation_status", other),
        }
    }
}

#[async_trait]
impl OrderApi for MockRemote {
    async fn place_order(&self, _order: &OrderRequest) -> Result<i64, RemoteError> {
        match self.next(ExpectedCall::PlaceOrder) {
            Response::OrderId(result) => result,
            other => mismatch("place_order", other),
        }
    }

    async fn order_status(&self, order_id: i64) -> Result<OrderStatus, RemoteError> {
        match self.next(ExpectedCall::OrderStatus { order_id }) {
            Response::Order(result) => result,
            other => mismatch("order_status", other),
        }
    }

    async fn service_for_order(
        &self,
        order_id: i64,
        _plan_code: &str,
    ) -> Result<ServiceIdentifier, RemoteError> {
        match self.next(ExpectedCall::ServiceForOrder { order_id }) {
            Response::Service(result) => result,
            other => mismatch("service_for_order", other),
        }
    }
}

#[async_trait]
impl TerminationApi for MockRemote {
    async fn terminate(&self, service_id: &str) -> Result<String, RemoteError> {
        match self.next(ExpectedCall::Terminate {
            service_id: service_id.to_string(),
        }) {
            Response::Token(result) => result,
            other => mismatch("terminate", other),
        }
    }

    async fn confirm_termination(
        &self,
        service_id: &str,
        confirmation: &TerminationConfirmation,
    ) -> Result<(), RemoteError> {
        self.confirmations.lock().unwrap().push(confirmation.clone());
        match self.next(ExpectedCall::ConfirmTermination {
            service_id: service_id.to_string(),
        }) {
            Response::Unit(result) => result,
            other => mismatch("confirm_termination", other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[should_panic(expected = "Unexpected request")]
    async fn test_out_of_order_call_panics() {
        let mock = MockRemote::new();
        mock.expect_fetch("kms", "k-1")
            .return_ok(RemoteModel::new("k-1", "READY"));
        let _ = mock.fetch("kms", "k-2").await;
    }

    #[test]
    #[should_panic(expected = "1 remaining")]
    fn test_verify_reports_unmet_expectations() {
        let mock = MockRemote::new();
        mock.expect_place_order().return_ok(1);
        mock.verify();
    }
}
