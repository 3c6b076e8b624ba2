//! Concrete resource types: their schemas, their control-plane rules and the
//! user-facing configuration structs that turn into plans.

pub mod database;
pub mod kms;

pub use database::DatabaseConfig;
pub use kms::KmsConfig;

use provider_framework::PlanModel;
use serde_json::Value;

/// `Some` becomes an explicit literal, `None` leaves the field unset.
pub(crate) fn plan_field(plan: PlanModel, name: &str, value: Option<impl Into<Value>>) -> PlanModel {
    match value {
        Some(value) => plan.explicit(name, value),
        None => plan.unset(name),
    }
}
