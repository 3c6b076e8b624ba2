/// A managed key-management instance.
///
/// Created through an asynchronous operation, updated in place, deleted through an
/// operation. The API rewrites `rotation_period` to whole weeks and never returns
/// `admin_password`.
use super::plan_field;
use crate::control_plane::CollectionRules;
use provider_framework::{FieldSpec, FormatKind, PlanModel, ResourceKind, Schema};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const COLLECTION: &str = "kms";
pub const DEFAULT_REGION: &str = "eu-west-1";

pub fn schema() -> Schema {
    Schema::new()
        .field(FieldSpec::configurable("name"))
        .field(FieldSpec::configurable("region").with_format(FormatKind::CaseInsensitive))
        .field(FieldSpec::configurable("rotation_period").with_format(FormatKind::Duration))
        .field(FieldSpec::configurable("key_policy").with_format(FormatKind::Json))
        .field(FieldSpec::configurable("admin_password").sensitive())
        .field(FieldSpec::computed("endpoint"))
        .field(FieldSpec::computed("last_action"))
}

pub fn kind() -> ResourceKind {
    ResourceKind::new("kms", COLLECTION, schema())
}

pub fn rules() -> CollectionRules {
    CollectionRules::default()
        .write_only(["admin_password"])
        .durations(["rotation_period"])
        .default_value("region", DEFAULT_REGION)
        .endpoint_domain("kms.example")
        .async_create()
}

/// User configuration for a KMS instance.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KmsConfig {
    pub name: String,
    pub region: Option<String>,
    pub rotation_period: Option<String>,
    pub key_policy: Option<Value>,
    pub admin_password: Option<String>,
}

impl KmsConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn rotation_period(mut self, period: impl Into<String>) -> Self {
        self.rotation_period = Some(period.into());
        self
    }

    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn key_policy(mut self, policy: Value) -> Self {
        self.key_policy = Some(policy);
        self
    }

    pub fn admin_password(mut self, password: impl Into<String>) -> Self {
        self.admin_password = Some(password.into());
        self
    }

    pub fn to_plan(&self) -> PlanModel {
        let plan = PlanModel::new()
            .explicit("name", self.name.clone())
            .computed("endpoint")
            .computed("last_action");
        let plan = plan_field(plan, "region", self.region.clone());
        let plan = plan_field(plan, "rotation_period", self.rotation_period.clone());
        let plan = plan_field(plan, "key_policy", self.key_policy.clone());
        plan_field(plan, "admin_password", self.admin_password.clone())
    }
}
