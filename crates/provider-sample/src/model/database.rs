/// A managed database, billed per plan.
///
/// Databases are not created directly: an order is placed for a plan code
/// (`database-<size>`), and the service shows up in the `database` collection once the
/// order is delivered. Decommissioning goes through terminate → confirm.
use super::plan_field;
use crate::control_plane::CollectionRules;
use provider_framework::{
    FieldSpec, FormatKind, OrderRequest, PlanModel, ResourceKind, Schema, StatusSet,
};
use serde::{Deserialize, Serialize};

pub const COLLECTION: &str = "database";

pub fn schema() -> Schema {
    Schema::new()
        .field(FieldSpec::configurable("plan_code"))
        .field(FieldSpec::configurable("engine").with_format(FormatKind::CaseInsensitive))
        .field(FieldSpec::configurable("version").with_format(FormatKind::Trimmed))
        .field(FieldSpec::configurable("backup_retention").with_format(FormatKind::Duration))
        .field(FieldSpec::configurable("password").sensitive())
        .field(FieldSpec::computed("order_id"))
        .field(FieldSpec::computed("endpoint"))
}

/// Delivered databases are `READY` straight away; a terminated one simply disappears.
pub fn kind() -> ResourceKind {
    ResourceKind::new("database", COLLECTION, schema())
        .with_ready_statuses(StatusSet::new(["DELIVERING"], ["READY"]))
        .with_deletion_statuses(StatusSet::deletion(["TERMINATING"]))
}

pub fn rules() -> CollectionRules {
    CollectionRules::default()
        .write_only(["password"])
        .durations(["backup_retention"])
        .endpoint_domain("db.example")
}

/// User configuration for a database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub plan_code: String,
    pub engine: String,
    pub version: Option<String>,
    pub backup_retention: Option<String>,
    pub password: Option<String>,
}

impl DatabaseConfig {
    pub fn new(plan_code: impl Into<String>, engine: impl Into<String>) -> Self {
        Self {
            plan_code: plan_code.into(),
            engine: engine.into(),
            version: None,
            backup_retention: None,
            password: None,
        }
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn backup_retention(mut self, retention: impl Into<String>) -> Self {
        self.backup_retention = Some(retention.into());
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// The order that provisions this database; every configured field rides along.
    pub fn to_order(&self) -> OrderRequest {
        self.to_plan()
            .explicit_attributes()
            .into_iter()
            .filter(|(name, _)| name != "plan_code")
            .fold(OrderRequest::new(self.plan_code.clone()), |order, (name, value)| {
                order.with_configuration(name, value)
            })
    }

    pub fn to_plan(&self) -> PlanModel {
        let plan = PlanModel::new()
            .explicit("plan_code", self.plan_code.clone())
            .explicit("engine", self.engine.clone())
            .computed("order_id")
            .computed("endpoint");
        let plan = plan_field(plan, "version", self.version.clone());
        let plan = plan_field(plan, "backup_retention", self.backup_retention.clone());
        plan_field(plan, "password", self.password.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_carries_configuration() {
        let order = DatabaseConfig::new("database-small", "postgresql")
            .backup_retention("P7D")
            .password("s3cr3t")
            .to_order();

        assert_eq!(order.plan_code, "database-small");
        assert_eq!(order.configuration["engine"], "postgresql");
        assert_eq!(order.configuration["backup_retention"], "P7D");
        assert!(!order.configuration.contains_key("plan_code"));
        assert!(!order.configuration.contains_key("version"));
    }
}
