//! # Model Reconciler
//!
//! Merges three views of one object into the state that gets persisted:
//!
//! - [`PlanModel`]: what the user declared, each field tagged with its [`Planned`] provenance.
//! - prior [`StateModel`]: what was persisted last time.
//! - remote [`StateModel`]: what the control plane reports right now.
//!
//! ## Per-field precedence
//!
//! 1. Sensitive field with nothing usable from the remote side (missing, null or `""`):
//!    the plan's literal if it has one, otherwise the prior value. A secret is never
//!    replaced by an empty echo.
//! 2. Computed field: the remote value.
//! 3. Explicit field: the plan's literal when the remote value is missing or
//!    semantically equivalent (per the field's [`FormatKind`]); otherwise the remote
//!    value, so real drift is surfaced.
//! 4. Unset field: the remote value when present, else the prior value.
//!
//! The merge is idempotent: feeding its result back in as the prior state with the same
//! plan and remote yields the same result.

use crate::error::ReconcileError;
use crate::normalize::{values_equivalent, FormatKind};
use crate::remote::Attributes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

/// Provenance of one field in the user's configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Planned {
    /// The user wrote this literal.
    Explicit(Value),
    /// Absent from configuration; the remote side may fill it.
    Unset,
    /// Never settable; always sourced from the remote side.
    Computed,
}

/// The user's declared configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PlanModel {
    fields: BTreeMap<String, Planned>,
}

impl PlanModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn explicit(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields
            .insert(name.into(), Planned::Explicit(value.into()));
        self
    }

    pub fn unset(mut self, name: impl Into<String>) -> Self {
        self.fields.insert(name.into(), Planned::Unset);
        self
    }

    pub fn computed(mut self, name: impl Into<String>) -> Self {
        self.fields.insert(name.into(), Planned::Computed);
        self
    }

    /// Fields the plan does not mention are `Unset`.
    pub fn get(&self, name: &str) -> &Planned {
        self.fields.get(name).unwrap_or(&Planned::Unset)
    }

    /// The literals the user wrote, as a request body.
    pub fn explicit_attributes(&self) -> Attributes {
        self.fields
            .iter()
            .filter_map(|(name, planned)| match planned {
                Planned::Explicit(value) => Some((name.clone(), value.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Planned)> {
        self.fields.iter()
    }
}

/// A flat attribute view: prior state, remote object, or merge result.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateModel {
    fields: BTreeMap<String, Value>,
}

impl StateModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_attributes(attributes: Attributes) -> Self {
        Self {
            fields: attributes.into_iter().collect(),
        }
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.fields.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }

    pub fn id(&self) -> Option<&str> {
        self.get_str("id")
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// `self` with every field of `top` written over it.
    pub fn overlaid_with(mut self, top: StateModel) -> StateModel {
        self.fields.extend(top.fields);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }
}

/// Schema entry for one attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    #[serde(default)]
    pub format: FormatKind,
    /// Write-only or echo-once values; never overwritten by an empty remote value.
    #[serde(default)]
    pub sensitive: bool,
    #[serde(default)]
    pub computed_only: bool,
}

impl FieldSpec {
    pub fn configurable(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            format: FormatKind::Exact,
            sensitive: false,
            computed_only: false,
        }
    }

    pub fn computed(name: impl Into<String>) -> Self {
        Self {
            computed_only: true,
            ..Self::configurable(name)
        }
    }

    pub fn with_format(mut self, format: FormatKind) -> Self {
        self.format = format;
        self
    }

    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }
}

/// The attribute set shared by plan, prior state and remote model.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Schema {
    fields: Vec<FieldSpec>,
}

impl Schema {
    /// A schema always carries the computed `id` and `status` fields.
    pub fn new() -> Self {
        Self::default()
            .field(FieldSpec::computed("id"))
            .field(FieldSpec::computed("status"))
    }

    pub fn field(mut self, spec: FieldSpec) -> Self {
        self.fields.retain(|f| f.name != spec.name);
        self.fields.push(spec);
        self
    }

    pub fn get(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }
}

/// One attribute an apply would change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeChange {
    pub field: String,
    pub before: Option<Value>,
    pub after: Value,
    pub sensitive: bool,
}

/// Result of a merge plus the fields where remote drift was surfaced.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MergeReport {
    pub result: StateModel,
    pub drifted: Vec<String>,
}

/// Three-way merge driven by a [`Schema`].
#[derive(Debug, Clone)]
pub struct ModelReconciler {
    schema: Schema,
}

impl ModelReconciler {
    pub fn new(schema: Schema) -> Self {
        Self { schema }
    }

    /// Rejects plans that mention unknown fields or set computed ones.
    pub fn validate_plan(&self, plan: &PlanModel) -> Result<(), ReconcileError> {
        for (name, planned) in plan.iter() {
            let spec = self
                .schema
                .get(name)
                .ok_or_else(|| ReconcileError::UnknownField(name.clone()))?;
            if spec.computed_only && matches!(planned, Planned::Explicit(_)) {
                return Err(ReconcileError::ComputedFieldSet(name.clone()));
            }
        }
        Ok(())
    }

    pub fn merge(
        &self,
        plan: &PlanModel,
        prior: &StateModel,
        remote: &StateModel,
    ) -> Result<StateModel, ReconcileError> {
        self.merge_with_report(plan, prior, remote)
            .map(|report| report.result)
    }

    pub fn merge_with_report(
        &self,
        plan: &PlanModel,
        prior: &StateModel,
        remote: &StateModel,
    ) -> Result<MergeReport, ReconcileError> {
        self.validate_plan(plan)?;

        let mut report = MergeReport::default();
        for spec in self.schema.fields() {
            let merged = merge_field(
                spec,
                plan.get(&spec.name),
                prior.get(&spec.name),
                remote.get(&spec.name),
            );
            if merged.drifted {
                debug!(field = %spec.name, "Remote drift surfaced");
                report.drifted.push(spec.name.clone());
            }
            if let Some(value) = merged.value {
                report.result.set(spec.name.clone(), value);
            }
        }
        Ok(report)
    }

    /// Changes applying `plan` on top of `state` would make, with equivalent values suppressed.
    pub fn plan_changes(
        &self,
        plan: &PlanModel,
        state: &StateModel,
    ) -> Result<Vec<AttributeChange>, ReconcileError> {
        self.validate_plan(plan)?;

        let changes = self
            .schema
            .fields()
            .iter()
            .filter_map(|spec| {
                let Planned::Explicit(after) = plan.get(&spec.name) else {
                    return None;
                };
                let before = state.get(&spec.name);
                if before.is_some_and(|b| values_equivalent(after, b, spec.format)) {
                    return None;
                }
                Some(AttributeChange {
                    field: spec.name.clone(),
                    before: before.cloned(),
                    after: after.clone(),
                    sensitive: spec.sensitive,
                })
            })
            .collect();
        Ok(changes)
    }
}

struct MergedField {
    value: Option<Value>,
    drifted: bool,
}

fn merge_field(
    spec: &FieldSpec,
    planned: &Planned,
    prior: Option<&Value>,
    remote: Option<&Value>,
) -> MergedField {
    let usable_remote = remote.filter(|v| !is_absent(v, spec.sensitive));
    let kept = |value: Option<&Value>| MergedField {
        value: value.cloned(),
        drifted: false,
    };

    if spec.sensitive && usable_remote.is_none() {
        return match planned {
            Planned::Explicit(literal) => kept(Some(literal)),
            _ => kept(prior),
        };
    }

    if spec.computed_only || matches!(planned, Planned::Computed) {
        return kept(remote);
    }

    match (planned, usable_remote) {
        (Planned::Explicit(literal), None) => kept(Some(literal)),
        (Planned::Explicit(literal), Some(observed)) => {
            if values_equivalent(literal, observed, spec.format) {
                kept(Some(literal))
            } else {
                MergedField {
                    value: Some(observed.clone()),
                    drifted: true,
                }
            }
        }
        (_, Some(observed)) => kept(Some(observed)),
        (_, None) => kept(prior),
    }
}

fn is_absent(value: &Value, sensitive: bool) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => sensitive && s.is_empty(),
        _ => false,
    }
}
