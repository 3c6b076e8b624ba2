//! Lifecycle driver against the expectation-queue mock.

use provider_framework::mock::MockRemote;
use provider_framework::{
    Checkpoint, FieldSpec, FormatKind, MutateOutcome, Mutation, OpContext, OperationHandle,
    OperationKind, OperationStatus, PlanModel, PollError, PollPolicy, ProviderConfig,
    ProviderError, RemoteError, RemoteModel, ResourceKind, ResourceLifecycle, Schema, StateModel,
};
use std::sync::Arc;
use std::time::Duration;

fn kms_kind() -> ResourceKind {
    let schema = Schema::new()
        .field(FieldSpec::configurable("name"))
        .field(FieldSpec::configurable("rotation_period").with_format(FormatKind::Duration))
        .field(FieldSpec::configurable("admin_password").sensitive())
        .field(FieldSpec::computed("endpoint"));
    ResourceKind::new("kms", "kms", schema)
}

fn fast_config() -> ProviderConfig {
    let policy = PollPolicy::new(
        Duration::from_millis(100),
        Duration::from_millis(500),
        Duration::from_secs(5),
    );
    ProviderConfig {
        create: policy,
        update: policy,
        delete: policy,
        order: policy,
    }
}

fn op(status: &str, resource_id: Option<&str>) -> OperationStatus {
    OperationStatus {
        status: status.to_string(),
        resource_id: resource_id.map(str::to_string),
    }
}

fn kms(status: &str) -> RemoteModel {
    RemoteModel::new("kms-1", status)
        .with_attribute("name", "vault")
        .with_attribute("rotation_period", "P1W")
        .with_attribute("admin_password", "")
        .with_attribute("endpoint", "https://kms-1.example")
}

fn plan() -> PlanModel {
    PlanModel::new()
        .explicit("name", "vault")
        .explicit("rotation_period", "P7D")
        .explicit("admin_password", "hunter2")
}

fn lifecycle(mock: &MockRemote) -> ResourceLifecycle<MockRemote> {
    ResourceLifecycle::new(Arc::new(mock.clone()), fast_config(), kms_kind()).unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_create_through_operation() {
    let mock = MockRemote::new();
    mock.expect_submit("kms").return_ok(MutateOutcome::Accepted {
        operation: OperationHandle::new("op-1", OperationKind::Create),
        resource_id: None,
    });
    mock.expect_operation_status("kms", "op-1")
        .return_ok(op("todo", None));
    mock.expect_operation_status("kms", "op-1")
        .return_ok(op("done", Some("kms-1")));
    mock.expect_fetch("kms", "kms-1").return_ok(kms("CREATING"));
    mock.expect_fetch("kms", "kms-1").return_ok(kms("READY"));

    let applied = lifecycle(&mock)
        .create(&OpContext::new(), &plan())
        .await
        .unwrap();

    assert_eq!(applied.id, "kms-1");
    assert_eq!(applied.state.get_str("rotation_period"), Some("P7D"));
    assert_eq!(applied.state.get_str("admin_password"), Some("hunter2"));
    assert_eq!(
        applied.state.get_str("endpoint"),
        Some("https://kms-1.example")
    );
    assert!(applied.drifted.is_empty());

    let submitted = mock.submitted();
    assert_eq!(submitted[0].mutation, Mutation::Create);
    assert_eq!(submitted[0].body.get("admin_password").unwrap(), "hunter2");
    mock.verify();
}

#[tokio::test(start_paused = true)]
async fn test_create_timeout_is_incomplete_with_id() {
    let mock = MockRemote::new();
    mock.expect_submit("kms").return_ok(MutateOutcome::Accepted {
        operation: OperationHandle::new("op-1", OperationKind::Create),
        resource_id: Some("kms-1".into()),
    });
    // 100ms initial delay, then every 500ms until the 5s deadline: 11 polls.
    mock.expect_operation_status("kms", "op-1")
        .return_ok_times(op("doing", None), 11);

    let err = lifecycle(&mock)
        .create(&OpContext::new(), &plan())
        .await
        .unwrap_err();

    match &err {
        ProviderError::Incomplete {
            checkpoint, state, ..
        } => {
            assert_eq!(checkpoint, &Checkpoint::Resource("kms-1".into()));
            assert_eq!(state.id(), Some("kms-1"));
            assert_eq!(state.get_str("name"), Some("vault"));
        }
        other => panic!("expected incomplete, got {other:?}"),
    }
    assert!(err.to_string().contains("progress was preserved"));
    mock.verify();
}

#[tokio::test(start_paused = true)]
async fn test_resume_after_timeout_does_not_recreate() {
    let mock = MockRemote::new();
    mock.expect_fetch("kms", "kms-1").return_ok(kms("READY"));

    let partial = StateModel::new()
        .with("id", "kms-1")
        .with("name", "vault")
        .with("admin_password", "hunter2");
    let applied = lifecycle(&mock)
        .resume(&OpContext::new(), &plan(), &partial)
        .await
        .unwrap();

    assert_eq!(applied.id, "kms-1");
    assert!(mock.submitted().is_empty());
    mock.verify();
}

#[tokio::test(start_paused = true)]
async fn test_resume_pending_operation_without_id() {
    let mock = MockRemote::new();
    mock.expect_operation_status("kms", "op-9")
        .return_ok(op("done", Some("kms-1")));
    mock.expect_fetch("kms", "kms-1").return_ok(kms("READY"));

    let partial = StateModel::new().with("pending_operation", "op-9");
    let applied = lifecycle(&mock)
        .resume(&OpContext::new(), &plan(), &partial)
        .await
        .unwrap();

    assert_eq!(applied.id, "kms-1");
    assert!(applied.state.get("pending_operation").is_none());
    mock.verify();
}

#[tokio::test]
async fn test_update_without_changes_sends_nothing() {
    let mock = MockRemote::new();
    let prior = kms("READY").to_state().with("rotation_period", "P7D");

    let applied = lifecycle(&mock)
        .update(
            &OpContext::new(),
            &PlanModel::new().explicit("rotation_period", "P1W"),
            &prior,
        )
        .await
        .unwrap();

    assert_eq!(applied.state, prior);
    assert!(mock.submitted().is_empty());
}

#[tokio::test]
async fn test_update_sends_only_changed_fields() {
    let mock = MockRemote::new();
    mock.expect_submit("kms")
        .return_ok(MutateOutcome::Completed(
            kms("READY").with_attribute("name", "vault-2"),
        ));

    let prior = kms("READY")
        .to_state()
        .with("rotation_period", "P7D")
        .with("admin_password", "hunter2");
    let plan = PlanModel::new()
        .explicit("name", "vault-2")
        .explicit("rotation_period", "P7D");

    let applied = lifecycle(&mock)
        .update(&OpContext::new(), &plan, &prior)
        .await
        .unwrap();

    let submitted = mock.submitted();
    assert_eq!(
        submitted[0].mutation,
        Mutation::Update {
            id: "kms-1".into()
        }
    );
    assert_eq!(submitted[0].body.len(), 1);
    assert_eq!(applied.state.get_str("name"), Some("vault-2"));
    assert_eq!(applied.state.get_str("admin_password"), Some("hunter2"));
    mock.verify();
}

#[tokio::test]
async fn test_read_gone_drops_state() {
    let mock = MockRemote::new();
    mock.expect_fetch("kms", "kms-1")
        .return_err(RemoteError::NotFound("kms/kms-1".into()));

    let refreshed = lifecycle(&mock)
        .read(&OpContext::new(), &plan(), &kms("READY").to_state())
        .await
        .unwrap();

    assert!(refreshed.is_none());
    mock.verify();
}

#[tokio::test]
async fn test_read_surfaces_drift() {
    let mock = MockRemote::new();
    mock.expect_fetch("kms", "kms-1")
        .return_ok(kms("READY").with_attribute("rotation_period", "P30D"));

    let prior = kms("READY").to_state().with("rotation_period", "P7D");
    let refreshed = lifecycle(&mock)
        .read(&OpContext::new(), &plan(), &prior)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(refreshed.get_str("rotation_period"), Some("P30D"));
}

#[tokio::test(start_paused = true)]
async fn test_delete_waits_until_not_found() {
    let mock = MockRemote::new();
    mock.expect_delete("kms", "kms-1")
        .return_ok(MutateOutcome::Accepted {
            operation: OperationHandle::new("op-2", OperationKind::Delete),
            resource_id: Some("kms-1".into()),
        });
    mock.expect_operation_status("kms", "op-2")
        .return_ok(op("done", Some("kms-1")));
    mock.expect_fetch("kms", "kms-1").return_ok(kms("DELETING"));
    mock.expect_fetch("kms", "kms-1")
        .return_err(RemoteError::NotFound("kms/kms-1".into()));

    lifecycle(&mock)
        .delete(&OpContext::new(), "kms-1")
        .await
        .unwrap();
    mock.verify();
}

#[tokio::test]
async fn test_delete_of_missing_object_succeeds() {
    let mock = MockRemote::new();
    mock.expect_delete("kms", "kms-1")
        .return_err(RemoteError::NotFound("kms/kms-1".into()));

    lifecycle(&mock)
        .delete(&OpContext::new(), "kms-1")
        .await
        .unwrap();
    mock.verify();
}

#[tokio::test(start_paused = true)]
async fn test_unexpected_object_status_fails() {
    let mock = MockRemote::new();
    mock.expect_submit("kms")
        .return_ok(MutateOutcome::Completed(kms("CREATING")));
    mock.expect_fetch("kms", "kms-1").return_ok(kms("ERROR"));

    let err = lifecycle(&mock)
        .create(&OpContext::new(), &plan())
        .await
        .unwrap_err();

    assert!(matches!(err, ProviderError::Failed { .. }));
    mock.verify();
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_create_stops_polling() {
    let mock = MockRemote::new();
    mock.expect_submit("kms").return_ok(MutateOutcome::Accepted {
        operation: OperationHandle::new("op-1", OperationKind::Create),
        resource_id: Some("kms-1".into()),
    });

    let ctx = OpContext::new();
    ctx.cancel();
    let err = lifecycle(&mock).create(&ctx, &plan()).await.unwrap_err();

    // Cancelled is terminal, but the object the remote side already started is not lost.
    assert!(matches!(
        err,
        ProviderError::Failed {
            source: PollError::Cancelled,
            ..
        }
    ));
    let partial = err.partial_state().unwrap();
    assert_eq!(partial.id(), Some("kms-1"));
    assert_eq!(partial.get_str("name"), Some("vault"));
    mock.verify();
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_create_without_id_keeps_operation() {
    let mock = MockRemote::new();
    mock.expect_submit("kms").return_ok(MutateOutcome::Accepted {
        operation: OperationHandle::new("op-4", OperationKind::Create),
        resource_id: None,
    });

    let ctx = OpContext::new();
    ctx.cancel();
    let err = lifecycle(&mock).create(&ctx, &plan()).await.unwrap_err();

    let partial = err.partial_state().unwrap();
    assert_eq!(partial.id(), None);
    assert_eq!(partial.get_str("pending_operation"), Some("op-4"));
    mock.verify();
}

#[tokio::test(start_paused = true)]
async fn test_stuck_operation_message_names_operation() {
    let mock = MockRemote::new();
    mock.expect_submit("kms").return_ok(MutateOutcome::Accepted {
        operation: OperationHandle::new("op-5", OperationKind::Create),
        resource_id: None,
    });
    mock.expect_operation_status("kms", "op-5")
        .return_ok_times(op("todo", None), 11);

    let err = lifecycle(&mock)
        .create(&OpContext::new(), &plan())
        .await
        .unwrap_err();

    assert!(err.is_incomplete());
    assert!(
        err.to_string().starts_with("kms operation 'op-5' is still in progress"),
        "{err}"
    );
    mock.verify();
}

#[tokio::test(start_paused = true)]
async fn test_unrepresentable_timeout_is_rejected() {
    let config = ProviderConfig::from_toml_str("[create]\ntimeout_secs = 9223372036854775807\n");
    assert!(matches!(config, Err(ProviderError::Policy { class: "create", .. })));

    // A policy built in code skips the loader; the driver must still not overflow.
    let mut huge = fast_config();
    huge.create.timeout = Duration::MAX;
    let mock = MockRemote::new();
    assert!(ResourceLifecycle::new(Arc::new(mock.clone()), huge, kms_kind()).is_err());
}

#[tokio::test(start_paused = true)]
async fn test_perform_waits_for_action_operation() {
    let mock = MockRemote::new();
    mock.expect_submit("kms").return_ok(MutateOutcome::Accepted {
        operation: OperationHandle::new("op-3", OperationKind::Update),
        resource_id: Some("kms-1".to_string()),
    });
    mock.expect_operation_status("kms", "op-3")
        .return_ok(op("doing", None));
    mock.expect_operation_status("kms", "op-3")
        .return_ok(op("done", None));
    mock.expect_fetch("kms", "kms-1").return_ok(kms("READY"));

    let prior = StateModel::new()
        .with("id", "kms-1")
        .with("name", "vault")
        .with("rotation_period", "P7D")
        .with("admin_password", "hunter2");
    let applied = lifecycle(&mock)
        .perform(&OpContext::new(), &plan(), &prior, "rotate")
        .await
        .unwrap();

    assert_eq!(applied.id, "kms-1");
    assert_eq!(applied.state.get_str("admin_password"), Some("hunter2"));
    assert_eq!(
        mock.submitted()[0].mutation,
        Mutation::Action {
            id: "kms-1".to_string(),
            action: "rotate".to_string(),
        }
    );
    mock.verify();
}
