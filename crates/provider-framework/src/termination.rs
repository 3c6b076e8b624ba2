//! # Termination Workflow
//!
//! Decommissioning a billed service is a two-step protocol:
//!
//! 1. `terminate(service)` asks for termination and returns a confirmation token.
//! 2. `confirm_termination(service, token, reason, commentary)` actually ends the service.
//!
//! Both steps treat "already gone" as success so a half-finished destroy can simply be
//! re-run.

use crate::error::RemoteError;
use crate::remote::{TerminationApi, TerminationConfirmation, TerminationReason};
use std::sync::Arc;
use tracing::{info, instrument};

/// Result of the first step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    Requested { token: String },
    AlreadyGone,
}

/// Result of the whole protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationOutcome {
    Confirmed,
    AlreadyGone,
}

pub struct TerminationWorkflow<C: TerminationApi> {
    api: Arc<C>,
}

impl<C: TerminationApi> TerminationWorkflow<C> {
    pub fn new(api: Arc<C>) -> Self {
        Self { api }
    }

    #[instrument(skip(self))]
    pub async fn terminate(&self, service_id: &str) -> Result<Termination, RemoteError> {
        match self.api.terminate(service_id).await {
            Ok(token) => {
                info!("Termination requested");
                Ok(Termination::Requested { token })
            }
            Err(e) if e.is_gone() => {
                info!(reason = %e, "Service already gone");
                Ok(Termination::AlreadyGone)
            }
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self, confirmation), fields(reason = ?confirmation.reason))]
    pub async fn confirm_terminate(
        &self,
        service_id: &str,
        confirmation: &TerminationConfirmation,
    ) -> Result<(), RemoteError> {
        match self.api.confirm_termination(service_id, confirmation).await {
            Ok(()) => {
                info!("Termination confirmed");
                Ok(())
            }
            Err(e) if e.is_gone() => {
                info!(reason = %e, "Service already gone");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Runs both steps.
    pub async fn run(
        &self,
        service_id: &str,
        reason: Option<TerminationReason>,
        commentary: Option<String>,
    ) -> Result<TerminationOutcome, RemoteError> {
        let token = match self.terminate(service_id).await? {
            Termination::Requested { token } => token,
            Termination::AlreadyGone => return Ok(TerminationOutcome::AlreadyGone),
        };
        let confirmation = TerminationConfirmation {
            token,
            reason,
            commentary,
        };
        self.confirm_terminate(service_id, &confirmation).await?;
        Ok(TerminationOutcome::Confirmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockRemote;

    #[tokio::test]
    async fn test_run_confirms_with_token() {
        let mock = MockRemote::new();
        mock.expect_terminate("svc-1").return_ok("tok-123".to_string());
        mock.expect_confirm_termination("svc-1").return_ok(());

        let workflow = TerminationWorkflow::new(Arc::new(mock.clone()));
        let outcome = workflow
            .run("svc-1", Some(TerminationReason::NotNeededAnymore), None)
            .await
            .unwrap();

        assert_eq!(outcome, TerminationOutcome::Confirmed);
        mock.verify();
    }

    #[tokio::test]
    async fn test_already_terminated_is_success() {
        let mock = MockRemote::new();
        mock.expect_terminate("svc-1")
            .return_err(RemoteError::AlreadyTerminated("svc-1".into()));

        let workflow = TerminationWorkflow::new(Arc::new(mock.clone()));
        let outcome = workflow.run("svc-1", None, None).await.unwrap();

        assert_eq!(outcome, TerminationOutcome::AlreadyGone);
        mock.verify();
    }

    #[tokio::test]
    async fn test_confirm_on_vanished_service_is_success() {
        let mock = MockRemote::new();
        mock.expect_confirm_termination("svc-1")
            .return_err(RemoteError::NotFound("svc-1".into()));

        let workflow = TerminationWorkflow::new(Arc::new(mock.clone()));
        let confirmation = TerminationConfirmation {
            token: "tok".into(),
            reason: None,
            commentary: None,
        };
        workflow.confirm_terminate("svc-1", &confirmation).await.unwrap();
    }

    #[tokio::test]
    async fn test_other_errors_propagate() {
        let mock = MockRemote::new();
        mock.expect_terminate("svc-1").return_err(RemoteError::Api {
            code: 403,
            message: "forbidden".into(),
        });

        let workflow = TerminationWorkflow::new(Arc::new(mock.clone()));
        let err = workflow.terminate("svc-1").await.unwrap_err();

        assert!(matches!(err, RemoteError::Api { code: 403, .. }));
    }
}
