use crate::control_plane::ControlPlaneClient;
use crate::model::{kms, KmsConfig};
use provider_framework::{
    Applied, OpContext, ProviderConfig, ProviderError, ResourceLifecycle, StateModel,
};
use std::sync::Arc;
use tracing::instrument;

/// KMS instances: a thin layer over the generic [`ResourceLifecycle`].
pub struct KmsClient {
    lifecycle: ResourceLifecycle<ControlPlaneClient>,
}

impl KmsClient {
    pub fn new(client: Arc<ControlPlaneClient>, config: ProviderConfig) -> Result<Self, ProviderError> {
        Ok(Self {
            lifecycle: ResourceLifecycle::new(client, config, kms::kind())?,
        })
    }

    #[instrument(skip_all, fields(name = %config.name))]
    pub async fn create(&self, ctx: &OpContext, config: &KmsConfig) -> Result<Applied, ProviderError> {
        self.lifecycle.create(ctx, &config.to_plan()).await
    }

    pub async fn read(
        &self,
        ctx: &OpContext,
        config: &KmsConfig,
        state: &StateModel,
    ) -> Result<Option<StateModel>, ProviderError> {
        self.lifecycle.read(ctx, &config.to_plan(), state).await
    }

    #[instrument(skip_all, fields(name = %config.name))]
    pub async fn update(
        &self,
        ctx: &OpContext,
        config: &KmsConfig,
        state: &StateModel,
    ) -> Result<Applied, ProviderError> {
        self.lifecycle.update(ctx, &config.to_plan(), state).await
    }

    /// Asks the instance to rotate its key material.
    pub async fn rotate(
        &self,
        ctx: &OpContext,
        config: &KmsConfig,
        state: &StateModel,
    ) -> Result<Applied, ProviderError> {
        self.lifecycle
            .perform(ctx, &config.to_plan(), state, "rotate")
            .await
    }

    pub async fn resume(
        &self,
        ctx: &OpContext,
        config: &KmsConfig,
        partial: &StateModel,
    ) -> Result<Applied, ProviderError> {
        self.lifecycle.resume(ctx, &config.to_plan(), partial).await
    }

    pub async fn delete(&self, ctx: &OpContext, state: &StateModel) -> Result<(), ProviderError> {
        let id = state
            .id()
            .ok_or_else(|| ProviderError::Config("kms state has no id".into()))?;
        self.lifecycle.delete(ctx, id).await
    }
}
