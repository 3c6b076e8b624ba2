//! # System Lifecycle
//!
//! [`ProviderSystem`] wires the simulated control plane to the engine:
//!
//! 1. **Create** the control-plane actor and its client.
//! 2. **Start** the actor loop on a Tokio task.
//! 3. **Wire** one typed client per resource type, each sharing the same
//!    [`ControlPlaneClient`] and the same explicitly passed [`ProviderConfig`].
//!
//! ## Graceful Shutdown
//!
//! [`ProviderSystem::shutdown`] drops every client, which closes the actor's channel;
//! the actor drains what is queued, logs `Control plane stopped` and its task is awaited.

use crate::clients::{DatabaseClient, KmsClient};
use crate::control_plane::{ControlPlane, ControlPlaneClient};
use crate::model::{database, kms};
use provider_framework::{PollPolicy, ProviderConfig, ProviderError};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::info;

const CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum SystemError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("control plane task failed: {0}")]
    Shutdown(String),
}

/// Timings for the simulator, where every step is one status query away.
pub fn demo_config() -> ProviderConfig {
    ProviderConfig::uniform(PollPolicy::new(
        Duration::from_millis(100),
        Duration::from_millis(250),
        Duration::from_secs(10),
    ))
}

pub struct ProviderSystem {
    /// Direct access to the simulator, e.g. for fault injection.
    pub control_plane: ControlPlaneClient,
    pub kms: KmsClient,
    pub databases: DatabaseClient,
    handle: JoinHandle<()>,
}

impl ProviderSystem {
    /// Must be called inside a Tokio runtime.
    pub fn new(config: ProviderConfig) -> Result<Self, SystemError> {
        config.validate()?;

        let catalog = HashMap::from([
            (kms::COLLECTION.to_string(), kms::rules()),
            (database::COLLECTION.to_string(), database::rules()),
        ]);
        let (actor, control_plane) = ControlPlane::new(catalog, CHANNEL_CAPACITY);
        let handle = tokio::spawn(actor.run());

        let shared = Arc::new(control_plane.clone());
        let kms = KmsClient::new(shared.clone(), config.clone())?;
        let databases = DatabaseClient::new(shared, config)?;
        info!("Provider system started");

        Ok(Self {
            control_plane,
            kms,
            databases,
            handle,
        })
    }

    pub async fn shutdown(self) -> Result<(), SystemError> {
        let Self {
            control_plane,
            kms,
            databases,
            handle,
        } = self;
        drop(kms);
        drop(databases);
        drop(control_plane);

        handle
            .await
            .map_err(|e| SystemError::Shutdown(e.to_string()))?;
        info!("Provider system stopped");
        Ok(())
    }
}
