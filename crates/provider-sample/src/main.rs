//! # Provider Sample
//!
//! Walks two resources through their whole lifecycle against the simulated control plane:
//!
//! 1. A **KMS instance**: create (operation), refresh, update in place, rotate, delete.
//! 2. A **database**: order, wait for delivery, refresh, terminate and confirm.
//!
//! Poll timings come from the TOML file given as first argument, or from
//! [`demo_config`] when none is given. Run with `RUST_LOG=info` (or `debug` to see
//! every poll attempt).

use provider_framework::tracing::setup_tracing;
use provider_framework::{OpContext, ProviderConfig};
use provider_sample::lifecycle::{demo_config, ProviderSystem, SystemError};
use provider_sample::model::{DatabaseConfig, KmsConfig};
use serde_json::json;
use tracing::{info, Instrument};

#[tokio::main]
async fn main() -> Result<(), SystemError> {
    setup_tracing();

    let config = match std::env::args().nth(1) {
        Some(path) => ProviderConfig::load(path)?,
        None => demo_config(),
    };
    let system = ProviderSystem::new(config)?;
    let ctx = OpContext::new();

    let kms_config = KmsConfig::new("vault")
        .rotation_period("P7D")
        .key_policy(json!({"rotation": "auto"}))
        .admin_password("hunter2");

    async {
        let created = system.kms.create(&ctx, &kms_config).await?;
        info!(id = %created.id, rotation_period = ?created.state.get("rotation_period"), "KMS instance ready");

        let refreshed = system
            .kms
            .read(&ctx, &kms_config, &created.state)
            .await?
            .unwrap_or_default();
        let renamed = KmsConfig {
            name: "vault-prod".into(),
            ..kms_config.clone()
        };
        let updated = system.kms.update(&ctx, &renamed, &refreshed).await?;
        info!(name = ?updated.state.get("name"), "KMS instance renamed");
        let rotated = system.kms.rotate(&ctx, &renamed, &updated.state).await?;
        info!(last_action = ?rotated.state.get("last_action"), "Key rotated");

        system.kms.delete(&ctx, &rotated.state).await?;
        Ok::<_, SystemError>(())
    }
    .instrument(tracing::info_span!("kms"))
    .await?;

    let db_config = DatabaseConfig::new("database-small", "postgresql")
        .version("16")
        .backup_retention("P14D")
        .password("s3cr3t");

    async {
        let delivered = system.databases.create(&ctx, &db_config).await?;
        info!(id = %delivered.id, order_id = ?delivered.state.get("order_id"), "Database delivered");

        let outcome = system
            .databases
            .delete(&delivered.state, Some("demo finished".into()))
            .await?;
        info!(?outcome, "Database terminated");
        Ok::<_, SystemError>(())
    }
    .instrument(tracing::info_span!("database"))
    .await?;

    system.shutdown().await?;
    info!("Demo completed");
    Ok(())
}
