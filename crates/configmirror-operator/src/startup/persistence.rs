//! Audit store initialization
//!
//! When `SAVE_REPLICATION_ACTION=true` the operator connects to Postgres and
//! applies the bundled schema before any reconcile runs. Any failure here
//! stops startup.

use configmirror_store::{
    persistence_enabled, run_migration, DatabaseConfig, EnvConfig, PgReplicaStore, IMPORT_SQL,
};

/// Connect and migrate the audit store if persistence is enabled
///
/// Returns `None` when persistence is disabled.
pub async fn init_persistence(env: &dyn EnvConfig) -> anyhow::Result<Option<PgReplicaStore>> {
    if !persistence_enabled(env) {
        tracing::info!("replica persistence disabled");
        return Ok(None);
    }

    let config = DatabaseConfig::from_env(env)?;
    tracing::info!(?config, "replica persistence enabled");

    let store = PgReplicaStore::connect(&config).await?;
    if let Err(e) = run_migration(store.pool(), IMPORT_SQL).await {
        store.close().await;
        return Err(anyhow::anyhow!("database migration failed: {e}"));
    }

    Ok(Some(store))
}
