//! Replica audit repository
//!
//! One row per replica identity `(name, destination_namespace)`. Rows are
//! overwritten on every successful apply and never deleted here.

use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::ResourceExt;
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::PgPool;
use tracing::{debug, info};

use configmirror_common::kube_utils::with_timeout;
use configmirror_common::{Error, MANAGED_BY_ANNOTATION, SOURCE_NAMESPACE_ANNOTATION};

use crate::config::DatabaseConfig;

/// Maximum pooled connections
const MAX_CONNECTIONS: u32 = 5;
/// How long to wait for a pooled connection
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

const UPSERT_SQL: &str = r#"
INSERT INTO configmirror.configmaps (name, source_namespace, destination_namespace, configmirror, json_data)
VALUES ($1, $2, $3, $4, $5)
ON CONFLICT (name, destination_namespace) DO UPDATE SET
    json_data = EXCLUDED.json_data,
    configmirror = EXCLUDED.configmirror,
    updated_at = now()
"#;

/// Trait abstracting the replica audit store
///
/// Implemented by [`PgReplicaStore`] in production and mocked in the
/// controller's tests.
#[async_trait]
pub trait ReplicaStore: Send + Sync {
    /// Insert or overwrite the audit row for an applied replica
    async fn upsert(&self, replica: &ConfigMap) -> Result<(), Error>;
}

/// Row written for one replica
#[derive(Clone, Debug, PartialEq)]
pub struct ReplicaRecord {
    /// Replica name (same as the source name)
    pub name: String,
    /// Namespace the source was read from
    pub source_namespace: String,
    /// Namespace the replica lives in
    pub destination_namespace: String,
    /// Owning ConfigMirror as `<namespace>/<name>`
    pub config_mirror: String,
    /// Snapshot of the replica as written
    pub json_data: serde_json::Value,
}

impl ReplicaRecord {
    /// Build the audit row from a replica carrying provenance annotations
    pub fn from_replica(replica: &ConfigMap) -> Result<Self, Error> {
        let destination_namespace = replica.namespace().ok_or_else(|| {
            Error::persistence(replica.name_any(), "replica has no namespace")
        })?;
        let annotations = replica.annotations();
        let json_data = serde_json::to_value(replica)
            .map_err(|e| Error::serialization(format!("failed to serialize replica: {e}")))?;

        Ok(Self {
            name: replica.name_any(),
            source_namespace: annotations
                .get(SOURCE_NAMESPACE_ANNOTATION)
                .cloned()
                .unwrap_or_default(),
            destination_namespace,
            config_mirror: annotations
                .get(MANAGED_BY_ANNOTATION)
                .cloned()
                .unwrap_or_default(),
            json_data,
        })
    }

    /// `<destination_namespace>/<name>` for logs and errors
    pub fn destination(&self) -> String {
        format!("{}/{}", self.destination_namespace, self.name)
    }
}

/// Postgres-backed [`ReplicaStore`]
#[derive(Clone, Debug)]
pub struct PgReplicaStore {
    pool: PgPool,
}

impl PgReplicaStore {
    /// Connect a pool to the configured database
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, Error> {
        info!(host = %config.host, port = config.port, database = %config.database, "database connecting");
        let pool = PgPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect_with(config.connect_options())
            .await
            .map_err(|e| Error::config(format!("failed to connect to database: {e}")))?;
        Ok(Self { pool })
    }

    /// Underlying pool, used for migration
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Close every pooled connection
    pub async fn close(&self) {
        info!("shutting down database connection");
        self.pool.close().await;
    }
}

#[async_trait]
impl ReplicaStore for PgReplicaStore {
    async fn upsert(&self, replica: &ConfigMap) -> Result<(), Error> {
        let record = ReplicaRecord::from_replica(replica)?;
        let destination = record.destination();

        with_timeout("upsert replica record", async {
            sqlx::query(UPSERT_SQL)
                .bind(&record.name)
                .bind(&record.source_namespace)
                .bind(&record.destination_namespace)
                .bind(&record.config_mirror)
                .bind(Json(&record.json_data))
                .execute(&self.pool)
                .await
                .map(|_| ())
                .map_err(|e| Error::persistence(&destination, e))
        })
        .await?;

        debug!(replica = %destination, "replica recorded in database");
        Ok(())
    }
}
