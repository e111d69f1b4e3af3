//! Replica audit persistence for ConfigMirror
//!
//! Records every successfully applied replica in Postgres, keyed by
//! `(name, destination_namespace)`. Enabled by `SAVE_REPLICATION_ACTION=true`.

#![deny(missing_docs)]

pub mod config;
pub mod migration;
pub mod repository;

pub use config::{persistence_enabled, DatabaseConfig, EnvConfig, OsEnvConfig};
pub use migration::{run_migration, split_statements, StatementExecutor, IMPORT_SQL};
pub use repository::{PgReplicaStore, ReplicaRecord, ReplicaStore};
