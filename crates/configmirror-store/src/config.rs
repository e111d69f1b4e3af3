//! Environment configuration for the audit database
//!
//! Provides trait-based access to environment configuration,
//! enabling dependency injection and mocking for tests.

use sqlx::postgres::PgConnectOptions;

use configmirror_common::Error;

/// Database host variable
pub const DATABASE_HOST_KEY: &str = "CM_DATABASE_HOST";
/// Database port variable
pub const DATABASE_PORT_KEY: &str = "CM_DATABASE_PORT";
/// Database username variable
pub const DATABASE_USERNAME_KEY: &str = "CM_DATABASE_USERNAME";
/// Database password variable
pub const DATABASE_PASSWORD_KEY: &str = "CM_DATABASE_PASSWORD";
/// Database name variable
pub const DATABASE_NAME_KEY: &str = "CM_DATABASE_NAME";
/// Flag enabling replica persistence and schema migration
pub const SAVE_REPLICATION_ACTION_KEY: &str = "SAVE_REPLICATION_ACTION";

/// Trait for reading process environment variables
///
/// This abstracts reading from environment variables, enabling
/// proper unit testing without manipulating global state.
#[cfg_attr(test, mockall::automock)]
pub trait EnvConfig: Send + Sync {
    /// Get a variable, `None` when unset
    fn var(&self, key: &str) -> Option<String>;
}

/// Default implementation that reads from environment variables
#[derive(Clone, Default)]
pub struct OsEnvConfig;

impl EnvConfig for OsEnvConfig {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

/// Whether replications should be recorded in the database
///
/// Only the literal value `true` enables it.
pub fn persistence_enabled(env: &dyn EnvConfig) -> bool {
    env.var(SAVE_REPLICATION_ACTION_KEY).as_deref() == Some("true")
}

/// Connection settings for the audit database
#[derive(Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// Login role
    pub username: String,
    /// Login password
    pub password: String,
    /// Database name
    pub database: String,
}

impl DatabaseConfig {
    /// Read every database variable; a missing variable is a startup error
    pub fn from_env(env: &dyn EnvConfig) -> Result<Self, Error> {
        let username = required(env, DATABASE_USERNAME_KEY)?;
        let password = required(env, DATABASE_PASSWORD_KEY)?;
        let host = required(env, DATABASE_HOST_KEY)?;
        let port = required(env, DATABASE_PORT_KEY)?;
        let database = required(env, DATABASE_NAME_KEY)?;

        let port = port.parse::<u16>().map_err(|e| {
            Error::config(format!(
                "environment variable `{DATABASE_PORT_KEY}` is not a valid port: {e}"
            ))
        })?;

        Ok(Self {
            host,
            port,
            username,
            password,
            database,
        })
    }

    /// Connection options for the pool
    pub fn connect_options(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.username)
            .password(&self.password)
            .database(&self.database)
    }
}

impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("database", &self.database)
            .finish()
    }
}

fn required(env: &dyn EnvConfig, key: &str) -> Result<String, Error> {
    env.var(key)
        .ok_or_else(|| Error::config(format!("environment variable `{key}` not set")))
}
