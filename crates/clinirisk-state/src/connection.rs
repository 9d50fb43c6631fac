//! SurrealDB connection setup
//!
//! Supports in-memory, local (surrealkv) and cloud (WebSocket) connections,
//! selected from environment variables.

use surrealdb::engine::any::Any;
use surrealdb::opt::auth::{Database, Root};
use surrealdb::Surreal;
use tracing::info;

use crate::error::StateError;
use crate::Result;

const DEFAULT_NAMESPACE: &str = "clinirisk";
const DEFAULT_DATABASE: &str = "main";
const LOCAL_DB_PATH: &str = ".clinirisk/db";

/// Authenticated remote store, read from `SURREALDB_*` variables.
#[derive(Debug, Clone)]
pub(crate) struct CloudConfig {
    endpoint: String,
    username: String,
    password: String,
    namespace: String,
    database: String,
    /// Root user instead of a database-scoped user
    is_root: bool,
}

impl CloudConfig {
    /// `None` unless endpoint, username and password are all set.
    /// Namespace and database fall back to `clinirisk` / `main`.
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        Some(Self {
            endpoint: lookup("SURREALDB_ENDPOINT")?,
            username: lookup("SURREALDB_USERNAME")?,
            password: lookup("SURREALDB_PASSWORD")?,
            namespace: lookup("SURREALDB_NAMESPACE")
                .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string()),
            database: lookup("SURREALDB_DATABASE")
                .unwrap_or_else(|| DEFAULT_DATABASE.to_string()),
            is_root: lookup("SURREALDB_ROOT").is_some_and(|v| v.eq_ignore_ascii_case("true")),
        })
    }

    fn from_env() -> Option<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }
}

/// Connect to `url` and select the default namespace/database.
pub(crate) async fn connect_url(url: &str) -> Result<Surreal<Any>> {
    let db = surrealdb::engine::any::connect(url)
        .await
        .map_err(|e| StateError::Connection(format!("Failed to connect to {}: {}", url, e)))?;

    db.use_ns(DEFAULT_NAMESPACE)
        .use_db(DEFAULT_DATABASE)
        .await
        .map_err(|e| StateError::Connection(e.to_string()))?;

    Ok(db)
}

/// Connect to SurrealDB Cloud and authenticate.
pub(crate) async fn connect_cloud(config: &CloudConfig) -> Result<Surreal<Any>> {
    info!("Connecting to SurrealDB Cloud (root={})", config.is_root);

    let db = surrealdb::engine::any::connect(&config.endpoint)
        .await
        .map_err(|e| {
            StateError::Connection(format!("Failed to connect to {}: {}", config.endpoint, e))
        })?;

    if config.is_root {
        db.signin(Root {
            username: &config.username,
            password: &config.password,
        })
        .await
        .map_err(|e| StateError::Connection(format!("Root authentication failed: {}", e)))?;
    } else {
        db.signin(Database {
            namespace: &config.namespace,
            database: &config.database,
            username: &config.username,
            password: &config.password,
        })
        .await
        .map_err(|e| StateError::Connection(format!("Database authentication failed: {}", e)))?;
    }

    db.use_ns(&config.namespace)
        .use_db(&config.database)
        .await
        .map_err(|e| {
            StateError::Connection(format!("Failed to select namespace/database: {}", e))
        })?;

    Ok(db)
}

/// Resolve a connection from the environment.
///
/// Cloud config wins, then `SURREALDB_URL`, then local persistence under
/// `.clinirisk/db`.
pub(crate) async fn connect_from_env() -> Result<Surreal<Any>> {
    if let Some(config) = CloudConfig::from_env() {
        return connect_cloud(&config).await;
    }

    if let Ok(url) = std::env::var("SURREALDB_URL") {
        info!("SURREALDB_URL found, connecting to {}", url);
        return connect_url(&url).await;
    }

    std::fs::create_dir_all(LOCAL_DB_PATH).map_err(|e| {
        StateError::Connection(format!(
            "Failed to create database directory {}: {}",
            LOCAL_DB_PATH, e
        ))
    })?;
    let url = format!("surrealkv://{}", LOCAL_DB_PATH);
    info!(
        "No cloud config or SURREALDB_URL found, using local persistence: {}",
        url
    );
    connect_url(&url).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn cloud_config_needs_endpoint_and_credentials() {
        assert!(CloudConfig::from_lookup(lookup(&[])).is_none());
        assert!(CloudConfig::from_lookup(lookup(&[
            ("SURREALDB_ENDPOINT", "wss://records.hospital"),
            ("SURREALDB_USERNAME", "scorer"),
        ]))
        .is_none());
    }

    #[test]
    fn cloud_config_defaults_to_clinirisk_namespace() {
        let config = CloudConfig::from_lookup(lookup(&[
            ("SURREALDB_ENDPOINT", "wss://records.hospital"),
            ("SURREALDB_USERNAME", "scorer"),
            ("SURREALDB_PASSWORD", "secret"),
        ]))
        .unwrap();
        assert_eq!(config.namespace, "clinirisk");
        assert_eq!(config.database, "main");
        assert!(!config.is_root);

        let root = CloudConfig::from_lookup(lookup(&[
            ("SURREALDB_ENDPOINT", "wss://records.hospital"),
            ("SURREALDB_USERNAME", "root"),
            ("SURREALDB_PASSWORD", "secret"),
            ("SURREALDB_DATABASE", "cardiology"),
            ("SURREALDB_ROOT", "TRUE"),
        ]))
        .unwrap();
        assert_eq!(root.database, "cardiology");
        assert!(root.is_root);
    }
}
