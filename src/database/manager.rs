//! Named connection registry
//!
//! The manager owns the configured connections and opens each one on first
//! use. Handles it returns are clones sharing the same pool.

use crate::database::adapter::DatabaseAdapter;
use crate::database::config::{ConnectionConfig, DatabasesConfig};
use crate::database::connection::Connection;
use crate::database::resolver;
use crate::error::Result;
use crate::query::QueryBuilder;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::RwLock;

pub struct DatabaseManager {
    config: Arc<RwLock<DatabasesConfig>>,
    connections: Arc<RwLock<HashMap<String, Connection>>>,
}

impl DatabaseManager {
    pub fn new(config: DatabasesConfig) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
            connections: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Build a manager from a TOML file
    #[cfg(feature = "config")]
    pub fn from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        Ok(Self::new(DatabasesConfig::from_file(path)?))
    }

    /// Get a connection by name, or the default one for `None`
    ///
    /// The connection is opened on first request and cached afterwards.
    pub async fn connection(&self, name: Option<&str>) -> Result<Connection> {
        let name = match name {
            Some(name) => name.to_string(),
            None => self.default_connection_name().await,
        };

        if let Some(connection) = self.connections.read().await.get(&name) {
            return Ok(connection.clone());
        }

        let config = self.config.read().await.connection(&name)?.clone();
        let connection = Connection::connect(name.clone(), &config).await?;

        let mut connections = self.connections.write().await;
        if let Some(existing) = connections.get(&name) {
            // Another task connected first; keep its pool
            connection.disconnect().await;
            return Ok(existing.clone());
        }
        connections.insert(name, connection.clone());
        Ok(connection)
    }

    pub async fn default_connection(&self) -> Result<Connection> {
        self.connection(None).await
    }

    pub async fn default_connection_name(&self) -> String {
        self.config.read().await.default.clone()
    }

    pub async fn set_default_connection(&self, name: impl Into<String>) {
        self.config.write().await.default = name.into();
    }

    /// Add or replace a connection configuration
    ///
    /// An already open connection under the same name is purged.
    pub async fn add_connection(&self, name: impl Into<String>, config: ConnectionConfig) {
        let name = name.into();
        self.purge(Some(&name)).await;
        self.config.write().await.connections.insert(name, config);
    }

    /// Register an already opened adapter under `name`
    pub async fn add_adapter(&self, name: impl Into<String>, config: ConnectionConfig, adapter: Arc<dyn DatabaseAdapter>) {
        let name = name.into();
        let connection = Connection::new(name.clone(), config.clone(), adapter);
        self.config.write().await.connections.insert(name.clone(), config);
        self.connections.write().await.insert(name, connection);
    }

    /// Start a query on `table` through the default connection
    pub async fn table(&self, table: &str) -> Result<QueryBuilder> {
        Ok(self.default_connection().await?.table(table))
    }

    /// Close the pool and forget the handle; the next request reconnects
    pub async fn disconnect(&self, name: Option<&str>) {
        if let Some(connection) = self.take(name).await {
            connection.disconnect().await;
        }
    }

    /// Forget the handle without closing it; outstanding clones keep working
    pub async fn purge(&self, name: Option<&str>) {
        self.take(name).await;
    }

    pub async fn reconnect(&self, name: Option<&str>) -> Result<Connection> {
        self.disconnect(name).await;
        self.connection(name).await
    }

    async fn take(&self, name: Option<&str>) -> Option<Connection> {
        let name = match name {
            Some(name) => name.to_string(),
            None => self.default_connection_name().await,
        };
        self.connections.write().await.remove(&name)
    }

    /// Register a connection factory for `driver`
    ///
    /// Applies process-wide, like [`resolver::register_resolver`].
    pub fn extend<F, Fut>(&self, driver: &str, factory: F)
    where
        F: Fn(String, ConnectionConfig) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Arc<dyn DatabaseAdapter>>> + Send + 'static,
    {
        resolver::register_resolver(driver, factory);
    }

    /// Names of the currently open connections
    pub async fn connections(&self) -> Vec<String> {
        let mut names: Vec<String> = self.connections.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Close every open connection
    pub async fn disconnect_all(&self) {
        let connections: Vec<Connection> = self.connections.write().await.drain().map(|(_, c)| c).collect();
        for connection in connections {
            connection.disconnect().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory() -> ConnectionConfig {
        ConnectionConfig::new("sqlite").database(":memory:")
    }

    #[tokio::test]
    async fn test_lazy_connect_and_cache() {
        let manager = DatabaseManager::new(DatabasesConfig::new("main").with_connection("main", memory()));
        assert!(manager.connections().await.is_empty());

        let first = manager.default_connection().await.unwrap();
        first.unprepared("create table t (id integer)").await.unwrap();

        // Same pool, so the in-memory table is visible
        let second = manager.connection(Some("main")).await.unwrap();
        assert!(second.select("select * from t", Vec::new()).await.unwrap().is_empty());
        assert_eq!(manager.connections().await, vec!["main".to_string()]);
    }

    #[tokio::test]
    async fn test_unknown_connection() {
        let manager = DatabaseManager::new(DatabasesConfig::default());
        let err = manager.connection(Some("reports")).await.unwrap_err();
        assert_eq!(err.to_string(), "Database connection [reports] not configured.");
    }

    #[tokio::test]
    async fn test_reconnect_opens_fresh_pool() {
        let manager = DatabaseManager::new(DatabasesConfig::new("main").with_connection("main", memory()));
        let first = manager.default_connection().await.unwrap();
        first.unprepared("create table t (id integer)").await.unwrap();

        let fresh = manager.reconnect(None).await.unwrap();
        assert!(fresh.select("select * from t", Vec::new()).await.is_err());
    }

    #[tokio::test]
    async fn test_purge_keeps_outstanding_handles() {
        let manager = DatabaseManager::new(DatabasesConfig::new("main").with_connection("main", memory()));
        let handle = manager.default_connection().await.unwrap();
        manager.purge(None).await;

        assert!(manager.connections().await.is_empty());
        assert!(handle.ping().await.unwrap());
    }
}
