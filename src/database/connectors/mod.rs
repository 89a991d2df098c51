//! Connectors turn a [`ConnectionConfig`] into a pooled adapter
//!
//! Each dialect shapes the sqlx connect options from the config record and
//! derives a list of bootstrap statements. The statements run in sqlx's
//! `after_connect` hook, so every new pooled connection receives them once.

use crate::database::adapter::DatabaseAdapter;
use crate::database::config::ConnectionConfig;
use crate::database::resolver;
use crate::error::{Error, Result};
use crate::query::DatabaseBackend;
use async_trait::async_trait;
use log::LevelFilter;
use std::sync::Arc;
use std::time::Duration;

pub mod mysql;
pub mod postgres;
pub mod sqlite;
pub mod sqlserver;

pub use mysql::MySqlConnector;
pub use postgres::{parse_search_path, quote_search_path, PgSsl, PostgresConnector};
pub use sqlite::SqliteConnector;
pub use sqlserver::{SqlServerConnectOptions, SqlServerConnector};

/// Per-connection driver attributes
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectAttributes {
    /// Prepared statements kept per connection
    pub statement_cache_capacity: usize,
    /// Level at which sqlx logs every statement
    pub log_statements: LevelFilter,
    /// Level and threshold for slow statement logging
    pub log_slow_statements: LevelFilter,
    pub slow_statement_threshold: Duration,
}

impl Default for ConnectAttributes {
    fn default() -> Self {
        Self {
            statement_cache_capacity: 100,
            log_statements: LevelFilter::Debug,
            log_slow_statements: LevelFilter::Warn,
            slow_statement_threshold: Duration::from_secs(1),
        }
    }
}

/// Pool sizing applied when the config record leaves a key unset
#[derive(Debug, Clone, PartialEq)]
pub struct PoolOptions {
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout: Duration,
    pub idle_timeout: Option<Duration>,
    pub max_lifetime: Option<Duration>,
    pub test_before_acquire: bool,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Some(Duration::from_secs(600)),
            max_lifetime: Some(Duration::from_secs(1800)),
            test_before_acquire: true,
        }
    }
}

impl PoolOptions {
    /// These defaults with the config's pool keys applied on top
    pub fn merged_with(&self, config: &ConnectionConfig) -> Self {
        let mut options = self.clone();
        if let Some(max) = config.max_connections {
            options.max_connections = max;
        }
        if let Some(min) = config.min_connections {
            options.min_connections = min;
        }
        if let Some(seconds) = config.connect_timeout {
            options.connect_timeout = Duration::from_secs(seconds);
        }
        if let Some(seconds) = config.idle_timeout {
            options.idle_timeout = Some(Duration::from_secs(seconds));
        }
        if let Some(seconds) = config.max_lifetime {
            options.max_lifetime = Some(Duration::from_secs(seconds));
        }
        options.min_connections = options.min_connections.min(options.max_connections);
        options
    }

    /// The equivalent sqlx pool options
    pub fn to_sqlx<DB: sqlx::Database>(&self) -> sqlx::pool::PoolOptions<DB> {
        sqlx::pool::PoolOptions::<DB>::new()
            .max_connections(self.max_connections)
            .min_connections(self.min_connections)
            .acquire_timeout(self.connect_timeout)
            .idle_timeout(self.idle_timeout)
            .max_lifetime(self.max_lifetime)
            .test_before_acquire(self.test_before_acquire)
    }
}

/// A dialect-specific connection factory
#[async_trait]
pub trait Connector: Send + Sync {
    /// Driver name this connector serves
    fn driver(&self) -> &'static str;

    /// Open a pool for `config` and wrap it in an adapter named `name`
    async fn connect(&self, name: &str, config: &ConnectionConfig) -> Result<Arc<dyn DatabaseAdapter>>;

    /// Statements issued on every new connection, in order
    ///
    /// Each statement is only emitted when its config key is present.
    fn bootstrap_statements(&self, config: &ConnectionConfig) -> Vec<String>;

    fn default_attributes(&self) -> &ConnectAttributes;

    fn set_default_attributes(&mut self, attributes: ConnectAttributes);

    fn default_pool_options(&self) -> &PoolOptions;

    fn set_default_pool_options(&mut self, options: PoolOptions);
}

/// The built-in connector for a driver name
pub fn connector_for(driver: &str) -> Result<Box<dyn Connector>> {
    let backend = DatabaseBackend::from_driver(driver)
        .ok_or_else(|| Error::configuration(format!("Unsupported driver [{}].", driver)))?;

    Ok(match backend {
        DatabaseBackend::MySQL => Box::new(MySqlConnector::new()),
        DatabaseBackend::MariaDB => Box::new(MySqlConnector::mariadb()),
        DatabaseBackend::Postgres => Box::new(PostgresConnector::new()),
        DatabaseBackend::SQLite => Box::new(SqliteConnector::new()),
        DatabaseBackend::SqlServer => Box::new(SqlServerConnector::new()),
    })
}

/// Connect `config`, preferring a registered resolver over the built-in connectors
pub async fn connect(name: &str, config: &ConnectionConfig) -> Result<Arc<dyn DatabaseAdapter>> {
    let config = config.resolved()?;
    let driver = config.driver_name()?.to_string();

    if let Some(resolver) = resolver::resolver_for(&driver) {
        log::debug!("Using registered resolver for driver [{}]", driver);
        return resolver(name.to_string(), config).await;
    }

    connector_for(&driver)?.connect(name, &config).await
}
