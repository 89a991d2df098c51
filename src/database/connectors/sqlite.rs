//! SQLite connector

use super::{ConnectAttributes, Connector, PoolOptions};
use crate::database::adapter::DatabaseAdapter;
use crate::database::adapters::{map_sqlx_error, SqliteAdapter};
use crate::database::config::ConnectionConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool};
use sqlx::ConnectOptions;
use std::path::Path;
use std::sync::Arc;

pub const IN_MEMORY: &str = ":memory:";

#[derive(Debug, Clone, Default)]
pub struct SqliteConnector {
    attributes: ConnectAttributes,
    pool_options: PoolOptions,
}

impl SqliteConnector {
    pub fn new() -> Self {
        Self::default()
    }

    fn is_in_memory(config: &ConnectionConfig) -> bool {
        config.database.as_deref() == Some(IN_MEMORY)
    }

    /// sqlx connect options; file databases must already exist
    pub fn connect_options(&self, config: &ConnectionConfig) -> Result<SqliteConnectOptions> {
        let options = if Self::is_in_memory(config) {
            SqliteConnectOptions::new().in_memory(true)
        } else {
            let path = config.database.as_deref().unwrap_or_default();
            if path.is_empty() || !Path::new(path).exists() {
                return Err(Error::configuration(format!(
                    "Database file at path [{}] does not exist. Ensure this is an absolute path to the database.",
                    path
                )));
            }
            SqliteConnectOptions::new().filename(path)
        };

        // Foreign keys stay at the SQLite default unless configured
        Ok(options
            .foreign_keys(false)
            .statement_cache_capacity(self.attributes.statement_cache_capacity)
            .log_statements(self.attributes.log_statements)
            .log_slow_statements(
                self.attributes.log_slow_statements,
                self.attributes.slow_statement_threshold,
            ))
    }
}

#[async_trait]
impl Connector for SqliteConnector {
    fn driver(&self) -> &'static str {
        "sqlite"
    }

    async fn connect(&self, name: &str, config: &ConnectionConfig) -> Result<Arc<dyn DatabaseAdapter>> {
        let connect_options = self.connect_options(config)?;
        let statements = Arc::new(self.bootstrap_statements(config));

        let mut pool_options = self.pool_options.merged_with(config);
        if Self::is_in_memory(config) {
            // Every connection would otherwise open its own empty database
            pool_options.max_connections = 1;
            pool_options.min_connections = 1;
            pool_options.idle_timeout = None;
            pool_options.max_lifetime = None;
        }
        log::info!(
            "Creating sqlite pool [{}] for {} (max {} connections)",
            name,
            config.database.as_deref().unwrap_or_default(),
            pool_options.max_connections
        );

        let pool: SqlitePool = pool_options
            .to_sqlx::<sqlx::Sqlite>()
            .after_connect(move |conn, _meta| {
                let statements = Arc::clone(&statements);
                Box::pin(async move {
                    for statement in statements.iter() {
                        log::debug!("SQLite bootstrap: {}", statement);
                        sqlx::Executor::execute(&mut *conn, statement.as_str()).await?;
                    }
                    Ok(())
                })
            })
            .connect_with(connect_options)
            .await
            .map_err(|e| map_sqlx_error("Failed to connect to SQLite", e))?;

        Ok(Arc::new(SqliteAdapter::from_pool(name, pool)))
    }

    fn bootstrap_statements(&self, config: &ConnectionConfig) -> Vec<String> {
        let mut statements = Vec::new();

        if let Some(enabled) = config.foreign_key_constraints {
            statements.push(format!(
                "PRAGMA foreign_keys = {}",
                if enabled { "ON" } else { "OFF" }
            ));
        }
        if let Some(timeout) = config.busy_timeout {
            statements.push(format!("PRAGMA busy_timeout = {}", timeout));
        }
        if let Some(mode) = &config.journal_mode {
            statements.push(format!("PRAGMA journal_mode = {}", mode));
        }
        if let Some(synchronous) = &config.synchronous {
            statements.push(format!("PRAGMA synchronous = {}", synchronous));
        }
        statements
    }

    fn default_attributes(&self) -> &ConnectAttributes {
        &self.attributes
    }

    fn set_default_attributes(&mut self, attributes: ConnectAttributes) {
        self.attributes = attributes;
    }

    fn default_pool_options(&self) -> &PoolOptions {
        &self.pool_options
    }

    fn set_default_pool_options(&mut self, options: PoolOptions) {
        self.pool_options = options;
    }
}
