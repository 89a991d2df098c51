//! MySQL / MariaDB connector

use super::{ConnectAttributes, Connector, PoolOptions};
use crate::database::adapter::DatabaseAdapter;
use crate::database::adapters::{map_sqlx_error, MySqlAdapter};
use crate::database::config::ConnectionConfig;
use crate::error::Result;
use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlPool};
use sqlx::ConnectOptions;
use std::sync::Arc;

/// Modes applied by `strict = true`
pub const STRICT_MODES: &str =
    "ONLY_FULL_GROUP_BY,STRICT_TRANS_TABLES,NO_ZERO_IN_DATE,NO_ZERO_DATE,ERROR_FOR_DIVISION_BY_ZERO,NO_ENGINE_SUBSTITUTION";

#[derive(Debug, Clone, Default)]
pub struct MySqlConnector {
    mariadb: bool,
    attributes: ConnectAttributes,
    pool_options: PoolOptions,
}

impl MySqlConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mariadb() -> Self {
        Self {
            mariadb: true,
            ..Self::default()
        }
    }

    /// sqlx connect options for `config`
    pub fn connect_options(&self, config: &ConnectionConfig) -> MySqlConnectOptions {
        let mut options = MySqlConnectOptions::new()
            .host(config.host.as_deref().unwrap_or("127.0.0.1"))
            .port(config.port.unwrap_or(3306))
            .statement_cache_capacity(self.attributes.statement_cache_capacity)
            .log_statements(self.attributes.log_statements)
            .log_slow_statements(
                self.attributes.log_slow_statements,
                self.attributes.slow_statement_threshold,
            );

        if let Some(socket) = &config.socket {
            options = options.socket(socket);
        }
        if let Some(username) = &config.username {
            options = options.username(username);
        }
        if let Some(password) = &config.password {
            options = options.password(password);
        }
        if let Some(database) = &config.database {
            options = options.database(database);
        }
        if let Some(charset) = &config.charset {
            options = options.charset(charset);
        }
        if let Some(collation) = &config.collation {
            options = options.collation(collation);
        }
        options
    }

    fn sql_mode(config: &ConnectionConfig) -> Option<String> {
        if let Some(modes) = &config.modes {
            return Some(format!("set session sql_mode='{}'", modes.join(",")));
        }
        match config.strict {
            Some(true) => Some(format!("set session sql_mode='{}'", STRICT_MODES)),
            Some(false) => Some("set session sql_mode='NO_ENGINE_SUBSTITUTION'".to_string()),
            None => None,
        }
    }
}

#[async_trait]
impl Connector for MySqlConnector {
    fn driver(&self) -> &'static str {
        if self.mariadb {
            "mariadb"
        } else {
            "mysql"
        }
    }

    async fn connect(&self, name: &str, config: &ConnectionConfig) -> Result<Arc<dyn DatabaseAdapter>> {
        let statements = Arc::new(self.bootstrap_statements(config));
        let pool_options = self.pool_options.merged_with(config);
        log::info!(
            "Creating {} pool [{}] (max {} connections)",
            self.driver(),
            name,
            pool_options.max_connections
        );

        let pool: MySqlPool = pool_options
            .to_sqlx::<sqlx::MySql>()
            .after_connect(move |conn, _meta| {
                let statements = Arc::clone(&statements);
                Box::pin(async move {
                    for statement in statements.iter() {
                        log::debug!("MySQL bootstrap: {}", statement);
                        sqlx::Executor::execute(&mut *conn, statement.as_str()).await?;
                    }
                    Ok(())
                })
            })
            .connect_with(self.connect_options(config))
            .await
            .map_err(|e| map_sqlx_error("Failed to connect to MySQL", e))?;

        let adapter = MySqlAdapter::from_pool(name, pool);
        Ok(Arc::new(if self.mariadb { adapter.mariadb() } else { adapter }))
    }

    fn bootstrap_statements(&self, config: &ConnectionConfig) -> Vec<String> {
        let mut statements = Vec::new();

        if let Some(level) = &config.isolation_level {
            statements.push(format!("SET SESSION TRANSACTION ISOLATION LEVEL {}", level));
        }
        if let Some(charset) = &config.charset {
            let mut names = format!("set names '{}'", charset);
            if let Some(collation) = &config.collation {
                names.push_str(&format!(" collate '{}'", collation));
            }
            statements.push(names);
        }
        if let Some(timezone) = &config.timezone {
            statements.push(format!("set time_zone=\"{}\"", timezone));
        }
        if let Some(mode) = Self::sql_mode(config) {
            statements.push(mode);
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bootstrap_order() {
        let config = ConnectionConfig::new("mysql")
            .isolation_level("READ COMMITTED")
            .charset("utf8mb4")
            .collation("utf8mb4_unicode_ci")
            .timezone("+00:00")
            .strict(true);

        assert_eq!(
            MySqlConnector::new().bootstrap_statements(&config),
            vec![
                "SET SESSION TRANSACTION ISOLATION LEVEL READ COMMITTED".to_string(),
                "set names 'utf8mb4' collate 'utf8mb4_unicode_ci'".to_string(),
                "set time_zone=\"+00:00\"".to_string(),
                format!("set session sql_mode='{}'", STRICT_MODES),
            ]
        );
    }

    #[test]
    fn test_explicit_modes_win_over_strict() {
        let config = ConnectionConfig::new("mysql")
            .strict(true)
            .modes(["ANSI_QUOTES", "NO_ENGINE_SUBSTITUTION"]);

        assert_eq!(
            MySqlConnector::new().bootstrap_statements(&config),
            vec!["set session sql_mode='ANSI_QUOTES,NO_ENGINE_SUBSTITUTION'".to_string()]
        );
    }

    #[test]
    fn test_nothing_configured_issues_nothing() {
        let config = ConnectionConfig::new("mysql");
        assert!(MySqlConnector::new().bootstrap_statements(&config).is_empty());

        let lenient = ConnectionConfig::new("mysql").strict(false);
        assert_eq!(
            MySqlConnector::new().bootstrap_statements(&lenient),
            vec!["set session sql_mode='NO_ENGINE_SUBSTITUTION'".to_string()]
        );
    }

    #[test]
    fn test_set_default_pool_options() {
        let mut connector = MySqlConnector::mariadb();
        connector.set_default_pool_options(PoolOptions {
            max_connections: 3,
            ..PoolOptions::default()
        });

        assert_eq!(connector.driver(), "mariadb");
        assert_eq!(connector.default_pool_options().max_connections, 3);
    }
}
