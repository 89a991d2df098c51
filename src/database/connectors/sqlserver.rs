//! SQL Server connector
//!
//! The bundled sqlx stack has no TDS transport. This connector shapes the
//! connect options and bootstrap statements, then hands them to the resolver
//! registered for `sqlsrv`.

use super::{ConnectAttributes, Connector, PoolOptions};
use crate::database::adapter::DatabaseAdapter;
use crate::database::config::ConnectionConfig;
use crate::database::resolver;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::sync::Arc;

/// Options a TDS driver needs to open a connection
#[derive(Debug, Clone, PartialEq)]
pub struct SqlServerConnectOptions {
    pub host: String,
    pub port: u16,
    pub database: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub encrypt: bool,
    pub trust_server_certificate: bool,
    pub application_name: Option<String>,
    /// Run on every new connection
    pub bootstrap: Vec<String>,
    pub pool: PoolOptions,
}

#[derive(Debug, Clone, Default)]
pub struct SqlServerConnector {
    attributes: ConnectAttributes,
    pool_options: PoolOptions,
}

impl SqlServerConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect_options(&self, config: &ConnectionConfig) -> SqlServerConnectOptions {
        SqlServerConnectOptions {
            host: config.host.clone().unwrap_or_else(|| "localhost".to_string()),
            port: config.port.unwrap_or(1433),
            database: config.database.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
            encrypt: config.encrypt.unwrap_or(true),
            trust_server_certificate: config.trust_server_certificate.unwrap_or(false),
            application_name: config.application_name.clone(),
            bootstrap: self.bootstrap_statements(config),
            pool: self.pool_options.merged_with(config),
        }
    }
}

#[async_trait]
impl Connector for SqlServerConnector {
    fn driver(&self) -> &'static str {
        "sqlsrv"
    }

    async fn connect(&self, name: &str, config: &ConnectionConfig) -> Result<Arc<dyn DatabaseAdapter>> {
        let resolver = resolver::resolver_for(self.driver()).ok_or_else(|| {
            Error::configuration(
                "No connection resolver registered for driver [sqlsrv]. Register one with register_resolver(\"sqlsrv\", ..).",
            )
        })?;
        let options = self.connect_options(config);
        log::info!(
            "Connecting sqlsrv [{}] to {}:{} through registered resolver",
            name,
            options.host,
            options.port
        );
        resolver(name.to_string(), config.clone()).await
    }

    fn bootstrap_statements(&self, config: &ConnectionConfig) -> Vec<String> {
        config
            .isolation_level
            .iter()
            .map(|level| format!("SET TRANSACTION ISOLATION LEVEL {}", level))
            .collect()
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
    fn test_connect_options_shape() {
        let config = ConnectionConfig::new("sqlsrv")
            .host("sql.local")
            .database("erp")
            .username("sa")
            .trust_server_certificate(true)
            .isolation_level("SNAPSHOT");
        let options = SqlServerConnector::new().connect_options(&config);

        assert_eq!(options.host, "sql.local");
        assert_eq!(options.port, 1433);
        assert!(options.encrypt);
        assert!(options.trust_server_certificate);
        assert_eq!(options.bootstrap, vec!["SET TRANSACTION ISOLATION LEVEL SNAPSHOT"]);
    }
}
