//! PostgreSQL connector
//!
//! Besides the usual bootstrap statements this resolves the `search_path`
//! and `sslmode` settings, both of which accept several input shapes.

use super::{ConnectAttributes, Connector, PoolOptions};
use crate::database::adapter::DatabaseAdapter;
use crate::database::adapters::{map_sqlx_error, PostgresAdapter};
use crate::database::config::{ConnectionConfig, SearchPath};
use crate::error::{Error, Result};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use sqlx::postgres::{PgConnectOptions, PgPool, PgSslMode};
use sqlx::ConnectOptions;
use std::sync::Arc;

static SCHEMA_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[^\s,"'\[\]]+"#).expect("valid schema name pattern"));

/// Normalize a search path into an ordered list of bare schema names
///
/// Strings may separate names with commas, spaces or newlines and may quote
/// them; list items are trimmed of surrounding quotes.
pub fn parse_search_path(search_path: &SearchPath) -> Vec<String> {
    match search_path {
        SearchPath::One(value) => SCHEMA_NAME
            .find_iter(value)
            .map(|m| m.as_str().to_string())
            .collect(),
        SearchPath::Many(values) => values
            .iter()
            .map(|value| value.trim_matches(|c| c == '\'' || c == '"').to_string())
            .collect(),
    }
}

/// `"a", "b"`
pub fn quote_search_path(schemas: &[String]) -> String {
    schemas
        .iter()
        .map(|schema| format!("\"{}\"", schema))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Resolved TLS settings
#[derive(Debug, Clone, PartialEq)]
pub enum PgSsl {
    Disabled,
    /// Bare "use TLS" with the driver's defaults
    Enabled,
    /// Explicit certificate material, PEM contents already read
    Options {
        reject_unauthorized: Option<bool>,
        ca: Option<String>,
        cert: Option<String>,
        key: Option<String>,
    },
}

impl PgSsl {
    /// Resolve `sslmode` and the certificate paths of `config`
    ///
    /// `None` leaves TLS to the driver default.
    pub fn resolve(config: &ConnectionConfig) -> Result<Option<PgSsl>> {
        let ca = read_certificate(config.sslrootcert.as_deref())?;
        let cert = read_certificate(config.sslcert.as_deref())?;
        let key = read_certificate(config.sslkey.as_deref())?;
        let has_material = ca.is_some() || cert.is_some() || key.is_some();
        let material = |reject_unauthorized| PgSsl::Options {
            reject_unauthorized,
            ca: ca.clone(),
            cert: cert.clone(),
            key: key.clone(),
        };

        Ok(match config.sslmode.as_deref() {
            Some("disable") => Some(PgSsl::Disabled),
            Some("prefer") | Some("require") | Some("verify-ca") | Some("verify-full") => {
                if has_material {
                    Some(material(None))
                } else {
                    Some(PgSsl::Enabled)
                }
            }
            Some("no-verify") => Some(material(Some(false))),
            _ => {
                if has_material {
                    Some(material(None))
                } else {
                    None
                }
            }
        })
    }
}

fn read_certificate(path: Option<&str>) -> Result<Option<String>> {
    match path {
        None => Ok(None),
        Some(path) => std::fs::read_to_string(path).map(Some).map_err(|_| {
            Error::configuration(format!("Unable to read SSL certificate file [{}].", path))
        }),
    }
}

fn ssl_mode(sslmode: Option<&str>) -> PgSslMode {
    match sslmode {
        Some("disable") => PgSslMode::Disable,
        Some("allow") => PgSslMode::Allow,
        Some("require") | Some("no-verify") => PgSslMode::Require,
        Some("verify-ca") => PgSslMode::VerifyCa,
        Some("verify-full") => PgSslMode::VerifyFull,
        _ => PgSslMode::Prefer,
    }
}

#[derive(Debug, Clone, Default)]
pub struct PostgresConnector {
    attributes: ConnectAttributes,
    pool_options: PoolOptions,
}

impl PostgresConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// sqlx connect options for `config`
    pub fn connect_options(&self, config: &ConnectionConfig) -> Result<PgConnectOptions> {
        let mut options = PgConnectOptions::new()
            .host(config.host.as_deref().unwrap_or("127.0.0.1"))
            .port(config.port.unwrap_or(5432))
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

        match PgSsl::resolve(config)? {
            None => {}
            Some(PgSsl::Disabled) => options = options.ssl_mode(PgSslMode::Disable),
            Some(PgSsl::Enabled) => options = options.ssl_mode(ssl_mode(config.sslmode.as_deref())),
            Some(PgSsl::Options { reject_unauthorized, ca, cert, key }) => {
                let mode = match reject_unauthorized {
                    Some(false) => PgSslMode::Require,
                    _ if config.sslmode.is_none() && ca.is_some() => PgSslMode::VerifyCa,
                    _ => ssl_mode(config.sslmode.as_deref()),
                };
                options = options.ssl_mode(mode);
                if let Some(ca) = ca {
                    options = options.ssl_root_cert_from_pem(ca.into_bytes());
                }
                if let Some(cert) = cert {
                    options = options.ssl_client_cert_from_pem(cert.into_bytes());
                }
                if let Some(key) = key {
                    options = options.ssl_client_key_from_pem(key.into_bytes());
                }
            }
        }
        Ok(options)
    }
}

#[async_trait]
impl Connector for PostgresConnector {
    fn driver(&self) -> &'static str {
        "pgsql"
    }

    async fn connect(&self, name: &str, config: &ConnectionConfig) -> Result<Arc<dyn DatabaseAdapter>> {
        let connect_options = self.connect_options(config)?;
        let statements = Arc::new(self.bootstrap_statements(config));
        let pool_options = self.pool_options.merged_with(config);
        log::info!(
            "Creating pgsql pool [{}] (max {} connections)",
            name,
            pool_options.max_connections
        );

        let pool: PgPool = pool_options
            .to_sqlx::<sqlx::Postgres>()
            .after_connect(move |conn, _meta| {
                let statements = Arc::clone(&statements);
                Box::pin(async move {
                    for statement in statements.iter() {
                        log::debug!("PostgreSQL bootstrap: {}", statement);
                        sqlx::Executor::execute(&mut *conn, statement.as_str()).await?;
                    }
                    Ok(())
                })
            })
            .connect_with(connect_options)
            .await
            .map_err(|e| map_sqlx_error("Failed to connect to PostgreSQL", e))?;

        Ok(Arc::new(PostgresAdapter::from_pool(name, pool)))
    }

    fn bootstrap_statements(&self, config: &ConnectionConfig) -> Vec<String> {
        let mut statements = Vec::new();

        if let Some(level) = &config.isolation_level {
            statements.push(format!(
                "set session characteristics as transaction isolation level {}",
                level
            ));
        }
        if let Some(charset) = &config.charset {
            statements.push(format!("set names '{}'", charset));
        }
        if let Some(timezone) = &config.timezone {
            statements.push(format!("set time zone '{}'", timezone));
        }
        if let Some(search_path) = &config.search_path {
            let schemas = parse_search_path(search_path);
            if !schemas.is_empty() {
                statements.push(format!("set search_path to {}", quote_search_path(&schemas)));
            }
        }
        if let Some(application_name) = &config.application_name {
            statements.push(format!("set application_name to '{}'", application_name));
        }
        if let Some(synchronous_commit) = &config.synchronous_commit {
            statements.push(format!("set synchronous_commit to '{}'", synchronous_commit));
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
    use std::io::Write;

    fn quoted(path: SearchPath) -> String {
        quote_search_path(&parse_search_path(&path))
    }

    #[test]
    fn test_search_path_single_schema_shapes() {
        for input in ["public", "\"public\"", "'public'"] {
            assert_eq!(quoted(SearchPath::from(input)), "\"public\"");
        }
        assert_eq!(quoted(SearchPath::from(vec!["public"])), "\"public\"");
        assert_eq!(quoted(SearchPath::from(vec!["'public'"])), "\"public\"");
    }

    #[test]
    fn test_search_path_lists() {
        for input in ["public user", "public,user", "public, user", "public\nuser", "public\r\nuser", "\"public\", 'user'"] {
            assert_eq!(quoted(SearchPath::from(input)), "\"public\", \"user\"");
        }
        assert_eq!(quoted(SearchPath::from(vec!["public", "user"])), "\"public\", \"user\"");
        assert_eq!(quoted(SearchPath::from("[public, user]")), "\"public\", \"user\"");
    }

    #[test]
    fn test_ssl_modes_without_material() {
        let resolve = |mode: &str| PgSsl::resolve(&ConnectionConfig::new("pgsql").sslmode(mode)).unwrap();

        assert_eq!(resolve("disable"), Some(PgSsl::Disabled));
        for mode in ["prefer", "require", "verify-ca", "verify-full"] {
            assert_eq!(resolve(mode), Some(PgSsl::Enabled));
        }
        assert_eq!(
            resolve("no-verify"),
            Some(PgSsl::Options {
                reject_unauthorized: Some(false),
                ca: None,
                cert: None,
                key: None
            })
        );
        assert_eq!(PgSsl::resolve(&ConnectionConfig::new("pgsql")).unwrap(), None);
    }

    #[test]
    fn test_ssl_material_is_read() {
        let mut ca = tempfile::NamedTempFile::new().unwrap();
        write!(ca, "-----BEGIN CERTIFICATE-----").unwrap();
        let path = ca.path().to_str().unwrap().to_string();

        let require = ConnectionConfig::new("pgsql").sslmode("require").sslrootcert(path.clone());
        assert_eq!(
            PgSsl::resolve(&require).unwrap(),
            Some(PgSsl::Options {
                reject_unauthorized: None,
                ca: Some("-----BEGIN CERTIFICATE-----".to_string()),
                cert: None,
                key: None
            })
        );

        let no_verify = ConnectionConfig::new("pgsql").sslmode("no-verify").sslrootcert(path);
        assert!(matches!(
            PgSsl::resolve(&no_verify).unwrap(),
            Some(PgSsl::Options { reject_unauthorized: Some(false), ca: Some(_), .. })
        ));
    }

    #[test]
    fn test_unreadable_certificate() {
        let config = ConnectionConfig::new("pgsql").sslcert("/nonexistent/client.crt");
        assert_eq!(
            PgSsl::resolve(&config).unwrap_err().to_string(),
            "Unable to read SSL certificate file [/nonexistent/client.crt]."
        );
    }

    #[test]
    fn test_bootstrap_statements() {
        let config = ConnectionConfig::new("pgsql")
            .isolation_level("serializable")
            .charset("utf8")
            .timezone("UTC")
            .search_path("public, audit")
            .application_name("api")
            .synchronous_commit("off");

        assert_eq!(
            PostgresConnector::new().bootstrap_statements(&config),
            vec![
                "set session characteristics as transaction isolation level serializable",
                "set names 'utf8'",
                "set time zone 'UTC'",
                "set search_path to \"public\", \"audit\"",
                "set application_name to 'api'",
                "set synchronous_commit to 'off'",
            ]
        );
    }
}
