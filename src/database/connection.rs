//! A named, configured connection
//!
//! [`Connection`] ties an adapter to the grammars matching its dialect and
//! configuration (table prefix, upsert alias). It is cheap to clone; query
//! builders and schema builders each carry a clone.

use crate::database::adapter::{DatabaseAdapter, QueryResult};
use crate::database::config::ConnectionConfig;
use crate::database::connectors;
use crate::database::types::SqlValue;
use crate::error::{Error, Result};
use crate::query::grammar::{Grammar, MySqlGrammar, PostgresGrammar, SQLiteGrammar, SqlServerGrammar};
use crate::query::{DatabaseBackend, Expression, QueryBuilder};
use crate::schema::{schema_grammar_for, SchemaBuilder, SchemaGrammar};
use serde_json::Value as JsonValue;
use std::fmt;
use std::sync::Arc;

#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

struct ConnectionInner {
    name: String,
    config: ConnectionConfig,
    adapter: Arc<dyn DatabaseAdapter>,
    grammar: Arc<dyn Grammar>,
    schema_grammar: Arc<dyn SchemaGrammar>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("name", &self.inner.name)
            .field("backend", &self.backend())
            .field("prefix", &self.inner.config.prefix)
            .finish()
    }
}

/// The query grammar for `backend` configured from `config`
pub fn query_grammar_for(backend: DatabaseBackend, config: &ConnectionConfig) -> Arc<dyn Grammar> {
    let prefix = config.prefix.clone();
    match backend {
        DatabaseBackend::MySQL => Arc::new(
            MySqlGrammar::new()
                .with_table_prefix(prefix)
                .with_upsert_alias(config.use_upsert_alias),
        ),
        DatabaseBackend::MariaDB => Arc::new(MySqlGrammar::mariadb().with_table_prefix(prefix)),
        DatabaseBackend::Postgres => Arc::new(PostgresGrammar::new().with_table_prefix(prefix)),
        DatabaseBackend::SQLite => Arc::new(SQLiteGrammar::new().with_table_prefix(prefix)),
        DatabaseBackend::SqlServer => Arc::new(SqlServerGrammar::new().with_table_prefix(prefix)),
    }
}

impl Connection {
    /// Wrap an already opened adapter
    pub fn new(name: impl Into<String>, config: ConnectionConfig, adapter: Arc<dyn DatabaseAdapter>) -> Self {
        let backend = adapter.backend();
        let grammar = query_grammar_for(backend, &config);
        let schema_grammar = schema_grammar_for(backend, &config);
        Self {
            inner: Arc::new(ConnectionInner {
                name: name.into(),
                config,
                adapter,
                grammar,
                schema_grammar,
            }),
        }
    }

    /// Open a connection through the resolver registry or built-in connectors
    pub async fn connect(name: impl Into<String>, config: &ConnectionConfig) -> Result<Self> {
        let name = name.into();
        let config = config.resolved()?;
        let adapter = connectors::connect(&name, &config).await?;
        Ok(Self::new(name, config, adapter))
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.inner.config
    }

    pub fn backend(&self) -> DatabaseBackend {
        self.inner.adapter.backend()
    }

    pub fn adapter(&self) -> &Arc<dyn DatabaseAdapter> {
        &self.inner.adapter
    }

    pub fn grammar(&self) -> Arc<dyn Grammar> {
        Arc::clone(&self.inner.grammar)
    }

    pub fn schema_grammar(&self) -> Arc<dyn SchemaGrammar> {
        Arc::clone(&self.inner.schema_grammar)
    }

    pub fn table_prefix(&self) -> &str {
        &self.inner.config.prefix
    }

    /// Start a query against `table`
    pub fn table(&self, table: &str) -> QueryBuilder {
        self.query().from(table)
    }

    /// Start a query with no table yet
    pub fn query(&self) -> QueryBuilder {
        QueryBuilder::with_connection(self.clone())
    }

    /// A raw SQL fragment for use in builder clauses
    pub fn raw(&self, sql: impl Into<String>) -> Expression {
        Expression::new(sql.into())
    }

    pub fn schema(&self) -> SchemaBuilder {
        SchemaBuilder::new(self.clone())
    }

    fn log_statement(&self, sql: &str, bindings: &[SqlValue]) {
        log::debug!("[{}] {} {:?}", self.inner.name, sql, bindings);
    }

    /// Rows of a select statement
    pub async fn select(&self, sql: &str, bindings: Vec<SqlValue>) -> Result<Vec<JsonValue>> {
        self.log_statement(sql, &bindings);
        self.inner.adapter.fetch_all(sql, bindings).await
    }

    /// The first row of a select statement
    pub async fn select_one(&self, sql: &str, bindings: Vec<SqlValue>) -> Result<Option<JsonValue>> {
        self.log_statement(sql, &bindings);
        self.inner.adapter.fetch_one(sql, bindings).await
    }

    /// The single column of the first row
    pub async fn scalar(&self, sql: &str, bindings: Vec<SqlValue>) -> Result<Option<JsonValue>> {
        match self.select_one(sql, bindings).await? {
            Some(JsonValue::Object(mut record)) => {
                if record.len() > 1 {
                    return Err(Error::invalid_argument(
                        "The scalar query returned more than one column.",
                    ));
                }
                let key = record.keys().next().cloned();
                Ok(key.and_then(|key| record.remove(&key)))
            }
            Some(other) => Ok(Some(other)),
            None => Ok(None),
        }
    }

    pub async fn insert(&self, sql: &str, bindings: Vec<SqlValue>) -> Result<bool> {
        self.statement(sql, bindings).await
    }

    pub async fn update(&self, sql: &str, bindings: Vec<SqlValue>) -> Result<u64> {
        self.affecting_statement(sql, bindings).await
    }

    pub async fn delete(&self, sql: &str, bindings: Vec<SqlValue>) -> Result<u64> {
        self.affecting_statement(sql, bindings).await
    }

    /// Run a statement and report affected rows and the generated id
    pub async fn execute(&self, sql: &str, bindings: Vec<SqlValue>) -> Result<QueryResult> {
        self.log_statement(sql, &bindings);
        self.inner.adapter.execute(sql, bindings).await
    }

    /// Run a statement, `true` once it succeeded
    pub async fn statement(&self, sql: &str, bindings: Vec<SqlValue>) -> Result<bool> {
        self.execute(sql, bindings).await.map(|_| true)
    }

    /// Run a statement and return the number of affected rows
    pub async fn affecting_statement(&self, sql: &str, bindings: Vec<SqlValue>) -> Result<u64> {
        self.execute(sql, bindings).await.map(|result| result.rows_affected)
    }

    /// Run raw SQL without bindings or preparation
    pub async fn unprepared(&self, sql: &str) -> Result<bool> {
        self.log_statement(sql, &[]);
        self.inner.adapter.execute_unprepared(sql).await.map(|_| true)
    }

    pub async fn ping(&self) -> Result<bool> {
        self.inner.adapter.ping().await
    }

    /// Close the pool; clones of this connection stop working
    pub async fn disconnect(&self) {
        log::info!("Closing database connection [{}]", self.inner.name);
        self.inner.adapter.close().await;
    }
}
