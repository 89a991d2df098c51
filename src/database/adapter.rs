//! Database adapter trait for multi-database support
//!
//! Adapters own a driver pool and speak `?`-placeholder SQL with positional
//! [`SqlValue`] bindings. Result rows come back as JSON objects keyed by
//! column name so the query builder stays independent of the driver.

use crate::database::types::SqlValue;
use crate::error::Result;
use crate::query::DatabaseBackend;
use async_trait::async_trait;
use serde_json::Value as JsonValue;

/// Result type for database query operations
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    /// Number of rows affected by the query
    pub rows_affected: u64,
    /// Last inserted ID (if applicable)
    pub last_insert_id: Option<i64>,
}

/// Unified database adapter trait
///
/// One implementation per driver; connectors hand them out as
/// `Arc<dyn DatabaseAdapter>` so a [`Connection`](crate::database::Connection)
/// never sees the concrete pool type.
#[async_trait]
pub trait DatabaseAdapter: Send + Sync {
    /// Get the name of this database connection
    fn name(&self) -> &str;

    /// Get the database backend type
    fn backend(&self) -> DatabaseBackend;

    /// Execute a statement that modifies data (INSERT, UPDATE, DELETE, DDL)
    ///
    /// # Returns
    /// * `Ok(QueryResult)` - Result with affected rows and last insert ID
    /// * `Err(Error)` - If the statement fails
    async fn execute(&self, sql: &str, params: Vec<SqlValue>) -> Result<QueryResult>;

    /// Fetch all rows from a SELECT query
    async fn fetch_all(&self, sql: &str, params: Vec<SqlValue>) -> Result<Vec<JsonValue>>;

    /// Fetch the first row, `Ok(None)` when nothing matches
    async fn fetch_one(&self, sql: &str, params: Vec<SqlValue>) -> Result<Option<JsonValue>>;

    /// Run SQL without preparing it; may contain several statements
    async fn execute_unprepared(&self, sql: &str) -> Result<()>;

    /// Test database connectivity
    async fn ping(&self) -> Result<bool>;

    /// Close the underlying pool
    async fn close(&self) {}

    /// Get the underlying adapter as Any for downcasting
    ///
    /// Code that knows the concrete driver can reach the sqlx pool this way,
    /// e.g. to manage transactions.
    fn as_any(&self) -> &dyn std::any::Any;

    /// Clone the adapter into a boxed trait object
    fn clone_box(&self) -> Box<dyn DatabaseAdapter>;
}

impl Clone for Box<dyn DatabaseAdapter> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}
