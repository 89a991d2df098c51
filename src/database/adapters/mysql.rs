//! MySQL / MariaDB database adapter implementation

use super::map_sqlx_error;
use crate::database::adapter::{DatabaseAdapter, QueryResult};
use crate::database::types::{SqlValue, MySqlTypeConverter};
use crate::error::Result;
use crate::query::DatabaseBackend;
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use sqlx::MySqlPool;
use std::sync::Arc;

/// MySQL database adapter
///
/// Also serves MariaDB; the backend reported follows the connector.
#[derive(Clone)]
pub struct MySqlAdapter {
    name: String,
    backend: DatabaseBackend,
    pool: Arc<MySqlPool>,
    converter: MySqlTypeConverter,
}

impl MySqlAdapter {
    /// Create adapter from existing pool
    pub fn from_pool(name: impl Into<String>, pool: MySqlPool) -> Self {
        Self {
            name: name.into(),
            backend: DatabaseBackend::MySQL,
            pool: Arc::new(pool),
            converter: MySqlTypeConverter::new(),
        }
    }

    /// Report MariaDB instead of MySQL
    pub fn mariadb(mut self) -> Self {
        self.backend = DatabaseBackend::MariaDB;
        self
    }

    /// Get reference to the underlying pool
    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }

    fn prepare<'q>(
        sql: &'q str,
        params: Vec<SqlValue>,
    ) -> sqlx::query::Query<'q, sqlx::MySql, sqlx::mysql::MySqlArguments> {
        let mut query = sqlx::query(sql);
        for param in params {
            query = MySqlTypeConverter::bind_param(query, param);
        }
        query
    }
}

#[async_trait]
impl DatabaseAdapter for MySqlAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn backend(&self) -> DatabaseBackend {
        self.backend
    }

    async fn execute(&self, sql: &str, params: Vec<SqlValue>) -> Result<QueryResult> {
        #[cfg(debug_assertions)]
        {
            log::debug!("MySQL EXECUTE: {}", sql);
            log::debug!("  Parameters: {:?}", params);
        }

        let result = Self::prepare(sql, params)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("MySQL execute failed", e))?;

        Ok(QueryResult {
            rows_affected: result.rows_affected(),
            last_insert_id: Some(result.last_insert_id() as i64).filter(|id| *id > 0),
        })
    }

    async fn fetch_all(&self, sql: &str, params: Vec<SqlValue>) -> Result<Vec<JsonValue>> {
        #[cfg(debug_assertions)]
        {
            log::debug!("MySQL FETCH_ALL: {}", sql);
            log::debug!("  Parameters: {:?}", params);
        }

        let rows = Self::prepare(sql, params)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("MySQL fetch_all failed", e))?;

        rows.iter().map(|row| self.converter.row_to_json(row)).collect()
    }

    async fn fetch_one(&self, sql: &str, params: Vec<SqlValue>) -> Result<Option<JsonValue>> {
        #[cfg(debug_assertions)]
        {
            log::debug!("MySQL FETCH_ONE: {}", sql);
            log::debug!("  Parameters: {:?}", params);
        }

        let row = Self::prepare(sql, params)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("MySQL fetch_one failed", e))?;

        row.map(|row| self.converter.row_to_json(&row)).transpose()
    }

    async fn execute_unprepared(&self, sql: &str) -> Result<()> {
        sqlx::raw_sql(sql)
            .execute(&*self.pool)
            .await
            .map(|_| ())
            .map_err(|e| map_sqlx_error("MySQL unprepared statement failed", e))
    }

    async fn ping(&self) -> Result<bool> {
        sqlx::query("SELECT 1")
            .fetch_one(&*self.pool)
            .await
            .map(|_| true)
            .map_err(|e| map_sqlx_error("MySQL ping failed", e))
    }

    async fn close(&self) {
        self.pool.close().await;
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn clone_box(&self) -> Box<dyn DatabaseAdapter> {
        Box::new(self.clone())
    }
}
