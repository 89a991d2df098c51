//! SQLite database adapter implementation

use super::map_sqlx_error;
use crate::database::adapter::{DatabaseAdapter, QueryResult};
use crate::database::types::{SqlValue, SqliteTypeConverter};
use crate::error::Result;
use crate::query::DatabaseBackend;
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use sqlx::SqlitePool;
use std::sync::Arc;

/// SQLite database adapter
#[derive(Clone)]
pub struct SqliteAdapter {
    name: String,
    pool: Arc<SqlitePool>,
    converter: SqliteTypeConverter,
}

impl SqliteAdapter {
    /// Create adapter from existing pool
    pub fn from_pool(name: impl Into<String>, pool: SqlitePool) -> Self {
        Self {
            name: name.into(),
            pool: Arc::new(pool),
            converter: SqliteTypeConverter::new(),
        }
    }

    /// Get reference to the underlying pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn prepare<'q>(
        sql: &'q str,
        params: Vec<SqlValue>,
    ) -> sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
        let mut query = sqlx::query(sql);
        for param in params {
            query = SqliteTypeConverter::bind_param(query, param);
        }
        query
    }
}

#[async_trait]
impl DatabaseAdapter for SqliteAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn backend(&self) -> DatabaseBackend {
        DatabaseBackend::SQLite
    }

    async fn execute(&self, sql: &str, params: Vec<SqlValue>) -> Result<QueryResult> {
        #[cfg(debug_assertions)]
        {
            log::debug!("SQLite EXECUTE: {}", sql);
            log::debug!("  Parameters: {:?}", params);
        }

        let result = Self::prepare(sql, params)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("SQLite execute failed", e))?;

        Ok(QueryResult {
            rows_affected: result.rows_affected(),
            last_insert_id: Some(result.last_insert_rowid()),
        })
    }

    async fn fetch_all(&self, sql: &str, params: Vec<SqlValue>) -> Result<Vec<JsonValue>> {
        #[cfg(debug_assertions)]
        {
            log::debug!("SQLite FETCH_ALL: {}", sql);
            log::debug!("  Parameters: {:?}", params);
        }

        let rows = Self::prepare(sql, params)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("SQLite fetch_all failed", e))?;

        rows.iter().map(|row| self.converter.row_to_json(row)).collect()
    }

    async fn fetch_one(&self, sql: &str, params: Vec<SqlValue>) -> Result<Option<JsonValue>> {
        #[cfg(debug_assertions)]
        {
            log::debug!("SQLite FETCH_ONE: {}", sql);
            log::debug!("  Parameters: {:?}", params);
        }

        let row = Self::prepare(sql, params)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("SQLite fetch_one failed", e))?;

        row.map(|row| self.converter.row_to_json(&row)).transpose()
    }

    async fn execute_unprepared(&self, sql: &str) -> Result<()> {
        sqlx::raw_sql(sql)
            .execute(&*self.pool)
            .await
            .map(|_| ())
            .map_err(|e| map_sqlx_error("SQLite unprepared statement failed", e))
    }

    async fn ping(&self) -> Result<bool> {
        sqlx::query("SELECT 1")
            .fetch_one(&*self.pool)
            .await
            .map(|_| true)
            .map_err(|e| map_sqlx_error("SQLite ping failed", e))
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
