//! PostgreSQL database adapter implementation
//!
//! Compiled SQL uses `?` placeholders; they are renumbered to `$1..$n` here.

use super::map_sqlx_error;
use crate::database::adapter::{DatabaseAdapter, QueryResult};
use crate::database::types::{SqlValue, PostgresTypeConverter};
use crate::error::Result;
use crate::query::grammar::raw::number_placeholders;
use crate::query::DatabaseBackend;
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use sqlx::PgPool;
use std::sync::Arc;

/// PostgreSQL database adapter
#[derive(Clone)]
pub struct PostgresAdapter {
    name: String,
    pool: Arc<PgPool>,
    converter: PostgresTypeConverter,
}

impl PostgresAdapter {
    /// Create adapter from existing pool
    pub fn from_pool(name: impl Into<String>, pool: PgPool) -> Self {
        Self {
            name: name.into(),
            pool: Arc::new(pool),
            converter: PostgresTypeConverter::new(),
        }
    }

    /// Get reference to the underlying pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn prepare<'q>(
        sql: &'q str,
        params: Vec<SqlValue>,
    ) -> sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments> {
        let mut query = sqlx::query(sql);
        for param in params {
            query = PostgresTypeConverter::bind_param(query, param);
        }
        query
    }
}

#[async_trait]
impl DatabaseAdapter for PostgresAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn backend(&self) -> DatabaseBackend {
        DatabaseBackend::Postgres
    }

    async fn execute(&self, sql: &str, params: Vec<SqlValue>) -> Result<QueryResult> {
        #[cfg(debug_assertions)]
        {
            log::debug!("PostgreSQL EXECUTE: {}", sql);
            log::debug!("  Parameters: {:?}", params);
        }

        let sql = number_placeholders(sql);
        let result = Self::prepare(&sql, params)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("PostgreSQL execute failed", e))?;

        Ok(QueryResult {
            rows_affected: result.rows_affected(),
            last_insert_id: None,
        })
    }

    async fn fetch_all(&self, sql: &str, params: Vec<SqlValue>) -> Result<Vec<JsonValue>> {
        #[cfg(debug_assertions)]
        {
            log::debug!("PostgreSQL FETCH_ALL: {}", sql);
            log::debug!("  Parameters: {:?}", params);
        }

        let sql = number_placeholders(sql);
        let rows = Self::prepare(&sql, params)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("PostgreSQL fetch_all failed", e))?;

        rows.iter().map(|row| self.converter.row_to_json(row)).collect()
    }

    async fn fetch_one(&self, sql: &str, params: Vec<SqlValue>) -> Result<Option<JsonValue>> {
        #[cfg(debug_assertions)]
        {
            log::debug!("PostgreSQL FETCH_ONE: {}", sql);
            log::debug!("  Parameters: {:?}", params);
        }

        let sql = number_placeholders(sql);
        let row = Self::prepare(&sql, params)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("PostgreSQL fetch_one failed", e))?;

        row.map(|row| self.converter.row_to_json(&row)).transpose()
    }

    async fn execute_unprepared(&self, sql: &str) -> Result<()> {
        sqlx::raw_sql(sql)
            .execute(&*self.pool)
            .await
            .map(|_| ())
            .map_err(|e| map_sqlx_error("PostgreSQL unprepared statement failed", e))
    }

    async fn ping(&self) -> Result<bool> {
        sqlx::query("SELECT 1")
            .fetch_one(&*self.pool)
            .await
            .map(|_| true)
            .map_err(|e| map_sqlx_error("PostgreSQL ping failed", e))
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
