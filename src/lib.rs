//! rustf-sql - multi-dialect SQL query builder and connection layer for RustF
//!
//! rustf-sql provides:
//! - A fluent query builder compiling to MySQL, PostgreSQL, SQLite and SQL Server
//! - Schema introspection and table DDL through per-dialect schema grammars
//! - sqlx-backed connections with per-driver bootstrap configuration
//! - A named connection manager with pluggable driver resolvers

// Enforce error handling best practices
#![cfg_attr(
    not(test),
    warn(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        clippy::unimplemented,
        clippy::todo,
    )
)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used,))]

pub mod database;
pub mod error;
pub mod query;
pub mod schema;

// Re-export main types for public API
pub use database::{Connection, ConnectionConfig, DatabaseManager, DatabasesConfig, SqlValue};
pub use error::{Error, ErrorContext, Result};
pub use query::{raw, DatabaseBackend, Expression, Grammar, QueryBuilder, QueryError};
pub use schema::{Blueprint, SchemaBuilder, SchemaGrammar};

// Re-export commonly used external types
pub use serde_json::{json, Value};

/// Prelude module for common imports
pub mod prelude {
    pub use crate::database::{
        register_resolver, Connection, ConnectionConfig, DatabaseAdapter, DatabaseManager,
        DatabasesConfig, QueryResult, SqlValue,
    };
    pub use crate::error::{Error, ErrorContext, Result};
    pub use crate::query::{
        grammar_for, raw, row, Column, DatabaseBackend, Direction, Expression, Grammar,
        QueryBuilder, QueryValue, Row, Truthy,
    };
    pub use crate::schema::{Blueprint, SchemaBuilder, TypeDefinition};
    pub use serde_json::json;
}
