//! Connections, drivers and configuration
//!
//! Adapters wrap a sqlx pool per backend, connectors build those pools from a
//! [`ConnectionConfig`], and the [`DatabaseManager`] keeps named connections
//! open for the query and schema builders.

pub mod adapter;
pub mod adapters;
pub mod config;
pub mod connection;
pub mod connectors;
pub mod manager;
pub mod resolver;
pub mod types;

// Re-export main types for convenience
pub use adapter::{DatabaseAdapter, QueryResult};
pub use adapters::{MySqlAdapter, PostgresAdapter, SqliteAdapter};
pub use config::{ConnectionConfig, DatabasesConfig, SearchPath};
pub use connection::{query_grammar_for, Connection};
pub use connectors::{connector_for, ConnectAttributes, Connector, PgSsl, PoolOptions};
pub use manager::DatabaseManager;
pub use resolver::{register_resolver, resolver_for, unregister_resolver};
pub use types::SqlValue;
