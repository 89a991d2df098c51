//! Query construction and SQL compilation
//!
//! The [`QueryBuilder`] accumulates a [`Registry`] of clauses and bindings;
//! a [`Grammar`] compiles the registry into dialect-specific SQL with `?`
//! placeholders whose order matches [`QueryBuilder::get_bindings`].

use std::fmt;

pub mod builder;
pub mod condition;
pub mod expression;
pub mod grammar;
pub mod registry;

pub use builder::{BeforeQuery, QueryBuilder};
pub use condition::Truthy;
pub use expression::{raw, Column, Expression, Literal, QueryValue};
pub use grammar::{
    grammar_for, Grammar, MySqlGrammar, PostgresGrammar, SQLiteGrammar, SqlServerGrammar,
};
pub use registry::{
    row, BindingKind, Bindings, Boolean, Direction, FulltextOptions, JoinClause, Lock,
    Registry, Row, Section, UpsertUpdate, WhereClause, WhereKind,
};

/// Database backend types supported by rustf-sql
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatabaseBackend {
    Postgres,
    MySQL,
    MariaDB,
    SQLite,
    SqlServer,
}

impl DatabaseBackend {
    /// Resolve a configuration driver name
    pub fn from_driver(driver: &str) -> Option<Self> {
        match driver.to_ascii_lowercase().as_str() {
            "mysql" => Some(Self::MySQL),
            "mariadb" => Some(Self::MariaDB),
            "pgsql" | "postgres" | "postgresql" => Some(Self::Postgres),
            "sqlite" => Some(Self::SQLite),
            "sqlsrv" | "sqlserver" | "mssql" => Some(Self::SqlServer),
            _ => None,
        }
    }

    /// Canonical driver name
    pub fn driver(&self) -> &'static str {
        match self {
            Self::Postgres => "pgsql",
            Self::MySQL => "mysql",
            Self::MariaDB => "mariadb",
            Self::SQLite => "sqlite",
            Self::SqlServer => "sqlsrv",
        }
    }
}

impl fmt::Display for DatabaseBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Postgres => "PostgreSQL",
            Self::MySQL => "MySQL",
            Self::MariaDB => "MariaDB",
            Self::SQLite => "SQLite",
            Self::SqlServer => "SQL Server",
        };
        f.write_str(name)
    }
}

/// Errors raised while compiling a registry to SQL
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum QueryError {
    #[error("Missing required clause: {clause}. Add .{clause}() to your query.")]
    MissingClause { clause: String },

    #[error("This database engine ({backend}) does not support {feature}.")]
    UnsupportedFeature {
        backend: DatabaseBackend,
        feature: String,
    },

    #[error("Invalid syntax for {backend}: {message}")]
    InvalidSyntax {
        backend: DatabaseBackend,
        message: String,
    },

    #[error("{0}")]
    InvalidArgument(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_driver_names() {
        assert_eq!(DatabaseBackend::from_driver("pgsql"), Some(DatabaseBackend::Postgres));
        assert_eq!(DatabaseBackend::from_driver("SQLSRV"), Some(DatabaseBackend::SqlServer));
        assert_eq!(DatabaseBackend::from_driver("oracle"), None);
        assert_eq!(DatabaseBackend::MariaDB.driver(), "mariadb");
    }

    #[test]
    fn test_unsupported_feature_message() {
        let err = QueryError::UnsupportedFeature {
            backend: DatabaseBackend::SQLite,
            feature: "fulltext search operations".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "This database engine (SQLite) does not support fulltext search operations."
        );
    }
}
