//! Database adapter implementations for different database backends

pub mod mysql;
pub mod postgres;
pub mod sqlite;

pub use mysql::MySqlAdapter;
pub use postgres::PostgresAdapter;
pub use sqlite::SqliteAdapter;

use crate::error::Error;

/// Map a sqlx failure onto the crate error, keeping the SQLSTATE in the message
pub(crate) fn map_sqlx_error(context: &str, err: sqlx::Error) -> Error {
    match &err {
        sqlx::Error::Database(db) => {
            let message = match db.code() {
                Some(code) => format!("{}: SQLSTATE[{}]: {}", context, code, db.message()),
                None => format!("{}: {}", context, db.message()),
            };
            Error::database_query(message)
        }
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
            Error::database_pool(format!("{}: {}", context, err))
        }
        sqlx::Error::Io(_) | sqlx::Error::Tls(_) | sqlx::Error::Protocol(_) => {
            Error::database_connection(format!("{}: {}", context, err))
        }
        _ => Error::database_query(format!("{}: {}", context, err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_errors_are_pool_errors() {
        let err = map_sqlx_error("SQLite fetch_all failed", sqlx::Error::PoolTimedOut);
        assert_eq!(err.error_code(), "DB_POOL_ERROR");
    }

    #[test]
    fn test_io_errors_are_lost_connections() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "Connection reset by peer");
        let err = map_sqlx_error("MySQL execute failed", sqlx::Error::Io(io));

        assert_eq!(err.error_code(), "DB_CONNECTION_ERROR");
        assert!(err.is_lost_connection());
    }
}
