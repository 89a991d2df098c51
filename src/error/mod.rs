use thiserror::Error;

pub mod classify;

pub use crate::query::QueryError;

pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for rustf-sql
#[derive(Error, Debug)]
pub enum Error {
    #[error("{0}")]
    InvalidArgument(String),

    #[error("{0}")]
    Configuration(String),

    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),

    // Database-specific errors
    #[error("Database connection error: {0}")]
    DatabaseConnection(String),

    #[error("Database query error: {0}")]
    DatabaseQuery(String),

    #[error("Database pool error: {0}")]
    DatabasePool(String),

    // Error with context chain
    #[error("{message}")]
    WithContext {
        message: String,
        #[source]
        source: Box<Error>,
    },
}

#[cfg(feature = "config")]
impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Self::Configuration(format!("Invalid database configuration: {}", err))
    }
}

impl Error {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    // Database error constructors
    pub fn database_connection(msg: impl Into<String>) -> Self {
        Self::DatabaseConnection(msg.into())
    }

    pub fn database_query(msg: impl Into<String>) -> Self {
        Self::DatabaseQuery(msg.into())
    }

    pub fn database_pool(msg: impl Into<String>) -> Self {
        Self::DatabasePool(msg.into())
    }

    // Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::WithContext {
            message: context.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error, skipping context wrappers
    pub fn root(&self) -> &Error {
        match self {
            Self::WithContext { source, .. } => source.root(),
            other => other,
        }
    }

    /// Whether the driver message matches a known lost-connection phrase
    pub fn is_lost_connection(&self) -> bool {
        match self.root() {
            Self::DatabaseConnection(msg) | Self::DatabaseQuery(msg) | Self::DatabasePool(msg) => {
                classify::caused_by_lost_connection(msg)
            }
            _ => false,
        }
    }

    /// Whether the driver message matches a known deadlock or lock-timeout phrase
    pub fn is_concurrency_error(&self) -> bool {
        match self.root() {
            Self::DatabaseQuery(msg) => classify::caused_by_concurrency_error(msg),
            _ => false,
        }
    }

    /// Get error code for logging and monitoring
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "INVALID_ARGUMENT",
            Self::Configuration(_) => "CONFIGURATION_ERROR",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Query(_) => "QUERY_COMPILE_ERROR",
            Self::Json(_) => "JSON_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
            Self::DatabaseConnection(_) => "DB_CONNECTION_ERROR",
            Self::DatabaseQuery(_) => "DB_QUERY_ERROR",
            Self::DatabasePool(_) => "DB_POOL_ERROR",
            Self::WithContext { source, .. } => source.error_code(),
        }
    }
}

/// Extension trait to attach context to fallible results
pub trait ErrorContext<T> {
    fn context(self, context: impl Into<String>) -> Result<T>;

    fn with_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: Into<Error>,
{
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().with_context(context))
    }

    fn with_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.map_err(|e| e.into().with_context(f()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_wraps_and_keeps_code() {
        let err: Result<()> = Err(Error::configuration("Unsupported driver [oracle]."));
        let err = err.context("Creating connection [main]").unwrap_err();

        assert_eq!(err.to_string(), "Creating connection [main]");
        assert_eq!(err.error_code(), "CONFIGURATION_ERROR");
        assert!(matches!(err.root(), Error::Configuration(_)));
    }

    #[test]
    fn test_lost_connection_detection() {
        let err = Error::database_query("SQLSTATE[HY000]: server has gone away");
        assert!(err.is_lost_connection());
        assert!(!err.is_concurrency_error());

        let err = Error::database_query("Deadlock found when trying to get lock");
        assert!(err.is_concurrency_error());
    }
}
