//! Error types for kgraph

use thiserror::Error;

/// Result type alias using kgraph's Error
pub type Result<T> = std::result::Result<T, Error>;

/// kgraph error types with helpful messages and suggestions
#[derive(Error, Debug)]
pub enum Error {
    // Validation errors (E001-E099)
    #[error("Invalid item: {0}")]
    Validation(String),

    #[error("Node '{0}' not found. Run `kgraph stats` to check what is loaded.")]
    NodeNotFound(String),

    // Capacity errors (E100-E199)
    #[error("Connection pool exhausted ({0}). Retry, or raise storage.max_connections.")]
    CapacityExhausted(String),

    #[error("Operation '{0}' exceeded its deadline and no cached result was available")]
    Timeout(String),

    // Store errors (E400-E499)
    #[error("Durable store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Database error: {0}")]
    Database(sqlx::Error),

    // Config errors (E600-E699)
    #[error("Configuration error: {0}")]
    Config(String),

    // Serialization errors (E800-E899)
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic errors
    #[error("{0}")]
    Other(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut => Self::CapacityExhausted(err.to_string()),
            sqlx::Error::PoolClosed | sqlx::Error::WorkerCrashed => {
                Self::StoreUnavailable(err.to_string())
            }
            sqlx::Error::Io(io) => Self::StoreUnavailable(io.to_string()),
            other => Self::Database(other),
        }
    }
}

impl Error {
    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "E001",
            Self::NodeNotFound(_) => "E002",
            Self::CapacityExhausted(_) => "E100",
            Self::Timeout(_) => "E101",
            Self::StoreUnavailable(_) => "E400",
            Self::Database(_) => "E401",
            Self::Config(_) => "E600",
            Self::Serialization(_) => "E800",
            Self::Other(_) | Self::Io(_) => "E9999",
        }
    }

    /// Whether the caller may retry the same operation unchanged
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::CapacityExhausted(_) | Self::Timeout(_) | Self::StoreUnavailable(_)
        )
    }

    /// Whether the durable store could not be reached at all
    pub fn is_store_unavailable(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_))
    }

    /// Get suggestion for how to fix this error
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Self::NodeNotFound(_) => Some("kgraph stats".to_string()),
            Self::CapacityExhausted(_) => {
                Some("kgraph config set storage.max_connections <n>".to_string())
            }
            Self::StoreUnavailable(_) => Some("kgraph doctor".to_string()),
            Self::Config(_) => Some("kgraph config list".to_string()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_timeout_maps_to_capacity() {
        let err: Error = sqlx::Error::PoolTimedOut.into();
        assert!(matches!(err, Error::CapacityExhausted(_)));
        assert!(err.is_retryable());
        assert_eq!(err.code(), "E100");
    }

    #[test]
    fn test_closed_pool_maps_to_unavailable() {
        let err: Error = sqlx::Error::PoolClosed.into();
        assert!(err.is_store_unavailable());
        assert!(err.is_retryable());
    }

    #[test]
    fn test_row_not_found_is_database_error() {
        let err: Error = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, Error::Database(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_suggestions() {
        assert_eq!(
            Error::NodeNotFound("x".into()).suggestion(),
            Some("kgraph stats".to_string())
        );
        assert!(Error::Validation("bad".into()).suggestion().is_none());
    }
}
