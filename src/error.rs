//! Error types for the SQL cache backend.

use std::fmt;

/// Result type for cache operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the SQL cache backend.
///
/// A cache miss is never an error: read operations report absence through
/// `None`, `false`, the `0` sentinel or an omitted map entry.
#[derive(Debug)]
pub enum Error {
    /// Configuration error during backend construction or connection lookup.
    ///
    /// Common causes:
    /// - Neither a named connection nor a connection URL was supplied
    /// - The named connection is not registered
    /// - Invalid table name or pattern separator
    ///
    /// **Recovery:** Fix configuration and restart.
    ConfigError(String),

    /// Storage error raised by the database driver.
    ///
    /// The driver error is kept as-is and exposed through
    /// [`std::error::Error::source`]. This layer never retries or suppresses it.
    Database(sqlx::Error),
}

impl Error {
    /// Whether the error comes from the storage engine rather than configuration.
    pub fn is_storage(&self) -> bool {
        matches!(self, Error::Database(_))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::ConfigError(msg) => write!(f, "Config error: {}", msg),
            Error::Database(e) => write!(f, "Database error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Database(e) => Some(e),
            _ => None,
        }
    }
}

// ============================================================================
// Conversions from other error types
// ============================================================================

impl From<sqlx::Error> for Error {
    fn from(e: sqlx::Error) -> Self {
        Error::Database(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::ConfigError(e.to_string())
    }
}
