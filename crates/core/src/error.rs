//! Error types for the interaction cache.

use thiserror::Error;

/// Result type alias using the cache's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the interaction cache.
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Fatal Errors
    // =========================================================================
    #[error("Could not establish connection to cache after {attempts} attempts: {reason}")]
    Connection { attempts: u32, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Runtime error: {0}")]
    Runtime(String),

    // =========================================================================
    // Recovered Errors (logged, never returned by the orchestrator)
    // =========================================================================
    #[error("Store operation {op} failed on {key}: {reason}")]
    StoreOperation {
        op: &'static str,
        key: String,
        reason: String,
    },

    #[error("Cache query timed out after {0}ms")]
    QueryTimeout(u64),

    #[error("Cache write timed out after {0}ms")]
    WriteTimeout(u64),
}

impl Error {
    /// Create a connection error.
    pub fn connection(attempts: u32, reason: impl Into<String>) -> Self {
        Self::Connection {
            attempts,
            reason: reason.into(),
        }
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a store operation error.
    pub fn store_operation(op: &'static str, key: impl Into<String>, reason: impl ToString) -> Self {
        Self::StoreOperation {
            op,
            key: key.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether this error must fail the whole call.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. } | Self::Config(_) | Self::Runtime(_)
        )
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}
