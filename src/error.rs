//! Error types for shardgraph operations.
//!
//! All fallible operations return [`Result<T>`]. Error kinds are distinct so
//! callers can apply different retry policy per kind: validation failures are
//! synchronous and precede any I/O, storage failures flow through the stream
//! error channel, and read-timeout failures signal the SLA breaker tripped
//! after zero or more results were already delivered.

use thiserror::Error;

/// Result type alias for shardgraph operations.
pub type Result<T> = std::result::Result<T, GraphError>;

/// Comprehensive error type for all graph operations.
#[derive(Error, Debug)]
pub enum GraphError {
    /// A required edge or node field failed validation before any I/O.
    #[error("Validation failed for '{field}': {message}")]
    Validation {
        /// Field that failed validation
        field: &'static str,
        /// Description of what was wrong
        message: String,
    },

    /// Storage backend error (RocksDB, file I/O, etc.)
    #[error("Storage error: {message}")]
    Storage {
        /// Detailed error message
        message: String,
        /// Optional source error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Serialization/deserialization error
    #[error("Serialization error: {message}")]
    Serialization {
        /// Error details
        message: String,
        /// Optional source error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A read stream exceeded the configured SLA and was aborted.
    ///
    /// Results delivered before this error are valid; more may exist and can
    /// be fetched by resuming from the last delivered cursor.
    #[error("Read aborted after {elapsed_ms}ms (timeout {timeout_ms}ms)")]
    ReadTimeout {
        /// Time the stream had been running when the breaker tripped
        elapsed_ms: u64,
        /// Configured read SLA
        timeout_ms: u64,
    },

    /// Invalid operation (e.g., physically deleting an unmarked edge)
    #[error("Invalid operation: {message}")]
    InvalidOperation {
        /// Description of what went wrong
        message: String,
    },
}

impl GraphError {
    /// Create a validation error for a named field.
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }

    /// Create a storage error from a message and optional source.
    pub fn storage<E>(message: impl Into<String>, source: Option<E>) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Storage {
            message: message.into(),
            source: source.map(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>),
        }
    }

    /// Create a serialization error from a message and optional source.
    pub fn serialization<E>(message: impl Into<String>, source: Option<E>) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Serialization {
            message: message.into(),
            source: source.map(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>),
        }
    }

    /// Create an invalid-operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// True if this error came from the read-SLA breaker rather than storage.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::ReadTimeout { .. })
    }
}
