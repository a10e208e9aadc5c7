//! Error types for the IPv6 reconciler
//!
//! This module defines all error types used throughout the crate.

use std::time::Duration;
use thiserror::Error;

/// Result type alias for reconciler operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the reconciler
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Address string that does not parse as an IPv6 address or prefix
    #[error("Invalid IPv6 address '{input}': {reason}")]
    InvalidAddress {
        /// The offending input
        input: String,
        /// Why it was rejected
        reason: String,
    },

    /// An external command ran but returned a non-zero status
    #[error("Command '{command}' failed with exit code {exit_code}: {output}")]
    CommandFailed {
        /// The command line that was executed
        command: String,
        /// Process exit code (-1 when killed by a signal)
        exit_code: i32,
        /// Combined stdout/stderr
        output: String,
    },

    /// An external command could not be started
    #[error("Failed to spawn '{command}': {source}")]
    CommandSpawn {
        /// The command line that was attempted
        command: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// An executor operation exceeded its time bound
    #[error("Operation '{operation}' timed out after {timeout:?}")]
    Timeout {
        /// The operation that hung
        operation: String,
        /// The bound that was exceeded
        timeout: Duration,
    },

    /// Output from the executor backend could not be understood
    #[error("Parse error: {0}")]
    Parse(String),

    /// Executor-specific error
    #[error("Executor error ({backend}): {message}")]
    Executor {
        /// Executor backend name
        backend: String,
        /// Error message
        message: String,
    },

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML deserialization errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an invalid address error
    pub fn invalid_address(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidAddress {
            input: input.into(),
            reason: reason.into(),
        }
    }

    /// Create a parse error
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    /// Create a timeout error
    pub fn timeout(operation: impl Into<String>, timeout: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout,
        }
    }

    /// Create an executor-specific error
    pub fn executor(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Executor {
            backend: backend.into(),
            message: message.into(),
        }
    }

    /// Whether this error is a malformed address rather than an executor failure
    pub fn is_invalid_address(&self) -> bool {
        matches!(self, Self::InvalidAddress { .. })
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
