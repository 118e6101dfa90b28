//! Unified error types for the Courier core.
//!
//! Framework-level errors (like `BuildError`) are defined in courier-framework,
//! runtime errors in courier-runtime.

use thiserror::Error;

// =============================================================================
// Transport Errors
// =============================================================================

/// Errors that can occur while talking to the remote API over the network.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// The HTTP request could not be completed.
    #[error("request to {method} failed: {reason}")]
    Request {
        /// The API method being called.
        method: String,
        /// Reason for failure.
        reason: String,
    },

    /// The server answered with a non-success status that carried no API envelope.
    #[error("HTTP {status} from {method}: {body}")]
    Status {
        /// The API method being called.
        method: String,
        /// HTTP status code.
        status: u16,
        /// Raw response body.
        body: String,
    },

    /// Binding a listener failed.
    #[error("failed to bind {addr}: {reason}")]
    Bind {
        /// The address that could not be bound.
        addr: String,
        /// Reason for failure.
        reason: String,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

// =============================================================================
// API Errors
// =============================================================================

/// Error type for calls into the remote messaging API.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// The bot has no working connection to the API.
    #[error("bot is not connected")]
    NotConnected,
    /// The API call timed out.
    #[error("API call timed out")]
    Timeout,
    /// The API answered `ok: false`.
    #[error("API error ({code}): {description}")]
    Api { code: i64, description: String },
    /// Failed to serialize/deserialize.
    #[error("serialization error: {0}")]
    Serialization(String),
    /// A local file used as upload source could not be read.
    #[error("cannot read upload file {path}: {reason}")]
    File { path: String, reason: String },
    /// Transport error.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// Other error.
    #[error("{0}")]
    Other(String),
}

impl ApiError {
    /// Builds an error from the API envelope's optional code and description.
    pub fn from_envelope(code: Option<i64>, description: Option<String>) -> Self {
        Self::Api {
            code: code.unwrap_or(0),
            description: description.unwrap_or_else(|| "unknown error".to_string()),
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Result type for API calls.
pub type ApiResult<T> = Result<T, ApiError>;
