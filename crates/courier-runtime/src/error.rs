//! Runtime error types.

use thiserror::Error;

use courier_core::{ApiError, TransportError};
use courier_framework::BuildError;

use crate::config::ConfigError;

/// Errors that stop the runtime before or while it starts.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The `getMe` check failed; the token is invalid or the API unreachable.
    #[error("Bot identity check failed: {0}")]
    Identity(#[source] ApiError),

    #[error("Dispatcher build failed: {0}")]
    Build(#[from] BuildError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// A platform call other than the identity check failed during startup.
    #[error("API error: {0}")]
    Api(#[from] ApiError),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
