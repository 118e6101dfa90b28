//! Framework error types.

use thiserror::Error;

/// Errors detected while assembling a [`Dispatcher`](crate::Dispatcher).
///
/// All of these are configuration errors: a bot with an invalid registration
/// must not start.
#[derive(Debug, Error)]
pub enum BuildError {
    /// A pattern did not compile.
    #[error("invalid pattern `{pattern}`: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// An alternation was registered with no patterns.
    #[error("empty pattern list")]
    NoPatterns,

    /// A chain was closed without any stage.
    #[error("chain {name} has no stages")]
    EmptyChain { name: String },
}

impl BuildError {
    pub(crate) fn invalid_pattern(pattern: impl Into<String>, source: regex::Error) -> Self {
        Self::InvalidPattern {
            pattern: pattern.into(),
            source,
        }
    }
}

/// Result type for dispatcher assembly.
pub type BuildResult<T> = Result<T, BuildError>;
