//! Error types for the host interface layer.

use thiserror::Error;

/// Result type alias for host interface operations.
pub type Result<T> = std::result::Result<T, VimError>;

/// Errors raised while talking to the ESXi host API.
#[derive(Debug, Error)]
pub enum VimError {
    /// Login was rejected or no session cookie was issued.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Transport-level HTTP failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The host answered a method call with a SOAP fault.
    #[error("{method} failed: {message}")]
    Fault {
        /// The vim method that faulted
        method: String,
        /// The host's fault message
        message: String,
    },

    /// A response did not contain the element we expected.
    #[error("unexpected response to {method}: {detail}")]
    Parse {
        /// The vim method whose response could not be read
        method: String,
        /// What was missing or malformed
        detail: String,
    },
}

impl VimError {
    pub(crate) fn parse(method: &str, detail: impl Into<String>) -> Self {
        VimError::Parse {
            method: method.to_string(),
            detail: detail.into(),
        }
    }
}
