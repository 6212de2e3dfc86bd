//! Error types for the model client.

use thiserror::Error;

/// A result type using `ModelError`.
pub type Result<T> = std::result::Result<T, ModelError>;

/// Errors that can occur while talking to the language model.
#[derive(Debug, Error)]
pub enum ModelError {
    /// The HTTP request could not be sent or the body could not be read.
    #[error("model request failed: {0}")]
    Request(String),

    /// The model service answered with a non-success status.
    #[error("model service returned {status}: {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Error message from the body, or the status text.
        message: String,
    },

    /// A stream frame could not be decoded.
    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    /// The model emitted an error event mid-stream.
    #[error("model stream error: {0}")]
    Stream(String),

    /// A non-streaming response had an unexpected shape.
    #[error("invalid model response: {0}")]
    InvalidResponse(String),

    /// The client could not be configured.
    #[error("model client configuration error: {0}")]
    Config(String),
}

impl ModelError {
    /// Returns true if retrying the same request may succeed.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        match self {
            Self::Request(_) => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::InvalidFrame(_)
            | Self::Stream(_)
            | Self::InvalidResponse(_)
            | Self::Config(_) => false,
        }
    }
}
