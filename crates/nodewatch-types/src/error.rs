//! Error types for payload decoding in nodewatch-types.

use thiserror::Error;

/// Errors that can occur when decoding a dataset pushed by a remote source.
///
/// This error type is transport-agnostic and does not include connection
/// errors (those belong in nodewatch-core).
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// The top-level value is neither an object, an array, nor null.
    #[error("Unexpected dataset shape: expected object, array or null, got {0}")]
    UnexpectedShape(&'static str),

    /// The payload is not valid JSON.
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias using nodewatch-types' ParseError type.
pub type ParseResult<T> = std::result::Result<T, ParseError>;
