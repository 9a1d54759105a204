//! Error types for nodewatch-core.
//!
//! None of these errors is fatal to the engine. They are either returned to
//! the caller of a single operation or reported on the status channel while
//! the last known good dataset stays in place.
//!
//! # Error Recovery Strategies
//!
//! | Error Type | Raised by | Recovery |
//! |------------|-----------|----------|
//! | [`Error::SelectionNotFound`] | [`crate::Engine::select_node`] | Prior selection is kept; ignore or show a hint |
//! | [`Error::Connection`] | Remote source, via the status channel | Show an offline/stale indicator; the dataset is retained |
//! | [`Error::InvalidPayload`] | Remote source, via the status channel | Same as above; the malformed push is dropped |
//! | [`Error::InvalidConfig`] | Source constructors | Fix configuration and restart |
//! | [`Error::Stopped`] | Operations on a disposed engine | Start a new engine |
//!
//! Retry and backoff are the transport's concern. The engine never retries
//! a failed subscription on its own.
//!
//! Timestamps that cannot be parsed are not errors at all: the normalizer
//! degrades to showing the raw text (see [`crate::timestamp`]).

use std::time::Duration;

use thiserror::Error;

use nodewatch_types::{NodeId, ParseError};

/// Errors that can occur in the synchronization engine.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// A node was selected that is not in the current dataset.
    #[error("Node not found in current dataset: {0}")]
    SelectionNotFound(NodeId),

    /// The remote source failed to deliver data.
    #[error("Connection error: {0}")]
    Connection(#[from] TransportError),

    /// The remote source delivered a value that is not a dataset.
    #[error("Invalid payload: {0}")]
    InvalidPayload(#[from] ParseError),

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The engine has been disposed.
    #[error("Engine stopped")]
    Stopped,
}

/// Failures of the transport that carries remote pushes.
///
/// These are reported through the engine's status channel and never clear
/// the dataset.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum TransportError {
    /// HTTP request could not be sent or the connection dropped.
    #[error("HTTP error: {0}")]
    Http(String),

    /// The server answered with a non-success status.
    #[error("Server returned status {status}: {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body or reason phrase.
        message: String,
    },

    /// The event stream carried something unexpected.
    #[error("Stream error: {0}")]
    Stream(String),

    /// The server cancelled the subscription (e.g. permissions changed).
    #[error("Subscription cancelled by server: {0}")]
    Cancelled(String),

    /// The stream ended without an error.
    #[error("Stream closed by server")]
    Closed,

    /// No data arrived within the expected time.
    #[error("No data received for {0:?}")]
    Timeout(Duration),

    /// Local I/O error (file sources).
    #[error("I/O error: {0}")]
    Io(String),
}

impl Error {
    /// Create a selection error for a node id.
    pub fn selection_not_found(id: impl Into<NodeId>) -> Self {
        Self::SelectionNotFound(id.into())
    }

    /// Create a configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    /// Whether this error means the last known data may be stale.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::InvalidPayload(_))
    }
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        TransportError::Io(err.to_string())
    }
}

/// Result type alias using nodewatch-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;
