//! Transport types

use thiserror::Error;

/// Errors raised while retrieving tile bytes.
///
/// `Clone` so a single failed load can be handed to every waiter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The HTTP client could not be constructed
    #[error("Failed to create HTTP client: {0}")]
    Client(String),

    /// The request could not be sent or the connection failed
    #[error("Request to {url} failed: {message}")]
    Request { url: String, message: String },

    /// The request did not complete in time
    #[error("Request to {url} timed out")]
    Timeout { url: String },

    /// The server answered with a non-success status
    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    /// The response body could not be read
    #[error("Failed to read response from {url}: {message}")]
    Body { url: String, message: String },

    /// A header from the layer's network options is not a valid HTTP header
    #[error("Invalid header '{name}': {message}")]
    InvalidHeader { name: String, message: String },
}

impl TransportError {
    /// Returns true for failures where a later attempt may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            TransportError::Timeout { .. } | TransportError::Request { .. } => true,
            TransportError::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}
