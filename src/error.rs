//! Error types for the room synchronization client.

use thiserror::Error;

/// Errors that can occur when using the room synchronization client.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Failed to send a message through the transport.
    #[error("transport send error: {0}")]
    TransportSend(String),

    /// Failed to receive a message from the transport.
    #[error("transport receive error: {0}")]
    TransportReceive(String),

    /// The transport connection was closed unexpectedly.
    #[error("transport connection closed")]
    TransportClosed,

    /// Failed to serialize or deserialize a protocol message.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The connection manager was shut down and no longer accepts messages.
    #[error("not connected to server")]
    NotConnected,

    /// The transport handshake did not complete within the configured timeout.
    #[error("handshake timed out")]
    HandshakeTimeout,

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A REST request for authoritative state failed.
    #[cfg(feature = "rest-client")]
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The REST base URL cannot be extended with a request path.
    #[cfg(feature = "rest-client")]
    #[error("invalid url: {0}")]
    InvalidUrl(String),
}

/// A specialized [`Result`] type for room synchronization operations.
pub type Result<T> = std::result::Result<T, SyncError>;
