//! Transport abstraction for the room server connection.
//!
//! [`Transport`] is one established, bidirectional text-message channel. The
//! protocol uses JSON text frames, so every implementation handles message
//! framing internally (WebSocket frames, long-polling bodies, in-process
//! channels in tests).
//!
//! [`Connector`] dials a fresh [`Transport`]. The connection manager calls it
//! once for the initial connect and again for every reconnection attempt, so
//! connection parameters (URL, TLS, headers) live in the connector rather than
//! in the manager.
//!
//! # Implementing a Custom Transport
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use auction_sync_client::error::SyncError;
//! use auction_sync_client::transport::{Connector, Transport};
//!
//! struct MyTransport { /* ... */ }
//!
//! #[async_trait]
//! impl Transport for MyTransport {
//!     async fn send(&mut self, message: String) -> Result<(), SyncError> {
//!         todo!()
//!     }
//!
//!     async fn recv(&mut self) -> Option<Result<String, SyncError>> {
//!         // Return None when the connection is closed cleanly
//!         todo!()
//!     }
//!
//!     async fn close(&mut self) -> Result<(), SyncError> {
//!         todo!()
//!     }
//! }
//!
//! struct MyConnector;
//!
//! #[async_trait]
//! impl Connector for MyConnector {
//!     async fn connect(&self) -> Result<Box<dyn Transport>, SyncError> {
//!         Ok(Box::new(MyTransport {}))
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::error::SyncError;

/// A bidirectional text message transport.
///
/// Each call to [`send`](Transport::send) transmits one complete JSON message.
/// Each call to [`recv`](Transport::recv) returns one complete JSON message.
///
/// # Cancel Safety
///
/// The [`recv`](Transport::recv) method **MUST** be cancel-safe because it is used
/// inside `tokio::select!`. If `recv` is cancelled before completion, calling it
/// again must not lose data.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Send a JSON text message to the server.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::TransportSend`] if the message could not be sent.
    async fn send(&mut self, message: String) -> Result<(), SyncError>;

    /// Receive the next JSON text message from the server.
    ///
    /// Returns:
    /// - `Some(Ok(text))` : a complete message was received
    /// - `Some(Err(e))` : a transport error occurred
    /// - `None`: the connection was closed cleanly by the server
    async fn recv(&mut self) -> Option<Result<String, SyncError>>;

    /// Close the transport connection gracefully.
    ///
    /// # Errors
    ///
    /// Returns an error if the graceful shutdown fails. Implementations should
    /// still release resources even if the close handshake fails.
    async fn close(&mut self) -> Result<(), SyncError>;
}

/// Establishes new [`Transport`]s on demand.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Dial the server and complete the transport handshake.
    ///
    /// The caller bounds this with the configured handshake timeout.
    ///
    /// # Errors
    ///
    /// Any error is reported as a `connect_error` and retried by the
    /// reconnection policy.
    async fn connect(&self) -> Result<Box<dyn Transport>, SyncError>;
}
