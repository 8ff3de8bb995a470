//! Transport implementations for the room server connection.
//!
//! Concrete [`Transport`](crate::Transport) and [`Connector`](crate::Connector)
//! implementations live behind feature gates:
//!
//! | Feature                | Transport              | Connector              |
//! |------------------------|------------------------|------------------------|
//! | `transport-websocket`  | [`WebSocketTransport`] | [`WebSocketConnector`] |
//!
//! # Example
//!
//! ```rust,ignore
//! use auction_sync_client::{ConnectionManager, SyncConfig, WebSocketConnector};
//!
//! let connector = WebSocketConnector::new("wss://auction.example.com/ws");
//! let manager = ConnectionManager::new(connector, SyncConfig::default());
//! let _connection = manager.connection();
//! ```

#[cfg(feature = "transport-websocket")]
pub mod websocket;

#[cfg(feature = "transport-websocket")]
pub use websocket::{WebSocketConnector, WebSocketTransport};
