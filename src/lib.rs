//! # Auction Sync Client
//!
//! Realtime room synchronization for auction leagues: one shared connection,
//! many room subscriptions, and state that heals itself after drops.
//!
//! The crate keeps a client's view of shared rooms (a league lobby, a live
//! auction) consistent with the server across unreliable networks. One
//! [`ConnectionManager`] owns the single physical connection; each UI consumer
//! opens a [`RoomSession`] on a [`RoomKey`] and reads its derived view.
//!
//! ## Features
//!
//! - **Automatic recovery**: linear capped backoff, and every registered room
//!   is rejoined after a reconnect, exactly once
//! - **Readiness**: per-session `ready` flag plus a one-shot [`ReadySignal`]
//! - **Idempotent membership**: `member_joined` upserts, `sync_members` replaces
//! - **Polling safety net**: periodic authoritative refresh through a
//!   [`LeagueStateSource`] while a league session is open
//! - **Transport-agnostic**: implement [`Transport`] and [`Connector`] for any
//!   backend; the default `transport-websocket` feature provides one
//! - **Host hooks**: [`Notifier`] for user-visible notices and
//!   [`SessionMetricsReporter`] for diagnostic gauges
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use auction_sync_client::{
//!     ConnectionManager, RoomKey, RoomSession, SyncConfig, UserIdentity, WebSocketConnector,
//! };
//!
//! let manager = ConnectionManager::new(
//!     WebSocketConnector::new("wss://auction.example.com/ws"),
//!     SyncConfig::default(),
//! );
//! manager.set_current_user(UserIdentity::new("u1", "Ann", "ann@example.com"));
//!
//! let lobby = RoomSession::open(&manager, RoomKey::league("L1"));
//! lobby.wait_ready().await?;
//! println!("{} members", lobby.members().len());
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod event;
pub mod identity;
pub mod members;
pub mod metrics;
pub mod notice;
pub mod poller;
pub mod protocol;
pub mod readiness;
pub mod registry;
#[cfg(feature = "rest-client")]
pub mod rest;
pub mod room;
pub mod session;
pub mod transport;
pub mod transports;

// Re-export primary types for ergonomic imports.
pub use config::{ReconnectPolicy, SyncConfig};
pub use connection::{Connection, ConnectionManager};
pub use error::{Result, SyncError};
pub use event::{ConnectionEvent, ConnectionState};
pub use identity::{IdentityProvider, UserIdentity};
pub use members::MemberList;
pub use metrics::{SessionMetricsHook, SessionMetricsReporter, TracingMetrics};
pub use notice::{Notice, NoticeDuration, NoticeId, NoticeKind, Notifier, TracingNotifier};
pub use poller::{LeagueStateSource, PolledState};
pub use protocol::{AuctionState, ClientMessage, LeagueStatus, Member, ServerMessage};
pub use readiness::{Readiness, ReadinessTrigger, ReadySignal};
pub use registry::RegistryEntry;
#[cfg(feature = "rest-client")]
pub use rest::HttpLeagueSource;
pub use room::{RoomKey, RoomType};
pub use session::{RoomSession, SessionOptions, SessionSnapshot};
pub use transport::{Connector, Transport};

#[cfg(feature = "transport-websocket")]
pub use transports::{WebSocketConnector, WebSocketTransport};
