//! Events fanned out from the connection manager to room sessions.

use crate::protocol::ServerMessage;

/// State of the one physical connection. Owned by the connection manager and
/// changed only by transport lifecycle events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// Everything a session can observe on the shared connection.
///
/// Lifecycle variants are synthesized locally; [`Server`](Self::Server)
/// carries decoded server pushes in transport order.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    /// The transport is connected (first connect or any reconnect).
    ///
    /// `replayed` is true when the manager already re-sent joins for every
    /// registered room (a current user is set). Sessions still check in after
    /// every connect; rooms already joined on the link are not joined twice.
    Connected { replayed: bool },
    /// The transport dropped or was closed.
    Disconnected {
        reason: Option<String>,
        user_initiated: bool,
    },
    /// A dial or handshake failed.
    ConnectError { message: String },
    /// About to retry; `attempt` is 1-based.
    ReconnectAttempt { attempt: u32 },
    /// A retry succeeded after `attempts` tries.
    Reconnected { attempts: u32 },
    /// Every permitted retry failed. No further attempts are made.
    ReconnectFailed,
    /// A decoded server message.
    Server(ServerMessage),
}

impl From<ServerMessage> for ConnectionEvent {
    fn from(msg: ServerMessage) -> Self {
        Self::Server(msg)
    }
}
