//! The one shared connection and its reconnection loop.
//!
//! [`ConnectionManager`] owns a background task that owns the transport. The
//! task dials through a [`Connector`], multiplexes outgoing messages and
//! incoming frames with `tokio::select!`, and on a drop retries according to
//! the [`ReconnectPolicy`](crate::config::ReconnectPolicy). After every
//! successful connect it replays the joins of every room in the
//! [`RoomRegistry`] (when a user is set) before anything else is sent.
//!
//! Sessions never talk to the transport. They queue messages with
//! [`Connection::emit`] (fire-and-forget) and observe a broadcast of
//! [`ConnectionEvent`]s.
//!
//! # Example
//!
//! ```rust,ignore
//! let manager = ConnectionManager::new(WebSocketConnector::new(url), SyncConfig::default());
//! manager.set_current_user(user);
//!
//! let session = RoomSession::open(&manager, RoomKey::league("L1"));
//! session.wait_ready().await?;
//! ```

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::event::{ConnectionEvent, ConnectionState};
use crate::identity::UserIdentity;
use crate::metrics::{ActiveSessions, SessionMetricsHook, TracingMetrics};
use crate::notice::{Notice, NoticeBoard, Notifier, TracingNotifier};
use crate::protocol::{ClientMessage, ServerMessage};
use crate::registry::{RegistryEntry, RoomRegistry};
use crate::room::RoomKey;
use crate::transport::{Connector, Transport};

// ── Shared state ────────────────────────────────────────────────────

/// Everything that must change atomically with respect to session attach
/// and detach: connection state, room interest, and the replay identity.
#[derive(Debug, Default)]
struct Link {
    state: ConnectionState,
    registry: RoomRegistry,
    user: Option<UserIdentity>,
    /// Rooms already joined on the current link.
    joined: HashSet<RoomKey>,
    /// Set by logout paths; the next disconnect stays silent.
    user_initiated: bool,
}

/// State shared by the manager, its connection handles, and the task.
struct Shared {
    link: Mutex<Link>,
    cmd_tx: mpsc::UnboundedSender<ClientMessage>,
    events: broadcast::Sender<ConnectionEvent>,
    notices: NoticeBoard,
    sessions: ActiveSessions,
    config: SyncConfig,
}

impl Shared {
    fn link(&self) -> MutexGuard<'_, Link> {
        self.link.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn broadcast(&self, event: ConnectionEvent) {
        // No receivers is fine: nobody is mounted.
        let _ = self.events.send(event);
    }

    /// Queue `msg` if the transport is connected; otherwise drop it.
    fn queue(&self, link: &Link, msg: ClientMessage) -> Result<()> {
        if link.state != ConnectionState::Connected {
            debug!(event = msg.event_name(), "not connected, dropping outbound message");
            return Ok(());
        }
        self.cmd_tx.send(msg).map_err(|_| SyncError::NotConnected)
    }
}

// ── Connection handle ───────────────────────────────────────────────

/// Cheap, cloneable handle to the shared connection.
///
/// Obtained from [`ConnectionManager::connection`]; every call returns a
/// handle to the same underlying connection.
#[derive(Clone)]
pub struct Connection {
    shared: Arc<Shared>,
}

impl Connection {
    /// Queue a message for the server.
    ///
    /// Fire-and-forget: returns once queued. While disconnected the message is
    /// dropped and `Ok(())` returned; rooms are rejoined by replay instead.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NotConnected`] if the connection task has exited.
    pub fn emit(&self, msg: ClientMessage) -> Result<()> {
        let link = self.shared.link();
        self.shared.queue(&link, msg)
    }

    /// Register a listener for connection events.
    ///
    /// Dropping the receiver deregisters it.
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.shared.events.subscribe()
    }

    /// Point-in-time transport state.
    pub fn state(&self) -> ConnectionState {
        self.shared.link().state
    }

    /// Whether the transport is connected right now.
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub(crate) fn config(&self) -> &SyncConfig {
        &self.shared.config
    }

    pub(crate) fn sessions(&self) -> &ActiveSessions {
        &self.shared.sessions
    }

    /// Register interest in `room` and start listening.
    ///
    /// Registration, subscription and the immediate join (when connected)
    /// happen under the link lock, so they are ordered consistently with
    /// reconnect replay.
    pub(crate) fn attach(&self, room: &RoomKey) -> Attachment {
        let mut link = self.shared.link();
        let references = link.registry.acquire(room);
        let events = self.shared.events.subscribe();
        let connected = link.state == ConnectionState::Connected;
        if connected {
            // Always join: a second session on the room needs its own
            // acknowledgement to become ready.
            self.queue_subscribe(&mut link, room);
        }
        debug!(room = %room, references, connected, "room attached");
        Attachment {
            events,
            connected,
            generation: link.registry.generation(),
        }
    }

    /// Make sure `room` is registered and joined on the current link.
    ///
    /// Called by every session after a connect. The join is skipped when
    /// replay (or another session) already sent it on this link. A reference
    /// voided by [`ConnectionManager::clear_current_user`] is taken again.
    /// Returns the generation the caller's reference now belongs to.
    pub(crate) fn resubscribe(&self, room: &RoomKey, generation: u64) -> u64 {
        let mut link = self.shared.link();
        if link.registry.generation() != generation {
            let references = link.registry.acquire(room);
            debug!(room = %room, references, "room registered again");
        }
        if !link.joined.contains(room) {
            debug!(room = %room, "rejoining room not replayed on this link");
            self.queue_subscribe(&mut link, room);
        }
        link.registry.generation()
    }

    /// Release interest in `room`, leaving it with the last reference.
    /// A reference from before the last registry clear is not released.
    /// Inert while disconnected.
    pub(crate) fn detach(&self, room: &RoomKey, generation: u64) {
        let mut link = self.shared.link();
        if link.registry.generation() != generation {
            debug!(room = %room, "reference voided by clear; nothing to release");
            return;
        }
        let references = link.registry.release(room);
        if references == 0 {
            link.joined.remove(room);
            if let Err(e) = self.shared.queue(&link, room.leave_message()) {
                debug!(room = %room, "leave not sent: {e}");
            }
        }
        debug!(room = %room, references, "room detached");
    }

    fn queue_subscribe(&self, link: &mut Link, room: &RoomKey) {
        if link.state == ConnectionState::Connected {
            link.joined.insert(room.clone());
        }
        let user_id = link.user.as_ref().map(|user| user.id.clone());
        for msg in room.subscribe_messages(user_id) {
            if let Err(e) = self.shared.queue(link, msg) {
                debug!(room = %room, "subscribe not sent: {e}");
            }
        }
    }
}

/// A session's registration, returned by [`Connection::attach`].
pub(crate) struct Attachment {
    pub events: broadcast::Receiver<ConnectionEvent>,
    /// Whether the transport was connected (and the room joined) at attach.
    pub connected: bool,
    /// Registry generation the reference was taken in.
    pub generation: u64,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

// ── Manager ─────────────────────────────────────────────────────────

/// Owner of the process-wide connection.
///
/// Construct one per process and hand it (behind an `Arc`, or by reference)
/// to every [`RoomSession`](crate::RoomSession). The connection task is
/// spawned lazily by the first [`connection`](Self::connection) call, so a
/// manager can be built before a tokio runtime is running.
///
/// After [`disconnect`](Self::disconnect) the manager is finished; build a
/// new one for the next login.
pub struct ConnectionManager {
    connector: Arc<dyn Connector>,
    shared: Arc<Shared>,
    connection: OnceLock<Connection>,
    cmd_rx: Mutex<Option<mpsc::UnboundedReceiver<ClientMessage>>>,
    task: Mutex<Option<JoinHandle<()>>>,
    shutdown_tx: watch::Sender<bool>,
}

impl ConnectionManager {
    /// Create a manager that logs notices and session gauges via `tracing`.
    pub fn new(connector: impl Connector, config: SyncConfig) -> Arc<Self> {
        Self::with_observers(
            connector,
            config,
            TracingNotifier,
            Arc::new(TracingMetrics),
        )
    }

    /// Create a manager with host-supplied notice display and metrics export.
    pub fn with_observers(
        connector: impl Connector,
        config: SyncConfig,
        notifier: impl Notifier,
        metrics: SessionMetricsHook,
    ) -> Arc<Self> {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        // tokio panics on a zero-capacity broadcast channel.
        let (events, _) = broadcast::channel(config.event_channel_capacity.max(1));
        let (shutdown_tx, _) = watch::channel(false);

        let shared = Arc::new(Shared {
            link: Mutex::new(Link::default()),
            cmd_tx,
            events,
            notices: NoticeBoard::new(notifier),
            sessions: ActiveSessions::new(metrics),
            config,
        });

        Arc::new(Self {
            connector: Arc::new(connector),
            shared,
            connection: OnceLock::new(),
            cmd_rx: Mutex::new(Some(cmd_rx)),
            task: Mutex::new(None),
            shutdown_tx,
        })
    }

    /// The shared connection, starting it on first use.
    ///
    /// Must be called from within a tokio runtime. Idempotent: every call
    /// returns a handle to the same connection.
    pub fn connection(&self) -> Connection {
        self.connection
            .get_or_init(|| {
                self.spawn_task();
                Connection {
                    shared: Arc::clone(&self.shared),
                }
            })
            .clone()
    }

    /// Record the identity used for reconnect replay.
    ///
    /// Also re-enables connectivity notices that a previous
    /// [`clear_current_user`](Self::clear_current_user) silenced.
    pub fn set_current_user(&self, user: UserIdentity) {
        let mut link = self.shared.link();
        debug!(user = %user.id, "current user set");
        link.user = Some(user);
        link.user_initiated = false;
    }

    /// Forget the current user and every registered room.
    ///
    /// The next disconnect is treated as user-initiated: no reconnecting or
    /// reconnect-failure notices are shown for it. Sessions still open
    /// register their rooms again on the next connect.
    pub fn clear_current_user(&self) {
        let mut link = self.shared.link();
        link.user = None;
        link.user_initiated = true;
        link.registry.clear();
        debug!("current user cleared");
    }

    /// The user joins are replayed as, if any.
    pub fn current_user(&self) -> Option<UserIdentity> {
        self.shared.link().user.clone()
    }

    /// Point-in-time transport state.
    pub fn state(&self) -> ConnectionState {
        self.shared.link().state
    }

    /// Whether the transport is connected right now.
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Rooms that would be rejoined on the next reconnect.
    pub fn registered_rooms(&self) -> Vec<RegistryEntry> {
        self.shared.link().registry.entries()
    }

    /// Open sessions for `room` (diagnostic gauge).
    pub fn active_sessions(&self, room: &RoomKey) -> usize {
        self.shared.sessions.get(room)
    }

    /// Close the connection for good (logout).
    ///
    /// Lifecycle events after this point are silent. The connection task gets
    /// [`SyncConfig::shutdown_timeout`] to close the transport before it is
    /// aborted.
    pub async fn disconnect(&self) {
        debug!("disconnect requested");
        self.shared.link().user_initiated = true;
        self.shutdown_tx.send_replace(true);

        let task = self
            .task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(mut task) = task {
            match tokio::time::timeout(self.shared.config.shutdown_timeout, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(join_err)) => warn!("connection task terminated with join error: {join_err}"),
                Err(_) => {
                    warn!("connection task did not exit within timeout; aborting");
                    task.abort();
                }
            }
        }

        self.shared.link().state = ConnectionState::Disconnected;
    }

    fn spawn_task(&self) {
        let Some(cmd_rx) = self
            .cmd_rx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        else {
            return;
        };

        let task = tokio::spawn(connection_task(
            Arc::clone(&self.connector),
            Arc::clone(&self.shared),
            cmd_rx,
            self.shutdown_tx.subscribe(),
        ));
        *self.task.lock().unwrap_or_else(|e| e.into_inner()) = Some(task);
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let link = self.shared.link();
        f.debug_struct("ConnectionManager")
            .field("state", &link.state)
            .field("rooms", &link.registry.len())
            .field("user", &link.user.as_ref().map(|user| &user.id))
            .field("started", &self.connection.get().is_some())
            .finish()
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        // No executor to drive a graceful close from `Drop`; abort instead.
        if let Some(task) = self
            .task
            .get_mut()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            task.abort();
        }
    }
}

// ── Connection task ─────────────────────────────────────────────────

/// Why one connected period ended.
enum LinkEnd {
    Shutdown,
    Dropped(Option<String>),
}

/// Dial, drive, and redial until shut down or out of attempts.
async fn connection_task(
    connector: Arc<dyn Connector>,
    shared: Arc<Shared>,
    mut cmd_rx: mpsc::UnboundedReceiver<ClientMessage>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    debug!("connection task started");
    let policy = shared.config.reconnect.clone();
    // Consecutive redials since the last good connection.
    let mut attempts: u32 = 0;

    loop {
        if *shutdown_rx.borrow() {
            break;
        }
        shared.link().state = ConnectionState::Connecting;

        let dial = tokio::select! {
            _ = shutdown_rx.changed() => break,
            dial = tokio::time::timeout(shared.config.handshake_timeout, connector.connect()) => dial,
        };

        match dial {
            Ok(Ok(mut transport)) => {
                on_connected(&shared, &mut cmd_rx, transport.as_mut(), attempts).await;
                attempts = 0;

                match drive(transport.as_mut(), &shared, &mut cmd_rx, &mut shutdown_rx).await {
                    LinkEnd::Shutdown => {
                        if let Err(e) = transport.close().await {
                            debug!("transport close failed: {e}");
                        }
                        on_disconnected(&shared, Some("client disconnect".into()));
                        break;
                    }
                    LinkEnd::Dropped(reason) => on_disconnected(&shared, reason),
                }
            }
            Ok(Err(e)) => {
                warn!("connect failed: {e}");
                shared.broadcast(ConnectionEvent::ConnectError {
                    message: e.to_string(),
                });
            }
            Err(_) => {
                warn!(timeout = ?shared.config.handshake_timeout, "handshake timed out");
                shared.broadcast(ConnectionEvent::ConnectError {
                    message: SyncError::HandshakeTimeout.to_string(),
                });
            }
        }

        attempts += 1;
        if !policy.allows(attempts) {
            on_reconnect_failed(&shared);
            break;
        }
        shared.link().state = ConnectionState::Disconnected;
        shared.broadcast(ConnectionEvent::ReconnectAttempt { attempt: attempts });
        let delay = policy.delay_for(attempts);
        debug!(attempt = attempts, ?delay, "reconnecting");

        tokio::select! {
            _ = shutdown_rx.changed() => break,
            () = tokio::time::sleep(delay) => {}
        }
    }

    shared.link().state = ConnectionState::Disconnected;
    debug!("connection task exited");
}

/// Transition to `Connected`, replay room joins, and announce the connect.
///
/// `attempts` is the number of redials it took; zero for a first connect.
async fn on_connected(
    shared: &Shared,
    cmd_rx: &mut mpsc::UnboundedReceiver<ClientMessage>,
    transport: &mut dyn Transport,
    attempts: u32,
) {
    // Anything still queued was meant for the previous link.
    let mut stale = 0usize;
    while cmd_rx.try_recv().is_ok() {
        stale += 1;
    }
    if stale > 0 {
        debug!(stale, "discarded messages queued for a dead link");
    }

    let (replay, had_rooms) = {
        let mut link = shared.link();
        link.state = ConnectionState::Connected;
        let had_rooms = !link.registry.is_empty();
        let rooms: Vec<RoomKey> = link
            .registry
            .entries()
            .into_iter()
            .map(|entry| entry.room)
            .collect();
        let replay: Option<Vec<ClientMessage>> = link.user.as_ref().map(|user| {
            rooms
                .iter()
                .flat_map(|room| room.subscribe_messages(Some(user.id.clone())))
                .collect()
        });
        link.joined = if replay.is_some() {
            rooms.into_iter().collect()
        } else {
            HashSet::new()
        };
        shared.broadcast(ConnectionEvent::Connected {
            replayed: replay.is_some(),
        });
        if attempts > 0 {
            shared.broadcast(ConnectionEvent::Reconnected { attempts });
        }
        (replay.unwrap_or_default(), had_rooms)
    };

    if attempts > 0 {
        info!(attempts, "reconnected");
        if had_rooms {
            shared
                .notices
                .replace(Notice::reconnected(shared.config.brief_notice_duration));
        } else {
            shared.notices.clear();
        }
    } else {
        info!("connected");
    }

    for msg in replay {
        debug!(event = msg.event_name(), "replaying");
        if let Err(e) = send(transport, &msg).await {
            // The drive loop will observe the broken transport.
            warn!("replay send failed: {e}");
            break;
        }
    }
}

fn on_disconnected(shared: &Shared, reason: Option<String>) {
    let user_initiated = {
        let mut link = shared.link();
        link.state = ConnectionState::Disconnected;
        link.joined.clear();
        shared.broadcast(ConnectionEvent::Disconnected {
            reason: reason.clone(),
            user_initiated: link.user_initiated,
        });
        link.user_initiated
    };

    if user_initiated {
        info!(reason = ?reason, "disconnected");
    } else {
        warn!(reason = ?reason, "connection lost");
        shared.notices.replace(Notice::reconnecting());
    }
}

fn on_reconnect_failed(shared: &Shared) {
    let user_initiated = {
        let mut link = shared.link();
        link.state = ConnectionState::Disconnected;
        shared.broadcast(ConnectionEvent::ReconnectFailed);
        link.user_initiated
    };

    error!("reconnection attempts exhausted");
    if !user_initiated {
        shared.notices.replace(Notice::connection_lost());
    }
}

/// Pump one connected transport until it drops or shutdown is requested.
async fn drive(
    transport: &mut dyn Transport,
    shared: &Shared,
    cmd_rx: &mut mpsc::UnboundedReceiver<ClientMessage>,
    shutdown_rx: &mut watch::Receiver<bool>,
) -> LinkEnd {
    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => return LinkEnd::Shutdown,

            cmd = cmd_rx.recv() => {
                let Some(msg) = cmd else {
                    return LinkEnd::Shutdown;
                };
                if let Err(e) = send(transport, &msg).await {
                    error!("transport send error: {e}");
                    return LinkEnd::Dropped(Some(e.to_string()));
                }
            }

            incoming = transport.recv() => match incoming {
                Some(Ok(text)) => dispatch(shared, &text),
                Some(Err(e)) => {
                    error!("transport receive error: {e}");
                    return LinkEnd::Dropped(Some(e.to_string()));
                }
                None => {
                    debug!("transport closed by server");
                    return LinkEnd::Dropped(None);
                }
            },
        }
    }
}

async fn send(transport: &mut dyn Transport, msg: &ClientMessage) -> Result<()> {
    let json = serde_json::to_string(msg)?;
    debug!(event = msg.event_name(), "sending");
    transport.send(json).await
}

/// Decode one frame and fan it out.
fn dispatch(shared: &Shared, text: &str) {
    let msg = match serde_json::from_str::<ServerMessage>(text) {
        Ok(msg) => msg,
        Err(e) => {
            warn!("failed to decode server message: {e}; raw: {text}");
            return;
        }
    };

    if let ServerMessage::Error { message } = &msg {
        warn!(%message, "server error");
        shared.notices.flash(Notice::server_error(
            message.clone(),
            shared.config.brief_notice_duration,
        ));
    }

    shared.broadcast(ConnectionEvent::Server(msg));
}
