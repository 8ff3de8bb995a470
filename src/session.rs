//! One consumer's subscription to one room.
//!
//! A [`RoomSession`] registers its room with the connection manager, joins
//! it, and keeps a derived view (connected, ready, members, league status,
//! auction state) up to date from the shared event stream. Every handler
//! filters by the session's own room id: many sessions listen to the same
//! stream and none may assume an event is meant for it.
//!
//! Dropping (or [`close`](RoomSession::close)-ing) the session leaves the
//! room, releases its registry reference, and silences it: events that
//! arrive afterwards are never applied.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::connection::{Connection, ConnectionManager};
use crate::error::Result;
use crate::event::ConnectionEvent;
use crate::identity::UserIdentity;
use crate::members::MemberList;
use crate::poller::{self, LeagueStateSource, PolledState};
use crate::protocol::{AuctionState, LeagueStatus, Member, ServerMessage};
use crate::readiness::{Readiness, ReadinessTrigger, ReadyLatch, ReadySignal};
use crate::room::{RoomKey, RoomType};

/// Optional inputs to [`RoomSession::open_with`].
#[derive(Clone, Default)]
pub struct SessionOptions {
    user: Option<UserIdentity>,
    state_source: Option<Arc<dyn LeagueStateSource>>,
}

impl SessionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forwarded to [`ConnectionManager::set_current_user`] on open.
    #[must_use]
    pub fn with_user(mut self, user: UserIdentity) -> Self {
        self.user = Some(user);
        self
    }

    /// Enable the polling safety net (league rooms only).
    #[must_use]
    pub fn with_state_source(mut self, source: Arc<dyn LeagueStateSource>) -> Self {
        self.state_source = Some(source);
        self
    }
}

impl std::fmt::Debug for SessionOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionOptions")
            .field("user", &self.user)
            .field("polling", &self.state_source.is_some())
            .finish()
    }
}

/// Point-in-time view of a session, published on every change.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionSnapshot {
    pub connected: bool,
    pub ready: bool,
    /// League rooms only; always empty for auctions.
    pub members: Vec<Member>,
    pub league_status: Option<LeagueStatus>,
    pub auction: Option<AuctionState>,
}

// ── Core ────────────────────────────────────────────────────────────

/// What applying one event did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Reaction {
    /// The published view changed.
    pub changed: bool,
    /// First readiness since the last (re)connect.
    pub became_ready: bool,
    /// A new link is up; the session must check its room is joined.
    pub resubscribe: bool,
}

impl Reaction {
    fn changed() -> Self {
        Self {
            changed: true,
            ..Self::default()
        }
    }
}

/// Event-driven session state, free of I/O.
#[derive(Debug)]
pub(crate) struct SessionCore {
    room: RoomKey,
    connected: bool,
    readiness: Readiness,
    members: MemberList,
    league_status: Option<LeagueStatus>,
    auction: Option<AuctionState>,
}

impl SessionCore {
    pub(crate) fn new(room: RoomKey, connected: bool) -> Self {
        Self {
            room,
            connected,
            readiness: Readiness::default(),
            members: MemberList::new(),
            league_status: None,
            auction: None,
        }
    }

    pub(crate) fn apply(&mut self, event: &ConnectionEvent) -> Reaction {
        match event {
            ConnectionEvent::Connected { .. } => {
                self.connected = true;
                self.readiness.reset();
                Reaction {
                    changed: true,
                    resubscribe: true,
                    ..Reaction::default()
                }
            }
            ConnectionEvent::Disconnected { .. } => {
                self.connected = false;
                self.readiness.reset();
                Reaction::changed()
            }
            ConnectionEvent::Server(msg) => self.apply_server(msg),
            ConnectionEvent::ConnectError { .. }
            | ConnectionEvent::ReconnectAttempt { .. }
            | ConnectionEvent::Reconnected { .. }
            | ConnectionEvent::ReconnectFailed => Reaction::default(),
        }
    }

    fn apply_server(&mut self, msg: &ServerMessage) -> Reaction {
        match msg {
            ServerMessage::RoomJoined { league_id }
                if self.room.matches(RoomType::League, league_id) =>
            {
                self.trigger(ReadinessTrigger::JoinAcknowledged)
            }
            ServerMessage::MemberJoined { member, league_id }
                if self.accepts_membership(league_id.as_deref()) =>
            {
                self.members.upsert(member.clone());
                Reaction::changed()
            }
            ServerMessage::SyncMembers { members, league_id }
                if self.accepts_membership(league_id.as_deref()) =>
            {
                self.members.replace(members.clone());
                Reaction::changed()
            }
            ServerMessage::LeagueStatusChanged(status)
                if self.room.matches(RoomType::League, &status.league_id) =>
            {
                self.league_status = Some(status.clone());
                Reaction::changed()
            }
            ServerMessage::SyncState { auction }
                if self.room.matches(RoomType::Auction, &auction.id) =>
            {
                self.auction = Some(auction.clone());
                Reaction {
                    changed: true,
                    ..self.trigger(ReadinessTrigger::StateSynced)
                }
            }
            ServerMessage::AuctionSnapshot(snapshot)
                if self.room.matches(RoomType::Auction, &snapshot.auction_id) =>
            {
                self.auction = Some(AuctionState {
                    id: snapshot.auction_id.clone(),
                    fields: snapshot.fields.clone(),
                });
                Reaction {
                    changed: true,
                    ..self.trigger(ReadinessTrigger::SnapshotReceived)
                }
            }
            _ => Reaction::default(),
        }
    }

    /// Membership events carry a league id only sometimes; unscoped ones go
    /// to every league session.
    fn accepts_membership(&self, league_id: Option<&str>) -> bool {
        self.room.room_type == RoomType::League
            && league_id.is_none_or(|id| id == self.room.room_id)
    }

    fn trigger(&mut self, trigger: ReadinessTrigger) -> Reaction {
        let became_ready = self.readiness.trigger(self.room.room_type, trigger);
        Reaction {
            changed: became_ready,
            became_ready,
            resubscribe: false,
        }
    }

    /// Apply a poll result as authoritative.
    pub(crate) fn apply_poll(&mut self, polled: PolledState) -> Reaction {
        if self.room.room_type != RoomType::League {
            return Reaction::default();
        }
        let mut reaction = Reaction::default();
        if let Some(status) = polled
            .status
            .filter(|status| self.room.matches(RoomType::League, &status.league_id))
        {
            self.league_status = Some(status);
            reaction.changed = true;
        }
        if let Some(members) = polled.members {
            self.members.replace(members);
            reaction.changed = true;
        }
        reaction
    }

    pub(crate) fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            connected: self.connected,
            ready: self.readiness.is_ready(),
            members: self.members.as_slice().to_vec(),
            league_status: self.league_status.clone(),
            auction: self.auction.clone(),
        }
    }
}

// ── Shared between handle and tasks ─────────────────────────────────

struct SessionShared {
    core: Mutex<SessionCore>,
    snapshot: watch::Sender<SessionSnapshot>,
    latch: ReadyLatch,
    closed: AtomicBool,
    /// Registry generation of this session's room reference.
    generation: Mutex<u64>,
}

impl SessionShared {
    /// Apply one update and publish the result. Inert once closed.
    fn update(&self, apply: impl FnOnce(&mut SessionCore) -> Reaction) -> Reaction {
        if self.closed.load(Ordering::Acquire) {
            return Reaction::default();
        }
        let (reaction, snapshot) = {
            let mut core = self.core.lock().unwrap_or_else(|e| e.into_inner());
            let reaction = apply(&mut core);
            (reaction, reaction.changed.then(|| core.snapshot()))
        };
        if let Some(snapshot) = snapshot {
            self.snapshot.send_replace(snapshot);
        }
        if reaction.became_ready && self.latch.fire() {
            debug!("session ready for the first time");
        }
        reaction
    }

    /// Re-register and rejoin after a connect. Inert once closed.
    fn resubscribe(&self, connection: &Connection, room: &RoomKey) {
        let mut generation = self.generation.lock().unwrap_or_else(|e| e.into_inner());
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        *generation = connection.resubscribe(room, *generation);
    }

    /// Release the room reference exactly once.
    fn detach(&self, connection: &Connection, room: &RoomKey) {
        let generation = self.generation.lock().unwrap_or_else(|e| e.into_inner());
        connection.detach(room, *generation);
    }
}

async fn listen(
    shared: Arc<SessionShared>,
    connection: Connection,
    room: RoomKey,
    mut events: broadcast::Receiver<ConnectionEvent>,
) {
    loop {
        match events.recv().await {
            Ok(event) => {
                let reaction = shared.update(|core| core.apply(&event));
                if reaction.resubscribe {
                    shared.resubscribe(&connection, &room);
                }
                if reaction.became_ready {
                    info!(room = %room, "room ready");
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(room = %room, skipped, "session listener lagged; events dropped");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

// ── Handle ──────────────────────────────────────────────────────────

/// One consumer's interest in one room.
///
/// The room key is fixed for the session's lifetime; to follow another room,
/// drop this session and open a new one.
pub struct RoomSession {
    room: RoomKey,
    connection: Connection,
    shared: Arc<SessionShared>,
    snapshot_rx: watch::Receiver<SessionSnapshot>,
    ready: ReadySignal,
    listener: Option<JoinHandle<()>>,
    poller: Option<JoinHandle<()>>,
}

impl RoomSession {
    /// Open a session on `room` with default options.
    ///
    /// Must be called from within a tokio runtime.
    pub fn open(manager: &ConnectionManager, room: RoomKey) -> Self {
        Self::open_with(manager, room, SessionOptions::default())
    }

    /// Open a session on `room`.
    ///
    /// Registers the room for replay and joins it right away when the
    /// transport is connected; otherwise the join goes out on the next
    /// connect. Auction rooms also request a state sync after joining.
    pub fn open_with(manager: &ConnectionManager, room: RoomKey, options: SessionOptions) -> Self {
        if let Some(user) = options.user {
            manager.set_current_user(user);
        }
        let connection = manager.connection();
        let active = connection.sessions().opened(&room);
        let attachment = connection.attach(&room);
        debug!(room = %room, active, connected = attachment.connected, "session opened");

        let core = SessionCore::new(room.clone(), attachment.connected);
        let (snapshot_tx, snapshot_rx) = watch::channel(core.snapshot());
        let (latch, ready) = ReadyLatch::new();
        let shared = Arc::new(SessionShared {
            core: Mutex::new(core),
            snapshot: snapshot_tx,
            latch,
            closed: AtomicBool::new(false),
            generation: Mutex::new(attachment.generation),
        });

        let listener = tokio::spawn(listen(
            Arc::clone(&shared),
            connection.clone(),
            room.clone(),
            attachment.events,
        ));

        let poller = match (room.room_type, options.state_source) {
            (RoomType::League, Some(source)) => {
                let sink = Arc::clone(&shared);
                Some(poller::spawn(
                    source,
                    room.room_id.clone(),
                    connection.config().poll_interval,
                    move |polled| {
                        sink.update(|core| core.apply_poll(polled));
                    },
                ))
            }
            _ => None,
        };

        Self {
            room,
            connection,
            shared,
            snapshot_rx,
            ready,
            listener: Some(listener),
            poller,
        }
    }

    pub fn room(&self) -> &RoomKey {
        &self.room
    }

    pub fn is_connected(&self) -> bool {
        self.snapshot_rx.borrow().connected
    }

    /// Whether the room is ready right now. Falls back to `false` on every
    /// connect and disconnect until the server confirms again.
    pub fn is_ready(&self) -> bool {
        self.snapshot_rx.borrow().ready
    }

    /// Current league membership.
    pub fn members(&self) -> Vec<Member> {
        self.snapshot_rx.borrow().members.clone()
    }

    pub fn league_status(&self) -> Option<LeagueStatus> {
        self.snapshot_rx.borrow().league_status.clone()
    }

    pub fn auction_state(&self) -> Option<AuctionState> {
        self.snapshot_rx.borrow().auction.clone()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    /// Receiver that observes every published snapshot.
    pub fn watch(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot_rx.clone()
    }

    /// One-shot signal for the first readiness of this session.
    pub fn ready_signal(&self) -> ReadySignal {
        self.ready.clone()
    }

    /// Wait until the session is ready for the first time.
    ///
    /// Resolves once per session. After a reconnect, read
    /// [`is_ready`](Self::is_ready) or [`watch`](Self::watch) instead.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NotConnected`](crate::SyncError::NotConnected) if
    /// the session is closed before it was ever ready.
    pub async fn wait_ready(&self) -> Result<()> {
        self.ready.clone().wait().await
    }

    /// Leave the room and stop listening.
    pub fn close(mut self) {
        self.teardown();
    }

    fn teardown(&mut self) {
        if self.shared.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
        if let Some(poller) = self.poller.take() {
            poller.abort();
        }
        self.shared.detach(&self.connection, &self.room);
        let active = self.connection.sessions().closed(&self.room);
        debug!(room = %self.room, active, "session closed");
    }
}

impl std::fmt::Debug for RoomSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let snapshot = self.snapshot_rx.borrow();
        f.debug_struct("RoomSession")
            .field("room", &self.room)
            .field("connected", &snapshot.connected)
            .field("ready", &snapshot.ready)
            .field("members", &snapshot.members.len())
            .finish_non_exhaustive()
    }
}

impl Drop for RoomSession {
    fn drop(&mut self) {
        self.teardown();
    }
}
