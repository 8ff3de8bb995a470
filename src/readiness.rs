//! Room readiness: "this session now holds a consistent view of its room".
//!
//! Readiness has two faces:
//!
//! - the **gate** ([`Readiness`]) answers "is it ready right now?". It is
//!   re-armed (reset to not-ready) on every connect and disconnect.
//! - the **signal** ([`ReadySignal`]) answers "has it ever been ready?". It
//!   resolves on the first readiness of the session and never again, so a
//!   caller awaiting it after a reconnect must read the gate instead.

use tokio::sync::watch;

use crate::error::{Result, SyncError};
use crate::room::RoomType;

/// Server events that establish readiness.
///
/// Which triggers apply depends on the room type; see
/// [`applies_to`](Self::applies_to).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadinessTrigger {
    /// `room_joined` acknowledgement (league rooms).
    JoinAcknowledged,
    /// `sync_state` reply carrying the auction (auction rooms).
    StateSynced,
    /// `auction_snapshot` push (auction rooms).
    SnapshotReceived,
}

impl ReadinessTrigger {
    /// Whether this trigger makes a room of `room_type` ready.
    pub fn applies_to(self, room_type: RoomType) -> bool {
        matches!(
            (self, room_type),
            (Self::JoinAcknowledged, RoomType::League)
                | (Self::StateSynced | Self::SnapshotReceived, RoomType::Auction)
        )
    }
}

/// Current readiness of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Readiness {
    #[default]
    NotReady,
    Ready,
}

impl Readiness {
    /// Apply `trigger` for a room of `room_type`.
    ///
    /// Returns `true` only for the `NotReady → Ready` transition; a trigger
    /// arriving when already ready, or one that does not apply, is a no-op.
    pub fn trigger(&mut self, room_type: RoomType, trigger: ReadinessTrigger) -> bool {
        if *self == Self::Ready || !trigger.applies_to(room_type) {
            return false;
        }
        *self = Self::Ready;
        true
    }

    /// Re-arm the gate.
    pub fn reset(&mut self) {
        *self = Self::NotReady;
    }

    pub fn is_ready(self) -> bool {
        self == Self::Ready
    }
}

// ── One-shot signal ─────────────────────────────────────────────────

/// Resolving side of a [`ReadySignal`].
#[derive(Debug)]
pub(crate) struct ReadyLatch {
    tx: watch::Sender<bool>,
}

impl ReadyLatch {
    pub(crate) fn new() -> (Self, ReadySignal) {
        let (tx, rx) = watch::channel(false);
        (Self { tx }, ReadySignal { rx })
    }

    /// Resolve the signal. Returns `true` the first time only.
    pub(crate) fn fire(&self) -> bool {
        self.tx.send_if_modified(|fired| {
            if *fired {
                false
            } else {
                *fired = true;
                true
            }
        })
    }
}

/// Resolves once, when its session first becomes ready.
///
/// Clones share the same underlying signal.
#[derive(Debug, Clone)]
pub struct ReadySignal {
    rx: watch::Receiver<bool>,
}

impl ReadySignal {
    /// Whether the session has ever been ready.
    pub fn is_resolved(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait for the first readiness.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NotConnected`] if the session was torn down before
    /// it ever became ready.
    pub async fn wait(mut self) -> Result<()> {
        self.rx
            .wait_for(|fired| *fired)
            .await
            .map(|_| ())
            .map_err(|_| SyncError::NotConnected)
    }
}
