//! Room identity and the per-room-type message vocabulary.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::protocol::{ClientMessage, UserId};

/// Server-side scoping unit a session can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomType {
    League,
    Auction,
}

impl fmt::Display for RoomType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::League => f.write_str("league"),
            Self::Auction => f.write_str("auction"),
        }
    }
}

/// Identifies one logical room subscription: `(room_type, room_id)`.
///
/// Used as the registry key, the metrics label, and the filter every session
/// applies to incoming events.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoomKey {
    pub room_type: RoomType,
    pub room_id: String,
}

impl RoomKey {
    /// Create a room key.
    pub fn new(room_type: RoomType, room_id: impl Into<String>) -> Self {
        Self {
            room_type,
            room_id: room_id.into(),
        }
    }

    /// Key of a league room.
    pub fn league(league_id: impl Into<String>) -> Self {
        Self::new(RoomType::League, league_id)
    }

    /// Key of an auction room.
    pub fn auction(auction_id: impl Into<String>) -> Self {
        Self::new(RoomType::Auction, auction_id)
    }

    /// Whether `id` names this room for the given room type.
    pub fn matches(&self, room_type: RoomType, id: &str) -> bool {
        self.room_type == room_type && self.room_id == id
    }

    /// The join message for this room. `user_id` is only sent for leagues.
    pub fn join_message(&self, user_id: Option<UserId>) -> ClientMessage {
        match self.room_type {
            RoomType::League => ClientMessage::JoinLeague {
                league_id: self.room_id.clone(),
                user_id,
            },
            RoomType::Auction => ClientMessage::JoinAuction {
                auction_id: self.room_id.clone(),
            },
        }
    }

    /// The leave message for this room.
    pub fn leave_message(&self) -> ClientMessage {
        match self.room_type {
            RoomType::League => ClientMessage::LeaveLeague {
                league_id: self.room_id.clone(),
            },
            RoomType::Auction => ClientMessage::LeaveAuction {
                auction_id: self.room_id.clone(),
            },
        }
    }

    /// Join followed by any room-type-specific bootstrap requests.
    ///
    /// Auction rooms request an authoritative snapshot right after joining so
    /// the lot and timer are never rendered from stale state.
    pub fn subscribe_messages(&self, user_id: Option<UserId>) -> Vec<ClientMessage> {
        let mut messages = vec![self.join_message(user_id)];
        if self.room_type == RoomType::Auction {
            messages.push(ClientMessage::SyncState {
                auction_id: self.room_id.clone(),
            });
        }
        messages
    }
}

impl fmt::Display for RoomKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.room_type, self.room_id)
    }
}
