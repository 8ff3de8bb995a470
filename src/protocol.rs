//! Wire-compatible protocol types for the league/auction room server.
//!
//! Every frame is a JSON object tagged by event name, with the payload under
//! `data`: `{"type": "join_league", "data": {"leagueId": "L1"}}`. Payload
//! fields use the server's `camelCase` names.
//!
//! Transport-level lifecycle events (`connect`, `disconnect`, reconnect
//! notifications) never appear on the wire; they are produced locally by the
//! connection manager as [`ConnectionEvent`](crate::event::ConnectionEvent)s.

use serde::{Deserialize, Serialize};

// ── Type aliases ────────────────────────────────────────────────────

/// Opaque identifier of a league.
pub type LeagueId = String;

/// Opaque identifier of an auction.
pub type AuctionId = String;

/// Opaque identifier of a user.
pub type UserId = String;

// ── Structs ─────────────────────────────────────────────────────────

/// One participant visible inside a league room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub user_id: UserId,
    pub display_name: String,
    /// ISO 8601 timestamp assigned by the server.
    pub joined_at: String,
}

impl Member {
    /// Create a member record.
    pub fn new(
        user_id: impl Into<UserId>,
        display_name: impl Into<String>,
        joined_at: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: display_name.into(),
            joined_at: joined_at.into(),
        }
    }
}

/// Current lifecycle status of a league, as pushed by `league_status_changed`
/// or returned by the REST status endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeagueStatus {
    pub league_id: LeagueId,
    pub status: String,
    /// Auction started for this league, once there is one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auction_id: Option<AuctionId>,
}

/// Authoritative auction state embedded in an inbound `sync_state` event.
///
/// Only `id` is interpreted by this crate; lot, bid and timer fields belong to
/// the server-side auction engine and are carried through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuctionState {
    pub id: AuctionId,
    #[serde(flatten)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

/// Payload of the `auction_snapshot` push.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuctionSnapshot {
    pub auction_id: AuctionId,
    #[serde(flatten)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

// ── Messages ────────────────────────────────────────────────────────

/// Message types sent from client to server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "data",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum ClientMessage {
    /// Subscribe to a league room.
    JoinLeague {
        league_id: LeagueId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user_id: Option<UserId>,
    },
    /// Unsubscribe from a league room.
    LeaveLeague { league_id: LeagueId },
    /// Subscribe to an auction room.
    JoinAuction { auction_id: AuctionId },
    /// Unsubscribe from an auction room.
    LeaveAuction { auction_id: AuctionId },
    /// Request an authoritative auction snapshot.
    SyncState { auction_id: AuctionId },
}

impl ClientMessage {
    /// Wire event name of this message.
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::JoinLeague { .. } => "join_league",
            Self::LeaveLeague { .. } => "leave_league",
            Self::JoinAuction { .. } => "join_auction",
            Self::LeaveAuction { .. } => "leave_auction",
            Self::SyncState { .. } => "sync_state",
        }
    }
}

/// Message types sent from server to client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "data",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum ServerMessage {
    /// Join acknowledgement for a league room.
    RoomJoined { league_id: LeagueId },
    /// A member joined (or re-joined) a league room.
    MemberJoined {
        #[serde(flatten)]
        member: Member,
        /// Scoping league, when the server includes it.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        league_id: Option<LeagueId>,
    },
    /// Authoritative full membership list of a league room.
    SyncMembers {
        members: Vec<Member>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        league_id: Option<LeagueId>,
    },
    /// League lifecycle status changed.
    LeagueStatusChanged(LeagueStatus),
    /// Authoritative auction snapshot in reply to a `sync_state` request.
    SyncState { auction: AuctionState },
    /// Auction snapshot pushed by the server.
    AuctionSnapshot(AuctionSnapshot),
    /// Application error reported by the server.
    Error { message: String },
}

impl ServerMessage {
    /// Wire event name of this message.
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::RoomJoined { .. } => "room_joined",
            Self::MemberJoined { .. } => "member_joined",
            Self::SyncMembers { .. } => "sync_members",
            Self::LeagueStatusChanged(_) => "league_status_changed",
            Self::SyncState { .. } => "sync_state",
            Self::AuctionSnapshot(_) => "auction_snapshot",
            Self::Error { .. } => "error",
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn join_league_omits_missing_user() {
        let msg = ClientMessage::JoinLeague {
            league_id: "L1".into(),
            user_id: None,
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value, json!({"type": "join_league", "data": {"leagueId": "L1"}}));
    }

    #[test]
    fn event_names_match_wire_tags() {
        let msg = ClientMessage::SyncState {
            auction_id: "A1".into(),
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], msg.event_name());

        let msg = ServerMessage::Error {
            message: "nope".into(),
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], msg.event_name());
    }

    #[test]
    fn member_joined_payload_is_the_member_itself() {
        let raw = json!({
            "type": "member_joined",
            "data": {"userId": "u1", "displayName": "Ann", "joinedAt": "2026-01-01T00:00:00Z"}
        });
        let msg: ServerMessage = serde_json::from_value(raw).unwrap();
        assert_eq!(
            msg,
            ServerMessage::MemberJoined {
                member: Member::new("u1", "Ann", "2026-01-01T00:00:00Z"),
                league_id: None,
            }
        );
    }

    #[test]
    fn sync_state_keeps_engine_fields() {
        let raw = json!({
            "type": "sync_state",
            "data": {"auction": {"id": "A1", "currentLot": 3, "timerEndsAt": 1700}}
        });
        let msg: ServerMessage = serde_json::from_value(raw).unwrap();
        let ServerMessage::SyncState { auction } = msg else {
            panic!("expected SyncState");
        };
        assert_eq!(auction.id, "A1");
        assert_eq!(auction.fields["currentLot"], 3);
    }
}
