#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
//! Integration tests for room sessions over a scripted connection.
//!
//! Uses the channel-backed `MockConnector` from `tests/common` to play the
//! server: tests read what the client joins, push room events, and drop the
//! connection to exercise replay.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use auction_sync_client::protocol::{AuctionSnapshot, ClientMessage, ServerMessage};
use auction_sync_client::{
    AuctionState, ConnectionManager, LeagueStateSource, LeagueStatus, Member, RoomKey,
    RoomSession, SessionOptions, SessionSnapshot, SyncConfig, SyncError, UserIdentity,
};

use common::{mock, settle, sort_by_wire, MockConnector, WAIT};

// ════════════════════════════════════════════════════════════════════
// Helpers
// ════════════════════════════════════════════════════════════════════

fn ann() -> UserIdentity {
    UserIdentity::new("u1", "Ann", "ann@example.com")
}

fn manager(connector: MockConnector) -> Arc<ConnectionManager> {
    let manager = ConnectionManager::new(connector, SyncConfig::default());
    manager.set_current_user(ann());
    manager
}

fn join_league(league_id: &str) -> ClientMessage {
    ClientMessage::JoinLeague {
        league_id: league_id.into(),
        user_id: Some("u1".into()),
    }
}

fn join_auction(auction_id: &str) -> ClientMessage {
    ClientMessage::JoinAuction {
        auction_id: auction_id.into(),
    }
}

fn sync_state(auction_id: &str) -> ClientMessage {
    ClientMessage::SyncState {
        auction_id: auction_id.into(),
    }
}

fn room_joined(league_id: &str) -> ServerMessage {
    ServerMessage::RoomJoined {
        league_id: league_id.into(),
    }
}

fn auction_snapshot(auction_id: &str) -> ServerMessage {
    ServerMessage::AuctionSnapshot(AuctionSnapshot {
        auction_id: auction_id.into(),
        fields: serde_json::Map::new(),
    })
}

/// Wait until the session's published view satisfies `pred`.
async fn until(
    session: &RoomSession,
    what: &str,
    pred: impl FnMut(&SessionSnapshot) -> bool,
) -> SessionSnapshot {
    let mut rx = session.watch();
    let snapshot = tokio::time::timeout(WAIT, rx.wait_for(pred))
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {what}"))
        .expect("session publisher dropped")
        .clone();
    snapshot
}

// ════════════════════════════════════════════════════════════════════
// Joining and readiness
// ════════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn cold_join_ends_ready_with_synced_members() {
    common::init_tracing();
    let (connector, mut server) = mock();
    let manager = manager(connector);
    let session = RoomSession::open(&manager, RoomKey::league("L1"));
    assert!(!session.is_ready());

    let mut link = server.accept().await;
    assert_eq!(link.next_message().await, join_league("L1"));

    link.push(&room_joined("L1"));
    link.push(&ServerMessage::SyncMembers {
        members: vec![Member::new("u1", "Ann", "T1")],
        league_id: None,
    });

    tokio::time::timeout(WAIT, session.wait_ready())
        .await
        .expect("ready in time")
        .expect("session ready");
    let view = until(&session, "synced members", |view| view.members.len() == 1).await;
    assert!(view.ready);
    assert!(view.connected);
    assert_eq!(view.members, vec![Member::new("u1", "Ann", "T1")]);

    settle().await;
    assert!(link.drain().is_empty(), "league joined more than once");
}

#[tokio::test(start_paused = true)]
async fn auction_session_joins_then_requests_state() {
    let (connector, mut server) = mock();
    let manager = manager(connector);
    let session = RoomSession::open(&manager, RoomKey::auction("A1"));

    let mut link = server.accept().await;
    assert_eq!(link.next_message().await, join_auction("A1"));
    assert_eq!(link.next_message().await, sync_state("A1"));

    let mut fields = serde_json::Map::new();
    fields.insert("currentLot".into(), serde_json::json!(7));
    link.push(&ServerMessage::SyncState {
        auction: AuctionState {
            id: "A1".into(),
            fields,
        },
    });
    link.push(&auction_snapshot("A1"));

    session.wait_ready().await.expect("ready");
    let signal = session.ready_signal();
    assert!(signal.is_resolved());
    assert!(session.is_ready());

    // The later snapshot replaced the synced state.
    let view = until(&session, "snapshot applied", |view| {
        view.auction.as_ref().is_some_and(|a| a.fields.is_empty())
    })
    .await;
    assert_eq!(view.auction.map(|a| a.id).as_deref(), Some("A1"));
}

#[tokio::test(start_paused = true)]
async fn session_opened_while_connected_joins_immediately() {
    let (connector, mut server) = mock();
    let manager = manager(connector);
    let _first = RoomSession::open(&manager, RoomKey::league("L1"));
    let mut link = server.accept().await;
    assert_eq!(link.next_message().await, join_league("L1"));
    settle().await;
    assert!(manager.is_connected());

    let second = RoomSession::open(&manager, RoomKey::league("L2"));
    assert!(second.is_connected());
    assert_eq!(link.next_message().await, join_league("L2"));
}

#[tokio::test(start_paused = true)]
async fn user_supplied_at_open_is_used_for_joins() {
    let (connector, mut server) = mock();
    let manager = ConnectionManager::new(connector, SyncConfig::default());
    let _session = RoomSession::open_with(
        &manager,
        RoomKey::league("L1"),
        SessionOptions::new().with_user(ann()),
    );

    assert_eq!(manager.current_user(), Some(ann()));
    let mut link = server.accept().await;
    assert_eq!(link.next_message().await, join_league("L1"));
}

// ════════════════════════════════════════════════════════════════════
// Reconnect
// ════════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn reconnect_replays_each_room_exactly_once() {
    let (connector, mut server) = mock();
    let manager = manager(connector);
    let league = RoomSession::open(&manager, RoomKey::league("L1"));
    let auction = RoomSession::open(&manager, RoomKey::auction("A1"));

    let mut expected = vec![join_league("L1"), join_auction("A1"), sync_state("A1")];
    sort_by_wire(&mut expected);

    let mut link = server.accept().await;
    assert_eq!(link.next_messages_unordered(3).await, expected);
    link.push(&room_joined("L1"));
    link.push(&auction_snapshot("A1"));
    until(&league, "league ready", |view| view.ready).await;
    until(&auction, "auction ready", |view| view.ready).await;

    drop(link);
    let view = until(&league, "league disconnected", |view| !view.connected).await;
    assert!(!view.ready);
    let view = until(&auction, "auction disconnected", |view| !view.connected).await;
    assert!(!view.ready);

    let mut link = server.accept().await;
    assert_eq!(link.next_messages_unordered(3).await, expected);
    settle().await;
    assert!(link.drain().is_empty(), "a room was joined twice");
    assert_eq!(server.dials(), 2);
}

#[tokio::test(start_paused = true)]
async fn reconnect_resets_readiness_until_confirmed_again() {
    let (connector, mut server) = mock();
    let manager = manager(connector);
    let session = RoomSession::open(&manager, RoomKey::league("L1"));

    let mut link = server.accept().await;
    link.next_message().await;
    link.push(&room_joined("L1"));
    until(&session, "ready", |view| view.ready).await;

    drop(link);
    let mut link = server.accept().await;
    assert_eq!(link.next_message().await, join_league("L1"));
    let view = until(&session, "reconnected", |view| view.connected).await;
    assert!(!view.ready);

    link.push(&room_joined("L1"));
    until(&session, "ready again", |view| view.ready).await;
}

#[tokio::test(start_paused = true)]
async fn without_a_user_sessions_rejoin_on_their_own() {
    let (connector, mut server) = mock();
    let manager = ConnectionManager::new(connector, SyncConfig::default());
    let _session = RoomSession::open(&manager, RoomKey::league("L1"));

    for _ in 0..2 {
        let mut link = server.accept().await;
        assert_eq!(
            link.next_message().await,
            ClientMessage::JoinLeague {
                league_id: "L1".into(),
                user_id: None,
            }
        );
        settle().await;
        assert!(link.drain().is_empty());
    }
}

// ════════════════════════════════════════════════════════════════════
// Filtering and teardown
// ════════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn events_for_other_rooms_leave_session_untouched() {
    let (connector, mut server) = mock();
    let manager = manager(connector);
    let l1 = RoomSession::open(&manager, RoomKey::league("L1"));
    let l2 = RoomSession::open(&manager, RoomKey::league("L2"));

    let link = server.accept().await;
    link.push(&room_joined("L2"));
    link.push(&ServerMessage::MemberJoined {
        member: Member::new("u7", "Gus", "T1"),
        league_id: Some("L2".into()),
    });
    link.push(&ServerMessage::LeagueStatusChanged(LeagueStatus {
        league_id: "L2".into(),
        status: "drafting".into(),
        auction_id: Some("A9".into()),
    }));

    let view = until(&l2, "L2 status", |view| view.league_status.is_some()).await;
    assert!(view.ready);
    assert_eq!(view.members.len(), 1);

    let untouched = l1.snapshot();
    assert!(!untouched.ready);
    assert!(untouched.members.is_empty());
    assert!(untouched.league_status.is_none());
}

#[tokio::test(start_paused = true)]
async fn closed_session_leaves_and_ignores_late_events() {
    let (connector, mut server) = mock();
    let manager = manager(connector);
    let session = RoomSession::open(&manager, RoomKey::auction("A1"));

    let mut link = server.accept().await;
    link.next_messages_unordered(2).await;

    let view = session.watch();
    session.close();
    assert_eq!(
        link.next_message().await,
        ClientMessage::LeaveAuction {
            auction_id: "A1".into()
        }
    );
    assert!(manager.registered_rooms().is_empty());
    assert_eq!(manager.active_sessions(&RoomKey::auction("A1")), 0);

    link.push(&auction_snapshot("A1"));
    settle().await;
    assert!(!view.borrow().ready);
    assert!(view.borrow().auction.is_none());
}

#[tokio::test(start_paused = true)]
async fn closing_while_disconnected_is_inert() {
    let (connector, mut server) = mock();
    let manager = manager(connector);
    let session = RoomSession::open(&manager, RoomKey::league("L1"));
    assert!(!manager.is_connected());

    drop(session);
    assert!(manager.registered_rooms().is_empty());

    let mut link = server.accept().await;
    settle().await;
    assert!(link.drain().is_empty());
}

#[tokio::test(start_paused = true)]
async fn room_is_left_with_its_last_session() {
    let (connector, mut server) = mock();
    let manager = manager(connector);
    let key = RoomKey::league("L1");
    let first = RoomSession::open(&manager, key.clone());
    let second = RoomSession::open(&manager, key.clone());
    assert_eq!(manager.active_sessions(&key), 2);

    let mut link = server.accept().await;
    assert_eq!(link.next_message().await, join_league("L1"));

    drop(first);
    settle().await;
    assert!(link.drain().is_empty(), "left a room still in use");
    assert_eq!(manager.registered_rooms()[0].references, 1);

    // The remaining session is still replayed.
    drop(link);
    let mut link = server.accept().await;
    assert_eq!(link.next_message().await, join_league("L1"));

    drop(second);
    assert_eq!(
        link.next_message().await,
        ClientMessage::LeaveLeague {
            league_id: "L1".into()
        }
    );
    assert_eq!(manager.active_sessions(&key), 0);
}

#[tokio::test(start_paused = true)]
async fn undecodable_and_error_frames_do_not_disturb_sessions() {
    let (connector, mut server) = mock();
    let manager = manager(connector);
    let session = RoomSession::open(&manager, RoomKey::league("L1"));

    let link = server.accept().await;
    link.push_raw("{not json");
    link.push_raw(r#"{"type":"bid_placed","data":{}}"#);
    link.push(&ServerMessage::Error {
        message: "league is full".into(),
    });
    link.push(&room_joined("L1"));

    until(&session, "ready", |view| view.ready).await;
    assert!(manager.is_connected());
}

// ════════════════════════════════════════════════════════════════════
// Polling safety net
// ════════════════════════════════════════════════════════════════════

#[derive(Default)]
struct ScriptedSource {
    members: Mutex<Vec<Member>>,
    polls: AtomicUsize,
}

#[async_trait]
impl LeagueStateSource for ScriptedSource {
    async fn league_status(&self, league_id: &str) -> Result<LeagueStatus, SyncError> {
        Ok(LeagueStatus {
            league_id: league_id.to_owned(),
            status: "open".into(),
            auction_id: None,
        })
    }

    async fn league_members(&self, _league_id: &str) -> Result<Vec<Member>, SyncError> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        Ok(self.members.lock().unwrap().clone())
    }
}

#[tokio::test(start_paused = true)]
async fn polling_repairs_a_missed_push_until_closed() {
    let (connector, mut server) = mock();
    let config = SyncConfig::default().with_poll_interval(Duration::from_secs(3));
    let manager = ConnectionManager::new(connector, config);
    let source = Arc::new(ScriptedSource::default());
    let session = RoomSession::open_with(
        &manager,
        RoomKey::league("L1"),
        SessionOptions::new()
            .with_user(ann())
            .with_state_source(source.clone()),
    );

    let link = server.accept().await;
    link.push(&ServerMessage::MemberJoined {
        member: Member::new("u1", "Ann", "T1"),
        league_id: None,
    });
    until(&session, "pushed member", |view| view.members.len() == 1).await;

    // Bo joins but the push is lost; the next poll brings them in.
    *source.members.lock().unwrap() = vec![
        Member::new("u1", "Ann", "T1"),
        Member::new("u2", "Bo", "T2"),
    ];
    let view = until(&session, "polled members", |view| view.members.len() == 2).await;
    assert_eq!(view.league_status.map(|s| s.status).as_deref(), Some("open"));

    session.close();
    let polls = source.polls.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(source.polls.load(Ordering::SeqCst), polls);
}

#[tokio::test(start_paused = true)]
async fn auction_sessions_never_poll() {
    let (connector, mut server) = mock();
    let manager = manager(connector);
    let source = Arc::new(ScriptedSource::default());
    let _session = RoomSession::open_with(
        &manager,
        RoomKey::auction("A1"),
        SessionOptions::new().with_state_source(source.clone()),
    );
    let _link = server.accept().await;

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(source.polls.load(Ordering::SeqCst), 0);
}
