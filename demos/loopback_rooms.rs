//! # Loopback Rooms Example
//!
//! Runs a tiny in-process room server on `127.0.0.1` and drives it with the
//! real WebSocket connector:
//!
//! 1. Open a league session and an auction session
//! 2. Wait for both to become ready
//! 3. The server drops the first connection; watch the client reconnect
//!    and replay both rooms exactly once
//! 4. Close the sessions and disconnect
//!
//! ## Running
//!
//! ```sh
//! cargo run --example loopback_rooms
//!
//! # Lifecycle detail:
//! RUST_LOG=auction_sync_client=debug cargo run --example loopback_rooms
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use auction_sync_client::protocol::{AuctionState, ClientMessage, Member, ServerMessage};
use auction_sync_client::{
    ConnectionManager, RoomKey, RoomSession, SessionOptions, SyncConfig, UserIdentity,
    WebSocketConnector,
};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::protocol::Message;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // ── Logging ─────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // ── Server ──────────────────────────────────────────────────────
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let url = format!("ws://{}", listener.local_addr()?);
    tokio::spawn(serve(listener));
    tracing::info!("room server listening on {url}");

    // ── Client ──────────────────────────────────────────────────────
    let manager = ConnectionManager::new(WebSocketConnector::new(url), SyncConfig::default());
    let user = UserIdentity::new("u1", "Ann", "ann@example.com");

    let league = RoomSession::open_with(
        &manager,
        RoomKey::league("L1"),
        SessionOptions::new().with_user(user),
    );
    let auction = RoomSession::open(&manager, RoomKey::auction("A1"));

    league.wait_ready().await?;
    auction.wait_ready().await?;
    tracing::info!(members = ?league.members(), "league ready");
    tracing::info!(auction = ?auction.auction_state(), "auction ready");

    // ── Reconnect ───────────────────────────────────────────────────
    // The server hangs up on the first connection; both sessions drop to
    // not-ready and come back once the replayed joins are answered.
    let mut view = league.watch();
    view.wait_for(|snapshot| !snapshot.connected).await?;
    tracing::info!("league lost its connection");
    view.wait_for(|snapshot| snapshot.connected && snapshot.ready)
        .await?;
    tracing::info!(members = league.members().len(), "league ready again");

    // ── Shutdown ────────────────────────────────────────────────────
    league.close();
    auction.close();
    manager.disconnect().await;
    tracing::info!("done");
    Ok(())
}

/// Accept connections forever; the first one is dropped after a second.
async fn serve(listener: TcpListener) {
    let connections = Arc::new(AtomicUsize::new(0));
    while let Ok((tcp, _)) = listener.accept().await {
        let n = connections.fetch_add(1, Ordering::SeqCst);
        tokio::spawn(async move {
            let Ok(ws) = tokio_tungstenite::accept_async(tcp).await else {
                return;
            };
            let session = handle(ws);
            if n == 0 {
                let _ = tokio::time::timeout(Duration::from_secs(1), session).await;
                tracing::warn!("server dropping connection #{n}");
            } else {
                session.await;
            }
        });
    }
}

/// Answer joins the way the real room server does.
async fn handle(mut ws: tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>) {
    while let Some(Ok(frame)) = ws.next().await {
        let Message::Text(text) = frame else {
            continue;
        };
        let Ok(msg) = serde_json::from_str::<ClientMessage>(text.as_str()) else {
            continue;
        };
        tracing::info!(event = msg.event_name(), "server received");

        let replies = match msg {
            ClientMessage::JoinLeague { league_id, .. } => vec![
                ServerMessage::RoomJoined {
                    league_id: league_id.clone(),
                },
                ServerMessage::SyncMembers {
                    members: vec![
                        Member::new("u1", "Ann", "2026-01-01T00:00:00Z"),
                        Member::new("u2", "Bo", "2026-01-01T00:01:00Z"),
                    ],
                    league_id: Some(league_id),
                },
            ],
            ClientMessage::SyncState { auction_id } => {
                let mut fields = serde_json::Map::new();
                fields.insert("currentLot".into(), serde_json::json!(1));
                vec![ServerMessage::SyncState {
                    auction: AuctionState {
                        id: auction_id,
                        fields,
                    },
                }]
            }
            _ => Vec::new(),
        };

        for reply in replies {
            let Ok(json) = serde_json::to_string(&reply) else {
                continue;
            };
            if ws.send(Message::Text(json.into())).await.is_err() {
                return;
            }
        }
    }
}
