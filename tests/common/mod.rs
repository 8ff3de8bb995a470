#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing,
    dead_code
)]
//! Shared test utilities for the room synchronization integration tests.
//!
//! Provides a channel-backed [`MockConnector`]: every successful dial hands
//! the test a [`ServerLink`] through [`MockServer::accept`], which plays the
//! server side of that one connection. Dropping the link drops the
//! connection, so tests can exercise reconnect and replay.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use auction_sync_client::protocol::{ClientMessage, ServerMessage};
use auction_sync_client::{Connector, Notice, NoticeId, NoticeKind, Notifier, SyncError, Transport};
use tokio::sync::mpsc;

/// Generous bound for anything the tests wait on. Under paused time this is
/// virtual, so it only fires when the awaited thing never happens.
pub const WAIT: Duration = Duration::from_secs(60);

// ── MockTransport ───────────────────────────────────────────────────

/// Client side of one scripted connection.
struct MockTransport {
    to_server: mpsc::UnboundedSender<String>,
    from_server: mpsc::UnboundedReceiver<String>,
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, message: String) -> Result<(), SyncError> {
        self.to_server
            .send(message)
            .map_err(|_| SyncError::TransportSend("server link dropped".into()))
    }

    async fn recv(&mut self) -> Option<Result<String, SyncError>> {
        // `None` once the test drops the link.
        self.from_server.recv().await.map(Ok)
    }

    async fn close(&mut self) -> Result<(), SyncError> {
        self.from_server.close();
        Ok(())
    }
}

// ── MockConnector ───────────────────────────────────────────────────

/// Connector whose dials are answered by the paired [`MockServer`].
pub struct MockConnector {
    links: mpsc::UnboundedSender<ServerLink>,
    fail_next: Arc<AtomicU32>,
    dials: Arc<AtomicU32>,
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self) -> Result<Box<dyn Transport>, SyncError> {
        self.dials.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(SyncError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "connection refused",
            )));
        }

        let (to_server, from_client) = mpsc::unbounded_channel();
        let (to_client, from_server) = mpsc::unbounded_channel();
        self.links
            .send(ServerLink {
                from_client,
                to_client,
            })
            .map_err(|_| SyncError::TransportClosed)?;

        Ok(Box::new(MockTransport {
            to_server,
            from_server,
        }))
    }
}

/// Test-side view of the connector.
pub struct MockServer {
    links: mpsc::UnboundedReceiver<ServerLink>,
    fail_next: Arc<AtomicU32>,
    dials: Arc<AtomicU32>,
}

impl MockServer {
    /// Wait for the client's next successful dial.
    pub async fn accept(&mut self) -> ServerLink {
        tokio::time::timeout(WAIT, self.links.recv())
            .await
            .expect("timed out waiting for the client to connect")
            .expect("connector dropped")
    }

    /// Refuse the next `n` dials.
    pub fn fail_next_dials(&self, n: u32) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Dials attempted so far, failed ones included.
    pub fn dials(&self) -> u32 {
        self.dials.load(Ordering::SeqCst)
    }
}

/// Create a connected connector/server pair.
pub fn mock() -> (MockConnector, MockServer) {
    let (links_tx, links_rx) = mpsc::unbounded_channel();
    let fail_next = Arc::new(AtomicU32::new(0));
    let dials = Arc::new(AtomicU32::new(0));
    (
        MockConnector {
            links: links_tx,
            fail_next: Arc::clone(&fail_next),
            dials: Arc::clone(&dials),
        },
        MockServer {
            links: links_rx,
            fail_next,
            dials,
        },
    )
}

// ── ServerLink ──────────────────────────────────────────────────────

/// Server side of one connection. Drop it to drop the connection.
pub struct ServerLink {
    from_client: mpsc::UnboundedReceiver<String>,
    to_client: mpsc::UnboundedSender<String>,
}

impl ServerLink {
    /// Push a server message to the client.
    pub fn push(&self, msg: &ServerMessage) {
        let json = serde_json::to_string(msg).expect("serialize server message");
        self.push_raw(&json);
    }

    /// Push a raw text frame.
    pub fn push_raw(&self, text: &str) {
        self.to_client
            .send(text.to_owned())
            .expect("client transport dropped");
    }

    /// Next message the client sent on this connection.
    pub async fn next_message(&mut self) -> ClientMessage {
        let json = tokio::time::timeout(WAIT, self.from_client.recv())
            .await
            .expect("timed out waiting for a client message")
            .expect("client closed the connection");
        serde_json::from_str(&json).expect("client sent an undecodable message")
    }

    /// The next `n` messages, sorted by wire form so order does not matter.
    pub async fn next_messages_unordered(&mut self, n: usize) -> Vec<ClientMessage> {
        let mut messages = Vec::with_capacity(n);
        for _ in 0..n {
            messages.push(self.next_message().await);
        }
        sort_by_wire(&mut messages);
        messages
    }

    /// Everything already sent and not yet read.
    pub fn drain(&mut self) -> Vec<ClientMessage> {
        let mut messages = Vec::new();
        while let Ok(json) = self.from_client.try_recv() {
            messages.push(serde_json::from_str(&json).expect("undecodable client message"));
        }
        messages
    }
}

pub fn sort_by_wire(messages: &mut [ClientMessage]) {
    messages.sort_by_key(|msg| serde_json::to_string(msg).unwrap_or_default());
}

// ── Notices ─────────────────────────────────────────────────────────

/// Notifier that records what it was asked to show.
#[derive(Debug, Default, Clone)]
pub struct RecordingNotifier {
    log: Arc<Mutex<Vec<String>>>,
    shown: Arc<Mutex<Vec<NoticeKind>>>,
}

impl RecordingNotifier {
    /// `show <Kind>` and `dismiss` entries, in order.
    pub fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    /// Kinds of every notice shown, in order.
    pub fn shown(&self) -> Vec<NoticeKind> {
        self.shown.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn show(&self, notice: &Notice) {
        self.shown.lock().unwrap().push(notice.kind);
        self.log
            .lock()
            .unwrap()
            .push(format!("show {:?}", notice.kind));
    }

    fn dismiss(&self, _id: NoticeId) {
        self.log.lock().unwrap().push("dismiss".into());
    }
}

// ── Misc ────────────────────────────────────────────────────────────

/// Let spawned tasks run until they block.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

/// Route `tracing` output through the test harness. Honors `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
