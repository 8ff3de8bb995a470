//! Polling safety net for league sessions.
//!
//! Push delivery has no end-to-end acknowledgement, so a lost `member_joined`
//! or `league_status_changed` is otherwise undetectable. While a league
//! session is open, a fixed-interval task re-fetches league status and
//! membership through a [`LeagueStateSource`] and applies both as
//! authoritative, exactly like a `sync_members` push.
//!
//! The interval is a cost/staleness tradeoff: every open league session costs
//! two requests per tick. See [`SyncConfig::poll_interval`](crate::SyncConfig::poll_interval).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::error::Result;
use crate::protocol::{LeagueId, LeagueStatus, Member};

/// Request/response access to the authoritative league state.
///
/// The same calls the host uses for initial page load.
#[async_trait]
pub trait LeagueStateSource: Send + Sync + 'static {
    /// Current status of `league_id`.
    async fn league_status(&self, league_id: &str) -> Result<LeagueStatus>;

    /// Full membership of `league_id`.
    async fn league_members(&self, league_id: &str) -> Result<Vec<Member>>;
}

/// Outcome of one poll. A failed call leaves its half `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolledState {
    pub status: Option<LeagueStatus>,
    pub members: Option<Vec<Member>>,
}

impl PolledState {
    /// Whether neither call succeeded.
    pub fn is_empty(&self) -> bool {
        self.status.is_none() && self.members.is_none()
    }
}

/// Issue both calls concurrently. Failures are logged and dropped.
pub async fn poll_once(source: &dyn LeagueStateSource, league_id: &str) -> PolledState {
    let (status, members) = tokio::join!(
        source.league_status(league_id),
        source.league_members(league_id)
    );

    PolledState {
        status: status
            .inspect_err(|e| warn!(league = league_id, "league status poll failed: {e}"))
            .ok(),
        members: members
            .inspect_err(|e| warn!(league = league_id, "league members poll failed: {e}"))
            .ok(),
    }
}

/// Spawn the polling task for `league_id`.
///
/// The first poll happens one `interval` after spawning; initial state comes
/// from the join bootstrap. Abort the returned handle to stop polling.
pub(crate) fn spawn(
    source: Arc<dyn LeagueStateSource>,
    league_id: LeagueId,
    interval: Duration,
    apply: impl Fn(PolledState) + Send + Sync + 'static,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let polled = poll_once(source.as_ref(), &league_id).await;
            if polled.is_empty() {
                continue;
            }
            debug!(
                league = %league_id,
                members = polled.members.as_ref().map(Vec::len),
                "applying polled league state"
            );
            apply(polled);
        }
    })
}
