//! Connection and session tuning.

use std::time::Duration;

/// Default capacity of the broadcast channel sessions listen on.
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

/// Default timeout for the graceful shutdown.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// Default bound on a single transport handshake.
const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(20);

/// Default period of the polling safety net.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Default display time of short-lived notices.
const DEFAULT_BRIEF_NOTICE: Duration = Duration::from_secs(2);

// ── Reconnection ────────────────────────────────────────────────────

/// Bounded, linearly-capped reconnection backoff.
///
/// The delay before attempt `n` (1-based) is `min(base_delay * n, max_delay)`.
///
/// ```
/// use auction_sync_client::config::ReconnectPolicy;
/// use std::time::Duration;
///
/// let policy = ReconnectPolicy::default();
/// assert_eq!(policy.delay_for(1), Duration::from_secs(1));
/// assert_eq!(policy.delay_for(3), Duration::from_secs(3));
/// assert_eq!(policy.delay_for(9), Duration::from_secs(5));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Attempts made after a drop before giving up. Zero disables reconnection.
    pub max_attempts: u32,
    /// Delay increment per attempt.
    pub base_delay: Duration,
    /// Ceiling on the delay between attempts.
    pub max_delay: Duration,
}

impl ReconnectPolicy {
    /// Delay to wait before reconnection attempt `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(attempt.max(1))
            .min(self.max_delay)
    }

    /// Whether attempt `attempt` (1-based) is still within budget.
    pub fn allows(&self, attempt: u32) -> bool {
        attempt <= self.max_attempts
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
        }
    }
}

// ── SyncConfig ──────────────────────────────────────────────────────

/// Configuration for a [`ConnectionManager`](crate::ConnectionManager).
///
/// # Example
///
/// ```
/// use auction_sync_client::config::{ReconnectPolicy, SyncConfig};
/// use std::time::Duration;
///
/// let config = SyncConfig::default()
///     .with_reconnect(ReconnectPolicy {
///         max_attempts: 5,
///         ..ReconnectPolicy::default()
///     })
///     .with_poll_interval(Duration::from_secs(10));
/// assert_eq!(config.reconnect.max_attempts, 5);
/// ```
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Reconnection attempts and backoff.
    pub reconnect: ReconnectPolicy,
    /// Upper bound on one transport handshake.
    ///
    /// Defaults to **20 seconds**.
    pub handshake_timeout: Duration,
    /// Capacity of the event fan-out channel.
    ///
    /// A listener that falls this far behind skips events (with a warning);
    /// the polling safety net then restores authoritative state.
    ///
    /// Defaults to **256**. Values below 1 are clamped to 1.
    pub event_channel_capacity: usize,
    /// Time given to the connection task to close the transport on
    /// [`disconnect`](crate::ConnectionManager::disconnect) before it is
    /// aborted.
    ///
    /// Defaults to **1 second**.
    pub shutdown_timeout: Duration,
    /// Period of the polling safety net for league sessions.
    ///
    /// Shorter periods bound staleness after a missed push more tightly at the
    /// cost of two REST calls per mounted league session per period.
    ///
    /// Defaults to **3 seconds**.
    pub poll_interval: Duration,
    /// Display time of the "reconnected" confirmation and server error notices.
    ///
    /// Defaults to **2 seconds**.
    pub brief_notice_duration: Duration,
}

impl SyncConfig {
    /// Set the reconnection policy.
    #[must_use]
    pub fn with_reconnect(mut self, reconnect: ReconnectPolicy) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Set the handshake timeout.
    #[must_use]
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Set the event channel capacity. Values below 1 are clamped to 1.
    #[must_use]
    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity.max(1);
        self
    }

    /// Set the graceful shutdown timeout.
    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Set the polling safety net period.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the display time of brief notices.
    #[must_use]
    pub fn with_brief_notice_duration(mut self, duration: Duration) -> Self {
        self.brief_notice_duration = duration;
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            reconnect: ReconnectPolicy::default(),
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            brief_notice_duration: DEFAULT_BRIEF_NOTICE,
        }
    }
}
