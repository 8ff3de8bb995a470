//! Active-session gauge per room key.
//!
//! Purely diagnostic: a count that keeps growing for one room usually means a
//! UI component leaks its session. Nothing in the crate makes decisions from
//! these numbers.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::room::RoomKey;

/// Hook for exporting session gauges to the host's metrics system.
pub trait SessionMetricsReporter: Send + Sync + 'static {
    /// `active` sessions are currently open for `room`.
    fn record_active_sessions(&self, room: &RoomKey, active: usize);
}

/// Shared handle to a metrics hook.
pub type SessionMetricsHook = Arc<dyn SessionMetricsReporter>;

/// Reporter that only logs the gauge.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingMetrics;

impl SessionMetricsReporter for TracingMetrics {
    fn record_active_sessions(&self, room: &RoomKey, active: usize) {
        debug!(room = %room, active, "active room sessions");
    }
}

/// Process-wide count of open sessions per room key.
pub struct ActiveSessions {
    counts: Mutex<HashMap<RoomKey, usize>>,
    hook: SessionMetricsHook,
}

impl ActiveSessions {
    /// Create a gauge reporting through `hook`.
    pub fn new(hook: SessionMetricsHook) -> Self {
        Self {
            counts: Mutex::new(HashMap::new()),
            hook,
        }
    }

    /// A session for `room` opened. Returns the new count.
    pub fn opened(&self, room: &RoomKey) -> usize {
        let active = {
            let mut counts = self.counts.lock().unwrap_or_else(|e| e.into_inner());
            let count = counts.entry(room.clone()).or_insert(0);
            *count += 1;
            *count
        };
        self.hook.record_active_sessions(room, active);
        active
    }

    /// A session for `room` closed. Returns the new count.
    pub fn closed(&self, room: &RoomKey) -> usize {
        let active = {
            let mut counts = self.counts.lock().unwrap_or_else(|e| e.into_inner());
            match counts.get_mut(room) {
                Some(count) if *count > 1 => {
                    *count -= 1;
                    *count
                }
                _ => {
                    counts.remove(room);
                    0
                }
            }
        };
        self.hook.record_active_sessions(room, active);
        active
    }

    /// Current count for `room`.
    pub fn get(&self, room: &RoomKey) -> usize {
        self.counts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(room)
            .copied()
            .unwrap_or(0)
    }
}

impl std::fmt::Debug for ActiveSessions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let counts = self.counts.lock().unwrap_or_else(|e| e.into_inner());
        f.debug_struct("ActiveSessions")
            .field("counts", &*counts)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Last(Mutex<Option<(RoomKey, usize)>>);

    impl SessionMetricsReporter for Last {
        fn record_active_sessions(&self, room: &RoomKey, active: usize) {
            *self.0.lock().unwrap() = Some((room.clone(), active));
        }
    }

    #[test]
    fn counts_per_room_and_reports_each_change() {
        let hook = Arc::new(Last::default());
        let gauge = ActiveSessions::new(hook.clone());
        let l1 = RoomKey::league("L1");

        assert_eq!(gauge.opened(&l1), 1);
        assert_eq!(gauge.opened(&l1), 2);
        assert_eq!(gauge.opened(&RoomKey::auction("L1")), 1);
        assert_eq!(gauge.closed(&l1), 1);
        assert_eq!(*hook.0.lock().unwrap(), Some((l1.clone(), 1)));

        assert_eq!(gauge.closed(&l1), 0);
        assert_eq!(gauge.closed(&l1), 0);
        assert_eq!(gauge.get(&l1), 0);
    }
}
