//! Room interest recorded for reconnect replay.
//!
//! Each entry is reference counted: two sessions on the same room key hold
//! two references, and the entry survives until the last one releases it.

use std::collections::HashMap;
use std::time::SystemTime;

use crate::room::RoomKey;

/// One room the process is interested in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryEntry {
    pub room: RoomKey,
    /// When the first current reference was taken.
    pub joined_at: SystemTime,
    /// Open sessions holding this entry.
    pub references: usize,
}

/// Reference-counted set of rooms to rejoin after a reconnect.
#[derive(Debug, Default)]
pub struct RoomRegistry {
    entries: HashMap<RoomKey, RegistryEntry>,
    /// Bumped by [`clear`](Self::clear); references taken before then are void.
    generation: u64,
}

impl RoomRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Take a reference on `room`. Returns the reference count after the call.
    pub fn acquire(&mut self, room: &RoomKey) -> usize {
        let entry = self
            .entries
            .entry(room.clone())
            .or_insert_with(|| RegistryEntry {
                room: room.clone(),
                joined_at: SystemTime::now(),
                references: 0,
            });
        entry.references += 1;
        entry.references
    }

    /// Drop a reference on `room`; the entry is removed with its last
    /// reference. Returns the remaining count. Unknown rooms are ignored.
    pub fn release(&mut self, room: &RoomKey) -> usize {
        let Some(entry) = self.entries.get_mut(room) else {
            return 0;
        };
        entry.references = entry.references.saturating_sub(1);
        let remaining = entry.references;
        if remaining == 0 {
            self.entries.remove(room);
        }
        remaining
    }

    /// Forget every room and void every outstanding reference.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.generation += 1;
    }

    /// Current generation. A holder whose reference predates the last
    /// [`clear`](Self::clear) must not release it.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether `room` is registered.
    pub fn contains(&self, room: &RoomKey) -> bool {
        self.entries.contains_key(room)
    }

    /// Number of distinct rooms.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no room is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in the order they were first joined.
    pub fn entries(&self) -> Vec<RegistryEntry> {
        let mut entries: Vec<_> = self.entries.values().cloned().collect();
        entries.sort_by_key(|entry| entry.joined_at);
        entries
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn shared_room_survives_first_release() {
        let mut registry = RoomRegistry::new();
        let l1 = RoomKey::league("L1");

        assert_eq!(registry.acquire(&l1), 1);
        assert_eq!(registry.acquire(&l1), 2);
        assert_eq!(registry.len(), 1);

        assert_eq!(registry.release(&l1), 1);
        assert!(registry.contains(&l1));

        assert_eq!(registry.release(&l1), 0);
        assert!(!registry.contains(&l1));
    }

    #[test]
    fn release_of_unknown_room_is_ignored() {
        let mut registry = RoomRegistry::new();
        assert_eq!(registry.release(&RoomKey::auction("A1")), 0);
        assert!(registry.is_empty());
    }

    #[test]
    fn clear_drops_everything() {
        let mut registry = RoomRegistry::new();
        registry.acquire(&RoomKey::league("L1"));
        registry.acquire(&RoomKey::auction("A1"));
        let before = registry.generation();
        registry.clear();
        assert!(registry.is_empty());
        assert!(registry.entries().is_empty());
        assert_eq!(registry.generation(), before + 1);
    }

    #[test]
    fn entries_carry_reference_counts() {
        let mut registry = RoomRegistry::new();
        let a1 = RoomKey::auction("A1");
        registry.acquire(&a1);
        registry.acquire(&a1);
        let entries = registry.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].room, a1);
        assert_eq!(entries[0].references, 2);
    }
}
