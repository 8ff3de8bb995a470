//! League membership reconciliation.
//!
//! Two event shapes feed one list:
//!
//! - `member_joined` is an **upsert** keyed by `user_id`: an existing row is
//!   replaced in place, a new user is appended. Duplicate deliveries (for
//!   example a reconnect re-announcing the same user) never add rows.
//! - `sync_members` is **authoritative**: the list is replaced wholesale.
//!
//! No timestamps are compared. Whichever event is applied last wins; the
//! server is expected to send a sync after any upserts it supersedes.

use crate::protocol::Member;

/// Membership of one league room, at most one row per `user_id`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemberList {
    members: Vec<Member>,
}

impl MemberList {
    /// Create an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `member`, or overwrite the row with the same `user_id`.
    pub fn upsert(&mut self, member: Member) {
        match self
            .members
            .iter_mut()
            .find(|existing| existing.user_id == member.user_id)
        {
            Some(existing) => *existing = member,
            None => self.members.push(member),
        }
    }

    /// Replace the whole list with the authoritative `members`.
    ///
    /// The result has one row per distinct `user_id`. A malformed sync that
    /// repeats an id therefore yields fewer rows than it carried; the later
    /// row wins.
    pub fn replace(&mut self, members: Vec<Member>) {
        self.members.clear();
        for member in members {
            self.upsert(member);
        }
    }

    /// Members in display order.
    pub fn as_slice(&self) -> &[Member] {
        &self.members
    }

    /// Look up a member by user id.
    pub fn get(&self, user_id: &str) -> Option<&Member> {
        self.members.iter().find(|member| member.user_id == user_id)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

impl From<Vec<Member>> for MemberList {
    fn from(members: Vec<Member>) -> Self {
        let mut list = Self::new();
        list.replace(members);
        list
    }
}
