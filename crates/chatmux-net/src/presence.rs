//! Online-user tracking.
//!
//! The backend pushes a full snapshot of connected usernames every time
//! someone connects or disconnects. Each snapshot replaces the previous one
//! outright; the tracker never merges snapshots and never expires entries on
//! its own.

use std::collections::BTreeSet;

use tracing::debug;

use chatmux_shared::Identity;

/// The set of users currently online, excluding the local user.
#[derive(Debug, Clone, Default)]
pub struct PresenceTracker {
    online: BTreeSet<Identity>,
}

impl PresenceTracker {
    /// Create a new, empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the online set with `snapshot`, minus `me`.
    ///
    /// Returns `true` if the set changed.
    pub fn apply_snapshot<I>(&mut self, snapshot: I, me: &Identity) -> bool
    where
        I: IntoIterator<Item = Identity>,
    {
        let next: BTreeSet<Identity> = snapshot.into_iter().filter(|id| id != me).collect();
        if next == self.online {
            return false;
        }

        debug!(
            online = next.len(),
            previous = self.online.len(),
            "Applied presence snapshot"
        );
        self.online = next;
        true
    }

    /// Check whether a user is in the latest snapshot.
    pub fn is_online(&self, identity: &Identity) -> bool {
        self.online.contains(identity)
    }

    /// The latest snapshot, sorted.
    pub fn online(&self) -> &BTreeSet<Identity> {
        &self.online
    }

    /// Return the number of online users.
    pub fn online_count(&self) -> usize {
        self.online.len()
    }

    /// Forget everything. Called when the session ends.
    pub fn clear(&mut self) {
        self.online.clear();
    }
}
