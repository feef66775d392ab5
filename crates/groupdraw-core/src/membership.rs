//! Session membership tracking.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of one peer device in a shared session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Participant(Uuid);

impl Participant {
    /// A fresh random participant id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for Participant {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Participant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Differences reported by one membership notification.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MembershipChange {
    /// Peers present now that were not present before.
    pub joined: HashSet<Participant>,
    /// Peers present before that are gone now.
    pub left: HashSet<Participant>,
}

impl MembershipChange {
    pub fn is_empty(&self) -> bool {
        self.joined.is_empty() && self.left.is_empty()
    }
}

/// Tracks the active participants of the current session.
///
/// The set only changes through [`MembershipTracker::update`], which is fed by
/// transport notifications. The local participant never counts as joined:
/// it has nothing to catch up on from itself.
#[derive(Debug, Default)]
pub struct MembershipTracker {
    local: Option<Participant>,
    active: HashSet<Participant>,
}

impl MembershipTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a new session for the given local participant.
    pub fn reset(&mut self, local: Option<Participant>) {
        self.local = local;
        self.active.clear();
    }

    pub fn active_participants(&self) -> &HashSet<Participant> {
        &self.active
    }

    /// Diff `current` against the stored set, then store it.
    pub fn update(&mut self, current: HashSet<Participant>) -> MembershipChange {
        let joined = current
            .difference(&self.active)
            .filter(|p| Some(**p) != self.local)
            .copied()
            .collect();
        let left = self
            .active
            .difference(&current)
            .filter(|p| Some(**p) != self.local)
            .copied()
            .collect();

        self.active = current;
        MembershipChange { joined, left }
    }
}
