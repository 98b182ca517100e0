//! Pause registry: senders whose automated replies are suspended.
//!
//! A pause starts when the operator replies manually (or on command) and ends
//! when its duration elapses or on an explicit resume. Expiry is lazy: an
//! expired entry is removed the next time it is checked.

use std::collections::{HashMap, HashSet};
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

use crate::conversation::SenderId;

/// Why a sender was paused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseReason {
    OperatorReply,
    ManualCommand,
}

impl fmt::Display for PauseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OperatorReply => f.write_str("operator-reply"),
            Self::ManualCommand => f.write_str("manual-command"),
        }
    }
}

/// An active pause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PauseEntry {
    pub paused_at: DateTime<Utc>,
    pub reason: PauseReason,
}

impl PauseEntry {
    fn is_active(&self, now: DateTime<Utc>, duration: Duration) -> bool {
        now - self.paused_at < duration
    }
}

#[derive(Debug, Default)]
pub struct PauseRegistry {
    entries: HashMap<SenderId, PauseEntry>,
}

impl PauseRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite the pause for `id`, starting at `now`.
    pub fn pause(&mut self, id: &SenderId, reason: PauseReason, now: DateTime<Utc>) {
        info!(sender = %id, reason = %reason, "Auto-replies paused");
        self.entries.insert(
            id.clone(),
            PauseEntry {
                paused_at: now,
                reason,
            },
        );
    }

    /// Remove the pause for `id`. Returns `true` if one existed.
    pub fn resume(&mut self, id: &SenderId) -> bool {
        let existed = self.entries.remove(id).is_some();
        if existed {
            info!(sender = %id, "Auto-replies resumed");
        }
        existed
    }

    /// Whether `id` is paused at `now`. Expired entries are removed.
    pub fn is_paused(&mut self, id: &SenderId, now: DateTime<Utc>, duration: Duration) -> bool {
        let Some(entry) = self.entries.get(id) else {
            return false;
        };
        if entry.is_active(now, duration) {
            return true;
        }
        debug!(sender = %id, "Pause expired");
        self.entries.remove(id);
        false
    }

    /// Time left on the pause for `id`, if it is still active. Diagnostic only.
    pub fn remaining(&self, id: &SenderId, now: DateTime<Utc>, duration: Duration) -> Option<Duration> {
        let entry = self.entries.get(id)?;
        let remaining = duration - (now - entry.paused_at);
        (remaining > Duration::zero()).then_some(remaining)
    }

    pub fn entry(&self, id: &SenderId) -> Option<&PauseEntry> {
        self.entries.get(id)
    }

    /// Senders whose pause is still active, without removing expired entries.
    pub fn active_ids(&self, now: DateTime<Utc>, duration: Duration) -> HashSet<SenderId> {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.is_active(now, duration))
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Number of stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Whole minutes left, rounded up.
pub fn ceil_minutes(remaining: Duration) -> i64 {
    let secs = remaining.num_seconds().max(0);
    (secs + 59) / 60
}
