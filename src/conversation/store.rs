//! Conversation store: in-memory map from sender to conversation record.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::model::{ConversationRecord, RETENTION_WINDOW, SenderId, Turn};

/// The full store contents, as written to and read from a snapshot.
pub type Snapshot = HashMap<SenderId, ConversationRecord>;

/// Read-only summary of one conversation (served on `/memory`).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub id: SenderId,
    pub contact_name: Option<String>,
    pub message_count: usize,
    pub first_contact_at: DateTime<Utc>,
    pub last_contact_at: DateTime<Utc>,
    pub last_message: Option<String>,
}

/// In-memory conversation store shared by the relay and the HTTP handlers.
pub struct ConversationStore {
    records: RwLock<Snapshot>,
    retention: usize,
}

impl ConversationStore {
    /// Create an empty store.
    pub fn new() -> Arc<Self> {
        Self::from_snapshot(Snapshot::new())
    }

    /// Create a store seeded from a previously persisted snapshot.
    ///
    /// Records longer than the retention window are truncated on load.
    pub fn from_snapshot(mut snapshot: Snapshot) -> Arc<Self> {
        for record in snapshot.values_mut() {
            if record.messages.len() > RETENTION_WINDOW {
                let excess = record.messages.len() - RETENTION_WINDOW;
                record.messages.drain(..excess);
            }
        }
        info!(conversations = snapshot.len(), "Conversation store loaded");
        Arc::new(Self {
            records: RwLock::new(snapshot),
            retention: RETENTION_WINDOW,
        })
    }

    /// Append a turn, creating the record if needed.
    ///
    /// Creation sets both contact timestamps to `now`. Returns the updated record.
    pub async fn append(&self, id: &SenderId, turn: Turn, now: DateTime<Utc>) -> ConversationRecord {
        let mut records = self.records.write().await;
        let record = records.entry(id.clone()).or_insert_with(|| {
            debug!(sender = %id, "New conversation");
            ConversationRecord::new(now)
        });
        record.push(turn, self.retention);
        record.clone()
    }

    /// Update `lastContactAt` for a known sender. Returns `false` for unknown senders.
    pub async fn touch(&self, id: &SenderId, now: DateTime<Utc>) -> bool {
        let mut records = self.records.write().await;
        match records.get_mut(id) {
            Some(record) => {
                record.touch(now);
                true
            }
            None => false,
        }
    }

    /// Store a contact name unless one is already set.
    pub async fn set_contact_name(&self, id: &SenderId, name: &str) -> bool {
        let mut records = self.records.write().await;
        records
            .get_mut(id)
            .is_some_and(|record| record.set_contact_name_if_absent(name))
    }

    pub async fn contact_name(&self, id: &SenderId) -> Option<String> {
        let records = self.records.read().await;
        records.get(id).and_then(|r| r.contact_name.clone())
    }

    pub async fn get(&self, id: &SenderId) -> Option<ConversationRecord> {
        self.records.read().await.get(id).cloned()
    }

    /// The last `n` turns for a sender (empty if unknown).
    pub async fn recent(&self, id: &SenderId, n: usize) -> Vec<Turn> {
        let records = self.records.read().await;
        records
            .get(id)
            .map(|r| r.recent(n).to_vec())
            .unwrap_or_default()
    }

    /// Purge one conversation. Returns `true` if it existed.
    pub async fn remove(&self, id: &SenderId) -> bool {
        let removed = self.records.write().await.remove(id).is_some();
        if removed {
            info!(sender = %id, "Conversation purged");
        }
        removed
    }

    /// Identifiers of all known senders.
    pub async fn ids(&self) -> Vec<SenderId> {
        self.records.read().await.keys().cloned().collect()
    }

    /// Summaries of all conversations, most recently active first.
    pub async fn summaries(&self) -> Vec<ConversationSummary> {
        let records = self.records.read().await;
        let mut summaries: Vec<ConversationSummary> = records
            .iter()
            .map(|(id, record)| ConversationSummary {
                id: id.clone(),
                contact_name: record.contact_name.clone(),
                message_count: record.messages.len(),
                first_contact_at: record.first_contact_at,
                last_contact_at: record.last_contact_at,
                last_message: record.messages.last().map(|t| t.content.clone()),
            })
            .collect();
        summaries.sort_by(|a, b| b.last_contact_at.cmp(&a.last_contact_at));
        summaries
    }

    /// Copy of the full store contents for persistence.
    pub async fn snapshot(&self) -> Snapshot {
        self.records.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}
