//! Conversation data model: sender identifiers, turns and per-sender records.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Number of turns retained per conversation.
pub const RETENTION_WINDOW: usize = 20;

/// Gateway suffix for individual chats.
pub const INDIVIDUAL_SUFFIX: &str = "@c.us";

/// Gateway suffix for group chats.
pub const GROUP_SUFFIX: &str = "@g.us";

/// A normalized phone-number-like sender identifier.
///
/// Free of gateway chat-type suffixes, a leading `+`, spaces and dashes, so
/// `+1 202-555-1234`, `12025551234@c.us` and `12025551234` are the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SenderId(String);

impl SenderId {
    /// Normalize a raw gateway identifier. Returns `None` if nothing usable remains.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        let without_suffix = raw.split('@').next().unwrap_or_default();
        let normalized: String = without_suffix
            .trim_start_matches('+')
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '-')
            .collect();

        if normalized.is_empty() {
            None
        } else {
            Some(Self(normalized))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Gateway chat id for a direct conversation with this sender.
    pub fn chat_id(&self) -> String {
        format!("{}{}", self.0, INDIVIDUAL_SUFFIX)
    }
}

impl fmt::Display for SenderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Whether a raw gateway identifier denotes a group chat.
pub fn is_group_chat(raw: &str) -> bool {
    raw.trim().ends_with(GROUP_SUFFIX)
}

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One message within a conversation's retained history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    pub fn user(content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            timestamp,
        }
    }

    pub fn assistant(content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            timestamp,
        }
    }
}

/// Per-sender conversational memory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationRecord {
    /// Display name, set once discovered.
    pub contact_name: Option<String>,
    /// Chronological turns, capped at the retention window.
    pub messages: Vec<Turn>,
    pub first_contact_at: DateTime<Utc>,
    pub last_contact_at: DateTime<Utc>,
}

impl ConversationRecord {
    /// Create an empty record first seen at `now`.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            contact_name: None,
            messages: Vec::new(),
            first_contact_at: now,
            last_contact_at: now,
        }
    }

    /// Append a turn, evicting the oldest turns beyond `retention`.
    pub fn push(&mut self, turn: Turn, retention: usize) {
        self.messages.push(turn);
        if self.messages.len() > retention {
            let excess = self.messages.len() - retention;
            self.messages.drain(..excess);
        }
    }

    /// The last `n` turns in chronological order.
    pub fn recent(&self, n: usize) -> &[Turn] {
        let start = self.messages.len().saturating_sub(n);
        &self.messages[start..]
    }

    /// Record the contact name unless one is already known.
    ///
    /// Returns `true` if the name was stored.
    pub fn set_contact_name_if_absent(&mut self, name: &str) -> bool {
        let name = name.trim();
        if self.contact_name.is_some() || name.is_empty() {
            return false;
        }
        self.contact_name = Some(name.to_string());
        true
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_contact_at = now;
    }
}
