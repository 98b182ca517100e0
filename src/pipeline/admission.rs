//! Admission filter: decides whether an inbound message gets an automated reply.
//!
//! Evaluated in strict order, first match wins:
//! - group-originated messages → reject
//! - blacklisted senders → reject (beats every other rule, reply-all included)
//! - reply-all off and sender not whitelisted → reject
//! - otherwise → accept

use std::collections::HashSet;
use std::fmt;

use tracing::debug;

use crate::conversation::SenderId;

/// Why an inbound message was not admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    GroupOrigin,
    Blacklisted,
    NotWhitelisted,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::GroupOrigin => "group-origin",
            Self::Blacklisted => "blacklisted",
            Self::NotWhitelisted => "not-whitelisted",
        };
        f.write_str(s)
    }
}

/// Result of an admission decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Accept,
    Reject(RejectReason),
}

impl Admission {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accept)
    }
}

/// Pure admission decision.
pub fn decide(
    sender: &SenderId,
    is_group: bool,
    blacklist: &HashSet<SenderId>,
    whitelist: &HashSet<SenderId>,
    reply_all: bool,
) -> Admission {
    if is_group {
        return Admission::Reject(RejectReason::GroupOrigin);
    }
    if blacklist.contains(sender) {
        return Admission::Reject(RejectReason::Blacklisted);
    }
    if !reply_all && !whitelist.contains(sender) {
        return Admission::Reject(RejectReason::NotWhitelisted);
    }
    Admission::Accept
}

/// The configured membership lists and reply-all flag.
#[derive(Debug, Clone, Default)]
pub struct AdmissionPolicy {
    pub whitelist: HashSet<SenderId>,
    pub blacklist: HashSet<SenderId>,
    pub reply_all: bool,
}

impl AdmissionPolicy {
    pub fn new(
        whitelist: impl IntoIterator<Item = SenderId>,
        blacklist: impl IntoIterator<Item = SenderId>,
        reply_all: bool,
    ) -> Self {
        Self {
            whitelist: whitelist.into_iter().collect(),
            blacklist: blacklist.into_iter().collect(),
            reply_all,
        }
    }

    pub fn decide(&self, sender: &SenderId, is_group: bool) -> Admission {
        let admission = decide(
            sender,
            is_group,
            &self.blacklist,
            &self.whitelist,
            self.reply_all,
        );
        debug!(sender = %sender, is_group, admission = ?admission, "Admission decided");
        admission
    }
}
