//! The relay: dispatches classified gateway events and runs AI turns.
//!
//! Flow per event:
//! - operator typed a message by hand → pause that contact (never the operator)
//! - operator command in a direct chat → mutate the pause registry, acknowledge, stop
//! - inbound message → admission → pause check → AI turn → gateway send

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::admission::{Admission, RejectReason};
use super::commands::{self, Command};
use super::pause::{PauseReason, PauseRegistry, ceil_minutes};
use super::prompt;
use crate::config::RelayPolicy;
use crate::conversation::{ConversationStore, SenderId, SnapshotTrigger, Turn};
use crate::error::Result;
use crate::gateway::{Gateway, GatewayEvent, InboundMessage};
use crate::llm::{CompletionRequest, LlmProvider};

/// What the relay did with an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayOutcome {
    /// An AI reply was generated and sent.
    Replied { reply: String },
    /// The operator replied by hand; auto-replies for this contact are paused.
    PauseRecorded { sender: SenderId },
    /// An operator command was executed and acknowledged.
    CommandHandled(Command),
    Rejected(RejectReason),
    /// The sender is paused; nothing was sent.
    Paused { remaining_minutes: i64 },
    Ignored,
}

/// Counts reported by the `status` command and `/health`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayStatus {
    /// Known senders without an active pause.
    pub active: usize,
    /// Senders with an active pause.
    pub paused: usize,
    /// Senders with a conversation record.
    pub total: usize,
}

/// Message-admission and conversation-state engine.
pub struct Relay {
    policy: RelayPolicy,
    store: Arc<ConversationStore>,
    pauses: Mutex<PauseRegistry>,
    gateway: Arc<dyn Gateway>,
    llm: Arc<dyn LlmProvider>,
    snapshots: SnapshotTrigger,
}

impl Relay {
    pub fn new(
        policy: RelayPolicy,
        store: Arc<ConversationStore>,
        gateway: Arc<dyn Gateway>,
        llm: Arc<dyn LlmProvider>,
        snapshots: SnapshotTrigger,
    ) -> Self {
        Self {
            policy,
            store,
            pauses: Mutex::new(PauseRegistry::new()),
            gateway,
            llm,
            snapshots,
        }
    }

    pub fn policy(&self) -> &RelayPolicy {
        &self.policy
    }

    pub fn store(&self) -> &Arc<ConversationStore> {
        &self.store
    }

    pub fn snapshots(&self) -> &SnapshotTrigger {
        &self.snapshots
    }

    fn pauses(&self) -> MutexGuard<'_, PauseRegistry> {
        // A panic while holding the lock cannot leave the map half-updated.
        self.pauses.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Handle an event at the current time.
    pub async fn handle(&self, event: GatewayEvent) -> Result<RelayOutcome> {
        self.handle_at(event, Utc::now()).await
    }

    /// Handle an event as if it arrived at `now`.
    pub async fn handle_at(&self, event: GatewayEvent, now: DateTime<Utc>) -> Result<RelayOutcome> {
        match event {
            GatewayEvent::Outbound { recipient } => {
                if self.policy.operator.as_ref() == Some(&recipient) {
                    info!(recipient = %recipient, "Outgoing message resolved to the operator, not pausing");
                    return Ok(RelayOutcome::Ignored);
                }
                self.pauses().pause(&recipient, PauseReason::OperatorReply, now);
                Ok(RelayOutcome::PauseRecorded { sender: recipient })
            }
            GatewayEvent::Inbound(message) => self.handle_inbound(message, now).await,
            GatewayEvent::Ignored(reason) => {
                debug!(reason = ?reason, "Event ignored");
                Ok(RelayOutcome::Ignored)
            }
        }
    }

    async fn handle_inbound(&self, message: InboundMessage, now: DateTime<Utc>) -> Result<RelayOutcome> {
        let sender = &message.sender;
        info!(sender = %sender, chars = message.text.chars().count(), "Inbound message");
        self.store.touch(sender, now).await;

        // Commands are only read from direct chats; group traffic goes on to admission.
        let command = if message.is_group {
            None
        } else {
            commands::interpret(sender, &message.text, self.policy.operator.as_ref())
        };
        if let Some(command) = command {
            self.execute_command(sender, &command, now).await?;
            return Ok(RelayOutcome::CommandHandled(command));
        }

        if let Admission::Reject(reason) = self.policy.admission.decide(sender, message.is_group) {
            info!(sender = %sender, reason = %reason, "Message not admitted");
            return Ok(RelayOutcome::Rejected(reason));
        }

        let paused_for = {
            let mut pauses = self.pauses();
            let duration = self.policy.pause_duration;
            if pauses.is_paused(sender, now, duration) {
                Some(pauses.remaining(sender, now, duration).map(ceil_minutes).unwrap_or(0))
            } else {
                None
            }
        };
        if let Some(remaining_minutes) = paused_for {
            info!(sender = %sender, remaining_minutes, "Sender paused, not replying");
            return Ok(RelayOutcome::Paused { remaining_minutes });
        }

        let reply = self.run_turn(&message, now).await?;
        Ok(RelayOutcome::Replied { reply })
    }

    /// One AI turn: remember the message, ask the model, remember and send the reply.
    async fn run_turn(&self, message: &InboundMessage, now: DateTime<Utc>) -> Result<String> {
        let sender = &message.sender;
        let record = self
            .store
            .append(sender, Turn::user(message.text.clone(), now), now)
            .await;

        let contact_name = match record.contact_name {
            Some(name) => Some(name),
            None => self.resolve_contact_name(message).await,
        };

        let request = CompletionRequest::new(prompt::context_messages(&record.messages)).with_system(
            prompt::persona_preamble(&self.policy.operator_name, contact_name.as_deref()),
        );

        let response = self.llm.complete(request).await.inspect_err(|e| {
            warn!(sender = %sender, error = %e, "AI call failed");
        })?;
        let reply = response.content;

        self.store
            .append(sender, Turn::assistant(reply.clone(), now), now)
            .await;
        self.snapshots.request();

        self.gateway
            .send_message(sender, &reply)
            .await
            .inspect_err(|e| warn!(sender = %sender, error = %e, "Reply delivery failed"))?;

        info!(sender = %sender, model = self.llm.model_name(), "Reply sent");
        Ok(reply)
    }

    /// Best-effort name discovery: the event's sender name, else the contact directory.
    async fn resolve_contact_name(&self, message: &InboundMessage) -> Option<String> {
        let name = match &message.sender_name {
            Some(name) => Some(name.clone()),
            None => match self.gateway.contact_name(&message.sender).await {
                Ok(name) => name,
                Err(e) => {
                    debug!(sender = %message.sender, error = %e, "Contact lookup failed");
                    None
                }
            },
        };

        if let Some(ref name) = name {
            self.store.set_contact_name(&message.sender, name).await;
        }
        name
    }

    async fn execute_command(&self, operator: &SenderId, command: &Command, now: DateTime<Utc>) -> Result<()> {
        let duration = self.policy.pause_duration;
        let ack = match command {
            Command::Pause(target) => {
                self.pauses().pause(target, PauseReason::ManualCommand, now);
                format!(
                    "⏸️ Auto-replies paused for {target} ({} min).",
                    duration.num_minutes()
                )
            }
            Command::Resume(target) => {
                if self.pauses().resume(target) {
                    format!("▶️ Auto-replies resumed for {target}.")
                } else {
                    format!("ℹ️ {target} was not paused.")
                }
            }
            Command::Status => {
                let status = self.status_at(now).await;
                format!(
                    "📊 Active: {} | Paused: {} | Total: {}\nPause duration: {} min",
                    status.active,
                    status.paused,
                    status.total,
                    duration.num_minutes()
                )
            }
        };

        info!(command = ?command, "Operator command executed");
        self.gateway.send_message(operator, &ack).await?;
        Ok(())
    }

    /// Current counts. Does not remove expired pauses.
    pub async fn status(&self) -> RelayStatus {
        self.status_at(Utc::now()).await
    }

    async fn status_at(&self, now: DateTime<Utc>) -> RelayStatus {
        let known = self.store.ids().await;
        let paused = self.pauses().active_ids(now, self.policy.pause_duration);
        let active = known.iter().filter(|id| !paused.contains(*id)).count();
        RelayStatus {
            active,
            paused: paused.len(),
            total: known.len(),
        }
    }

    /// Whether `id` is currently paused (lazy expiry applies).
    pub fn is_paused(&self, id: &SenderId) -> bool {
        self.pauses().is_paused(id, Utc::now(), self.policy.pause_duration)
    }
}
