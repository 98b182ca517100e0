//! Gateway webhook events and their classification.
//!
//! Raw Green API payloads are validated once here and turned into a
//! [`GatewayEvent`]; nothing downstream probes JSON fields.

use serde::Deserialize;
use tracing::{debug, warn};

use crate::conversation::SenderId;
use crate::conversation::model::is_group_chat;

/// Message received by the instance's WhatsApp account.
pub const INCOMING_MESSAGE: &str = "incomingMessageReceived";
/// Message typed by the account owner on the phone.
pub const OUTGOING_MESSAGE: &str = "outgoingMessageReceived";

const TEXT_MESSAGE: &str = "textMessage";
const EXTENDED_TEXT_MESSAGE: &str = "extendedTextMessage";

// ── Raw payload shapes ──────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawEvent {
    pub type_webhook: Option<String>,
    pub id_message: Option<String>,
    pub sender_data: Option<RawSenderData>,
    pub message_data: Option<RawMessageData>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawSenderData {
    pub chat_id: Option<String>,
    pub sender: Option<String>,
    pub chat_name: Option<String>,
    pub sender_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawMessageData {
    pub type_message: Option<String>,
    pub text_message_data: Option<RawTextMessage>,
    pub extended_text_message_data: Option<RawExtendedText>,
    pub quoted_message: Option<RawQuotedMessage>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawTextMessage {
    pub text_message: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawExtendedText {
    pub text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawQuotedMessage {
    pub participant: Option<String>,
}

impl RawMessageData {
    fn text(&self) -> Option<&str> {
        self.text_message_data
            .as_ref()
            .and_then(|t| t.text_message.as_deref())
            .or_else(|| {
                self.extended_text_message_data
                    .as_ref()
                    .and_then(|t| t.text.as_deref())
            })
    }
}

// ── Classified events ───────────────────────────────────────────────────

/// A text message from a contact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub sender: SenderId,
    pub text: String,
    pub is_group: bool,
    /// Display name supplied by the gateway, if any.
    pub sender_name: Option<String>,
}

/// Why an event produces no action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Not a message event this relay acts on.
    UnrelatedEvent(String),
    /// A message without a text payload (media, location, ...).
    NonText(String),
    /// Required fields missing or the body did not parse.
    Malformed(String),
    /// An outbound message whose recipient could not be determined.
    UnresolvedRecipient,
}

/// A gateway event after validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayEvent {
    /// The operator messaged `recipient` by hand.
    Outbound { recipient: SenderId },
    Inbound(InboundMessage),
    Ignored(IgnoreReason),
}

/// Classify a raw webhook body.
pub fn classify_bytes(body: &[u8]) -> GatewayEvent {
    match serde_json::from_slice::<serde_json::Value>(body) {
        Ok(payload) => classify(&payload),
        Err(e) => {
            warn!(error = %e, "Webhook body is not JSON");
            GatewayEvent::Ignored(IgnoreReason::Malformed(e.to_string()))
        }
    }
}

/// Classify a webhook payload.
pub fn classify(payload: &serde_json::Value) -> GatewayEvent {
    let raw = match RawEvent::deserialize(payload) {
        Ok(raw) => raw,
        Err(e) => {
            warn!(error = %e, "Webhook payload has unexpected shape");
            return GatewayEvent::Ignored(IgnoreReason::Malformed(e.to_string()));
        }
    };

    let event_type = raw.type_webhook.as_deref().unwrap_or_default();

    if event_type == OUTGOING_MESSAGE {
        return match outbound_recipient(&raw) {
            Some(recipient) => GatewayEvent::Outbound { recipient },
            None => {
                warn!(payload = %payload, "Could not determine recipient of outgoing message");
                GatewayEvent::Ignored(IgnoreReason::UnresolvedRecipient)
            }
        };
    }

    if event_type != INCOMING_MESSAGE {
        debug!(event_type, "Ignoring unrelated webhook event");
        return GatewayEvent::Ignored(IgnoreReason::UnrelatedEvent(event_type.to_string()));
    }

    let Some(message) = raw.message_data.as_ref() else {
        return malformed("missing messageData");
    };
    let message_type = message.type_message.as_deref().unwrap_or_default();
    if message_type != TEXT_MESSAGE && message_type != EXTENDED_TEXT_MESSAGE {
        debug!(message_type, "Ignoring non-text message");
        return GatewayEvent::Ignored(IgnoreReason::NonText(message_type.to_string()));
    }

    let Some(sender_data) = raw.sender_data.as_ref() else {
        return malformed("missing senderData");
    };
    let Some(raw_sender) = sender_data.sender.as_deref().or(sender_data.chat_id.as_deref()) else {
        return malformed("missing sender");
    };
    let Some(sender) = SenderId::parse(raw_sender) else {
        return malformed("empty sender");
    };

    let text = message.text().map(str::trim).unwrap_or_default();
    if text.is_empty() {
        return malformed("empty text");
    }

    let is_group = [sender_data.chat_id.as_deref(), sender_data.sender.as_deref()]
        .into_iter()
        .flatten()
        .any(is_group_chat);

    GatewayEvent::Inbound(InboundMessage {
        sender,
        text: text.to_string(),
        is_group,
        sender_name: sender_data
            .sender_name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(String::from),
    })
}

fn malformed(reason: &str) -> GatewayEvent {
    warn!(reason, "Malformed incoming message event");
    GatewayEvent::Ignored(IgnoreReason::Malformed(reason.to_string()))
}

/// Recipient of an operator-typed message.
///
/// Probes, in order: `senderData.chatId`, `senderData.sender`,
/// `messageData.quotedMessage.participant`. The first field holding an
/// individual (non-group) chat wins.
fn outbound_recipient(raw: &RawEvent) -> Option<SenderId> {
    let sender_data = raw.sender_data.as_ref();
    let candidates = [
        sender_data.and_then(|s| s.chat_id.as_deref()),
        sender_data.and_then(|s| s.sender.as_deref()),
        raw.message_data
            .as_ref()
            .and_then(|m| m.quoted_message.as_ref())
            .and_then(|q| q.participant.as_deref()),
    ];

    let (position, recipient) = candidates
        .into_iter()
        .enumerate()
        .filter_map(|(i, raw_id)| raw_id.map(|r| (i, r)))
        .filter(|(_, raw_id)| !is_group_chat(raw_id))
        .find_map(|(i, raw_id)| SenderId::parse(raw_id).map(|id| (i, id)))?;
    if position == SENDER_FALLBACK {
        // In a group chat this is usually the instance's own number.
        warn!(recipient = %recipient, "Outgoing recipient taken from senderData.sender");
    }
    Some(recipient)
}

/// Position of `senderData.sender` in the recipient chain.
const SENDER_FALLBACK: usize = 1;

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn id(raw: &str) -> SenderId {
        SenderId::parse(raw).unwrap()
    }

    fn incoming_text(sender: &str, text: &str) -> serde_json::Value {
        json!({
            "typeWebhook": "incomingMessageReceived",
            "idMessage": "BAE5F4886F6F2D05",
            "senderData": {
                "chatId": sender,
                "sender": sender,
                "senderName": "Ana"
            },
            "messageData": {
                "typeMessage": "textMessage",
                "textMessageData": { "textMessage": text }
            }
        })
    }

    #[test]
    fn incoming_text_message() {
        let event = classify(&incoming_text("12025551234@c.us", "Hello"));
        assert_eq!(
            event,
            GatewayEvent::Inbound(InboundMessage {
                sender: id("12025551234"),
                text: "Hello".into(),
                is_group: false,
                sender_name: Some("Ana".into()),
            })
        );
    }

    #[test]
    fn incoming_extended_text_message() {
        let payload = json!({
            "typeWebhook": "incomingMessageReceived",
            "senderData": { "chatId": "12025551234@c.us", "sender": "12025551234@c.us" },
            "messageData": {
                "typeMessage": "extendedTextMessage",
                "extendedTextMessageData": { "text": "see https://example.com" }
            }
        });
        match classify(&payload) {
            GatewayEvent::Inbound(msg) => {
                assert_eq!(msg.text, "see https://example.com");
                assert_eq!(msg.sender_name, None);
            }
            other => panic!("Expected Inbound, got {:?}", other),
        }
    }

    #[test]
    fn group_origin_detected_from_chat_id() {
        let payload = json!({
            "typeWebhook": "incomingMessageReceived",
            "senderData": { "chatId": "120363025@g.us", "sender": "12025551234@c.us" },
            "messageData": {
                "typeMessage": "textMessage",
                "textMessageData": { "textMessage": "hi all" }
            }
        });
        match classify(&payload) {
            GatewayEvent::Inbound(msg) => {
                assert!(msg.is_group);
                assert_eq!(msg.sender, id("12025551234"));
            }
            other => panic!("Expected Inbound, got {:?}", other),
        }
    }

    #[test]
    fn non_text_message_ignored() {
        let payload = json!({
            "typeWebhook": "incomingMessageReceived",
            "senderData": { "chatId": "12025551234@c.us", "sender": "12025551234@c.us" },
            "messageData": { "typeMessage": "imageMessage" }
        });
        assert_eq!(
            classify(&payload),
            GatewayEvent::Ignored(IgnoreReason::NonText("imageMessage".into()))
        );
    }

    #[test]
    fn unrelated_events_ignored() {
        let payload = json!({ "typeWebhook": "stateInstanceChanged", "stateInstance": "authorized" });
        assert_eq!(
            classify(&payload),
            GatewayEvent::Ignored(IgnoreReason::UnrelatedEvent("stateInstanceChanged".into()))
        );

        // The relay's own API sends are not operator activity.
        let api_echo = json!({
            "typeWebhook": "outgoingAPIMessageReceived",
            "senderData": { "chatId": "12025551234@c.us" }
        });
        assert!(matches!(
            classify(&api_echo),
            GatewayEvent::Ignored(IgnoreReason::UnrelatedEvent(_))
        ));
    }

    #[test]
    fn missing_fields_are_malformed() {
        let no_sender = json!({
            "typeWebhook": "incomingMessageReceived",
            "messageData": {
                "typeMessage": "textMessage",
                "textMessageData": { "textMessage": "Hello" }
            }
        });
        assert!(matches!(
            classify(&no_sender),
            GatewayEvent::Ignored(IgnoreReason::Malformed(_))
        ));

        assert!(matches!(
            classify(&incoming_text("12025551234@c.us", "   ")),
            GatewayEvent::Ignored(IgnoreReason::Malformed(_))
        ));

        assert!(matches!(
            classify(&json!({ "typeWebhook": 42 })),
            GatewayEvent::Ignored(IgnoreReason::Malformed(_))
        ));
    }

    #[test]
    fn non_json_body_is_malformed() {
        assert!(matches!(
            classify_bytes(b"not json at all"),
            GatewayEvent::Ignored(IgnoreReason::Malformed(_))
        ));
    }

    #[test]
    fn outbound_recipient_from_chat_id() {
        let payload = json!({
            "typeWebhook": "outgoingMessageReceived",
            "senderData": { "chatId": "12025551234@c.us", "sender": "972501234567@c.us" },
            "messageData": {
                "typeMessage": "textMessage",
                "textMessageData": { "textMessage": "I'll take it from here" }
            }
        });
        assert_eq!(
            classify(&payload),
            GatewayEvent::Outbound { recipient: id("12025551234") }
        );
    }

    #[test]
    fn outbound_recipient_falls_back_to_sender_field() {
        let payload = json!({
            "typeWebhook": "outgoingMessageReceived",
            "senderData": { "sender": "12025551234@c.us" }
        });
        assert_eq!(
            classify(&payload),
            GatewayEvent::Outbound { recipient: id("12025551234") }
        );
    }

    #[test]
    fn outbound_recipient_falls_back_to_quoted_participant() {
        let payload = json!({
            "typeWebhook": "outgoingMessageReceived",
            "senderData": { "chatId": "120363025@g.us" },
            "messageData": {
                "typeMessage": "quotedMessage",
                "quotedMessage": { "participant": "12025551234@c.us" }
            }
        });
        assert_eq!(
            classify(&payload),
            GatewayEvent::Outbound { recipient: id("12025551234") }
        );
    }

    #[test]
    fn outbound_without_recipient_is_unresolved() {
        let payload = json!({
            "typeWebhook": "outgoingMessageReceived",
            "senderData": { "chatName": "Somebody" }
        });
        assert_eq!(
            classify(&payload),
            GatewayEvent::Ignored(IgnoreReason::UnresolvedRecipient)
        );
    }
}
