//! HTTP surface: the gateway webhook plus health and memory endpoints.

use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::conversation::SenderId;
use crate::gateway::classify_bytes;
use crate::pipeline::Relay;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub relay: Arc<Relay>,
}

/// Build the Axum router for the relay.
pub fn relay_routes(relay: Arc<Relay>) -> Router {
    let state = AppState { relay };

    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/webhook", post(webhook))
        .route("/memory", get(list_memory))
        .route("/memory/{id}", delete(delete_memory))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ── Status ──────────────────────────────────────────────────────────────

async fn index(State(state): State<AppState>) -> impl IntoResponse {
    let admission = &state.relay.policy().admission;
    if admission.reply_all {
        "WhatsApp relay running (mode: reply to all)".to_string()
    } else {
        format!(
            "WhatsApp relay running (mode: whitelist, {} numbers)",
            admission.whitelist.len()
        )
    }
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let admission = &state.relay.policy().admission;
    let status = state.relay.status().await;
    Json(serde_json::json!({
        "status": "ok",
        "whitelist": admission.whitelist.len(),
        "blacklist": admission.blacklist.len(),
        "replyToAll": admission.reply_all,
        "conversations": status.total,
        "paused": status.paused,
    }))
}

// ── Webhook ─────────────────────────────────────────────────────────────

async fn webhook(State(state): State<AppState>, body: Bytes) -> impl IntoResponse {
    debug!(payload = %String::from_utf8_lossy(&body), "Webhook received");

    let event = classify_bytes(&body);
    match state.relay.handle(event).await {
        Ok(outcome) => {
            debug!(outcome = ?outcome, "Webhook handled");
            StatusCode::OK
        }
        Err(e) => {
            warn!(error = %e, "Webhook processing failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

// ── Memory ──────────────────────────────────────────────────────────────

async fn list_memory(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.relay.store().summaries().await)
}

async fn delete_memory(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    let Some(sender) = SenderId::parse(&id) else {
        return (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"error": "Conversation not found"})),
        );
    };

    if state.relay.store().remove(&sender).await {
        info!(sender = %sender, "Conversation purged");
        state.relay.snapshots().request();
        (
            StatusCode::OK,
            Json(serde_json::json!({"status": "deleted", "id": sender})),
        )
    } else {
        (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"error": "Conversation not found"})),
        )
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use chrono::Utc;
    use tower::ServiceExt;

    use super::*;
    use crate::config::RelayPolicy;
    use crate::conversation::{ConversationStore, SnapshotTrigger, Turn};
    use crate::error::{GatewayError, LlmError};
    use crate::gateway::Gateway;
    use crate::llm::{CompletionRequest, CompletionResponse, LlmProvider};
    use crate::pipeline::AdmissionPolicy;

    struct SilentGateway;

    #[async_trait]
    impl Gateway for SilentGateway {
        async fn send_message(&self, _to: &SenderId, _text: &str) -> Result<(), GatewayError> {
            Ok(())
        }

        async fn contact_name(&self, _id: &SenderId) -> Result<Option<String>, GatewayError> {
            Ok(None)
        }
    }

    struct FailingLlm;

    #[async_trait]
    impl LlmProvider for FailingLlm {
        fn model_name(&self) -> &str {
            "failing"
        }

        async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
            Err(LlmError::RequestFailed {
                provider: "failing".into(),
                reason: "unreachable".into(),
            })
        }
    }

    fn id(raw: &str) -> SenderId {
        SenderId::parse(raw).unwrap()
    }

    fn app(store: Arc<ConversationStore>) -> Router {
        let policy = RelayPolicy {
            admission: AdmissionPolicy::new([id("12025551234")], [id("15550001111")], false),
            ..Default::default()
        };
        let relay = Relay::new(
            policy,
            store,
            Arc::new(SilentGateway),
            Arc::new(FailingLlm),
            SnapshotTrigger::default(),
        );
        relay_routes(Arc::new(relay))
    }

    async fn body_json(resp: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn index_reports_mode() {
        let resp = app(ConversationStore::new())
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert!(String::from_utf8_lossy(&bytes).contains("whitelist, 1 numbers"));
    }

    #[tokio::test]
    async fn health_reports_counts() {
        let store = ConversationStore::new();
        store
            .append(&id("12025551234"), Turn::user("hi", Utc::now()), Utc::now())
            .await;

        let resp = app(store)
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["status"], "ok");
        assert_eq!(json["whitelist"], 1);
        assert_eq!(json["blacklist"], 1);
        assert_eq!(json["replyToAll"], false);
        assert_eq!(json["conversations"], 1);
        assert_eq!(json["paused"], 0);
    }

    #[tokio::test]
    async fn malformed_webhook_is_acknowledged() {
        let resp = app(ConversationStore::new())
            .oneshot(Request::post("/webhook").body(Body::from("not json")).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn failed_turn_returns_500() {
        let payload = serde_json::json!({
            "typeWebhook": "incomingMessageReceived",
            "senderData": { "chatId": "12025551234@c.us", "sender": "12025551234@c.us" },
            "messageData": {
                "typeMessage": "textMessage",
                "textMessageData": { "textMessage": "Hello" }
            }
        });
        let resp = app(ConversationStore::new())
            .oneshot(
                Request::post("/webhook")
                    .header("content-type", "application/json")
                    .body(Body::from(payload.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn memory_lists_and_deletes() {
        let store = ConversationStore::new();
        store
            .append(&id("12025551234"), Turn::user("hi", Utc::now()), Utc::now())
            .await;
        let router = app(store.clone());

        let resp = router
            .clone()
            .oneshot(Request::get("/memory").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let json = body_json(resp).await;
        assert_eq!(json[0]["id"], "12025551234");
        assert_eq!(json[0]["messageCount"], 1);
        assert_eq!(json[0]["lastMessage"], "hi");

        let resp = router
            .clone()
            .oneshot(Request::delete("/memory/12025551234").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(store.is_empty().await);

        let resp = router
            .oneshot(Request::delete("/memory/12025551234").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
