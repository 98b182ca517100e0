//! Green API client: outbound messages and contact directory lookups.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, info};

use crate::conversation::SenderId;
use crate::error::GatewayError;

/// Default Green API host.
pub const DEFAULT_GREEN_API_URL: &str = "https://api.green-api.com";

/// The messaging gateway as seen by the relay.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Deliver a text message to a direct chat.
    async fn send_message(&self, recipient: &SenderId, text: &str) -> Result<(), GatewayError>;

    /// Look up a display name for a contact. `Ok(None)` when the gateway knows none.
    async fn contact_name(&self, id: &SenderId) -> Result<Option<String>, GatewayError>;
}

/// Green API connection settings.
#[derive(Debug, Clone)]
pub struct GreenApiConfig {
    pub base_url: String,
    pub instance_id: String,
    pub api_token: SecretString,
}

/// HTTP client for a single Green API instance.
pub struct GreenApiClient {
    config: GreenApiConfig,
    client: reqwest::Client,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ContactInfo {
    name: Option<String>,
    contact_name: Option<String>,
}

impl ContactInfo {
    /// The address-book name if present, otherwise the WhatsApp profile name.
    fn display_name(self) -> Option<String> {
        [self.contact_name, self.name]
            .into_iter()
            .flatten()
            .map(|n| n.trim().to_string())
            .find(|n| !n.is_empty())
    }
}

impl GreenApiClient {
    pub fn new(config: GreenApiConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn api_url(&self, method: &str) -> String {
        format!(
            "{}/waInstance{}/{method}/{}",
            self.config.base_url.trim_end_matches('/'),
            self.config.instance_id,
            self.config.api_token.expose_secret()
        )
    }

    async fn post(
        &self,
        method: &str,
        body: &serde_json::Value,
    ) -> Result<reqwest::Response, GatewayError> {
        let resp = self
            .client
            .post(self.api_url(method))
            .json(body)
            .send()
            .await
            .map_err(|e| GatewayError::RequestFailed {
                method: method.to_string(),
                reason: e.without_url().to_string(),
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(GatewayError::Status {
                method: method.to_string(),
                status: status.as_u16(),
                body,
            });
        }
        Ok(resp)
    }
}

#[async_trait]
impl Gateway for GreenApiClient {
    async fn send_message(&self, recipient: &SenderId, text: &str) -> Result<(), GatewayError> {
        let body = serde_json::json!({
            "chatId": recipient.chat_id(),
            "message": text,
        });
        self.post("sendMessage", &body).await?;
        info!(recipient = %recipient, chars = text.chars().count(), "Message sent");
        Ok(())
    }

    async fn contact_name(&self, id: &SenderId) -> Result<Option<String>, GatewayError> {
        let body = serde_json::json!({ "chatId": id.chat_id() });
        let resp = self.post("getContactInfo", &body).await?;
        let info: ContactInfo = resp.json().await.map_err(|e| GatewayError::InvalidResponse {
            method: "getContactInfo".into(),
            reason: e.to_string(),
        })?;
        let name = info.display_name();
        debug!(contact = %id, found = name.is_some(), "Contact lookup");
        Ok(name)
    }
}
