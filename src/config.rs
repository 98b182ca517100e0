//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::conversation::SenderId;
use crate::conversation::snapshot::DEFAULT_FLUSH_INTERVAL;
use crate::error::ConfigError;
use crate::gateway::GreenApiConfig;
use crate::gateway::client::DEFAULT_GREEN_API_URL;
use crate::llm::{DEFAULT_ANTHROPIC_URL, DEFAULT_MAX_TOKENS, DEFAULT_MODEL, LlmConfig};
use crate::pipeline::AdmissionPolicy;

/// Default port for the webhook server.
pub const DEFAULT_PORT: u16 = 3000;
/// Default pause after the operator replies by hand.
pub const DEFAULT_PAUSE_MINUTES: i64 = 30;
/// Default operator name used in the persona preamble.
pub const DEFAULT_OPERATOR_NAME: &str = "the owner";
/// Default snapshot location.
pub const DEFAULT_MEMORY_FILE: &str = "./data/conversations.json";

/// Relay policy: who gets replies and how handoff pauses behave.
#[derive(Debug, Clone)]
pub struct RelayPolicy {
    pub admission: AdmissionPolicy,
    /// Sender allowed to issue control commands. Commands are disabled when `None`.
    pub operator: Option<SenderId>,
    /// Name the assistant writes as.
    pub operator_name: String,
    pub pause_duration: chrono::Duration,
}

impl Default for RelayPolicy {
    fn default() -> Self {
        Self {
            admission: AdmissionPolicy::default(),
            operator: None,
            operator_name: DEFAULT_OPERATOR_NAME.to_string(),
            pause_duration: chrono::Duration::minutes(DEFAULT_PAUSE_MINUTES),
        }
    }
}

/// Full process configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub port: u16,
    pub gateway: GreenApiConfig,
    pub llm: LlmConfig,
    pub policy: RelayPolicy,
    pub memory_file: PathBuf,
    pub snapshot_interval: Duration,
}

impl RelayConfig {
    /// Read configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let required =
            |key: &str| get(key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()));

        let instance_id = required("GREEN_API_ID")?;
        let api_token = required("GREEN_API_TOKEN")?;
        let api_key = required("ANTHROPIC_API_KEY")?;

        let port = parse_or("PORT", get("PORT"), DEFAULT_PORT)?;
        let max_tokens = parse_or("ANTHROPIC_MAX_TOKENS", get("ANTHROPIC_MAX_TOKENS"), DEFAULT_MAX_TOKENS)?;
        let pause_minutes = parse_or(
            "PAUSE_DURATION_MINUTES",
            get("PAUSE_DURATION_MINUTES"),
            DEFAULT_PAUSE_MINUTES,
        )?;
        if pause_minutes <= 0 {
            return Err(ConfigError::InvalidValue {
                key: "PAUSE_DURATION_MINUTES".into(),
                message: "must be positive".into(),
            });
        }
        let snapshot_secs = parse_or(
            "SNAPSHOT_INTERVAL_SECS",
            get("SNAPSHOT_INTERVAL_SECS"),
            DEFAULT_FLUSH_INTERVAL.as_secs(),
        )?;
        if snapshot_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "SNAPSHOT_INTERVAL_SECS".into(),
                message: "must be positive".into(),
            });
        }

        let operator = match get("OPERATOR_NUMBER") {
            Some(raw) => Some(SenderId::parse(&raw).ok_or_else(|| ConfigError::InvalidValue {
                key: "OPERATOR_NUMBER".into(),
                message: format!("'{raw}' is not a phone number"),
            })?),
            None => None,
        };

        let admission = AdmissionPolicy::new(
            parse_id_list(get("WHITELIST")),
            parse_id_list(get("BLACKLIST")),
            get("REPLY_TO_ALL").is_some_and(|v| v.eq_ignore_ascii_case("true")),
        );

        Ok(Self {
            port,
            gateway: GreenApiConfig {
                base_url: get("GREEN_API_URL").unwrap_or_else(|| DEFAULT_GREEN_API_URL.to_string()),
                instance_id,
                api_token: SecretString::from(api_token),
            },
            llm: LlmConfig {
                base_url: get("ANTHROPIC_BASE_URL")
                    .unwrap_or_else(|| DEFAULT_ANTHROPIC_URL.to_string()),
                api_key: SecretString::from(api_key),
                model: get("ANTHROPIC_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
                max_tokens,
            },
            policy: RelayPolicy {
                admission,
                operator,
                operator_name: get("OPERATOR_NAME")
                    .unwrap_or_else(|| DEFAULT_OPERATOR_NAME.to_string()),
                pause_duration: chrono::Duration::minutes(pause_minutes),
            },
            memory_file: PathBuf::from(
                get("MEMORY_FILE").unwrap_or_else(|| DEFAULT_MEMORY_FILE.to_string()),
            ),
            snapshot_interval: Duration::from_secs(snapshot_secs),
        })
    }
}

fn parse_or<T>(key: &str, value: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        Some(v) => v.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("'{v}': {e}"),
        }),
        None => Ok(default),
    }
}

/// Comma-separated phone numbers; blanks and unparseable entries are skipped.
fn parse_id_list(value: Option<String>) -> Vec<SenderId> {
    value
        .unwrap_or_default()
        .split(',')
        .filter_map(|s| {
            let id = SenderId::parse(s);
            if id.is_none() && !s.trim().is_empty() {
                tracing::warn!(entry = s.trim(), "Skipping invalid number in list");
            }
            id
        })
        .collect()
}
