use serde::{Deserialize, Serialize};

/// Messaging gateway configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GatewayConfig {
    pub backend: GatewayBackend,
    #[serde(default)]
    pub telegram: Option<TelegramConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayBackend {
    Telegram,
}

/// Telegram Bot API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TelegramConfig {
    /// Bot token issued by BotFather.
    pub token: String,
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Upper bound for every Bot API call.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Concurrent requests across all workers.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Idle pooled connections kept per host.
    #[serde(default = "default_max_connections_per_host")]
    pub max_connections_per_host: usize,
    #[serde(default = "default_parse_mode")]
    pub parse_mode: Option<String>,
}

impl TelegramConfig {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            api_url: default_api_url(),
            timeout_secs: default_timeout_secs(),
            max_connections: default_max_connections(),
            max_connections_per_host: default_max_connections_per_host(),
            parse_mode: default_parse_mode(),
        }
    }
}

fn default_api_url() -> String {
    "https://api.telegram.org".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_max_connections() -> usize {
    100
}

fn default_max_connections_per_host() -> usize {
    20
}

fn default_parse_mode() -> Option<String> {
    Some("HTML".to_string())
}
