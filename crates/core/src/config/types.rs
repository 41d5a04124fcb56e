use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;

use crate::extractor::ExtractorConfig;
use crate::gateway::{GatewayBackend, GatewayConfig};
use crate::orchestrator::DownloadConfig;
use crate::settings::SettingsConfig;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub downloads: DownloadConfig,
    #[serde(default)]
    pub extractor: ExtractorConfig,
    #[serde(default)]
    pub settings: SettingsConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    8080
}

/// Database configuration (user settings persistence)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("zenload.db")
}

/// Sanitized config for API responses (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub downloads: DownloadConfig,
    pub extractor: ExtractorConfig,
    pub settings: SettingsConfig,
    pub gateway: SanitizedGatewayConfig,
}

/// Sanitized gateway config (bot token hidden)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedGatewayConfig {
    pub backend: String,
    pub api_url: Option<String>,
    pub token_configured: bool,
    pub timeout_secs: Option<u64>,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        let telegram = config.gateway.telegram.as_ref();
        Self {
            server: config.server.clone(),
            database: config.database.clone(),
            downloads: config.downloads.clone(),
            extractor: config.extractor.clone(),
            settings: config.settings.clone(),
            gateway: SanitizedGatewayConfig {
                backend: match config.gateway.backend {
                    GatewayBackend::Telegram => "telegram".to_string(),
                },
                api_url: telegram.map(|t| t.api_url.clone()),
                token_configured: telegram.map(|t| !t.token.is_empty()).unwrap_or(false),
                timeout_secs: telegram.map(|t| t.timeout_secs),
            },
        }
    }
}
