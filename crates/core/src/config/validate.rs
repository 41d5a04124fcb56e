use super::{types::Config, ConfigError};
use crate::gateway::GatewayBackend;

/// Validate configuration
///
/// Checks capacity limits that would otherwise deadlock or reject every
/// submission, and that the selected gateway backend has credentials.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    let downloads = &config.downloads;
    if downloads.max_concurrent_downloads == 0 {
        return Err(ConfigError::ValidationError(
            "downloads.max_concurrent_downloads must be at least 1".to_string(),
        ));
    }
    if downloads.max_downloads_per_user == 0 {
        return Err(ConfigError::ValidationError(
            "downloads.max_downloads_per_user must be at least 1".to_string(),
        ));
    }
    if downloads.per_host_limit == 0 {
        return Err(ConfigError::ValidationError(
            "downloads.per_host_limit must be at least 1".to_string(),
        ));
    }
    if downloads.shutdown_timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "downloads.shutdown_timeout_secs cannot be 0".to_string(),
        ));
    }

    match config.gateway.backend {
        GatewayBackend::Telegram => match &config.gateway.telegram {
            Some(telegram) if !telegram.token.is_empty() => {}
            _ => {
                return Err(ConfigError::ValidationError(
                    "gateway.telegram.token is required for the telegram backend".to_string(),
                ))
            }
        },
    }

    Ok(())
}
