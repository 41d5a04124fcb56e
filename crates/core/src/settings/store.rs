use thiserror::Error;

use super::{Preferences, QualityPreference};
use crate::gateway::ChatId;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("settings database error: {0}")]
    Database(String),
}

/// Storage of per-user and per-group preferences.
///
/// Reads use get-or-create semantics: an unknown owner gets the configured
/// defaults persisted on first access.
pub trait SettingsStore: Send + Sync {
    /// Preferences governing a submission from `user_id` in `chat_id`.
    fn resolve_preferences(
        &self,
        user_id: i64,
        chat_id: Option<ChatId>,
    ) -> Result<Preferences, SettingsError>;

    /// Change the interface language of a user or group.
    fn update_language(&self, owner_id: i64, language: &str) -> Result<Preferences, SettingsError>;

    /// Change the default quality of a user or group.
    fn update_default_quality(
        &self,
        owner_id: i64,
        quality: QualityPreference,
    ) -> Result<Preferences, SettingsError>;
}

/// Row key for a submission: group chats (negative ids) share one set of
/// preferences, private chats use the user's own.
pub fn settings_key(user_id: i64, chat_id: Option<ChatId>) -> i64 {
    match chat_id {
        Some(chat) if chat.0 < 0 => chat.0,
        _ => user_id,
    }
}
