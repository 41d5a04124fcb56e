use std::collections::HashMap;
use std::sync::Mutex;

use super::{settings_key, Preferences, QualityPreference, SettingsConfig, SettingsError, SettingsStore};
use crate::gateway::ChatId;

/// Settings held in process memory. Used by tests and ephemeral deployments.
#[derive(Debug, Default)]
pub struct InMemorySettingsStore {
    defaults: SettingsConfig,
    entries: Mutex<HashMap<i64, Preferences>>,
}

impl InMemorySettingsStore {
    pub fn new(defaults: SettingsConfig) -> Self {
        Self {
            defaults,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn update<F>(&self, owner_id: i64, apply: F) -> Result<Preferences, SettingsError>
    where
        F: FnOnce(&mut Preferences),
    {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let entry = entries
            .entry(owner_id)
            .or_insert_with(|| self.defaults.defaults());
        apply(entry);
        Ok(entry.clone())
    }
}

impl SettingsStore for InMemorySettingsStore {
    fn resolve_preferences(
        &self,
        user_id: i64,
        chat_id: Option<ChatId>,
    ) -> Result<Preferences, SettingsError> {
        self.update(settings_key(user_id, chat_id), |_| {})
    }

    fn update_language(&self, owner_id: i64, language: &str) -> Result<Preferences, SettingsError> {
        self.update(owner_id, |p| p.language = language.to_string())
    }

    fn update_default_quality(
        &self,
        owner_id: i64,
        quality: QualityPreference,
    ) -> Result<Preferences, SettingsError> {
        self.update(owner_id, |p| p.default_quality = quality)
    }
}
