//! SQLite-backed settings store.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};

use super::{settings_key, Preferences, QualityPreference, SettingsConfig, SettingsError, SettingsStore};
use crate::gateway::ChatId;

/// SQLite-backed settings store.
pub struct SqliteSettingsStore {
    conn: Mutex<Connection>,
    defaults: SettingsConfig,
}

impl SqliteSettingsStore {
    /// Open (or create) the database at `path`.
    pub fn new(path: &Path, defaults: SettingsConfig) -> Result<Self, SettingsError> {
        let conn = Connection::open(path).map_err(|e| SettingsError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            defaults,
        })
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory(defaults: SettingsConfig) -> Result<Self, SettingsError> {
        let conn =
            Connection::open_in_memory().map_err(|e| SettingsError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            defaults,
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), SettingsError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS user_settings (
                user_id INTEGER PRIMARY KEY,
                language TEXT NOT NULL,
                default_quality TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        )
        .map_err(|e| SettingsError::Database(e.to_string()))
    }

    fn get_or_create(conn: &Connection, owner_id: i64, defaults: &Preferences) -> rusqlite::Result<Preferences> {
        let existing = conn
            .query_row(
                "SELECT language, default_quality FROM user_settings WHERE user_id = ?1",
                params![owner_id],
                |row| {
                    let language: String = row.get(0)?;
                    let quality: String = row.get(1)?;
                    Ok(Preferences {
                        language,
                        default_quality: QualityPreference::from(quality),
                    })
                },
            )
            .optional()?;

        if let Some(preferences) = existing {
            return Ok(preferences);
        }

        let now = chrono::Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO user_settings (user_id, language, default_quality, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)",
            params![owner_id, defaults.language, defaults.default_quality.as_str(), now],
        )?;
        Ok(defaults.clone())
    }

    fn update<F>(&self, owner_id: i64, apply: F) -> Result<Preferences, SettingsError>
    where
        F: FnOnce(&mut Preferences),
    {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let mut preferences = Self::get_or_create(&conn, owner_id, &self.defaults.defaults())
            .map_err(|e| SettingsError::Database(e.to_string()))?;
        apply(&mut preferences);

        conn.execute(
            "UPDATE user_settings SET language = ?1, default_quality = ?2, updated_at = ?3
             WHERE user_id = ?4",
            params![
                preferences.language,
                preferences.default_quality.as_str(),
                chrono::Utc::now().to_rfc3339(),
                owner_id
            ],
        )
        .map_err(|e| SettingsError::Database(e.to_string()))?;

        tracing::debug!(owner_id, language = %preferences.language, quality = %preferences.default_quality, "Settings updated");
        Ok(preferences)
    }
}

impl SettingsStore for SqliteSettingsStore {
    fn resolve_preferences(
        &self,
        user_id: i64,
        chat_id: Option<ChatId>,
    ) -> Result<Preferences, SettingsError> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        Self::get_or_create(&conn, settings_key(user_id, chat_id), &self.defaults.defaults())
            .map_err(|e| SettingsError::Database(e.to_string()))
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
