//! Per-user and per-group preferences.
//!
//! The download core consults the [`SettingsStore`] once per submission to
//! pick the interface language and the default quality.

mod memory;
mod sqlite;
mod store;
mod types;

pub use memory::InMemorySettingsStore;
pub use sqlite::SqliteSettingsStore;
pub use store::{settings_key, SettingsError, SettingsStore};
pub use types::{Preferences, QualityPreference, SettingsConfig};
