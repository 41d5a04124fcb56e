use std::fmt;

use serde::{Deserialize, Serialize};

/// How the quality of a download is chosen when the request names none.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum QualityPreference {
    /// Let the front-end prompt; the extractor's platform default applies.
    #[default]
    Ask,
    /// Best available format.
    Best,
    /// A specific format selector.
    Format(String),
}

impl QualityPreference {
    /// Format selector implied by this preference, if any.
    pub fn format_id(&self) -> Option<String> {
        match self {
            QualityPreference::Ask => None,
            QualityPreference::Best => Some("best".to_string()),
            QualityPreference::Format(id) => Some(id.clone()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            QualityPreference::Ask => "ask",
            QualityPreference::Best => "best",
            QualityPreference::Format(id) => id,
        }
    }
}

impl From<String> for QualityPreference {
    fn from(value: String) -> Self {
        match value.trim() {
            "" | "ask" => QualityPreference::Ask,
            "best" => QualityPreference::Best,
            other => QualityPreference::Format(other.to_string()),
        }
    }
}

impl From<QualityPreference> for String {
    fn from(value: QualityPreference) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for QualityPreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolved preferences for one submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
    pub language: String,
    pub default_quality: QualityPreference,
}

/// Defaults applied to users without stored settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SettingsConfig {
    #[serde(default = "default_language")]
    pub default_language: String,
    #[serde(default)]
    pub default_quality: QualityPreference,
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            default_language: default_language(),
            default_quality: QualityPreference::default(),
        }
    }
}

impl SettingsConfig {
    pub fn defaults(&self) -> Preferences {
        Preferences {
            language: self.default_language.clone(),
            default_quality: self.default_quality.clone(),
        }
    }
}

fn default_language() -> String {
    "ru".to_string()
}
