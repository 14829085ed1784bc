//! Application-level configuration.

use serde::Deserialize;

use crate::domain::Locale;

/// Application-level settings.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Application name used in logs and notifications.
    pub name: String,
    /// Environment: "development", "staging", or "production".
    pub env: String,
    /// Logging verbosity: "debug", "info", "warn", "error".
    pub log_level: Option<String>,
    /// Language for status labels and action labels.
    #[serde(default)]
    pub locale: Locale,
}

impl AppConfig {
    pub fn is_development(&self) -> bool {
        self.env == "development"
    }
}
