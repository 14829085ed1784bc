//! Configuration loading and validation for the order sync daemon.
//!
//! Uses serde_yaml to load YAML configuration files with support for
//! environment variable overrides for credentials.

mod app;
mod backend;
mod duration;
mod error;
mod notification;
mod storage;
mod sync;

pub use app::AppConfig;
pub use backend::BackendConfig;
pub use error::ConfigError;
pub use notification::{NotificationConfig, TelegramConfig};
pub use storage::StorageConfig;
pub use sync::{RetryConfig, SyncConfig};

use serde::Deserialize;
use std::{env, fs};

/// Root configuration structure.
///
/// Required sections: app, backend.
/// Optional sections: sync, storage, notification.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub backend: BackendConfig,
    /// Sync loop and push retries; defaults apply when absent.
    #[serde(default)]
    pub sync: SyncConfig,
    pub storage: Option<StorageConfig>,
    pub notification: Option<NotificationConfig>,
}

impl Config {
    /// Load configuration from a YAML file at the given path.
    ///
    /// First loads environment variables from `.env` (if present), then the
    /// YAML file, then credentials from the environment:
    /// - `BACKEND_AUTH_TOKEN`
    /// - `TELEGRAM_BOT_TOKEN`, `TELEGRAM_CHAT_ID`, `TELEGRAM_ERROR_CHAT_ID`
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let content = fs::read_to_string(path)?;
        let mut config: Config = serde_yaml::from_str(&content)?;

        config.load_credentials_from_env();
        config.validate()?;

        Ok(config)
    }

    fn load_credentials_from_env(&mut self) {
        self.backend.auth_token = env::var("BACKEND_AUTH_TOKEN").unwrap_or_default();

        if let Some(telegram) = self
            .notification
            .as_mut()
            .and_then(|n| n.telegram.as_mut())
            .filter(|t| t.enabled)
        {
            telegram.bot_token = env::var("TELEGRAM_BOT_TOKEN").unwrap_or_default();
            telegram.chat_id = env::var("TELEGRAM_CHAT_ID").unwrap_or_default();
            telegram.error_chat_id = env::var("TELEGRAM_ERROR_CHAT_ID").unwrap_or_default();
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.app.name.is_empty() {
            return Err(ConfigError::Validation("app.name is required".into()));
        }

        let base_url = &self.backend.base_url;
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ConfigError::Validation(format!(
                "backend.base_url must be an http(s) URL, got {base_url:?}"
            )));
        }

        if self.backend.user_id.trim().is_empty() {
            return Err(ConfigError::Validation("backend.user_id is required".into()));
        }

        if self.backend.page_size == 0 {
            return Err(ConfigError::Validation(
                "backend.page_size must be positive".into(),
            ));
        }

        // Only require credentials outside development
        if !self.app.is_development() && self.backend.auth_token.is_empty() {
            return Err(ConfigError::MissingCredential("BACKEND_AUTH_TOKEN"));
        }

        if let Some(multiplier) = self.sync.retry.multiplier {
            if multiplier < 1.0 {
                return Err(ConfigError::Validation(
                    "sync.retry.multiplier must be at least 1".into(),
                ));
            }
        }

        Ok(())
    }

    /// Telegram settings when the section is present and enabled.
    pub fn telegram(&self) -> Option<&TelegramConfig> {
        self.notification
            .as_ref()
            .and_then(|n| n.telegram.as_ref())
            .filter(|t| t.enabled)
    }

    /// Storage settings when the section is present and enabled.
    pub fn storage(&self) -> Option<&StorageConfig> {
        self.storage.as_ref().filter(|s| s.enabled)
    }
}

#[cfg(test)]
mod tests;
