//! Notification configuration.

use serde::Deserialize;
use std::time::Duration;

use super::duration;

/// Notification settings.
#[derive(Debug, Clone, Deserialize)]
pub struct NotificationConfig {
    /// Telegram bot notifications.
    pub telegram: Option<TelegramConfig>,
}

/// Telegram notification settings.
#[derive(Debug, Clone, Deserialize)]
pub struct TelegramConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Bot token (loaded from TELEGRAM_BOT_TOKEN env var).
    #[serde(skip)]
    pub bot_token: String,
    /// Target chat ID (loaded from TELEGRAM_CHAT_ID env var).
    #[serde(skip)]
    pub chat_id: String,
    /// Chat ID for error alerts (loaded from TELEGRAM_ERROR_CHAT_ID env var).
    #[serde(skip)]
    pub error_chat_id: String,
    /// Send a message for every order status change.
    #[serde(default)]
    pub notify_status_changes: bool,
    /// Send alerts for sync and push failures.
    #[serde(default)]
    pub notify_errors: bool,
    /// Send periodic overview messages with order counts.
    #[serde(default)]
    pub notify_overview: bool,
    /// Interval between overview messages (default: 1h).
    #[serde(default, with = "duration")]
    pub overview_interval: Duration,
}
