//! Sync agent settings.

use std::time::Duration;

use crate::config::Config;
use crate::domain::Role;

/// Default period between overview notifications.
const DEFAULT_OVERVIEW_INTERVAL: Duration = Duration::from_secs(3600);
/// Safety bound on pages fetched in one cycle.
const DEFAULT_MAX_PAGES: u32 = 500;

/// Everything the agent needs from the configuration.
#[derive(Debug, Clone)]
pub struct AgentSettings {
    /// Party whose orders are fetched.
    pub role: Role,
    pub user_id: String,
    pub page_size: u32,
    pub max_pages: u32,
    /// Whether the periodic fetch runs; write-through and pushes work regardless.
    pub sync_enabled: bool,
    pub interval: Duration,
    pub push_timeout: Duration,
    pub overview_interval: Duration,
    /// Reported in the startup notification.
    pub version: String,
}

impl AgentSettings {
    pub fn from_config(config: &Config) -> Self {
        let overview_interval = config
            .telegram()
            .map(|t| t.overview_interval)
            .filter(|d| !d.is_zero())
            .unwrap_or(DEFAULT_OVERVIEW_INTERVAL);

        Self {
            role: config.backend.role,
            user_id: config.backend.user_id.clone(),
            page_size: config.backend.page_size,
            max_pages: DEFAULT_MAX_PAGES,
            sync_enabled: config.sync.enabled,
            interval: config.sync.interval,
            push_timeout: config.sync.push_timeout,
            overview_interval,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
