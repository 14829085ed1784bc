//! Marketplace backend configuration.

use serde::Deserialize;
use std::time::Duration;

use super::duration;
use crate::domain::Role;

fn default_page_size() -> u32 {
    20
}

fn default_timeout() -> Duration {
    Duration::from_secs(10)
}

/// Connection to the order API and the identity this daemon acts as.
#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    /// API root, e.g. "https://api.agromart.id/v1".
    pub base_url: String,
    /// Party whose orders are synchronised.
    pub role: Role,
    /// Buyer or seller id matching `role`.
    pub user_id: String,
    /// Orders requested per page.
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    /// Per-request HTTP timeout.
    #[serde(default = "default_timeout", with = "duration")]
    pub timeout: Duration,
    /// Bearer token (loaded from BACKEND_AUTH_TOKEN env var).
    #[serde(skip)]
    pub auth_token: String,
}
