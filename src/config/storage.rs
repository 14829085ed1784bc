//! Storage configuration.

use serde::Deserialize;

/// Order persistence settings.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Path to the SQLite database file (default "data/orders.db").
    pub path: Option<String>,
}

impl StorageConfig {
    pub fn path(&self) -> &str {
        self.path.as_deref().unwrap_or("data/orders.db")
    }
}
