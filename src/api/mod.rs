//! Marketplace backend integration.

mod client;
pub mod remote;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;

use crate::domain::{CanonicalStatus, CartSnapshot, Order, OrderId, Role};
use crate::lifecycle::RemoteBatch;

pub use client::{ClientConfig, HttpBackend};

/// Backend errors.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Non-2xx answer from the backend.
    #[error("backend error {status}: {message}")]
    Api { status: u16, message: String },

    /// The backend returned an order that fails domain validation.
    #[error("invalid remote order {id}: {reason}")]
    InvalidOrder { id: OrderId, reason: String },

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// Client-side configuration problem (bad base URL, bad header value).
    #[error("backend client misconfigured: {0}")]
    Config(String),
}

impl BackendError {
    /// Returns true if the same request may succeed later.
    ///
    /// 4xx answers other than 408 and 429 are final.
    pub fn is_retryable(&self) -> bool {
        match self {
            BackendError::Request(_) | BackendError::Timeout(_) => true,
            BackendError::Api { status, .. } => {
                *status >= 500 || *status == 408 || *status == 429
            }
            BackendError::Json(_) | BackendError::InvalidOrder { .. } | BackendError::Config(_) => {
                false
            }
        }
    }
}

/// Result type for backend operations.
pub type Result<T> = std::result::Result<T, BackendError>;

/// Parameters of one `fetch_orders` page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchQuery {
    pub role: Role,
    pub user_id: String,
    pub status: Option<CanonicalStatus>,
    /// 1-based page number.
    pub page: u32,
    pub page_size: u32,
}

/// One page of remote orders, already mapped to the domain.
#[derive(Debug, Clone, Default)]
pub struct RemotePage {
    pub orders: Vec<Order>,
    pub deleted: Vec<OrderId>,
    pub has_more: bool,
}

impl From<RemotePage> for RemoteBatch {
    fn from(page: RemotePage) -> Self {
        RemoteBatch {
            orders: page.orders,
            deleted: page.deleted,
        }
    }
}

/// A status change to confirm with the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    pub order_id: OrderId,
    pub status: CanonicalStatus,
    pub at: DateTime<Utc>,
    /// Same key for every retry of the same change.
    pub idempotency_key: String,
}

/// OrderBackend is the remote system of record for orders.
#[async_trait]
pub trait OrderBackend: Send + Sync {
    /// Fetches one page of orders visible to the querying party.
    async fn fetch_orders(&self, query: &FetchQuery) -> Result<RemotePage>;

    /// Confirms a locally applied status change.
    /// Repeating a call with the same idempotency key must be harmless.
    async fn push_status_update(&self, update: &StatusUpdate) -> Result<()>;

    /// Submits a checkout and returns the order the backend created for it.
    async fn submit_checkout(&self, cart: &CartSnapshot) -> Result<Order>;

    /// Name used in logs.
    fn name(&self) -> &str;
}
