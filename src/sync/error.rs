//! Sync agent error types.

use crate::api::BackendError;
use crate::domain::OrderId;
use crate::lifecycle::LifecycleError;
use crate::storage::StorageError;

/// Sync agent error type.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("sync agent is already running")]
    AlreadyRunning,
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),
    #[error("lifecycle error: {0}")]
    Lifecycle(#[from] LifecycleError),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("no status push queued for order {0}")]
    NothingQueued(OrderId),
    #[error("backend kept reporting more pages after {0} pages")]
    TooManyPages(u32),
}
