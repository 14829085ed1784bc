//! Lifecycle error types.

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::domain::{CanonicalStatus, OrderError, OrderId, Role};

/// Errors raised by the order store and the lifecycle service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifecycleError {
    /// No order with this id in the store.
    #[error("order {0} not found")]
    NotFound(OrderId),

    /// An order with this id is already stored.
    #[error("order {0} already exists")]
    DuplicateId(OrderId),

    /// The role has nothing to do for this status.
    #[error("no transition from {status} for {role}")]
    NoLegalTransition { status: CanonicalStatus, role: Role },

    /// The order moved since the caller last looked at it.
    #[error("order {id} is {actual}, expected {expected}")]
    ConcurrentModification {
        id: OrderId,
        expected: CanonicalStatus,
        actual: CanonicalStatus,
    },

    /// The change is older than the order's latest history entry.
    #[error("order {id}: change at {attempted} precedes last change at {last}")]
    StaleTimestamp {
        id: OrderId,
        last: DateTime<Utc>,
        attempted: DateTime<Utc>,
    },

    /// Cancellation is only possible before shipping.
    #[error("cannot cancel an order that is {0}")]
    InvalidCancellation(CanonicalStatus),

    #[error("invalid order: {0}")]
    InvalidOrder(#[from] OrderError),

    #[error("order {order_id}: product {product_id} cannot be reviewed")]
    ReviewNotEligible {
        order_id: OrderId,
        product_id: String,
    },
}

impl LifecycleError {
    /// Expected outcomes that mean "no action available".
    pub fn is_routine(&self) -> bool {
        matches!(
            self,
            LifecycleError::NoLegalTransition { .. }
                | LifecycleError::InvalidCancellation(_)
                | LifecycleError::ReviewNotEligible { .. }
        )
    }

    /// The caller's view is stale; refresh and retry.
    pub fn requires_refresh(&self) -> bool {
        matches!(
            self,
            LifecycleError::ConcurrentModification { .. } | LifecycleError::StaleTimestamp { .. }
        )
    }

    /// Indicates a bug in a caller or in reconciliation.
    pub fn is_programmer_error(&self) -> bool {
        matches!(
            self,
            LifecycleError::NotFound(_)
                | LifecycleError::DuplicateId(_)
                | LifecycleError::InvalidOrder(_)
        )
    }

    /// Logs the error at the level its class calls for.
    pub(crate) fn trace(&self, operation: &str) {
        if self.is_programmer_error() {
            error!(operation, error = %self, "Order operation failed");
        } else if self.requires_refresh() {
            warn!(operation, error = %self, "Order changed underneath caller");
        } else {
            debug!(operation, error = %self, "No action available");
        }
    }
}

/// Result type for lifecycle operations.
pub type Result<T> = std::result::Result<T, LifecycleError>;
