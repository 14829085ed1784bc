//! Transition policy: which role may move an order to which status.
//!
//! Pure functions of `(status, role)`; nothing here looks at the store.
//!
//! ```text
//! pending --seller--> processing --seller--> shipped --buyer--> completed
//!    \                    /
//!     +----any role------+--> cancelled
//! ```

use serde::Serialize;

use super::error::{LifecycleError, Result};
use crate::domain::{Actor, CanonicalStatus, Locale, Order, Role};

/// The single legal next status for `actor`, if any. Admin counts as seller.
pub fn next_status(current: CanonicalStatus, actor: Role) -> Option<CanonicalStatus> {
    match (current, actor.effective()) {
        (CanonicalStatus::Pending, Role::Seller) => Some(CanonicalStatus::Processing),
        (CanonicalStatus::Processing, Role::Seller) => Some(CanonicalStatus::Shipped),
        (CanonicalStatus::Shipped, Role::Buyer) => Some(CanonicalStatus::Completed),
        _ => None,
    }
}

/// Like [`next_status`] but fails with `NoLegalTransition`.
pub fn require_next(current: CanonicalStatus, actor: Role) -> Result<CanonicalStatus> {
    next_status(current, actor).ok_or(LifecycleError::NoLegalTransition {
        status: current,
        role: actor,
    })
}

/// Returns true while the order can still be cancelled.
pub fn can_cancel(current: CanonicalStatus) -> bool {
    matches!(
        current,
        CanonicalStatus::Pending | CanonicalStatus::Processing
    )
}

/// Cancellation rule. Either role may cancel before shipping.
pub fn cancel(current: CanonicalStatus) -> Result<CanonicalStatus> {
    if can_cancel(current) {
        Ok(CanonicalStatus::Cancelled)
    } else {
        Err(LifecycleError::InvalidCancellation(current))
    }
}

/// Returns true if `to` directly follows `from` for some role, or is a legal cancellation.
pub fn is_legal_step(from: CanonicalStatus, to: CanonicalStatus) -> bool {
    [Role::Buyer, Role::Seller]
        .into_iter()
        .any(|role| next_status(from, role) == Some(to))
        || (to == CanonicalStatus::Cancelled && can_cancel(from))
}

/// Whether a recorded history may go from `from` to `to` when `actor` made the change.
///
/// Repeats of the same status are tolerated. The backend may also jump forward
/// along the main line, because a merge that catches up records the remote
/// status as a single entry. Nothing may move backward or leave a terminal status.
pub fn is_recordable_step(from: CanonicalStatus, to: CanonicalStatus, actor: Actor) -> bool {
    if from == to || is_legal_step(from, to) {
        return true;
    }
    actor == Actor::Backend
        && matches!((from.rank(), to.rank()), (Some(f), Some(t)) if t > f)
}

/// What the UI may offer a role for an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AvailableAction {
    /// Button label for the primary action.
    pub label: &'static str,
    /// Status the primary action leads to; `None` if the only action is cancelling.
    pub next: Option<CanonicalStatus>,
    pub cancel_allowed: bool,
}

/// Derives the action for `role` on `order`, or `None` if there is nothing to offer.
pub fn available_action(order: &Order, role: Role, locale: Locale) -> Option<AvailableAction> {
    let current = order.status();
    let next = next_status(current, role);
    let cancel_allowed = can_cancel(current);

    let label = match next {
        Some(next) => action_label(next, locale),
        None if cancel_allowed => cancel_label(locale),
        None => return None,
    };

    Some(AvailableAction {
        label,
        next,
        cancel_allowed,
    })
}

fn action_label(next: CanonicalStatus, locale: Locale) -> &'static str {
    match (locale, next) {
        (Locale::Indonesian, CanonicalStatus::Processing) => "Proses Pesanan",
        (Locale::Indonesian, CanonicalStatus::Shipped) => "Kirim Pesanan",
        (Locale::Indonesian, CanonicalStatus::Completed) => "Pesanan Diterima",
        (Locale::English, CanonicalStatus::Processing) => "Process Order",
        (Locale::English, CanonicalStatus::Shipped) => "Ship Order",
        (Locale::English, CanonicalStatus::Completed) => "Confirm Receipt",
        // next_status never yields pending or cancelled
        (_, CanonicalStatus::Pending | CanonicalStatus::Cancelled) => cancel_label(locale),
    }
}

fn cancel_label(locale: Locale) -> &'static str {
    match locale {
        Locale::Indonesian => "Batalkan Pesanan",
        Locale::English => "Cancel Order",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::order_in;

    use CanonicalStatus::*;

    #[test]
    fn test_next_status_table() {
        let table = [
            (Pending, Some(Processing), None),
            (Processing, Some(Shipped), None),
            (Shipped, None, Some(Completed)),
            (Completed, None, None),
            (Cancelled, None, None),
        ];

        for (current, seller, buyer) in table {
            assert_eq!(next_status(current, Role::Seller), seller, "{current} seller");
            assert_eq!(next_status(current, Role::Admin), seller, "{current} admin");
            assert_eq!(next_status(current, Role::Buyer), buyer, "{current} buyer");
        }
    }

    #[test]
    fn test_require_next_reports_role() {
        assert_eq!(
            require_next(Processing, Role::Buyer),
            Err(LifecycleError::NoLegalTransition {
                status: Processing,
                role: Role::Buyer
            })
        );
        assert_eq!(require_next(Pending, Role::Seller), Ok(Processing));
    }

    #[test]
    fn test_cancel_only_before_shipping() {
        assert_eq!(cancel(Pending), Ok(Cancelled));
        assert_eq!(cancel(Processing), Ok(Cancelled));
        for status in [Shipped, Completed, Cancelled] {
            assert_eq!(cancel(status), Err(LifecycleError::InvalidCancellation(status)));
        }
    }

    #[test]
    fn test_legal_steps_never_skip_or_go_back() {
        assert!(is_legal_step(Pending, Processing));
        assert!(is_legal_step(Shipped, Completed));
        assert!(is_legal_step(Processing, Cancelled));
        assert!(!is_legal_step(Pending, Shipped));
        assert!(!is_legal_step(Shipped, Processing));
        assert!(!is_legal_step(Shipped, Cancelled));
    }

    #[test]
    fn test_recordable_steps_allow_backend_catch_up_only() {
        assert!(is_recordable_step(Pending, Pending, Actor::Buyer));
        assert!(is_recordable_step(Pending, Processing, Actor::Seller));
        assert!(is_recordable_step(Pending, Shipped, Actor::Backend));
        assert!(is_recordable_step(Processing, Completed, Actor::Backend));

        assert!(!is_recordable_step(Pending, Shipped, Actor::Seller));
        assert!(!is_recordable_step(Completed, Pending, Actor::Backend));
        assert!(!is_recordable_step(Shipped, Processing, Actor::Backend));
        assert!(!is_recordable_step(Cancelled, Processing, Actor::Backend));
        assert!(!is_recordable_step(Shipped, Cancelled, Actor::Backend));
    }

    #[test]
    fn test_available_action_for_seller_and_buyer() {
        let pending = order_in("o-1", Pending);
        assert_eq!(
            available_action(&pending, Role::Seller, Locale::Indonesian),
            Some(AvailableAction {
                label: "Proses Pesanan",
                next: Some(Processing),
                cancel_allowed: true
            })
        );
        // buyer can only cancel a pending order
        assert_eq!(
            available_action(&pending, Role::Buyer, Locale::English),
            Some(AvailableAction {
                label: "Cancel Order",
                next: None,
                cancel_allowed: true
            })
        );

        let shipped = order_in("o-1", Shipped);
        assert_eq!(available_action(&shipped, Role::Seller, Locale::English), None);
        assert_eq!(
            available_action(&shipped, Role::Buyer, Locale::Indonesian).map(|a| a.label),
            Some("Pesanan Diterima")
        );

        assert_eq!(available_action(&order_in("o-1", Completed), Role::Buyer, Locale::English), None);
        assert_eq!(available_action(&order_in("o-1", Cancelled), Role::Seller, Locale::English), None);
    }
}
