//! Review eligibility.
//!
//! Eligibility is computed from the live order status every time it is asked
//! for; only the fact that a review was written is stored.

use std::collections::HashSet;
use std::sync::{PoisonError, RwLock};
use tracing::info;

use super::error::{LifecycleError, Result};
use super::store::OrderStore;
use crate::domain::{CanonicalStatus, Order, OrderId};

/// ReviewLedger remembers which `(order, product)` pairs were reviewed.
#[derive(Default)]
pub struct ReviewLedger {
    reviewed: RwLock<HashSet<(OrderId, String)>>,
}

fn eligible(order: &Order, buyer_id: &str, product_id: &str) -> bool {
    order.status() == CanonicalStatus::Completed
        && order.buyer_id == buyer_id
        && order.contains_product(product_id)
}

impl ReviewLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if `buyer_id` may review `product_id` from this order now.
    pub fn is_eligible(
        &self,
        store: &OrderStore,
        buyer_id: &str,
        order_id: &OrderId,
        product_id: &str,
    ) -> bool {
        let Some(order) = store.get(order_id) else {
            return false;
        };
        let reviewed = self.reviewed.read().unwrap_or_else(PoisonError::into_inner);
        eligible(&order, buyer_id, product_id)
            && !reviewed.contains(&(order_id.clone(), product_id.to_string()))
    }

    /// Records a review, failing with `ReviewNotEligible` if it is not allowed.
    pub fn record_review(
        &self,
        store: &OrderStore,
        buyer_id: &str,
        order_id: &OrderId,
        product_id: &str,
    ) -> Result<()> {
        let order = store
            .get(order_id)
            .ok_or_else(|| LifecycleError::NotFound(order_id.clone()))?;

        let mut reviewed = self.reviewed.write().unwrap_or_else(PoisonError::into_inner);
        let key = (order_id.clone(), product_id.to_string());
        if !eligible(&order, buyer_id, product_id) || reviewed.contains(&key) {
            return Err(LifecycleError::ReviewNotEligible {
                order_id: order_id.clone(),
                product_id: product_id.to_string(),
            });
        }

        reviewed.insert(key);
        info!(order_id = %order_id, product_id, "Review recorded");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{order, order_in};

    #[test]
    fn test_only_completed_orders_are_reviewable() {
        let store = OrderStore::new();
        store.insert(order("o-1")).unwrap();
        store
            .insert(order_in("o-2", CanonicalStatus::Completed))
            .unwrap();
        let ledger = ReviewLedger::new();

        assert!(!ledger.is_eligible(&store, "buyer-1", &"o-1".into(), "p-urea"));
        assert!(ledger.is_eligible(&store, "buyer-1", &"o-2".into(), "p-urea"));
        assert!(!ledger.is_eligible(&store, "buyer-1", &"o-2".into(), "p-tractor"));
        assert!(!ledger.is_eligible(&store, "buyer-2", &"o-2".into(), "p-urea"));
        assert!(!ledger.is_eligible(&store, "buyer-1", &"o-404".into(), "p-urea"));
    }

    #[test]
    fn test_each_pair_is_reviewed_once() {
        let store = OrderStore::new();
        store
            .insert(order_in("o-1", CanonicalStatus::Completed))
            .unwrap();
        let ledger = ReviewLedger::new();

        ledger
            .record_review(&store, "buyer-1", &"o-1".into(), "p-urea")
            .unwrap();

        assert!(!ledger.is_eligible(&store, "buyer-1", &"o-1".into(), "p-urea"));
        assert!(ledger.is_eligible(&store, "buyer-1", &"o-1".into(), "p-seed"));
        assert!(matches!(
            ledger.record_review(&store, "buyer-1", &"o-1".into(), "p-urea"),
            Err(LifecycleError::ReviewNotEligible { .. })
        ));
    }

    #[test]
    fn test_eligibility_follows_live_status() {
        let store = OrderStore::new();
        store
            .insert(order_in("o-1", CanonicalStatus::Shipped))
            .unwrap();
        let ledger = ReviewLedger::new();
        assert!(!ledger.is_eligible(&store, "buyer-1", &"o-1".into(), "p-urea"));

        store
            .apply_status(
                &"o-1".into(),
                CanonicalStatus::Completed,
                crate::domain::Actor::Buyer,
                crate::fixtures::at(10),
            )
            .unwrap();

        assert!(ledger.is_eligible(&store, "buyer-1", &"o-1".into(), "p-urea"));
    }
}
