//! Order lifecycle service: the only entry point that changes an order's status.
//!
//! Transitions are applied locally right away. Remote confirmation happens
//! later through whatever [`ConfirmationSink`] is attached.

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::info;

use super::error::{LifecycleError, Result};
use super::policy::{self, AvailableAction};
use super::store::{OrderFilter, OrderStore};
use crate::domain::{
    Actor, CanonicalStatus, CartSnapshot, Locale, Order, OrderId, Role, StatusChange,
};

/// Source of transition timestamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Receives every locally applied transition for later confirmation upstream.
///
/// Called while the order is locked; implementations must not call back into
/// the store.
pub trait ConfirmationSink: Send + Sync {
    fn enqueue(&self, order_id: &OrderId, change: &StatusChange);
}

/// Outcome of a successful transition.
#[derive(Debug, Clone)]
pub struct TransitionOutcome {
    pub status: CanonicalStatus,
    pub previous: CanonicalStatus,
    pub order: Order,
}

/// Timestamp for a new history entry: the clock reading, nudged past `last`
/// when the clock has not moved on since the previous entry.
fn next_timestamp(now: DateTime<Utc>, last: DateTime<Utc>) -> DateTime<Utc> {
    if now > last {
        now
    } else {
        last + Duration::microseconds(1)
    }
}

/// LifecycleService gates every status change through the transition policy.
pub struct LifecycleService {
    store: Arc<OrderStore>,
    clock: Arc<dyn Clock>,
    locale: Locale,
    confirmations: Option<Arc<dyn ConfirmationSink>>,
}

impl LifecycleService {
    pub fn new(store: Arc<OrderStore>, clock: Arc<dyn Clock>, locale: Locale) -> Self {
        Self {
            store,
            clock,
            locale,
            confirmations: None,
        }
    }

    /// Attaches a sink that receives every applied transition.
    pub fn with_confirmations(mut self, sink: Arc<dyn ConfirmationSink>) -> Self {
        self.confirmations = Some(sink);
        self
    }

    pub fn store(&self) -> &Arc<OrderStore> {
        &self.store
    }

    pub fn locale(&self) -> Locale {
        self.locale
    }

    /// Creates a pending order from a cart and stores it.
    pub fn create_order(&self, id: OrderId, cart: CartSnapshot) -> Result<Order> {
        let order = Order::from_checkout(id, cart, self.clock.now())?;
        self.record_checkout(order)
    }

    /// Stores an order produced by checkout (locally or by the backend).
    pub fn record_checkout(&self, order: Order) -> Result<Order> {
        match self.store.insert(order.clone()) {
            Ok(()) => {
                info!(
                    order_id = %order.id,
                    buyer_id = %order.buyer_id,
                    total = %order.total_price,
                    "Order recorded"
                );
                Ok(order)
            }
            Err(e) => {
                e.trace("record_checkout");
                Err(e)
            }
        }
    }

    pub fn get(&self, id: &OrderId) -> Option<Order> {
        self.store.get(id)
    }

    /// Orders for adapter binding, newest first.
    pub fn list_orders(&self, filter: &OrderFilter) -> Vec<Order> {
        self.store.list(filter)
    }

    /// What `role` may do with `order` right now.
    pub fn available_action(&self, order: &Order, role: Role) -> Option<AvailableAction> {
        policy::available_action(order, role, self.locale)
    }

    /// Advances the order one step for `role`.
    ///
    /// When `expected` is given and the stored status differs, fails with
    /// `ConcurrentModification` instead of acting on a stale view.
    pub fn request_transition(
        &self,
        id: &OrderId,
        role: Role,
        expected: Option<CanonicalStatus>,
    ) -> Result<TransitionOutcome> {
        self.transition("request_transition", id, role, |order| {
            if let Some(expected) = expected {
                if order.status() != expected {
                    return Err(LifecycleError::ConcurrentModification {
                        id: order.id.clone(),
                        expected,
                        actual: order.status(),
                    });
                }
            }
            policy::require_next(order.status(), role)
        })
    }

    /// Cancels the order. Either role may cancel while pending or processing.
    pub fn request_cancellation(&self, id: &OrderId, role: Role) -> Result<TransitionOutcome> {
        self.transition("request_cancellation", id, role, |order| {
            policy::cancel(order.status())
        })
    }

    fn transition<F>(
        &self,
        operation: &str,
        id: &OrderId,
        role: Role,
        decide: F,
    ) -> Result<TransitionOutcome>
    where
        F: FnOnce(&Order) -> Result<CanonicalStatus>,
    {
        let now = self.clock.now();
        let sink = self.confirmations.as_deref();
        let result = self.store.update_and(
            id,
            Actor::from(role),
            |order| {
                let status = decide(order)?;
                Ok((status, next_timestamp(now, order.last_change().at)))
            },
            // queued under the order lock, so confirmations keep history order
            |change| {
                if let Some(sink) = sink {
                    sink.enqueue(id, change);
                }
            },
        );

        let applied = match result {
            Ok(applied) => applied,
            Err(e) => {
                e.trace(operation);
                return Err(e);
            }
        };

        let change = applied.order.last_change().clone();
        info!(
            order_id = %id,
            from = %applied.previous,
            to = %change.status,
            role = %role,
            "Order transitioned"
        );

        Ok(TransitionOutcome {
            status: change.status,
            previous: applied.previous,
            order: applied.order,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{ManualClock, at, cart, order, order_in};
    use std::sync::{Mutex, mpsc};
    use std::thread;

    use CanonicalStatus::*;

    fn service() -> (LifecycleService, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::starting_at(at(0)));
        let service = LifecycleService::new(
            Arc::new(OrderStore::new()),
            clock.clone(),
            Locale::Indonesian,
        );
        (service, clock)
    }

    #[derive(Default)]
    struct RecordingSink(Mutex<Vec<(OrderId, CanonicalStatus)>>);

    impl ConfirmationSink for RecordingSink {
        fn enqueue(&self, order_id: &OrderId, change: &StatusChange) {
            self.0.lock().unwrap().push((order_id.clone(), change.status));
        }
    }

    #[test]
    fn test_full_lifecycle_seller_then_buyer() {
        let (service, clock) = service();
        let id = OrderId::from("o-1");
        service.record_checkout(order("o-1")).unwrap();

        clock.advance(60);
        let out = service.request_transition(&id, Role::Seller, None).unwrap();
        assert_eq!((out.previous, out.status), (Pending, Processing));

        clock.advance(60);
        let out = service.request_transition(&id, Role::Seller, None).unwrap();
        assert_eq!(out.status, Shipped);

        clock.advance(60);
        let out = service.request_transition(&id, Role::Buyer, None).unwrap();
        assert_eq!(out.status, Completed);

        for role in [Role::Buyer, Role::Seller, Role::Admin] {
            assert!(matches!(
                service.request_transition(&id, role, None),
                Err(LifecycleError::NoLegalTransition { status: Completed, .. })
            ));
        }

        let order = service.get(&id).unwrap();
        let history = order.history();
        assert_eq!(history.len(), 4);
        assert!(history.windows(2).all(|w| w[0].at < w[1].at));
        assert_eq!(order.status(), history[3].status);
        assert_eq!(order.entered_at(Shipped), Some(at(120)));
        assert_eq!(history[3].actor, Actor::Buyer);
    }

    #[test]
    fn test_buyer_cannot_advance_pending() {
        let (service, _) = service();
        service.record_checkout(order("o-1")).unwrap();

        let err = service
            .request_transition(&"o-1".into(), Role::Buyer, None)
            .unwrap_err();

        assert!(err.is_routine());
        assert_eq!(service.get(&"o-1".into()).unwrap().history().len(), 1);
    }

    #[test]
    fn test_cancellation_while_processing_then_nothing() {
        let (service, clock) = service();
        let id = OrderId::from("o-1");
        service.record_checkout(order_in("o-1", Processing)).unwrap();

        clock.advance(5);
        let out = service.request_cancellation(&id, Role::Buyer).unwrap();
        assert_eq!(out.status, Cancelled);

        for role in [Role::Buyer, Role::Seller] {
            assert!(matches!(
                service.request_transition(&id, role, None),
                Err(LifecycleError::NoLegalTransition { .. })
            ));
        }
        assert_eq!(
            service.request_cancellation(&id, Role::Seller).unwrap_err(),
            LifecycleError::InvalidCancellation(Cancelled)
        );
    }

    #[test]
    fn test_cancellation_after_shipping_fails() {
        let (service, _) = service();
        service.record_checkout(order_in("o-1", Shipped)).unwrap();

        assert_eq!(
            service.request_cancellation(&"o-1".into(), Role::Seller).unwrap_err(),
            LifecycleError::InvalidCancellation(Shipped)
        );
    }

    #[test]
    fn test_expected_status_mismatch_is_concurrent_modification() {
        let (service, _) = service();
        let id = OrderId::from("o-1");
        service.record_checkout(order("o-1")).unwrap();
        service.request_transition(&id, Role::Seller, Some(Pending)).unwrap();

        let err = service
            .request_transition(&id, Role::Seller, Some(Pending))
            .unwrap_err();

        assert_eq!(
            err,
            LifecycleError::ConcurrentModification {
                id: id.clone(),
                expected: Pending,
                actual: Processing
            }
        );
        assert!(err.requires_refresh());
        assert_eq!(service.get(&id).unwrap().status(), Processing);
    }

    #[test]
    fn test_unknown_order_is_not_found() {
        let (service, _) = service();
        let err = service
            .request_transition(&"ghost".into(), Role::Seller, None)
            .unwrap_err();
        assert!(err.is_programmer_error());
    }

    #[test]
    fn test_duplicate_checkout_is_rejected() {
        let (service, _) = service();
        service.record_checkout(order("o-1")).unwrap();
        assert_eq!(
            service.record_checkout(order("o-1")).unwrap_err(),
            LifecycleError::DuplicateId("o-1".into())
        );
    }

    #[test]
    fn test_create_order_uses_clock() {
        let (service, clock) = service();
        clock.advance(30);

        let order = service
            .create_order("o-9".into(), cart("buyer-1", "seller-1"))
            .unwrap();

        assert_eq!(order.created_at, at(30));
        assert_eq!(service.store().len(), 1);
    }

    #[test]
    fn test_frozen_clock_still_yields_increasing_history() {
        let (service, _) = service();
        let id = OrderId::from("o-1");
        service.record_checkout(order("o-1")).unwrap();

        service.request_transition(&id, Role::Seller, None).unwrap();
        service.request_transition(&id, Role::Seller, None).unwrap();

        let order = service.get(&id).unwrap();
        assert!(order.history().windows(2).all(|w| w[0].at < w[1].at));
    }

    #[test]
    fn test_transitions_are_handed_to_sink() {
        let (service, _) = service();
        let sink = Arc::new(RecordingSink::default());
        let service = service.with_confirmations(sink.clone());
        service.record_checkout(order("o-1")).unwrap();

        service.request_transition(&"o-1".into(), Role::Seller, None).unwrap();
        let _ = service.request_transition(&"o-1".into(), Role::Buyer, None);
        service.request_cancellation(&"o-1".into(), Role::Buyer).unwrap();

        let seen = sink.0.lock().unwrap().clone();
        assert_eq!(
            seen,
            vec![
                (OrderId::from("o-1"), Processing),
                (OrderId::from("o-1"), Cancelled)
            ]
        );
    }

    #[test]
    fn test_racing_sellers_advance_exactly_once() {
        let (service, _) = service();
        let service = Arc::new(service);
        service.record_checkout(order("o-1")).unwrap();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let service = Arc::clone(&service);
                thread::spawn(move || {
                    service.request_transition(&"o-1".into(), Role::Seller, Some(Pending))
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let ok = results.iter().filter(|r| r.is_ok()).count();

        assert_eq!(ok, 1);
        assert!(results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(LifecycleError::requires_refresh));
        assert_eq!(service.get(&"o-1".into()).unwrap().history().len(), 2);
    }

    #[test]
    fn test_available_action_uses_service_locale() {
        let (service, _) = service();
        let order = order_in("o-1", Processing);
        let action = service.available_action(&order, Role::Seller).unwrap();
        assert_eq!(action.label, "Kirim Pesanan");
        assert_eq!(action.next, Some(Shipped));
    }

    /// Holds the first confirmation until released, then records like `RecordingSink`.
    struct GatedSink {
        inner: RecordingSink,
        entered: Mutex<Option<mpsc::Sender<()>>>,
        release: Mutex<Option<mpsc::Receiver<()>>>,
    }

    impl ConfirmationSink for GatedSink {
        fn enqueue(&self, order_id: &OrderId, change: &StatusChange) {
            let entered = self.entered.lock().unwrap().take();
            if let Some(entered) = entered {
                entered.send(()).unwrap();
                let release = self.release.lock().unwrap().take().unwrap();
                release.recv().unwrap();
            }
            self.inner.enqueue(order_id, change);
        }
    }

    #[test]
    fn test_confirmations_follow_history_order_under_contention() {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let sink = Arc::new(GatedSink {
            inner: RecordingSink::default(),
            entered: Mutex::new(Some(entered_tx)),
            release: Mutex::new(Some(release_rx)),
        });
        let (service, _) = service();
        let service = service.with_confirmations(sink.clone());
        let id = OrderId::from("o-1");
        service.record_checkout(order("o-1")).unwrap();

        thread::scope(|scope| {
            let first = scope.spawn(|| service.request_transition(&id, Role::Seller, Some(Pending)));
            entered_rx.recv().unwrap();

            // the second seller call races the first one's confirmation
            let second = scope.spawn(|| service.request_transition(&id, Role::Seller, None));
            thread::sleep(std::time::Duration::from_millis(50));
            release_tx.send(()).unwrap();

            assert_eq!(first.join().unwrap().unwrap().status, Processing);
            assert_eq!(second.join().unwrap().unwrap().status, Shipped);
        });

        let recorded: Vec<_> = sink.inner.0.lock().unwrap().iter().map(|(_, s)| *s).collect();
        assert_eq!(recorded, vec![Processing, Shipped]);
    }
}
