//! In-memory authoritative set of orders for the session.
//!
//! Each order sits behind its own mutex, so status changes on one order are
//! serialised while reads and writes on other orders proceed. Every successful
//! mutation is broadcast as an [`OrderEvent`]; failed mutations emit nothing.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use tokio::sync::broadcast;
use tracing::debug;

use super::error::{LifecycleError, Result};
use crate::domain::{Actor, CanonicalStatus, Order, OrderId, StatusChange};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Change notification emitted once per mutation.
#[derive(Debug, Clone)]
pub enum OrderEvent {
    Inserted(Order),
    StatusChanged {
        order: Order,
        previous: CanonicalStatus,
    },
    Removed(OrderId),
}

impl OrderEvent {
    pub fn order_id(&self) -> &OrderId {
        match self {
            OrderEvent::Inserted(order) => &order.id,
            OrderEvent::StatusChanged { order, .. } => &order.id,
            OrderEvent::Removed(id) => id,
        }
    }
}

/// Which side of the orders to list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Party {
    Buyer(String),
    Seller(String),
}

/// Listing filter for adapter binding.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderFilter {
    pub party: Option<Party>,
    pub status: Option<CanonicalStatus>,
}

impl OrderFilter {
    pub fn matches(&self, order: &Order) -> bool {
        let party_ok = match &self.party {
            None => true,
            Some(Party::Buyer(id)) => order.buyer_id == *id,
            Some(Party::Seller(id)) => order.involves_seller(id),
        };
        party_ok && self.status.is_none_or(|s| order.status() == s)
    }
}

/// Result of a successful status mutation.
#[derive(Debug, Clone)]
pub struct AppliedChange {
    pub order: Order,
    pub previous: CanonicalStatus,
}

#[derive(Default)]
struct Index {
    orders: HashMap<OrderId, Arc<Mutex<Order>>>,
    /// Insertion order, oldest first.
    sequence: Vec<OrderId>,
}

/// OrderStore owns the session's orders, keyed by id.
pub struct OrderStore {
    index: RwLock<Index>,
    events: broadcast::Sender<OrderEvent>,
}

fn lock(order: &Mutex<Order>) -> MutexGuard<'_, Order> {
    order.lock().unwrap_or_else(PoisonError::into_inner)
}

impl OrderStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            index: RwLock::new(Index::default()),
            events,
        }
    }

    /// Subscribes to change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<OrderEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: OrderEvent) {
        // no receivers is fine
        let _ = self.events.send(event);
    }

    fn entry(&self, id: &OrderId) -> Option<Arc<Mutex<Order>>> {
        let index = self.index.read().unwrap_or_else(PoisonError::into_inner);
        index.orders.get(id).cloned()
    }

    /// Adds a new order. Fails with `DuplicateId` if the id is taken.
    pub(crate) fn insert(&self, order: Order) -> Result<()> {
        {
            let mut index = self.index.write().unwrap_or_else(PoisonError::into_inner);
            if index.orders.contains_key(&order.id) {
                return Err(LifecycleError::DuplicateId(order.id));
            }
            index
                .orders
                .insert(order.id.clone(), Arc::new(Mutex::new(order.clone())));
            index.sequence.push(order.id.clone());
        }

        debug!(order_id = %order.id, status = %order.status(), "Order inserted");
        self.emit(OrderEvent::Inserted(order));
        Ok(())
    }

    /// Consistent snapshot of one order.
    pub fn get(&self, id: &OrderId) -> Option<Order> {
        self.entry(id).map(|entry| lock(&entry).clone())
    }

    pub fn contains(&self, id: &OrderId) -> bool {
        self.entry(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.index
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .sequence
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Orders matching `filter`, newest inserted first.
    pub fn list(&self, filter: &OrderFilter) -> Vec<Order> {
        let index = self.index.read().unwrap_or_else(PoisonError::into_inner);
        index
            .sequence
            .iter()
            .rev()
            .filter_map(|id| index.orders.get(id))
            .map(|entry| lock(entry).clone())
            .filter(|order| filter.matches(order))
            .collect()
    }

    /// Orders currently in `status`, newest inserted first.
    pub fn filter_by_status(&self, status: CanonicalStatus) -> Vec<Order> {
        self.list(&OrderFilter {
            party: None,
            status: Some(status),
        })
    }

    /// Every order, newest inserted first.
    pub fn all(&self) -> Vec<Order> {
        self.list(&OrderFilter::default())
    }

    /// Appends `status` to the order's history. All-or-nothing.
    ///
    /// Fails with `NotFound` for unknown ids and `StaleTimestamp` when `at`
    /// precedes the order's last recorded change.
    pub(crate) fn apply_status(
        &self,
        id: &OrderId,
        status: CanonicalStatus,
        actor: Actor,
        at: DateTime<Utc>,
    ) -> Result<AppliedChange> {
        self.update(id, actor, |_| Ok((status, at)))
    }

    /// Decides and applies a change while holding the order's lock, so the
    /// decision sees exactly the state it is applied to.
    pub(crate) fn update<F>(&self, id: &OrderId, actor: Actor, decide: F) -> Result<AppliedChange>
    where
        F: FnOnce(&Order) -> Result<(CanonicalStatus, DateTime<Utc>)>,
    {
        self.update_and(id, actor, decide, |_| {})
    }

    /// Like [`update`](Self::update), and hands the new history entry to
    /// `applied` before the order lock is released. Anything `applied` records
    /// therefore sees one order's changes in history order.
    pub(crate) fn update_and<F, G>(
        &self,
        id: &OrderId,
        actor: Actor,
        decide: F,
        applied: G,
    ) -> Result<AppliedChange>
    where
        F: FnOnce(&Order) -> Result<(CanonicalStatus, DateTime<Utc>)>,
        G: FnOnce(&StatusChange),
    {
        let entry = self
            .entry(id)
            .ok_or_else(|| LifecycleError::NotFound(id.clone()))?;
        let mut order = lock(&entry);

        let (status, at) = decide(&order)?;
        let last = order.last_change().at;
        if at < last {
            return Err(LifecycleError::StaleTimestamp {
                id: id.clone(),
                last,
                attempted: at,
            });
        }

        let previous = order.status();
        order.push_change(StatusChange { status, at, actor });
        applied(order.last_change());
        let snapshot = order.clone();

        debug!(
            order_id = %id,
            from = %previous,
            to = %status,
            actor = %actor,
            "Order status applied"
        );

        // emitted under the order lock so events for one order arrive in history order
        self.emit(OrderEvent::StatusChanged {
            order: snapshot.clone(),
            previous,
        });

        Ok(AppliedChange {
            order: snapshot,
            previous,
        })
    }

    /// Drops an order the backend reported as deleted.
    pub(crate) fn remove(&self, id: &OrderId) -> Option<Order> {
        let removed = {
            let mut index = self.index.write().unwrap_or_else(PoisonError::into_inner);
            let entry = index.orders.remove(id)?;
            index.sequence.retain(|existing| existing != id);
            let order = lock(&entry).clone();
            order
        };

        debug!(order_id = %id, "Order removed");
        self.emit(OrderEvent::Removed(id.clone()));
        Some(removed)
    }
}

impl Default for OrderStore {
    fn default() -> Self {
        Self::new()
    }
}
