//! Queue of locally applied status changes awaiting backend confirmation.
//!
//! Entries are FIFO per order: a later change for an order is never pushed
//! while an earlier one is still queued.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::debug;

use crate::api::StatusUpdate;
use crate::config::RetryConfig;
use crate::domain::{CanonicalStatus, OrderId, StatusChange};
use crate::lifecycle::ConfirmationSink;

/// Deterministic key for one status change, stable across retries and restarts.
pub fn idempotency_key(order_id: &OrderId, status: CanonicalStatus, at: DateTime<Utc>) -> String {
    let data = format!("{}|{}|{}", order_id, status, at.to_rfc3339());

    let mut hasher = Sha256::new();
    hasher.update(data.as_bytes());
    let hash = hasher.finalize();

    hex::encode(&hash[..16])
}

/// One queued push.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingPush {
    pub order_id: OrderId,
    pub status: CanonicalStatus,
    pub at: DateTime<Utc>,
    /// Failed attempts so far.
    pub attempts: u32,
    pub key: String,
    pub last_error: Option<String>,
    not_before: Option<Instant>,
}

impl PendingPush {
    fn new(order_id: OrderId, change: &StatusChange) -> Self {
        Self {
            key: idempotency_key(&order_id, change.status, change.at),
            order_id,
            status: change.status,
            at: change.at,
            attempts: 0,
            last_error: None,
            not_before: None,
        }
    }

    pub fn to_update(&self) -> StatusUpdate {
        StatusUpdate {
            order_id: self.order_id.clone(),
            status: self.status,
            at: self.at,
            idempotency_key: self.key.clone(),
        }
    }

    fn is_due(&self, now: Instant) -> bool {
        self.not_before.is_none_or(|at| at <= now)
    }
}

/// What happened to an entry after a failed push.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushFailure {
    /// Still queued; next attempt after `delay`.
    Retrying { attempts: u32, delay: Duration },
    /// Removed from the queue.
    Abandoned(PendingPush),
}

/// PushOutbox holds pending pushes and their backoff state.
pub struct PushOutbox {
    queues: Mutex<BTreeMap<OrderId, VecDeque<PendingPush>>>,
    retry: RetryConfig,
}

impl PushOutbox {
    pub fn new(retry: RetryConfig) -> Self {
        Self {
            queues: Mutex::new(BTreeMap::new()),
            retry,
        }
    }

    fn queues(&self) -> std::sync::MutexGuard<'_, BTreeMap<OrderId, VecDeque<PendingPush>>> {
        self.queues.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queues a change; a change already queued under the same key is ignored.
    pub fn push(&self, order_id: &OrderId, change: &StatusChange) {
        let entry = PendingPush::new(order_id.clone(), change);
        let mut queues = self.queues();
        let queue = queues.entry(order_id.clone()).or_default();
        if queue.iter().any(|p| p.key == entry.key) {
            return;
        }
        debug!(order_id = %order_id, status = %change.status, key = %entry.key, "Status push queued");
        queue.push_back(entry);
    }

    /// Total queued entries.
    pub fn len(&self) -> usize {
        self.queues().values().map(VecDeque::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Queued entries for one order, oldest first.
    pub fn pending_for(&self, order_id: &OrderId) -> Vec<PendingPush> {
        self.queues()
            .get(order_id)
            .map(|q| q.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Orders whose oldest entry may be pushed at `now`.
    pub fn due_orders(&self, now: Instant) -> Vec<OrderId> {
        self.queues()
            .iter()
            .filter(|(_, queue)| queue.front().is_some_and(|p| p.is_due(now)))
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Oldest entry for an order, regardless of backoff.
    pub fn head(&self, order_id: &OrderId) -> Option<PendingPush> {
        self.queues().get(order_id).and_then(|q| q.front().cloned())
    }

    /// Removes the head entry after the backend accepted it.
    /// Returns false if the head no longer carries `key`.
    pub fn confirm(&self, order_id: &OrderId, key: &str) -> bool {
        let mut queues = self.queues();
        let Some(queue) = queues.get_mut(order_id) else {
            return false;
        };
        if queue.front().is_none_or(|p| p.key != key) {
            return false;
        }
        queue.pop_front();
        if queue.is_empty() {
            queues.remove(order_id);
        }
        true
    }

    /// Records a failed attempt on the head entry.
    ///
    /// The entry is abandoned once it reaches the configured attempt limit,
    /// or right away when `retryable` is false.
    pub fn fail(
        &self,
        order_id: &OrderId,
        key: &str,
        error: &str,
        retryable: bool,
        now: Instant,
    ) -> Option<PushFailure> {
        let mut queues = self.queues();
        let queue = queues.get_mut(order_id)?;
        let head = queue.front_mut().filter(|p| p.key == key)?;

        head.attempts += 1;
        head.last_error = Some(error.to_string());

        if !retryable || head.attempts >= self.retry.max_attempts() {
            let abandoned = queue.pop_front()?;
            if queue.is_empty() {
                queues.remove(order_id);
            }
            return Some(PushFailure::Abandoned(abandoned));
        }

        let delay = self.retry.delay_after(head.attempts);
        head.not_before = Some(now + delay);
        Some(PushFailure::Retrying {
            attempts: head.attempts,
            delay,
        })
    }
}

impl ConfirmationSink for PushOutbox {
    fn enqueue(&self, order_id: &OrderId, change: &StatusChange) {
        self.push(order_id, change);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Actor;
    use crate::fixtures::at;

    use CanonicalStatus::*;

    fn change(status: CanonicalStatus, secs: i64) -> StatusChange {
        StatusChange {
            status,
            at: at(secs),
            actor: Actor::Seller,
        }
    }

    fn outbox(max_attempts: u32) -> PushOutbox {
        PushOutbox::new(RetryConfig {
            max_attempts: Some(max_attempts),
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            multiplier: Some(2.0),
        })
    }

    #[test]
    fn test_key_is_deterministic_and_distinct() {
        let id = OrderId::from("o-1");
        let key = idempotency_key(&id, Processing, at(1));

        assert_eq!(key, idempotency_key(&id, Processing, at(1)));
        assert_eq!(key.len(), 32);
        assert_ne!(key, idempotency_key(&id, Processing, at(2)));
        assert_ne!(key, idempotency_key(&id, Shipped, at(1)));
        assert_ne!(key, idempotency_key(&"o-2".into(), Processing, at(1)));
    }

    #[test]
    fn test_fifo_per_order_and_duplicate_keys() {
        let outbox = outbox(3);
        let id = OrderId::from("o-1");
        outbox.push(&id, &change(Processing, 1));
        outbox.push(&id, &change(Shipped, 2));
        outbox.push(&id, &change(Processing, 1));

        let pending = outbox.pending_for(&id);
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].status, Processing);
        assert_eq!(outbox.head(&id).unwrap().status, Processing);

        assert!(!outbox.confirm(&id, &pending[1].key));
        assert!(outbox.confirm(&id, &pending[0].key));
        assert_eq!(outbox.head(&id).unwrap().status, Shipped);
    }

    #[test]
    fn test_failure_backs_off_then_abandons() {
        let outbox = outbox(2);
        let id = OrderId::from("o-1");
        outbox.push(&id, &change(Cancelled, 1));
        let key = outbox.head(&id).unwrap().key;
        let now = Instant::now();

        let first = outbox.fail(&id, &key, "503", true, now).unwrap();
        assert_eq!(
            first,
            PushFailure::Retrying {
                attempts: 1,
                delay: Duration::from_secs(1)
            }
        );
        assert!(outbox.due_orders(now).is_empty());
        assert_eq!(outbox.due_orders(now + Duration::from_secs(1)), vec![id.clone()]);

        match outbox.fail(&id, &key, "503", true, now).unwrap() {
            PushFailure::Abandoned(entry) => {
                assert_eq!(entry.attempts, 2);
                assert_eq!(entry.last_error.as_deref(), Some("503"));
            }
            other => panic!("expected abandon, got {other:?}"),
        }
        assert!(outbox.is_empty());
    }

    #[test]
    fn test_final_error_abandons_immediately() {
        let outbox = outbox(5);
        let id = OrderId::from("o-1");
        outbox.push(&id, &change(Processing, 1));
        outbox.push(&id, &change(Shipped, 2));
        let key = outbox.head(&id).unwrap().key;

        let result = outbox.fail(&id, &key, "422", false, Instant::now());

        assert!(matches!(result, Some(PushFailure::Abandoned(_))));
        // the next change for the order moves up
        assert_eq!(outbox.head(&id).unwrap().status, Shipped);
    }

    #[test]
    fn test_blocked_head_holds_back_its_order_only() {
        let outbox = outbox(5);
        let now = Instant::now();
        outbox.push(&"o-1".into(), &change(Processing, 1));
        outbox.push(&"o-1".into(), &change(Shipped, 2));
        outbox.push(&"o-2".into(), &change(Processing, 1));
        let key = outbox.head(&"o-1".into()).unwrap().key;
        outbox.fail(&"o-1".into(), &key, "timeout", true, now);

        assert_eq!(outbox.due_orders(now), vec![OrderId::from("o-2")]);
        assert_eq!(outbox.len(), 3);
    }
}
