//! Merges remote order snapshots into the local store.
//!
//! The backend is authoritative once it has caught up, but an optimistic local
//! transition that has not reached the backend yet is never rolled back.
//! Orders missing from a page are left alone; only an explicit deletion removes one.

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{info, warn};

use super::error::LifecycleError;
use super::policy;
use super::service::Clock;
use super::store::OrderStore;
use crate::domain::{Actor, CanonicalStatus, Order, OrderId};

/// Attempts per order when a local transition races the merge.
const MAX_MERGE_ATTEMPTS: usize = 3;

/// One batch of remote data to merge.
#[derive(Debug, Clone, Default)]
pub struct RemoteBatch {
    /// Remote orders, already mapped to the domain model.
    pub orders: Vec<Order>,
    /// Ids the backend explicitly reported as deleted.
    pub deleted: Vec<OrderId>,
}

/// What a merge did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub inserted: usize,
    /// Local orders moved forward to the remote status.
    pub advanced: usize,
    /// Local orders ahead of or diverged from the remote, left as they are.
    pub kept_local: usize,
    pub unchanged: usize,
    pub removed: usize,
    pub failed: usize,
}

impl MergeReport {
    pub fn absorb(&mut self, other: MergeReport) {
        self.inserted += other.inserted;
        self.advanced += other.advanced;
        self.kept_local += other.kept_local;
        self.unchanged += other.unchanged;
        self.removed += other.removed;
        self.failed += other.failed;
    }

    pub fn changed(&self) -> usize {
        self.inserted + self.advanced + self.removed
    }
}

/// How a local/remote status pair is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Unchanged,
    KeepLocal,
    AdoptRemote,
}

/// Decides which side wins for one order.
///
/// Remote wins only when it is further along the main line, or when it
/// reports a cancellation the local order could still legally take.
pub fn resolve(local: CanonicalStatus, remote: CanonicalStatus) -> Resolution {
    if local == remote {
        return Resolution::Unchanged;
    }

    match (local.rank(), remote.rank()) {
        (Some(l), Some(r)) if r > l => Resolution::AdoptRemote,
        (Some(_), None) if policy::can_cancel(local) => Resolution::AdoptRemote,
        _ => Resolution::KeepLocal,
    }
}

enum Outcome {
    Inserted,
    Advanced,
    KeptLocal,
    Unchanged,
}

/// SyncReconciler folds remote snapshots into the [`OrderStore`].
pub struct SyncReconciler {
    store: Arc<OrderStore>,
    clock: Arc<dyn Clock>,
}

impl SyncReconciler {
    pub fn new(store: Arc<OrderStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Merges one batch. Individual failures are counted, not fatal.
    pub fn merge(&self, batch: RemoteBatch) -> MergeReport {
        let mut report = MergeReport::default();

        for remote in batch.orders {
            match self.merge_one(remote) {
                Ok(Outcome::Inserted) => report.inserted += 1,
                Ok(Outcome::Advanced) => report.advanced += 1,
                Ok(Outcome::KeptLocal) => report.kept_local += 1,
                Ok(Outcome::Unchanged) => report.unchanged += 1,
                Err(e) => {
                    e.trace("merge");
                    report.failed += 1;
                }
            }
        }

        for id in batch.deleted {
            if self.store.remove(&id).is_some() {
                info!(order_id = %id, "Order deleted upstream, removed locally");
                report.removed += 1;
            }
        }

        if report.changed() > 0 || report.failed > 0 {
            info!(
                inserted = report.inserted,
                advanced = report.advanced,
                kept_local = report.kept_local,
                removed = report.removed,
                failed = report.failed,
                "Remote orders merged"
            );
        }

        report
    }

    fn merge_one(&self, remote: Order) -> Result<Outcome, LifecycleError> {
        let mut attempts = 0;
        loop {
            attempts += 1;

            let Some(local) = self.store.get(&remote.id) else {
                match self.store.insert(remote.clone()) {
                    Ok(()) => return Ok(Outcome::Inserted),
                    // inserted concurrently; merge against it
                    Err(LifecycleError::DuplicateId(_)) if attempts < MAX_MERGE_ATTEMPTS => {
                        continue;
                    }
                    Err(e) => return Err(e),
                }
            };

            match resolve(local.status(), remote.status()) {
                Resolution::Unchanged => return Ok(Outcome::Unchanged),
                Resolution::KeepLocal => {
                    if remote.status() == CanonicalStatus::Cancelled
                        || local.status() == CanonicalStatus::Cancelled
                    {
                        warn!(
                            order_id = %local.id,
                            local = %local.status(),
                            remote = %remote.status(),
                            "Local and remote order status diverged, keeping local"
                        );
                    }
                    return Ok(Outcome::KeptLocal);
                }
                Resolution::AdoptRemote => {}
            }

            let observed = local.status();
            let target = remote.status();
            let reported_at = remote.last_change().at;
            let now = self.clock.now();

            let result = self.store.update(&remote.id, Actor::Backend, |current| {
                if current.status() != observed {
                    return Err(LifecycleError::ConcurrentModification {
                        id: current.id.clone(),
                        expected: observed,
                        actual: current.status(),
                    });
                }
                let at = adopt_timestamp(reported_at, now, current.last_change().at);
                Ok((target, at))
            });

            match result {
                Ok(_) => return Ok(Outcome::Advanced),
                Err(LifecycleError::ConcurrentModification { .. })
                    if attempts < MAX_MERGE_ATTEMPTS =>
                {
                    continue;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Timestamp for a synthetic history entry: the remote's own time when it does
/// not precede local history, otherwise the local clock (kept monotonic).
fn adopt_timestamp(
    reported: DateTime<Utc>,
    now: DateTime<Utc>,
    last: DateTime<Utc>,
) -> DateTime<Utc> {
    if reported >= last {
        reported
    } else if now > last {
        now
    } else {
        last + Duration::microseconds(1)
    }
}
