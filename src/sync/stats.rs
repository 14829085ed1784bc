//! Runtime statistics for the sync agent.

use crate::lifecycle::MergeReport;

/// Counters since start-up.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStats {
    pub sync_cycles: u64,
    pub failed_cycles: u64,
    pub pages_fetched: u64,
    pub orders_inserted: u64,
    pub orders_advanced: u64,
    pub orders_kept_local: u64,
    pub orders_removed: u64,
    pub merge_failures: u64,
    pub pushes_confirmed: u64,
    pub pushes_failed: u64,
    pub pushes_abandoned: u64,
    pub checkouts: u64,
}

impl SyncStats {
    pub(super) fn record_merge(&mut self, report: &MergeReport) {
        self.orders_inserted += report.inserted as u64;
        self.orders_advanced += report.advanced as u64;
        self.orders_kept_local += report.kept_local as u64;
        self.orders_removed += report.removed as u64;
        self.merge_failures += report.failed as u64;
    }
}
