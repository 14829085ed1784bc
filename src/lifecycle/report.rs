//! Per-seller sales report.
//!
//! Revenue uses the prices frozen on each line at checkout and the completion
//! time recorded in the status history.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;

use crate::domain::{CanonicalStatus, Order};

/// Half-open reporting window `[from, to)` on completion time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportPeriod {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl ReportPeriod {
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.from <= at && at < self.to
    }
}

/// SalesReport summarises one seller's lines.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SalesReport {
    pub seller_id: String,
    pub completed_orders: usize,
    /// Sum of the seller's line subtotals over completed orders.
    pub revenue: Decimal,
    pub units_sold: u64,
    pub orders_by_status: HashMap<CanonicalStatus, usize>,
}

impl SalesReport {
    /// Builds the report from any set of orders; orders without the seller's lines are ignored.
    /// With a period, completed orders count only if they completed inside it.
    pub fn for_seller(orders: &[Order], seller_id: &str, period: Option<ReportPeriod>) -> Self {
        let mut report = SalesReport {
            seller_id: seller_id.to_string(),
            completed_orders: 0,
            revenue: Decimal::ZERO,
            units_sold: 0,
            orders_by_status: HashMap::new(),
        };

        for order in orders.iter().filter(|o| o.involves_seller(seller_id)) {
            *report.orders_by_status.entry(order.status()).or_default() += 1;

            if order.status() != CanonicalStatus::Completed {
                continue;
            }
            if let Some(period) = period {
                let completed_at = order.entered_at(CanonicalStatus::Completed);
                if !completed_at.is_some_and(|at| period.contains(at)) {
                    continue;
                }
            }

            report.completed_orders += 1;
            for line in order.line_items.iter().filter(|l| l.seller_id == seller_id) {
                report.revenue += line.line_subtotal;
                report.units_sold += u64::from(line.quantity);
            }
        }

        report
    }

    pub fn count(&self, status: CanonicalStatus) -> usize {
        self.orders_by_status.get(&status).copied().unwrap_or(0)
    }
}
