//! Shared builders for unit tests.

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;

use crate::domain::{
    Actor, CanonicalStatus, CartLine, CartSnapshot, Order, OrderId, OrderParts, StatusChange,
};

/// Fixed instant `secs` seconds after a base time.
pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

pub fn cart(buyer: &str, seller: &str) -> CartSnapshot {
    CartSnapshot {
        buyer_id: buyer.into(),
        lines: vec![
            CartLine {
                product_id: "p-urea".into(),
                product_name: "Pupuk Urea 50kg".into(),
                seller_id: seller.into(),
                unit_price: Decimal::from(185_000),
                quantity: 2,
            },
            CartLine {
                product_id: "p-seed".into(),
                product_name: "Benih Padi Ciherang".into(),
                seller_id: seller.into(),
                unit_price: Decimal::from(60_000),
                quantity: 1,
            },
        ],
        shipping_cost: Decimal::from(15_000),
        payment_method: "transfer".into(),
        shipping_address: "Jl. Sawah 1, Klaten".into(),
        recipient_phone: "+62812000000".into(),
    }
}

/// Fresh pending order created at `at(0)`.
pub fn order(id: &str) -> Order {
    Order::from_checkout(id.into(), cart("buyer-1", "seller-1"), at(0)).unwrap()
}

/// Order whose whole history is `statuses`, one second apart, recorded by the backend.
pub fn order_with_history(id: &str, statuses: &[CanonicalStatus]) -> Order {
    let base = order(id);
    let history = statuses
        .iter()
        .enumerate()
        .map(|(i, status)| StatusChange {
            status: *status,
            at: at(i as i64),
            actor: Actor::Backend,
        })
        .collect();

    Order::from_parts(OrderParts {
        id: OrderId::from(id),
        buyer_id: base.buyer_id.clone(),
        line_items: base.line_items.clone(),
        shipping_cost: base.shipping_cost,
        total_price: base.total_price,
        payment_method: base.payment_method.clone(),
        shipping_address: base.shipping_address.clone(),
        recipient_phone: base.recipient_phone.clone(),
        created_at: base.created_at,
        history,
    })
    .unwrap()
}

/// Order currently in `status`, with a single history entry.
pub fn order_in(id: &str, status: CanonicalStatus) -> Order {
    order_with_history(id, &[status])
}

/// Test clock that only moves when told to.
pub struct ManualClock(std::sync::Mutex<DateTime<Utc>>);

impl ManualClock {
    pub fn starting_at(start: DateTime<Utc>) -> Self {
        Self(std::sync::Mutex::new(start))
    }

    pub fn advance(&self, secs: i64) {
        let mut now = self.0.lock().unwrap();
        *now += chrono::Duration::seconds(secs);
    }
}

impl crate::lifecycle::Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap()
    }
}
