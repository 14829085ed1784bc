//! Core business entities for marketplace orders.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use super::status::CanonicalStatus;
use crate::lifecycle::policy;

/// OrderId is the single identifier type used for orders across local and remote data.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(String);

impl OrderId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OrderId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for OrderId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<i64> for OrderId {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

/// Role of the party asking for a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Buyer,
    Seller,
    /// Marketplace staff; treated as a seller for transitions.
    Admin,
}

impl Role {
    /// Collapses admin onto seller for transition decisions.
    pub fn effective(self) -> Role {
        match self {
            Role::Admin => Role::Seller,
            other => other,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Buyer => write!(f, "buyer"),
            Role::Seller => write!(f, "seller"),
            Role::Admin => write!(f, "admin"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "buyer" | "pembeli" => Ok(Role::Buyer),
            "seller" | "penjual" => Ok(Role::Seller),
            "admin" => Ok(Role::Admin),
            _ => Err(format!("Unknown role: {}", s)),
        }
    }
}

/// Who recorded a status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Actor {
    Buyer,
    Seller,
    Admin,
    /// Entry adopted from the backend during reconciliation.
    Backend,
}

impl From<Role> for Actor {
    fn from(role: Role) -> Self {
        match role {
            Role::Buyer => Actor::Buyer,
            Role::Seller => Actor::Seller,
            Role::Admin => Actor::Admin,
        }
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Actor::Buyer => write!(f, "buyer"),
            Actor::Seller => write!(f, "seller"),
            Actor::Admin => write!(f, "admin"),
            Actor::Backend => write!(f, "backend"),
        }
    }
}

impl std::str::FromStr for Actor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "buyer" => Ok(Actor::Buyer),
            "seller" => Ok(Actor::Seller),
            "admin" => Ok(Actor::Admin),
            "backend" => Ok(Actor::Backend),
            _ => Err(format!("Unknown actor: {}", s)),
        }
    }
}

/// One entry of the append-only status audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    pub status: CanonicalStatus,
    pub at: DateTime<Utc>,
    pub actor: Actor,
}

/// LineItem is one product line frozen at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub product_id: String,
    pub product_name: String,
    /// Seller owning this product.
    pub seller_id: String,
    /// Unit price at checkout time, not the live catalog price.
    pub unit_price: Decimal,
    pub quantity: u32,
    pub line_subtotal: Decimal,
}

/// CartLine is one line of a cart submitted at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: String,
    pub product_name: String,
    pub seller_id: String,
    pub unit_price: Decimal,
    pub quantity: u32,
}

/// CartSnapshot is the checkout-time input an order is created from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartSnapshot {
    pub buyer_id: String,
    pub lines: Vec<CartLine>,
    pub shipping_cost: Decimal,
    pub payment_method: String,
    pub shipping_address: String,
    pub recipient_phone: String,
}

/// Order creation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    #[error("order has no line items")]
    NoLineItems,
    #[error("product {0}: quantity must be positive")]
    ZeroQuantity(String),
    #[error("{0} must not be negative")]
    NegativeAmount(String),
    #[error("order has no status history")]
    EmptyHistory,
    #[error("status history entry {0} is older than the entry before it")]
    HistoryOutOfOrder(usize),
    #[error("status history entry {0} is not a legal step from the entry before it")]
    IllegalStep(usize),
}

/// Everything needed to rebuild an order that already exists elsewhere
/// (backend payload or local database).
#[derive(Debug, Clone)]
pub struct OrderParts {
    pub id: OrderId,
    pub buyer_id: String,
    pub line_items: Vec<LineItem>,
    pub shipping_cost: Decimal,
    /// Reported total; kept as the historical fact, never recomputed.
    pub total_price: Decimal,
    pub payment_method: String,
    pub shipping_address: String,
    pub recipient_phone: String,
    pub created_at: DateTime<Utc>,
    pub history: Vec<StatusChange>,
}

/// Order represents one purchase transaction.
///
/// Only the status and its history change after creation, and only through
/// the lifecycle layer. The current status always equals the last history entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Order {
    pub id: OrderId,
    pub buyer_id: String,
    pub line_items: Vec<LineItem>,
    pub shipping_cost: Decimal,
    pub total_price: Decimal,
    pub payment_method: String,
    pub shipping_address: String,
    pub recipient_phone: String,
    pub created_at: DateTime<Utc>,
    status: CanonicalStatus,
    history: Vec<StatusChange>,
}

impl Order {
    /// Creates a pending order from a cart snapshot.
    ///
    /// Subtotals are `unit_price * quantity`; the total is their sum plus shipping.
    pub fn from_checkout(
        id: OrderId,
        cart: CartSnapshot,
        created_at: DateTime<Utc>,
    ) -> Result<Self, OrderError> {
        if cart.lines.is_empty() {
            return Err(OrderError::NoLineItems);
        }
        if cart.shipping_cost < Decimal::ZERO {
            return Err(OrderError::NegativeAmount("shipping cost".into()));
        }

        let mut line_items = Vec::with_capacity(cart.lines.len());
        for line in cart.lines {
            if line.quantity == 0 {
                return Err(OrderError::ZeroQuantity(line.product_id));
            }
            if line.unit_price < Decimal::ZERO {
                return Err(OrderError::NegativeAmount(format!(
                    "unit price of {}",
                    line.product_id
                )));
            }

            let line_subtotal = line.unit_price * Decimal::from(line.quantity);
            line_items.push(LineItem {
                product_id: line.product_id,
                product_name: line.product_name,
                seller_id: line.seller_id,
                unit_price: line.unit_price,
                quantity: line.quantity,
                line_subtotal,
            });
        }

        let total_price =
            line_items.iter().map(|l| l.line_subtotal).sum::<Decimal>() + cart.shipping_cost;

        Ok(Self {
            id,
            buyer_id: cart.buyer_id,
            line_items,
            shipping_cost: cart.shipping_cost,
            total_price,
            payment_method: cart.payment_method,
            shipping_address: cart.shipping_address,
            recipient_phone: cart.recipient_phone,
            created_at,
            status: CanonicalStatus::Pending,
            history: vec![StatusChange {
                status: CanonicalStatus::Pending,
                at: created_at,
                actor: Actor::Buyer,
            }],
        })
    }

    /// Rebuilds an order from stored or remote parts, checking the history invariants:
    /// timestamps never go back and every entry is a recordable step from the one before.
    pub fn from_parts(parts: OrderParts) -> Result<Self, OrderError> {
        let Some(last) = parts.history.last() else {
            return Err(OrderError::EmptyHistory);
        };
        if let Some(index) = parts
            .history
            .windows(2)
            .position(|pair| pair[1].at < pair[0].at)
        {
            return Err(OrderError::HistoryOutOfOrder(index + 1));
        }
        if let Some(index) = parts.history.windows(2).position(|pair| {
            !policy::is_recordable_step(pair[0].status, pair[1].status, pair[1].actor)
        }) {
            return Err(OrderError::IllegalStep(index + 1));
        }

        Ok(Self {
            status: last.status,
            id: parts.id,
            buyer_id: parts.buyer_id,
            line_items: parts.line_items,
            shipping_cost: parts.shipping_cost,
            total_price: parts.total_price,
            payment_method: parts.payment_method,
            shipping_address: parts.shipping_address,
            recipient_phone: parts.recipient_phone,
            created_at: parts.created_at,
            history: parts.history,
        })
    }

    pub fn status(&self) -> CanonicalStatus {
        self.status
    }

    /// Append-only audit trail, oldest first.
    pub fn history(&self) -> &[StatusChange] {
        &self.history
    }

    pub fn last_change(&self) -> &StatusChange {
        // from_checkout and from_parts both guarantee at least one entry
        &self.history[self.history.len() - 1]
    }

    /// When the order last entered the given status, e.g. when it was shipped.
    pub fn entered_at(&self, status: CanonicalStatus) -> Option<DateTime<Utc>> {
        self.history
            .iter()
            .rev()
            .find(|change| change.status == status)
            .map(|change| change.at)
    }

    /// Distinct sellers in line order.
    pub fn seller_ids(&self) -> Vec<&str> {
        let mut sellers: Vec<&str> = Vec::new();
        for item in &self.line_items {
            if !sellers.contains(&item.seller_id.as_str()) {
                sellers.push(&item.seller_id);
            }
        }
        sellers
    }

    pub fn involves_seller(&self, seller_id: &str) -> bool {
        self.line_items.iter().any(|l| l.seller_id == seller_id)
    }

    pub fn contains_product(&self, product_id: &str) -> bool {
        self.line_items.iter().any(|l| l.product_id == product_id)
    }

    /// Appends a change. Callers hold the per-order lock and have checked ordering.
    pub(crate) fn push_change(&mut self, change: StatusChange) {
        self.status = change.status;
        self.history.push(change);
    }
}
