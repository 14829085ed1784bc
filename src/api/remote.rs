//! Wire shapes returned by the marketplace backend and their mapping to the domain.
//!
//! The backend is loose about types: ids arrive as strings or integers, prices
//! as strings or numbers, timestamps as RFC 3339 or `YYYY-MM-DD HH:MM:SS`.

use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};

use super::BackendError;
use crate::domain::{
    Actor, LineItem, Order, OrderId, OrderParts, StatusChange, status,
};

/// String or integer identifier as sent by the backend.
#[derive(Deserialize)]
#[serde(untagged)]
enum LooseId {
    Text(String),
    Int(i64),
}

impl From<LooseId> for String {
    fn from(id: LooseId) -> Self {
        match id {
            LooseId::Text(s) => s,
            LooseId::Int(n) => n.to_string(),
        }
    }
}

fn loose_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    LooseId::deserialize(deserializer).map(String::from)
}

fn loose_order_id<'de, D>(deserializer: D) -> Result<OrderId, D::Error>
where
    D: Deserializer<'de>,
{
    loose_id(deserializer).map(OrderId::from)
}

fn loose_order_ids<'de, D>(deserializer: D) -> Result<Vec<OrderId>, D::Error>
where
    D: Deserializer<'de>,
{
    let ids: Option<Vec<LooseId>> = Option::deserialize(deserializer)?;
    Ok(ids
        .unwrap_or_default()
        .into_iter()
        .map(|id| OrderId::from(String::from(id)))
        .collect())
}

/// Parses RFC 3339 or a MySQL-style `YYYY-MM-DD HH:MM:SS` (taken as UTC).
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

/// One line item in a backend order.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteLineItem {
    #[serde(deserialize_with = "loose_id", alias = "id_produk")]
    pub product_id: String,
    #[serde(default, alias = "nama_produk")]
    pub product_name: String,
    #[serde(deserialize_with = "loose_id", alias = "id_penjual")]
    pub seller_id: String,
    #[serde(alias = "harga")]
    pub unit_price: Decimal,
    #[serde(alias = "jumlah")]
    pub quantity: u32,
    #[serde(default)]
    pub line_subtotal: Option<Decimal>,
}

/// One history entry in a backend order.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteStatusChange {
    pub status: Option<String>,
    pub at: String,
    #[serde(default)]
    pub actor: Option<String>,
}

/// Order as returned by the backend.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteOrder {
    #[serde(deserialize_with = "loose_order_id", alias = "order_id")]
    pub id: OrderId,
    #[serde(deserialize_with = "loose_id", alias = "id_pembeli")]
    pub buyer_id: String,
    /// Raw status label in whatever spelling the backend uses.
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub items: Vec<RemoteLineItem>,
    pub total_price: Decimal,
    #[serde(default)]
    pub shipping_cost: Decimal,
    #[serde(default)]
    pub payment_method: Option<String>,
    #[serde(default)]
    pub shipping_address: Option<String>,
    #[serde(default)]
    pub recipient_phone: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub history: Option<Vec<RemoteStatusChange>>,
}

/// One page of `GET /orders`.
#[derive(Debug, Deserialize)]
pub struct RemoteOrderPage {
    #[serde(default)]
    pub data: Vec<RemoteOrder>,
    #[serde(default)]
    pub has_more: bool,
    #[serde(default, deserialize_with = "loose_order_ids")]
    pub deleted_ids: Vec<OrderId>,
}

impl RemoteOrder {
    /// Maps the wire order into a domain [`Order`].
    ///
    /// Uses the remote history when present. Otherwise, or when the history
    /// does not end in the reported status, a backend entry is synthesised.
    /// `received_at` stands in for timestamps the backend left out.
    pub fn into_order(self, received_at: DateTime<Utc>) -> Result<Order, BackendError> {
        let current = status::normalize(self.status.as_deref());
        let created_at = self
            .created_at
            .as_deref()
            .and_then(parse_timestamp)
            .unwrap_or(received_at);
        let updated_at = self
            .updated_at
            .as_deref()
            .and_then(parse_timestamp)
            .unwrap_or(created_at);

        let mut history: Vec<StatusChange> = self
            .history
            .unwrap_or_default()
            .into_iter()
            .filter_map(|entry| {
                let at = parse_timestamp(&entry.at)?;
                Some(StatusChange {
                    status: status::normalize(entry.status.as_deref()),
                    at,
                    actor: entry
                        .actor
                        .as_deref()
                        .and_then(|a| a.parse().ok())
                        .unwrap_or(Actor::Backend),
                })
            })
            .collect();
        history.sort_by_key(|change| change.at);

        if history.last().map(|last| last.status) != Some(current) {
            let at = history
                .last()
                .map(|last| last.at.max(updated_at))
                .unwrap_or(updated_at);
            history.push(StatusChange {
                status: current,
                at,
                actor: Actor::Backend,
            });
        }

        let line_items = self
            .items
            .into_iter()
            .map(|item| LineItem {
                line_subtotal: item
                    .line_subtotal
                    .unwrap_or(item.unit_price * Decimal::from(item.quantity)),
                product_id: item.product_id,
                product_name: item.product_name,
                seller_id: item.seller_id,
                unit_price: item.unit_price,
                quantity: item.quantity,
            })
            .collect();

        let id = self.id.clone();
        Order::from_parts(OrderParts {
            id: self.id,
            buyer_id: self.buyer_id,
            line_items,
            shipping_cost: self.shipping_cost,
            total_price: self.total_price,
            payment_method: self.payment_method.unwrap_or_default(),
            shipping_address: self.shipping_address.unwrap_or_default(),
            recipient_phone: self.recipient_phone.unwrap_or_default(),
            created_at,
            history,
        })
        .map_err(|e| BackendError::InvalidOrder {
            id,
            reason: e.to_string(),
        })
    }
}
