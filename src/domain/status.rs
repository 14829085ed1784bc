//! Canonical order statuses and the codec for their human-facing spellings.
//!
//! The backend, older app builds and seller dashboards all spell statuses
//! differently ("Menunggu Konfirmasi", "Dikemas", "packed", ...). Everything
//! past the boundary works with [`CanonicalStatus`] only.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

/// CanonicalStatus is the authoritative lifecycle stage of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CanonicalStatus {
    /// Created at checkout, waiting for the seller.
    Pending,
    /// Accepted and being packed by the seller.
    Processing,
    /// Handed over to the courier.
    Shipped,
    /// Received by the buyer.
    Completed,
    /// Cancelled before shipping.
    Cancelled,
}

impl CanonicalStatus {
    /// All statuses in canonical order, side-branch last.
    pub const ALL: [CanonicalStatus; 5] = [
        CanonicalStatus::Pending,
        CanonicalStatus::Processing,
        CanonicalStatus::Shipped,
        CanonicalStatus::Completed,
        CanonicalStatus::Cancelled,
    ];

    /// Position on the main line `pending → processing → shipped → completed`.
    /// `cancelled` is a side-branch and has no rank.
    pub fn rank(self) -> Option<u8> {
        match self {
            CanonicalStatus::Pending => Some(0),
            CanonicalStatus::Processing => Some(1),
            CanonicalStatus::Shipped => Some(2),
            CanonicalStatus::Completed => Some(3),
            CanonicalStatus::Cancelled => None,
        }
    }

    /// Returns true for statuses with no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, CanonicalStatus::Completed | CanonicalStatus::Cancelled)
    }

    /// Stable lowercase code used on the wire and in storage.
    pub fn as_str(self) -> &'static str {
        match self {
            CanonicalStatus::Pending => "pending",
            CanonicalStatus::Processing => "processing",
            CanonicalStatus::Shipped => "shipped",
            CanonicalStatus::Completed => "completed",
            CanonicalStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for CanonicalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CanonicalStatus {
    type Err = String;

    /// Strict parse of the canonical code. Use [`normalize`] for raw labels.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(CanonicalStatus::Pending),
            "processing" => Ok(CanonicalStatus::Processing),
            "shipped" => Ok(CanonicalStatus::Shipped),
            "completed" => Ok(CanonicalStatus::Completed),
            "cancelled" => Ok(CanonicalStatus::Cancelled),
            _ => Err(format!("Unknown order status: {}", s)),
        }
    }
}

/// Locale used for display labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Locale {
    #[default]
    #[serde(rename = "id")]
    Indonesian,
    #[serde(rename = "en")]
    English,
}

impl Locale {
    pub const ALL: [Locale; 2] = [Locale::Indonesian, Locale::English];
}

/// Known spellings per canonical status, compared after [`fold`].
const SPELLINGS: &[(CanonicalStatus, &[&str])] = &[
    (
        CanonicalStatus::Pending,
        &[
            "pending",
            "menunggu",
            "menunggu konfirmasi",
            "menunggu pembayaran",
            "belum dibayar",
            "belum diproses",
            "waiting",
            "waiting confirmation",
            "new",
            "baru",
        ],
    ),
    (
        CanonicalStatus::Processing,
        &[
            "processing",
            "process",
            "processed",
            "diproses",
            "sedang diproses",
            "dikemas",
            "sedang dikemas",
            "dikonfirmasi",
            "packed",
            "packing",
            "confirmed",
        ],
    ),
    (
        CanonicalStatus::Shipped,
        &[
            "shipped",
            "shipping",
            "ship",
            "dikirim",
            "sedang dikirim",
            "dalam pengiriman",
            "delivering",
            "on delivery",
            "in delivery",
        ],
    ),
    (
        CanonicalStatus::Completed,
        &[
            "completed",
            "complete",
            "selesai",
            "diterima",
            "pesanan diterima",
            "delivered",
            "done",
            "finished",
        ],
    ),
    (
        CanonicalStatus::Cancelled,
        &[
            "cancelled",
            "canceled",
            "cancel",
            "dibatalkan",
            "batal",
        ],
    ),
];

/// Lowercases, trims, and collapses runs of whitespace, `_` and `-` into one space.
fn fold(raw: &str) -> String {
    raw.split(|c: char| c.is_whitespace() || c == '_' || c == '-')
        .filter(|part| !part.is_empty())
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Maps a raw label to its canonical status, or `None` if it is not a known spelling.
pub fn try_normalize(raw: &str) -> Option<CanonicalStatus> {
    let folded = fold(raw);
    if folded.is_empty() {
        return None;
    }

    SPELLINGS
        .iter()
        .find(|(_, variants)| variants.contains(&folded.as_str()))
        .map(|(status, _)| *status)
}

/// Maps any known spelling to its canonical status.
///
/// Missing, empty and unrecognised input falls back to `pending`. Unrecognised
/// non-empty input is logged so a malformed backend status does not go unnoticed.
pub fn normalize(raw: Option<&str>) -> CanonicalStatus {
    let Some(raw) = raw else {
        return CanonicalStatus::Pending;
    };

    match try_normalize(raw) {
        Some(status) => status,
        None => {
            if !raw.trim().is_empty() {
                warn!(raw = %raw, "Unrecognised order status, defaulting to pending");
            }
            CanonicalStatus::Pending
        }
    }
}

/// Display label for a status in the given locale.
pub fn label(status: CanonicalStatus, locale: Locale) -> &'static str {
    match (locale, status) {
        (Locale::Indonesian, CanonicalStatus::Pending) => "Menunggu Konfirmasi",
        (Locale::Indonesian, CanonicalStatus::Processing) => "Dikemas",
        (Locale::Indonesian, CanonicalStatus::Shipped) => "Dikirim",
        (Locale::Indonesian, CanonicalStatus::Completed) => "Selesai",
        (Locale::Indonesian, CanonicalStatus::Cancelled) => "Dibatalkan",
        (Locale::English, CanonicalStatus::Pending) => "Pending",
        (Locale::English, CanonicalStatus::Processing) => "Processing",
        (Locale::English, CanonicalStatus::Shipped) => "Shipped",
        (Locale::English, CanonicalStatus::Completed) => "Completed",
        (Locale::English, CanonicalStatus::Cancelled) => "Cancelled",
    }
}
