use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::domain::status::{self, CanonicalStatus, Locale};
use crate::domain::{Actor, OrderId, Role};

/// Notification event type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    /// An order moved to a new status.
    StatusChange,
    /// A sync or push failure the operator should see.
    Error,
    /// Daemon started.
    Startup,
    /// Daemon stopped.
    Shutdown,
    /// Periodic summary.
    Overview,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventType::StatusChange => write!(f, "status_change"),
            EventType::Error => write!(f, "error"),
            EventType::Startup => write!(f, "startup"),
            EventType::Shutdown => write!(f, "shutdown"),
            EventType::Overview => write!(f, "overview"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StatusChangeData {
    pub order_id: OrderId,
    pub from: CanonicalStatus,
    pub to: CanonicalStatus,
    pub actor: Actor,
    pub total_price: Decimal,
    /// Language of the status labels in the message.
    pub locale: Locale,
}

#[derive(Debug, Clone)]
pub struct ErrorData {
    pub component: String,
    pub message: String,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct StartupData {
    pub version: String,
    pub role: Role,
    pub user_id: String,
    pub orders_loaded: usize,
    pub sync_enabled: bool,
}

#[derive(Debug, Clone)]
pub struct ShutdownData {
    pub reason: String,
    pub uptime: Duration,
    pub graceful: bool,
}

#[derive(Debug, Clone)]
pub struct OverviewData {
    pub uptime: Duration,
    pub sync_cycles: u64,
    /// Local order count per status, in lifecycle order.
    pub orders_by_status: Vec<(CanonicalStatus, usize)>,
    pub pushes_confirmed: u64,
    pub pushes_failed: u64,
    pub pending_pushes: usize,
    pub locale: Locale,
}

#[derive(Debug, Clone)]
pub enum EventData {
    StatusChange(StatusChangeData),
    Error(ErrorData),
    Startup(StartupData),
    Shutdown(ShutdownData),
    Overview(OverviewData),
}

/// Notification event.
#[derive(Debug, Clone)]
pub struct Event {
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    pub data: EventData,
}

impl Event {
    pub fn new(event_type: EventType, data: EventData) -> Self {
        Self {
            event_type,
            timestamp: Utc::now(),
            data,
        }
    }

    pub fn status_change(data: StatusChangeData) -> Self {
        Self::new(EventType::StatusChange, EventData::StatusChange(data))
    }

    pub fn error(data: ErrorData) -> Self {
        Self::new(EventType::Error, EventData::Error(data))
    }

    pub fn startup(data: StartupData) -> Self {
        Self::new(EventType::Startup, EventData::Startup(data))
    }

    pub fn shutdown(data: ShutdownData) -> Self {
        Self::new(EventType::Shutdown, EventData::Shutdown(data))
    }

    pub fn overview(data: OverviewData) -> Self {
        Self::new(EventType::Overview, EventData::Overview(data))
    }
}

/// Notifier delivers operator notifications.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    /// Sends and waits for delivery.
    async fn send(&self, event: &Event) -> Result<(), NotificationError>;

    /// Queues for background delivery without waiting.
    fn send_async(&self, event: Event);

    /// Whether events of this type are delivered at all.
    fn is_enabled(&self, event_type: EventType) -> bool;

    /// Flushes queued messages and stops background work.
    async fn close(&self) -> Result<(), NotificationError>;
}

/// Notification errors.
#[derive(Debug, Clone, Error)]
pub enum NotificationError {
    #[error("notifier misconfigured: {0}")]
    Config(String),

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("Telegram API error {status}: {body}")]
    Api { status: u16, body: String },
}

/// NoopNotifier drops every event.
#[derive(Debug, Default)]
pub struct NoopNotifier;

impl NoopNotifier {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl Notifier for NoopNotifier {
    async fn send(&self, _event: &Event) -> Result<(), NotificationError> {
        Ok(())
    }

    fn send_async(&self, _event: Event) {}

    fn is_enabled(&self, _event_type: EventType) -> bool {
        false
    }

    async fn close(&self) -> Result<(), NotificationError> {
        Ok(())
    }
}

// === Message formatting (Telegram Markdown, Indonesian operator texts) ===

fn clock() -> String {
    Utc::now().format("%H:%M:%S UTC").to_string()
}

pub fn format_status_change(data: &StatusChangeData) -> String {
    let icon = match data.to {
        CanonicalStatus::Pending => "🕒",
        CanonicalStatus::Processing => "📦",
        CanonicalStatus::Shipped => "🚚",
        CanonicalStatus::Completed => "✅",
        CanonicalStatus::Cancelled => "❌",
    };

    format!(
        "{} *Status Pesanan Berubah*\n\n\
         Pesanan: #{}\n\
         {} → *{}*\n\
         Oleh: {}\n\
         Total: {}\n\n\
         ⏰ {}",
        icon,
        escape_markdown(data.order_id.as_str()),
        status::label(data.from, data.locale),
        status::label(data.to, data.locale),
        data.actor,
        format_rupiah(data.total_price),
        clock()
    )
}

pub fn format_error(data: &ErrorData) -> String {
    let error_str = data
        .error
        .as_ref()
        .map(|e| format!("\nDetail: {}", escape_markdown(e)))
        .unwrap_or_default();

    format!(
        "⚠️ *Kesalahan*\n\n\
         Komponen: {}\n\
         Pesan: {}{}\n\n\
         ⏰ {}",
        data.component,
        escape_markdown(&data.message),
        error_str,
        clock()
    )
}

pub fn format_startup(data: &StartupData) -> String {
    let sync = if data.sync_enabled { "aktif" } else { "nonaktif" };

    format!(
        "🌾 *Sinkronisasi pesanan dimulai*\n\n\
         Versi: {}\n\
         Peran: {} ({})\n\
         Pesanan dimuat: {}\n\
         Sinkronisasi: {}\n\n\
         ⏰ {}",
        data.version,
        data.role,
        escape_markdown(&data.user_id),
        add_thousand_separators(data.orders_loaded as u64),
        sync,
        clock()
    )
}

pub fn format_shutdown(data: &ShutdownData) -> String {
    let status = if data.graceful {
        "✅ Normal"
    } else {
        "⚠️ Paksa"
    };

    format!(
        "🛑 *Sinkronisasi pesanan berhenti*\n\n\
         Alasan: {}\n\
         Status: {}\n\
         Waktu aktif: {}\n\n\
         ⏰ {}",
        data.reason,
        status,
        format_duration(data.uptime),
        clock()
    )
}

pub fn format_overview(data: &OverviewData) -> String {
    let by_status: String = data
        .orders_by_status
        .iter()
        .map(|(status, count)| {
            format!(
                "• {}: {}\n",
                status::label(*status, data.locale),
                add_thousand_separators(*count as u64)
            )
        })
        .collect();

    format!(
        "📊 *Ringkasan Pesanan*\n\n\
         ⏱ Waktu aktif: {}\n\
         🔄 Siklus sinkronisasi: {}\n\n\
         {}\n\
         📤 Konfirmasi terkirim: {}\n\
         ❌ Konfirmasi gagal: {}\n\
         ⏳ Menunggu kirim: {}\n\n\
         ⏰ {}",
        format_duration(data.uptime),
        add_thousand_separators(data.sync_cycles),
        by_status,
        data.pushes_confirmed,
        data.pushes_failed,
        data.pending_pushes,
        clock()
    )
}

pub fn format_event(event: &Event) -> String {
    match &event.data {
        EventData::StatusChange(data) => format_status_change(data),
        EventData::Error(data) => format_error(data),
        EventData::Startup(data) => format_startup(data),
        EventData::Shutdown(data) => format_shutdown(data),
        EventData::Overview(data) => format_overview(data),
    }
}

// === Helpers ===

/// Escapes characters Telegram Markdown would treat as markup.
pub(super) fn escape_markdown(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '_' | '*' | '`' | '[') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// "Rp 265.000": rounded to whole rupiah with dot grouping.
pub(super) fn format_rupiah(amount: Decimal) -> String {
    let rounded = amount.round_dp(0).normalize();
    let digits = rounded.abs().to_string();
    let grouped = match digits.parse::<u64>() {
        Ok(n) => add_thousand_separators(n),
        Err(_) => digits,
    };
    if rounded.is_sign_negative() && !rounded.is_zero() {
        format!("-Rp {}", grouped)
    } else {
        format!("Rp {}", grouped)
    }
}

/// Short Indonesian duration: d(etik), m(enit), j(am), h(ari).
pub(super) fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{}d", secs)
    } else if secs < 3600 {
        format!("{}m {}d", secs / 60, secs % 60)
    } else if secs < 86400 {
        format!("{}j {}m", secs / 3600, (secs % 3600) / 60)
    } else {
        format!("{}h {}j", secs / 86400, (secs % 86400) / 3600)
    }
}

/// Groups digits with dots, the Indonesian convention.
pub(super) fn add_thousand_separators(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::new();
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push('.');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}
