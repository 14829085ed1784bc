//! Operator notifications about order activity and sync health.

mod notifier;
mod telegram;

pub use notifier::{
    ErrorData, Event, EventData, EventType, NoopNotifier, NotificationError, Notifier,
    OverviewData, ShutdownData, StartupData, StatusChangeData, format_event,
};
pub use telegram::TelegramNotifier;
