use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, warn};

use crate::config::TelegramConfig;
use crate::notification::{Event, EventType, NotificationError, Notifier, format_event};

const TELEGRAM_API_URL: &str = "https://api.telegram.org/bot";
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_MESSAGE_LENGTH: usize = 4096;
const ASYNC_QUEUE_SIZE: usize = 100;
/// Upper bound on draining the queue in `close`.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Where and what to send.
#[derive(Debug, Clone)]
struct Routing {
    chat_id: String,
    error_chat_id: Option<String>,
    notify_status_changes: bool,
    notify_errors: bool,
    notify_overview: bool,
}

impl Routing {
    fn chat_for(&self, event_type: EventType) -> &str {
        match (event_type, &self.error_chat_id) {
            (EventType::Error, Some(chat)) => chat,
            _ => &self.chat_id,
        }
    }

    fn is_enabled(&self, event_type: EventType) -> bool {
        match event_type {
            EventType::Startup | EventType::Shutdown => true,
            EventType::StatusChange => self.notify_status_changes,
            EventType::Error => self.notify_errors,
            EventType::Overview => self.notify_overview,
        }
    }
}

/// TelegramNotifier sends messages through the Telegram Bot API.
///
/// `send_async` hands events to a bounded queue drained by one worker task,
/// so a slow Telegram API never blocks order processing.
pub struct TelegramNotifier {
    routing: Routing,
    http_client: reqwest::Client,
    api_url: String,
    sender: Mutex<Option<mpsc::Sender<Event>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl TelegramNotifier {
    /// Must be called inside a Tokio runtime; spawns the delivery worker.
    pub fn new(config: &TelegramConfig) -> Result<Self, NotificationError> {
        if config.bot_token.is_empty() {
            return Err(NotificationError::Config(
                "bot token is required (TELEGRAM_BOT_TOKEN)".into(),
            ));
        }
        if config.chat_id.is_empty() {
            return Err(NotificationError::Config(
                "chat id is required (TELEGRAM_CHAT_ID)".into(),
            ));
        }

        let http_client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| NotificationError::Config(format!("failed to create HTTP client: {}", e)))?;

        let routing = Routing {
            chat_id: config.chat_id.clone(),
            error_chat_id: Some(config.error_chat_id.clone()).filter(|id| !id.is_empty()),
            notify_status_changes: config.notify_status_changes,
            notify_errors: config.notify_errors,
            notify_overview: config.notify_overview,
        };
        let api_url = format!("{}{}", TELEGRAM_API_URL, config.bot_token);

        let (sender, receiver) = mpsc::channel(ASYNC_QUEUE_SIZE);
        let worker = Self::spawn_worker(receiver, routing.clone(), http_client.clone(), api_url.clone());

        Ok(Self {
            routing,
            http_client,
            api_url,
            sender: Mutex::new(Some(sender)),
            worker: Mutex::new(Some(worker)),
        })
    }

    fn spawn_worker(
        mut receiver: mpsc::Receiver<Event>,
        routing: Routing,
        http_client: reqwest::Client,
        api_url: String,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(event) = receiver.recv().await {
                let text = format_event(&event);
                let chat_id = routing.chat_for(event.event_type);
                if let Err(e) = send_message(&http_client, &api_url, chat_id, &text).await {
                    error!(error = %e, event = %event.event_type, "Failed to send Telegram message");
                }
            }
        })
    }
}

/// Cuts `text` to at most `max` bytes on a char boundary.
fn truncate(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

async fn send_message(
    http_client: &reqwest::Client,
    api_url: &str,
    chat_id: &str,
    text: &str,
) -> Result<(), NotificationError> {
    let payload = serde_json::json!({
        "chat_id": chat_id,
        "text": truncate(text, MAX_MESSAGE_LENGTH),
        "parse_mode": "Markdown"
    });

    let response = http_client
        .post(format!("{}/sendMessage", api_url))
        .json(&payload)
        .send()
        .await
        .map_err(|e| NotificationError::Http(e.to_string()))?;

    if !response.status().is_success() {
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "unknown error".to_string());
        return Err(NotificationError::Api { status, body });
    }

    Ok(())
}

#[async_trait::async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, event: &Event) -> Result<(), NotificationError> {
        if !self.is_enabled(event.event_type) {
            return Ok(());
        }

        let text = format_event(event);
        let chat_id = self.routing.chat_for(event.event_type);
        send_message(&self.http_client, &self.api_url, chat_id, &text).await
    }

    fn send_async(&self, event: Event) {
        if !self.is_enabled(event.event_type) {
            return;
        }

        let sender = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        match sender.as_ref() {
            Some(sender) => {
                if let Err(e) = sender.try_send(event) {
                    error!(error = %e, "Failed to queue Telegram message");
                }
            }
            None => warn!(event = %event.event_type, "Telegram notifier closed, message dropped"),
        }
    }

    fn is_enabled(&self, event_type: EventType) -> bool {
        self.routing.is_enabled(event_type)
    }

    async fn close(&self) -> Result<(), NotificationError> {
        // dropping the sender ends the worker once the queue is drained
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(worker) = worker else {
            return Ok(());
        };
        match tokio::time::timeout(CLOSE_TIMEOUT, worker).await {
            Ok(_) => Ok(()),
            Err(_) => {
                warn!("Telegram queue not drained before close timeout");
                Ok(())
            }
        }
    }
}
