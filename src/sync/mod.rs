//! Background synchronisation with the marketplace backend.
//!
//! Coordinates the backend client, reconciler, push outbox, persistence and
//! operator notifications.

mod error;
mod outbox;
mod settings;
mod stats;

pub use error::SyncError;
pub use outbox::{PendingPush, PushFailure, PushOutbox, idempotency_key};
pub use settings::AgentSettings;
pub use stats::SyncStats;

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{Mutex, Notify};
use tracing::{debug, error, info, warn};

use crate::api::{BackendError, FetchQuery, OrderBackend};
use crate::domain::{CanonicalStatus, CartSnapshot, Order, OrderId};
use crate::lifecycle::{
    LifecycleError, LifecycleService, MergeReport, OrderEvent, RemoteBatch, SyncReconciler,
};
use crate::notification::{
    ErrorData, Event, EventType, Notifier, OverviewData, ShutdownData, StartupData,
    StatusChangeData,
};
use crate::storage::OrderRepository;

/// How often due pushes are retried between sync cycles.
const OUTBOX_FLUSH_INTERVAL: Duration = Duration::from_secs(5);

/// Result of one outbox flush.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub confirmed: usize,
    pub failed: usize,
    pub abandoned: usize,
}

/// SyncAgent keeps the local store, the backend and the database in step.
pub struct SyncAgent {
    backend: Arc<dyn OrderBackend>,
    service: Arc<LifecycleService>,
    reconciler: SyncReconciler,
    outbox: Arc<PushOutbox>,
    repository: Option<Arc<dyn OrderRepository>>,
    notifier: Option<Arc<dyn Notifier>>,
    settings: AgentSettings,

    // Runtime state
    running: Mutex<bool>,
    started_at: Mutex<Option<Instant>>,
    stats: Mutex<SyncStats>,
    shutdown: Notify,
    // One flush at a time, so an order's pushes are never interleaved
    flush_lock: Mutex<()>,
}

impl SyncAgent {
    pub fn new(
        backend: Arc<dyn OrderBackend>,
        service: Arc<LifecycleService>,
        reconciler: SyncReconciler,
        outbox: Arc<PushOutbox>,
        settings: AgentSettings,
    ) -> Self {
        Self {
            backend,
            service,
            reconciler,
            outbox,
            repository: None,
            notifier: None,
            settings,
            running: Mutex::new(false),
            started_at: Mutex::new(None),
            stats: Mutex::new(SyncStats::default()),
            shutdown: Notify::new(),
            flush_lock: Mutex::new(()),
        }
    }

    pub fn with_repository(mut self, repository: Arc<dyn OrderRepository>) -> Self {
        self.repository = Some(repository);
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn outbox(&self) -> &Arc<PushOutbox> {
        &self.outbox
    }

    /// Returns a copy of the current statistics.
    pub async fn stats(&self) -> SyncStats {
        self.stats.lock().await.clone()
    }

    pub async fn is_running(&self) -> bool {
        *self.running.lock().await
    }

    pub async fn uptime(&self) -> Duration {
        self.started_at
            .lock()
            .await
            .map(|s| s.elapsed())
            .unwrap_or(Duration::ZERO)
    }

    /// Loads persisted orders into the store. Call before [`run`](Self::run),
    /// so hydration is not written back.
    pub async fn hydrate(&self) -> Result<usize, SyncError> {
        let Some(repository) = &self.repository else {
            return Ok(0);
        };

        let orders = repository.load_all().await?;
        let store = self.service.store();
        let mut loaded = 0;
        for order in orders {
            match store.insert(order) {
                Ok(()) => loaded += 1,
                Err(LifecycleError::DuplicateId(id)) => {
                    warn!(order_id = %id, "Persisted order already in store, skipped");
                }
                Err(e) => return Err(e.into()),
            }
        }

        info!(orders = loaded, "Orders hydrated from storage");
        Ok(loaded)
    }

    /// Fetches every page visible to the configured party, merges it and
    /// flushes the outbox.
    ///
    /// Pages merged before a fetch error stay merged.
    pub async fn sync_once(&self) -> Result<MergeReport, SyncError> {
        let result = self.fetch_and_merge().await;

        {
            let mut stats = self.stats.lock().await;
            stats.sync_cycles += 1;
            match &result {
                Ok(report) => stats.record_merge(report),
                Err(_) => stats.failed_cycles += 1,
            }
        }

        if let Err(e) = &result {
            warn!(error = %e, "Order sync failed");
            self.notify_error("SyncAgent", "order sync failed", e.to_string());
        }

        self.flush_outbox().await;
        result
    }

    async fn fetch_and_merge(&self) -> Result<MergeReport, SyncError> {
        let mut total = MergeReport::default();

        for page in 1..=self.settings.max_pages {
            let query = FetchQuery {
                role: self.settings.role,
                user_id: self.settings.user_id.clone(),
                status: None,
                page,
                page_size: self.settings.page_size,
            };

            let remote = self.backend.fetch_orders(&query).await?;
            self.stats.lock().await.pages_fetched += 1;

            let has_more = remote.has_more;
            debug!(page, orders = remote.orders.len(), has_more, "Fetched order page");

            total.absorb(self.reconciler.merge(RemoteBatch::from(remote)));
            if !has_more {
                return Ok(total);
            }
        }

        Err(SyncError::TooManyPages(self.settings.max_pages))
    }

    /// Pushes every due entry, oldest first per order.
    pub async fn flush_outbox(&self) -> FlushReport {
        let _guard = self.flush_lock.lock().await;
        let mut report = FlushReport::default();

        for order_id in self.outbox.due_orders(Instant::now()) {
            self.push_order(&order_id, &mut report).await;
        }

        if report != FlushReport::default() {
            info!(
                confirmed = report.confirmed,
                failed = report.failed,
                abandoned = report.abandoned,
                pending = self.outbox.len(),
                "Outbox flushed"
            );
        }
        report
    }

    /// Re-attempts one order's queued pushes now, ignoring backoff.
    /// The local store is not touched.
    pub async fn retry_push(&self, order_id: &OrderId) -> Result<FlushReport, SyncError> {
        let _guard = self.flush_lock.lock().await;
        if self.outbox.head(order_id).is_none() {
            return Err(SyncError::NothingQueued(order_id.clone()));
        }

        let mut report = FlushReport::default();
        self.push_order(order_id, &mut report).await;
        Ok(report)
    }

    /// Pushes one order's entries until the queue empties or one fails.
    async fn push_order(&self, order_id: &OrderId, report: &mut FlushReport) {
        while let Some(entry) = self.outbox.head(order_id) {
            let update = entry.to_update();
            let pushed = tokio::time::timeout(
                self.settings.push_timeout,
                self.backend.push_status_update(&update),
            )
            .await
            .unwrap_or(Err(BackendError::Timeout(self.settings.push_timeout)));

            match pushed {
                Ok(()) => {
                    self.outbox.confirm(order_id, &entry.key);
                    self.stats.lock().await.pushes_confirmed += 1;
                    report.confirmed += 1;
                    debug!(order_id = %order_id, status = %entry.status, "Status push confirmed");
                }
                Err(e) => {
                    self.handle_push_failure(&entry, &e, report).await;
                    return;
                }
            }
        }
    }

    async fn handle_push_failure(
        &self,
        entry: &PendingPush,
        err: &BackendError,
        report: &mut FlushReport,
    ) {
        let outcome = self.outbox.fail(
            &entry.order_id,
            &entry.key,
            &err.to_string(),
            err.is_retryable(),
            Instant::now(),
        );
        self.stats.lock().await.pushes_failed += 1;
        report.failed += 1;

        match outcome {
            Some(PushFailure::Retrying { attempts, delay }) => {
                warn!(
                    order_id = %entry.order_id,
                    status = %entry.status,
                    attempts,
                    retry_in = ?delay,
                    error = %err,
                    "Status push failed"
                );
            }
            Some(PushFailure::Abandoned(abandoned)) => {
                self.stats.lock().await.pushes_abandoned += 1;
                report.abandoned += 1;
                error!(
                    order_id = %abandoned.order_id,
                    status = %abandoned.status,
                    attempts = abandoned.attempts,
                    error = %err,
                    "Status push abandoned, local status kept"
                );
                self.notify_error(
                    "PushOutbox",
                    &format!(
                        "confirmation of order {} as {} abandoned after {} attempts",
                        abandoned.order_id, abandoned.status, abandoned.attempts
                    ),
                    err.to_string(),
                );
            }
            // entry confirmed or replaced concurrently
            None => {}
        }
    }

    /// Submits a checkout and records the order the backend created.
    pub async fn checkout(&self, cart: &CartSnapshot) -> Result<Order, SyncError> {
        let order = self.backend.submit_checkout(cart).await?;
        let order = self.service.record_checkout(order)?;
        self.stats.lock().await.checkouts += 1;

        info!(order_id = %order.id, total = %order.total_price, "Checkout recorded");
        Ok(order)
    }

    /// Runs until [`stop`](Self::stop): periodic sync, write-through of store
    /// events, and overview notifications.
    pub async fn run(&self) -> Result<(), SyncError> {
        // subscribed before the flag is visible, so no event is missed
        let mut events = {
            let mut running = self.running.lock().await;
            if *running {
                return Err(SyncError::AlreadyRunning);
            }
            *running = true;
            self.service.store().subscribe()
        };
        *self.started_at.lock().await = Some(Instant::now());

        let mut sync_timer = tokio::time::interval(self.settings.interval);
        let mut push_timer = tokio::time::interval(OUTBOX_FLUSH_INTERVAL);
        let mut overview_timer = tokio::time::interval(self.settings.overview_interval);
        // the first tick fires at once; skip it so the overview is periodic
        overview_timer.tick().await;

        let sync_enabled = self.settings.sync_enabled;
        let overview_enabled = self
            .notifier
            .as_ref()
            .is_some_and(|n| n.is_enabled(EventType::Overview));
        let mut events_open = true;

        info!(
            role = %self.settings.role,
            user_id = %self.settings.user_id,
            sync_enabled,
            interval = ?self.settings.interval,
            orders = self.service.store().len(),
            "Starting order sync"
        );

        self.send_notification(Event::startup(StartupData {
            version: self.settings.version.clone(),
            role: self.settings.role,
            user_id: self.settings.user_id.clone(),
            orders_loaded: self.service.store().len(),
            sync_enabled,
        }))
        .await;

        loop {
            tokio::select! {
                _ = self.shutdown.notified() => break,
                event = events.recv(), if events_open => match event {
                    Ok(event) => self.handle_event(event).await,
                    Err(RecvError::Lagged(missed)) => {
                        warn!(missed, "Order events lagged, persisting full store");
                        self.persist_all().await;
                    }
                    Err(RecvError::Closed) => events_open = false,
                },
                _ = sync_timer.tick(), if sync_enabled => {
                    // failures are logged and counted inside
                    let _ = self.sync_once().await;
                }
                _ = push_timer.tick() => {
                    self.flush_outbox().await;
                }
                _ = overview_timer.tick(), if overview_enabled => {
                    self.send_overview().await;
                }
            }
        }

        // drain events published before the stop request
        while let Ok(event) = events.try_recv() {
            self.handle_event(event).await;
        }

        self.finish().await;
        Ok(())
    }

    /// Signals the run loop to stop. The loop drains pending store events,
    /// sends the shutdown notification and closes the notifier before
    /// [`run`](Self::run) returns.
    pub async fn stop(&self) -> Result<(), SyncError> {
        {
            let mut running = self.running.lock().await;
            if !*running {
                return Ok(());
            }
            *running = false;
        }

        info!("Stopping order sync...");
        self.shutdown.notify_one();
        Ok(())
    }

    async fn finish(&self) {
        let uptime = self.uptime().await;
        self.send_notification(Event::shutdown(ShutdownData {
            reason: "graceful shutdown".to_string(),
            uptime,
            graceful: true,
        }))
        .await;

        if let Some(notifier) = &self.notifier {
            if let Err(e) = notifier.close().await {
                debug!(error = %e, "Failed to close notifier");
            }
        }

        let pending = self.outbox.len();
        if pending > 0 {
            warn!(pending, "Stopping with unconfirmed status pushes");
        }

        info!(uptime = ?uptime, "Order sync stopped");
    }

    /// Closes the repository. Call after the run loop has returned.
    pub async fn close_storage(&self) -> Result<(), SyncError> {
        if let Some(repository) = &self.repository {
            repository.close().await?;
        }
        Ok(())
    }

    async fn handle_event(&self, event: OrderEvent) {
        if let Some(repository) = &self.repository {
            let result = match &event {
                OrderEvent::Inserted(order) | OrderEvent::StatusChanged { order, .. } => {
                    repository.save(order).await
                }
                OrderEvent::Removed(id) => repository.delete(id).await.map(|_| ()),
            };
            if let Err(e) = result {
                error!(order_id = %event.order_id(), error = %e, "Failed to persist order");
                self.notify_error("Storage", "failed to persist order", e.to_string());
            }
        }

        if let OrderEvent::StatusChanged { order, previous } = event {
            self.notify(Event::status_change(StatusChangeData {
                from: previous,
                to: order.status(),
                actor: order.last_change().actor,
                total_price: order.total_price,
                locale: self.service.locale(),
                order_id: order.id,
            }));
        }
    }

    async fn persist_all(&self) {
        let Some(repository) = &self.repository else {
            return;
        };
        for order in self.service.store().all() {
            if let Err(e) = repository.save(&order).await {
                error!(order_id = %order.id, error = %e, "Failed to persist order");
            }
        }
    }

    /// Queues a notification without waiting.
    fn notify(&self, event: Event) {
        if let Some(notifier) = &self.notifier {
            notifier.send_async(event);
        }
    }

    fn notify_error(&self, component: &str, message: &str, error: String) {
        self.notify(Event::error(ErrorData {
            component: component.to_string(),
            message: message.to_string(),
            error: Some(error),
        }));
    }

    /// Sends a notification and waits for delivery.
    async fn send_notification(&self, event: Event) {
        if let Some(notifier) = &self.notifier {
            if let Err(e) = notifier.send(&event).await {
                debug!(
                    event_type = %event.event_type,
                    error = %e,
                    "Failed to send notification"
                );
            }
        }
    }

    async fn send_overview(&self) {
        let stats = self.stats().await;
        let orders = self.service.store().all();
        let orders_by_status = CanonicalStatus::ALL
            .iter()
            .map(|status| {
                (
                    *status,
                    orders.iter().filter(|o| o.status() == *status).count(),
                )
            })
            .collect();

        self.send_notification(Event::overview(OverviewData {
            uptime: self.uptime().await,
            sync_cycles: stats.sync_cycles,
            orders_by_status,
            pushes_confirmed: stats.pushes_confirmed,
            pushes_failed: stats.pushes_failed,
            pending_pushes: self.outbox.len(),
            locale: self.service.locale(),
        }))
        .await;
    }
}
