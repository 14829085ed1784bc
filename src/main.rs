use agromart_orders::api::HttpBackend;
use agromart_orders::config::Config;
use agromart_orders::lifecycle::{LifecycleService, OrderStore, SyncReconciler, SystemClock};
use agromart_orders::notification::{Notifier, TelegramNotifier};
use agromart_orders::storage::{OrderRepository, SqliteStorage, SqliteStorageConfig};
use agromart_orders::sync::{AgentSettings, PushOutbox, SyncAgent};
use std::env;
use std::sync::Arc;
use tracing::{Level, error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

const DEFAULT_CONFIG_PATH: &str = "configs/config.yaml";
const DEFAULT_MAX_CONNECTIONS: u32 = 5;

fn parse_config_path() -> String {
    for arg in env::args().skip(1) {
        if let Some(path) = arg.strip_prefix("--config=") {
            return path.to_string();
        }
    }
    DEFAULT_CONFIG_PATH.to_string()
}

fn init_tracing(log_level: Option<&str>) {
    let level = match log_level {
        Some("debug") => Level::DEBUG,
        Some("info") => Level::INFO,
        Some("warn") | Some("warning") => Level::WARN,
        Some("error") => Level::ERROR,
        Some("trace") => Level::TRACE,
        _ => Level::INFO,
    };

    // RUST_LOG wins over the configured level
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

async fn open_storage(config: &Config) -> Option<Arc<dyn OrderRepository>> {
    let storage = config.storage()?;
    let sqlite = SqliteStorage::new(SqliteStorageConfig {
        path: storage.path().to_string(),
        max_connections: DEFAULT_MAX_CONNECTIONS,
    })
    .await;

    match sqlite {
        Ok(sqlite) => {
            info!(path = %storage.path(), "Order storage opened");
            Some(Arc::new(sqlite))
        }
        Err(e) => {
            warn!(error = %e, "Failed to open order storage, running without persistence");
            None
        }
    }
}

fn create_notifier(config: &Config) -> Option<Arc<dyn Notifier>> {
    let telegram = config.telegram()?;
    match TelegramNotifier::new(telegram) {
        Ok(notifier) => Some(Arc::new(notifier)),
        Err(e) => {
            warn!(error = %e, "Failed to create Telegram notifier, notifications disabled");
            None
        }
    }
}

#[tokio::main]
async fn main() {
    let config_path = parse_config_path();
    let config = match Config::load(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {}", e);
            std::process::exit(1);
        }
    };

    init_tracing(config.app.log_level.as_deref());
    info!(config = %config_path, name = %config.app.name, env = %config.app.env, "Configuration loaded");

    let backend = match HttpBackend::from_config(&config.backend) {
        Ok(b) => Arc::new(b),
        Err(e) => {
            error!(error = %e, "Failed to create backend client");
            std::process::exit(1);
        }
    };

    let store = Arc::new(OrderStore::new());
    let clock = Arc::new(SystemClock);
    let outbox = Arc::new(PushOutbox::new(config.sync.retry.clone()));
    let service = Arc::new(
        LifecycleService::new(store.clone(), clock.clone(), config.app.locale)
            .with_confirmations(outbox.clone()),
    );
    let reconciler = SyncReconciler::new(store, clock);

    let mut agent = SyncAgent::new(
        backend,
        service,
        reconciler,
        outbox,
        AgentSettings::from_config(&config),
    );
    if let Some(repository) = open_storage(&config).await {
        agent = agent.with_repository(repository);
    }
    if let Some(notifier) = create_notifier(&config) {
        agent = agent.with_notifier(notifier);
    }
    let agent = Arc::new(agent);

    if let Err(e) = agent.hydrate().await {
        error!(error = %e, "Failed to load stored orders");
        std::process::exit(1);
    }

    let runner = tokio::spawn({
        let agent = Arc::clone(&agent);
        async move { agent.run().await }
    });

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
    }

    let _ = agent.stop().await;
    match runner.await {
        Ok(Err(e)) => error!(error = %e, "Order sync error"),
        Err(e) => error!(error = %e, "Order sync task panicked"),
        Ok(Ok(())) => {}
    }

    if let Err(e) = agent.close_storage().await {
        warn!(error = %e, "Failed to close order storage");
    }
}
