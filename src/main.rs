//! Analytics Pipeline
//!
//! Queue-backed analytics event service:
//! - Synchronous validation and enqueue of incoming events
//! - Durable job queue with retry and exponential backoff
//! - Bounded worker pool writing events idempotently to the store
//! - Page view reports aggregated from the store

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

use api::{router, AppState, IngestionService};
use event_store::{EventStore, ReportingAggregator, StoreBackend, StoreConfig};
use job_queue::{JobQueue, QueueBackend, QueueConfig};
use pipeline_core::AnonymousUsers;
use pipeline_core::limits::DEFAULT_TOP_PATHS;
use telemetry::{init_tracing, HealthRegistry, LogConfig};
use worker::{WorkerConfig, WorkerScheduler};

/// Which parts of the pipeline this process runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Mode {
    /// HTTP API and workers in one process
    #[default]
    All,
    /// HTTP API only
    Api,
    /// Workers only
    Worker,
}

impl Mode {
    fn serves_http(self) -> bool {
        matches!(self, Self::All | Self::Api)
    }

    fn runs_workers(self) -> bool {
        matches!(self, Self::All | Self::Worker)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ServerConfig {
    #[serde(default = "default_host")]
    host: String,
    #[serde(default = "default_port")]
    port: u16,
    #[serde(default)]
    mode: Mode,
    /// Seconds between backend health checks
    #[serde(default = "default_health_interval_secs")]
    health_interval_secs: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_health_interval_secs() -> u64 {
    15
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            mode: Mode::default(),
            health_interval_secs: default_health_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ReportingConfig {
    #[serde(default = "default_top_paths")]
    top_paths: usize,
    #[serde(default)]
    anonymous_users: AnonymousUsers,
}

fn default_top_paths() -> usize {
    DEFAULT_TOP_PATHS
}

impl Default for ReportingConfig {
    fn default() -> Self {
        Self {
            top_paths: default_top_paths(),
            anonymous_users: AnonymousUsers::default(),
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Config {
    #[serde(default)]
    server: ServerConfig,
    #[serde(default)]
    log: LogConfig,
    #[serde(default)]
    queue: QueueConfig,
    #[serde(default)]
    store: StoreConfig,
    #[serde(default)]
    worker: WorkerConfig,
    #[serde(default)]
    reporting: ReportingConfig,
}

impl Config {
    /// Whether any backend keeps its data only in process memory.
    fn uses_memory_backend(&self) -> bool {
        self.queue.backend == QueueBackend::Memory || self.store.backend == StoreBackend::Memory
    }

    /// Memory backends live inside one process, so they cannot be split.
    fn validate(&self) -> Result<()> {
        if self.uses_memory_backend() && self.server.mode != Mode::All {
            bail!(
                "memory backends require server.mode = \"all\" (got {:?})",
                self.server.mode
            );
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let config = load_config()?;

    init_tracing(&config.log.clone().with_env_overrides());

    info!("Starting Analytics Pipeline v{}", env!("CARGO_PKG_VERSION"));
    info!(
        mode = ?config.server.mode,
        queue_backend = ?config.queue.backend,
        store_backend = ?config.store.backend,
        concurrency = config.worker.concurrency,
        "Loaded configuration"
    );
    config.validate()?;
    if config.uses_memory_backend() {
        warn!(
            queue_backend = ?config.queue.backend,
            store_backend = ?config.store.backend,
            "Memory backend in use: queued jobs and stored events are lost on exit. \
             Set PIPELINE__QUEUE__BACKEND=postgres and PIPELINE__STORE__BACKEND=postgres for durability"
        );
    }

    let health = Arc::new(HealthRegistry::new());

    let queue = job_queue::connect(&config.queue)
        .await
        .context("Failed to initialize job queue")?;
    let store = event_store::connect(&config.store)
        .await
        .context("Failed to initialize event store")?;

    check_health(queue.as_ref(), store.as_ref(), &health).await;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut handles = vec![spawn_health_monitor(
        queue.clone(),
        store.clone(),
        health.clone(),
        Duration::from_secs(config.server.health_interval_secs.max(1)),
        shutdown_rx.clone(),
    )];

    if config.server.mode.runs_workers() {
        let scheduler = WorkerScheduler::new(
            config.worker.clone(),
            config.queue.poll_interval(),
            queue.clone(),
            store.clone(),
        );
        handles.extend(scheduler.start(shutdown_rx.clone()));
    }

    if config.server.mode.serves_http() {
        let reporting = ReportingAggregator::new(store.clone())
            .with_top_paths(config.reporting.top_paths)
            .with_anonymous_users(config.reporting.anonymous_users);
        let state = AppState::new(IngestionService::new(queue.clone()), reporting, health);
        let app = router(state);

        let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
            .parse()
            .context("Invalid server address")?;

        info!("Listening on http://{}", addr);

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .context("Failed to bind to address")?;

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("Server error")?;
    } else {
        shutdown_signal().await;
    }

    info!("Shutting down...");
    let _ = shutdown_tx.send(true);
    for handle in handles {
        if let Err(e) = handle.await {
            error!("Background task panicked: {}", e);
        }
    }

    info!("Shutdown complete");
    Ok(())
}

/// Load configuration from defaults, `config/default.toml`, and environment.
fn load_config() -> Result<Config> {
    let config = config::Config::builder()
        .add_source(config::Config::try_from(&Config::default())?)
        .add_source(
            config::File::with_name("config/default")
                .required(false)
                .format(config::FileFormat::Toml),
        )
        // PIPELINE__QUEUE__MAX_ATTEMPTS=5
        .add_source(
            config::Environment::with_prefix("PIPELINE")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .context("Failed to build configuration")?;

    let mut config: Config = config
        .try_deserialize()
        .context("Failed to deserialize configuration")?;

    // Flat overrides used by common deployment platforms
    if let Ok(url) = std::env::var("DATABASE_URL") {
        config.queue.database_url.get_or_insert_with(|| url.clone());
        config.store.database_url.get_or_insert(url);
    }
    if let Ok(port) = std::env::var("PORT") {
        config.server.port = port.parse().context("PORT must be a port number")?;
    }

    Ok(config)
}

/// Check backend health and update the registry.
async fn check_health(queue: &dyn JobQueue, store: &dyn EventStore, health: &HealthRegistry) {
    if job_queue::health::check_connection(queue, &health.queue).await {
        info!("Job queue connection: healthy");
    } else {
        error!("Job queue connection: unhealthy");
    }

    if event_store::health::check_connection(store, &health.store).await {
        info!("Event store connection: healthy");
    } else {
        error!("Event store connection: unhealthy");
    }
}

fn spawn_health_monitor(
    queue: Arc<dyn JobQueue>,
    store: Arc<dyn EventStore>,
    health: Arc<HealthRegistry>,
    every: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {}
            }

            let was_ready = health.is_ready();
            job_queue::health::check_connection(queue.as_ref(), &health.queue).await;
            event_store::health::check_connection(store.as_ref(), &health.store).await;
            if was_ready && !health.is_ready() {
                warn!("Service no longer ready: job queue unreachable");
            }
        }
    })
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received terminate signal");
        }
    }
}
