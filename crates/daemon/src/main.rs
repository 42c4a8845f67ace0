//! Findoc daemon - composition root
//!
//! Wires the SQLite queue, HTTP adapters and subprocess pipeline into the
//! core services and runs the configured role (api, worker or both).

mod config;

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinError, JoinHandle};
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use config::AppConfig;
use findoc_api_http::{ApiServer, ApiServerConfig};
use findoc_core::application::{
    shutdown_channel, IntakeService, LifecycleController, LifecycleSettings, MaintenanceScheduler,
    RedeliveryService, ShutdownSender, Worker,
};
use findoc_core::port::id_provider::UuidProvider;
use findoc_core::port::time_provider::SystemTimeProvider;
use findoc_core::port::{TimeProvider, WorkQueue};
use findoc_infra_http::{
    GraphQlStatusReporter, ObjectStoreFetcher, ObjectStoreSettings, RecordStoreSettings,
};
use findoc_infra_sqlite::{create_pool, run_migrations, SqliteMaintenance, SqliteWorkQueue};
use findoc_infra_system::{PipelineSettings, SubprocessPipeline};

const VERSION: &str = env!("CARGO_PKG_VERSION");
const LOG_FILE_PREFIX: &str = "findoc.log";
/// How long in-flight jobs get to finish after a shutdown signal
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Logging (guards flush the non-blocking writers on drop)
    let _log_guards = init_logging()?;

    info!("Findoc daemon v{} starting...", VERSION);

    // 2. Configuration
    let config = AppConfig::load()?;
    info!(
        role = ?config.role,
        channel = %config.queue.channel,
        "Configuration loaded"
    );

    // 3. Queue database
    let database_url = sqlite_url(&config.database_url())?;
    info!(database = %database_url, "Opening queue database...");
    let pool = create_pool(&database_url)
        .await
        .context("Queue database pool creation failed")?;
    run_migrations(&pool).await.context("Migration failed")?;

    let time_provider: Arc<dyn TimeProvider> = Arc::new(SystemTimeProvider);
    let queue: Arc<dyn WorkQueue> =
        Arc::new(SqliteWorkQueue::new(pool.clone(), time_provider.clone()));

    let (shutdown_tx, _shutdown_rx) = shutdown_channel();
    let mut background: Vec<JoinHandle<()>> = Vec::new();

    // 4. HTTP intake
    let mut api_handle = if config.role.runs_api() {
        Some(start_api(&config, queue.clone(), time_provider.clone(), &shutdown_tx))
    } else {
        None
    };

    // 5. Workers, redelivery and maintenance
    if config.role.runs_workers() {
        let maintenance = Arc::new(SqliteMaintenance::new(pool.clone(), time_provider.clone()));
        background.extend(
            start_workers(&config, queue.clone(), time_provider.clone(), maintenance, &shutdown_tx)
                .await?,
        );
    }

    info!("System ready");

    // 6. Wait for a signal (or for the intake to die)
    let api_failure = tokio::select! {
        _ = shutdown_signal() => {
            info!("Shutdown signal received. Exiting gracefully...");
            None
        }
        result = wait_api(&mut api_handle) => Some(result),
    };

    // 7. Graceful shutdown
    shutdown_tx.shutdown();

    let exit = match api_failure {
        Some(result) => {
            api_handle = None;
            match result {
                Ok(Ok(())) => Err(anyhow::anyhow!("HTTP intake stopped unexpectedly")),
                Ok(Err(e)) => Err(anyhow::Error::new(e).context("HTTP intake failed")),
                Err(e) => Err(anyhow::anyhow!("HTTP intake task failed: {}", e)),
            }
        }
        None => Ok(()),
    };

    if let Some(handle) = api_handle {
        background.push(tokio::spawn(async move {
            if let Ok(Err(e)) = handle.await {
                error!(error = %e, "HTTP intake failed during shutdown");
            }
        }));
    }

    let drain = drain_tasks(background);
    if tokio::time::timeout(SHUTDOWN_GRACE, drain).await.is_err() {
        warn!(
            grace_secs = SHUTDOWN_GRACE.as_secs(),
            "Tasks still running after grace period; unfinished items will be redelivered"
        );
    }

    pool.close().await;
    info!("Shutdown complete.");
    exit
}

fn init_logging() -> Result<Vec<WorkerGuard>> {
    let log_format = std::env::var("FINDOC_LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("findoc=info"))
        .context("Failed to create env filter")?;

    let mut guards = Vec::new();

    let (stdout, guard) = tracing_appender::non_blocking(std::io::stdout());
    guards.push(guard);
    let stdout_layer = match log_format.as_str() {
        // Production: JSON structured logging
        "json" => fmt::layer().json().with_writer(stdout).boxed(),
        // Development: pretty formatting with colors
        _ => fmt::layer().pretty().with_writer(stdout).boxed(),
    };

    let file_layer = match std::env::var("FINDOC_LOG_DIR") {
        Ok(dir) => {
            let appender =
                tracing_appender::rolling::daily(shellexpand::tilde(&dir).as_ref(), LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            guards.push(guard);
            Some(fmt::layer().json().with_ansi(false).with_writer(writer))
        }
        Err(_) => None,
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    Ok(guards)
}

/// Accept a bare path or a `sqlite:` URL; bare paths get their directory created
fn sqlite_url(database: &str) -> Result<String> {
    if database.starts_with("sqlite:") {
        return Ok(database.to_string());
    }
    if let Some(parent) = Path::new(database).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }
    Ok(format!("sqlite://{}", database))
}

fn start_api(
    config: &AppConfig,
    queue: Arc<dyn WorkQueue>,
    time_provider: Arc<dyn TimeProvider>,
    shutdown_tx: &ShutdownSender,
) -> JoinHandle<std::io::Result<()>> {
    let intake = Arc::new(IntakeService::new(
        queue,
        Arc::new(UuidProvider),
        time_provider,
        config.queue.channel.clone(),
    ));
    let server = ApiServer::new(
        ApiServerConfig {
            host: config.http.host.clone(),
            port: config.http.port,
        },
        intake,
    );

    let mut token = shutdown_tx.token();
    tokio::spawn(async move { server.serve(async move { token.wait().await }).await })
}

async fn start_workers(
    config: &AppConfig,
    queue: Arc<dyn WorkQueue>,
    time_provider: Arc<dyn TimeProvider>,
    maintenance: Arc<SqliteMaintenance>,
    shutdown_tx: &ShutdownSender,
) -> Result<Vec<JoinHandle<()>>> {
    let mut object_store = ObjectStoreSettings::new(config.object_store.base_url.clone())
        .with_admin_secret(config.object_store.admin_secret.clone());
    object_store.read_timeout = Duration::from_secs(config.object_store.read_timeout_secs);
    let fetcher = Arc::new(
        ObjectStoreFetcher::new(object_store).context("Object store client setup failed")?,
    );

    let mut record_store = RecordStoreSettings::new(config.record_store.graphql_url.clone())
        .with_admin_secret(config.record_store.admin_secret.clone());
    record_store.timeout = Duration::from_secs(config.record_store.timeout_secs);
    let reporter = Arc::new(
        GraphQlStatusReporter::new(record_store).context("Record store client setup failed")?,
    );

    let mut pipeline_settings = PipelineSettings::new(config.pipeline.program.clone())
        .with_args(config.pipeline.args.clone())
        .with_timeout(config.pipeline_timeout())
        .with_env_allowlist(config.pipeline.env_allowlist.clone());
    pipeline_settings.working_dir = config.pipeline.working_dir.as_ref().map(Into::into);
    let pipeline = Arc::new(SubprocessPipeline::new(pipeline_settings));

    let scratch_dir = config.scratch_dir();
    std::fs::create_dir_all(&scratch_dir)
        .with_context(|| format!("Failed to create scratch dir {}", scratch_dir.display()))?;

    let controller = Arc::new(LifecycleController::new(
        fetcher,
        pipeline,
        reporter.clone(),
        LifecycleSettings { scratch_dir },
    ));

    // Claims orphaned by a previous crash go back on the queue before we start
    let redelivery = Arc::new(RedeliveryService::new(
        queue.clone(),
        reporter,
        time_provider,
        Some(config.queue.visibility_timeout_ms),
        Some(config.queue.max_deliveries),
    ));
    match redelivery.redeliver_stale().await {
        Ok(report) => info!(
            requeued = report.requeued,
            buried = report.buried,
            "Startup redelivery completed"
        ),
        Err(e) => error!(error = %e, "Startup redelivery failed"),
    }

    let mut handles = Vec::with_capacity(config.worker.concurrency + 1);
    let instance = uuid::Uuid::new_v4().simple().to_string();
    for n in 0..config.worker.concurrency {
        let worker = Worker::new(
            format!("worker-{}-{}", &instance[..8], n),
            config.queue.channel.clone(),
            queue.clone(),
            controller.clone(),
        )
        .with_heartbeat_interval(config.heartbeat_interval());
        let token = shutdown_tx.token();
        handles.push(tokio::spawn(async move {
            if let Err(e) = worker.run(token).await {
                error!(worker_id = %worker.worker_id(), error = %e, "Worker failed");
            }
        }));
    }
    info!(workers = config.worker.concurrency, "Workers started");

    let scheduler = MaintenanceScheduler::new(
        maintenance,
        redelivery,
        config.maintenance_config(),
        config.maintenance_period(),
    );
    handles.push(tokio::spawn(scheduler.run(shutdown_tx.token())));

    Ok(handles)
}

async fn wait_api(
    handle: &mut Option<JoinHandle<std::io::Result<()>>>,
) -> std::result::Result<std::io::Result<()>, JoinError> {
    match handle {
        Some(handle) => handle.await,
        None => std::future::pending().await,
    }
}

async fn drain_tasks(handles: Vec<JoinHandle<()>>) {
    for handle in handles {
        if let Err(e) = handle.await {
            error!(error = %e, "Background task panicked");
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
