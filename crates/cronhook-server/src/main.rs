//! Cronhook server entry point.
//!
//! Initializes the store, bootstraps the scheduling engine from the
//! persisted jobs, starts the retention sweeper, and serves the REST
//! API until a shutdown signal arrives.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cronhook_api::{ApiContext, TriggerRateLimiter};
use cronhook_core::config::AppConfig;
use cronhook_database::{DatabasePool, JobRepository, LogRepository, Migrator};
use cronhook_scheduler::{RetentionSweeper, SchedulerEngine};
use cronhook_server::shutdown::{graceful_shutdown, listen_for_shutdown_signals};
use cronhook_server::{create_router, ShutdownController};

/// Cronhook - a persistent scheduler for HTTP jobs
#[derive(Parser, Debug)]
#[command(name = "cronhook")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Port to run the server on (overrides PORT)
    #[arg(short, long)]
    port: Option<u16>,

    /// Host to bind the server to
    #[arg(long)]
    host: Option<String>,
}

/// Initialize the tracing/logging subsystem
fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cronhook=info,tower_http=info,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Initialize the database connection pool and schema
async fn init_database(config: &AppConfig) -> anyhow::Result<DatabasePool> {
    info!(kind = ?config.database.kind, "Connecting to database...");

    let pool = DatabasePool::connect(&config.database).await?;
    pool.health_check().await?;
    Migrator::run(&pool).await?;

    info!("Database connection established");
    Ok(pool)
}

async fn run_app(cli: &Cli) -> anyhow::Result<()> {
    info!("Starting Cronhook");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let mut config = AppConfig::from_env()?;
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(ref host) = cli.host {
        config.server.host = host.clone();
    }
    info!(
        host = %config.server.host,
        port = config.server.port,
        timezone = %config.timezone,
        "Configuration loaded"
    );

    // SQLite needs its parent directory to exist
    if let Some(parent) = std::path::Path::new(&config.database.path).parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await.ok();
        }
    }

    let pool = match init_database(&config).await {
        Ok(pool) => pool,
        Err(err) => {
            error!("Failed to initialize database: {err}");
            error!("Check DB_TYPE and the DB_* connection settings");
            return Err(err);
        }
    };

    let jobs = JobRepository::new(pool.clone());
    let logs = LogRepository::new(pool.clone());

    let engine = SchedulerEngine::new(jobs.clone(), logs.clone(), config.timezone);
    let registered = engine.bootstrap().await?;
    info!(jobs = registered, "Active jobs scheduled");

    let sweeper = RetentionSweeper::new(logs.clone(), config.retention.clone(), config.timezone);
    sweeper.start();

    let ctx = ApiContext {
        jobs,
        logs,
        engine: engine.clone(),
        sweeper: sweeper.clone(),
        limiter: Arc::new(TriggerRateLimiter::new()),
        timezone: config.timezone,
    };
    let router = create_router(ctx);

    let addr: SocketAddr = config.server.address().parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Cronhook listening on http://{addr}");
    info!("API endpoint: http://{addr}/api/jobs");
    info!("Health check: http://{addr}/health");

    let controller =
        ShutdownController::new(Duration::from_secs(config.server.shutdown_timeout_secs));
    tokio::spawn(listen_for_shutdown_signals(controller.clone()));

    axum::serve(listener, router)
        .with_graceful_shutdown(graceful_shutdown(controller.clone()))
        .await?;

    // Stop timers, let in-flight executions drain, then release the store
    sweeper.stop();
    engine.shutdown(controller.timeout()).await;
    pool.close().await;

    info!("Server shutdown complete");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    // A non-zero exit code on fatal errors, zero on graceful shutdown
    run_app(&cli).await
}
