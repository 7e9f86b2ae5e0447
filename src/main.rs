use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use sluice::config::{LogFormat, LoggingConfig, SluiceConfig, StoreBackend};
use sluice::http::{AdmissionGate, ClassLimits, GateState, HttpServer};
use sluice::ratelimit::{CounterStore, Limiter, LimiterSettings, MemoryStore, RedisStore};

/// How often the in-memory store drops expired entries.
const SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// Per-identifier request admission control.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Path to a YAML configuration file; `SLUICE_*` variables override it
    #[arg(short, long, env = "SLUICE_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Configuration errors are fatal before anything is served
    let config = SluiceConfig::load(args.config.as_deref())?;
    init_tracing(&config.logging);

    info!("Starting Sluice admission control");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!(
        listen_addr = %config.server.listen_addr,
        backend = ?config.store.backend,
        ip_limit = config.limits.ip_limit,
        token_limit = config.limits.token_limit,
        window = ?config.limits.window(),
        cooldown = ?config.limits.cooldown(),
        "Configuration loaded"
    );

    let store: Arc<dyn CounterStore> = match config.store.backend {
        StoreBackend::Redis => Arc::new(RedisStore::connect(&config.store.redis_url).await?),
        StoreBackend::Memory => {
            let store = Arc::new(MemoryStore::new());
            store.clone().spawn_sweeper(SWEEP_INTERVAL);
            store
        }
    };

    let limiter = Arc::new(Limiter::new(store, LimiterSettings::from_config(&config)));
    let gate = Arc::new(AdmissionGate::new(
        limiter,
        ClassLimits::from_config(&config.limits),
    ));
    let state = GateState::new(gate, config.limits.credential_header()?);
    info!("Admission gate initialized");

    let server = HttpServer::bind(config.server.listen_addr, state).await?;
    server.serve_with_shutdown(shutdown_signal()).await?;

    info!("Sluice stopped");
    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true);

    match logging.format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
