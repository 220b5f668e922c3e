//! watchtower-relay
//!
//! Run with: cargo run
//!
//! Environment variables (optionally pre-loaded from an env file):
//! - WATCHTOWER_ENV_FILE: env file to load first (default: /usr/local/etc/watchtower-relay.env)
//! - WATCHTOWER_TARGETS: Comma-separated target ids, e.g. "mainnet,testnet"
//! - WATCHTOWER_<ID>_IDENTITY / WATCHTOWER_<ID>_RPC_URL: per-target validator and cluster
//! - WATCHTOWER_<ID>_DISCORD_WEBHOOK / WATCHTOWER_<ID>_TELEGRAM_CHAT_ID: alert channels
//! - TELEGRAM_BOT_TOKEN: Bot token shared by every Telegram chat
//! - WATCHTOWER_STATUS_ADDR: Bind address of the status endpoint (disabled when unset)
//! - WATCHTOWER_LOG_DIR: Also write a daily-rolling log file here
//! - RUST_LOG: Log level (default: watchtower_relay=info)
//!
//! See the `config` module for the full list.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::watch;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use watchtower_relay::api::{run_status_server, AppState};
use watchtower_relay::config::{load_env_file, MonitorConfig, DEFAULT_ENV_FILE};
use watchtower_relay::monitor::Orchestrator;

const LOG_FILE_PREFIX: &str = "watchtower-relay.log";

fn init_logging(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "watchtower_relay=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();

    guard
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install CTRL+C signal handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Resolves once `shutdown` turns true or its sender is dropped
async fn wait_for_shutdown(mut shutdown: watch::Receiver<bool>) {
    while !*shutdown.borrow() {
        if shutdown.changed().await.is_err() {
            break;
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let env_file = PathBuf::from(
        std::env::var("WATCHTOWER_ENV_FILE").unwrap_or_else(|_| DEFAULT_ENV_FILE.to_string()),
    );
    let env_loaded = load_env_file(&env_file)?;

    let config = MonitorConfig::from_env();
    let log_dir = config.as_ref().ok().and_then(|c| c.log_dir.clone());
    let _log_guard = init_logging(log_dir.as_deref());

    let config = config.map_err(|e| {
        tracing::error!(error = %e, "Invalid configuration");
        e
    })?;

    tracing::info!("watchtower-relay v{}", env!("CARGO_PKG_VERSION"));
    if env_loaded {
        tracing::info!("  Env file: {}", env_file.display());
    }
    tracing::info!("  Targets: {}", config.targets.len());
    tracing::info!("  Sweep interval: {:?}", config.sweep_interval);
    tracing::info!("  Webhook timeout: {:?}", config.webhook_timeout);
    tracing::info!("  Balance timeout: {:?}", config.balance_timeout);
    if let Some(dir) = &config.log_dir {
        tracing::info!("  Log directory: {}", dir.display());
    }
    for target in &config.targets {
        target.log_summary();
    }

    let orchestrator = Orchestrator::from_config(&config);
    let targets = orchestrator.targets();
    let monitors = orchestrator.start();

    let status_server = config.status_addr.map(|addr| {
        let state = Arc::new(AppState { targets });
        let shutdown = wait_for_shutdown(monitors.subscribe());
        tokio::spawn(async move {
            if let Err(e) = run_status_server(addr, state, shutdown).await {
                tracing::error!(error = %e, "Status server failed");
            }
        })
    });

    shutdown_signal().await;
    monitors.shutdown().await;

    if let Some(server) = status_server {
        if let Err(e) = server.await {
            tracing::error!(error = %e, "Status server task failed");
        }
    }

    tracing::info!("watchtower-relay stopped");
    Ok(())
}
