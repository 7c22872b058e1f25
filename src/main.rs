//! vllm-gate - Bearer-token authenticating reverse proxy
//!
//! This is the main entry point for the vllm-gate proxy server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::{signal, sync::oneshot};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use vllm_gate::{
    config::{Config, LogFormat},
    create_router, metrics, AppState,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Load configuration first so the log format is known; a missing secret
    // aborts startup here
    let config = Config::from_env()?;

    init_tracing(config.log_format);

    info!("Starting vllm-gate");
    info!(
        upstream = %config.upstream_url,
        secret_len = config.secret.len(),
        "Configuration loaded successfully"
    );

    if let Some(addr) = config.metrics_addr {
        metrics::init_metrics(addr)?;
        info!("Metrics exporter listening on {}", addr);
    }

    // Initialize application state
    let state = Arc::new(AppState::new(config.clone())?);
    info!("Application state initialized");

    // Build the router
    let app = create_router(state.clone());

    // Bind to address
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("Invalid listen address")?;
    info!("Listening on {}", addr);

    // Create listener
    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Start server with graceful shutdown
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let mut server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                shutdown_rx.await.ok();
            })
            .await
    });

    tokio::select! {
        result = &mut server => {
            result.context("Server task failed")??;
            return Ok(());
        }
        _ = shutdown_signal() => {}
    }
    let _ = shutdown_tx.send(());

    // Open streams keep their connections alive; give them a bounded grace
    // period before cancelling
    let grace = Duration::from_secs(config.shutdown_grace_seconds);
    match tokio::time::timeout(grace, &mut server).await {
        Ok(result) => result.context("Server task failed")??,
        Err(_) => {
            warn!(
                active_streams = state.relay.tracker().active(),
                grace_seconds = config.shutdown_grace_seconds,
                "Connections still open after grace period, cancelling"
            );
            server.abort();
        }
    }

    // Remaining handles go away with the runtime, which cancels any relay
    // still in flight and closes its upstream stream
    drop(state);
    info!("Upstream connection pool released");

    info!("vllm-gate shutdown complete");
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "vllm_gate=info,tower_http=info".into());

    match format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init(),
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(true)
            .init(),
    }
}

/// Handle graceful shutdown signals
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            warn!("Received Ctrl+C, initiating shutdown");
        }
        _ = terminate => {
            warn!("Received SIGTERM, initiating shutdown");
        }
    }
}
