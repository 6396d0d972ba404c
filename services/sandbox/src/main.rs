use anyhow::Result;
use chrono::Utc;
use common::config::SandboxConfig;
use common::telemetry::{init_telemetry, TelemetryConfig};
use futures_util::stream::StreamExt;
use signal_hook::consts::signal::*;
use signal_hook_tokio::Signals;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info};

mod handlers;
mod routes;
mod state;

use state::AppState;

/// Resolves once SIGTERM or SIGINT arrives
async fn shutdown_signal(mut signals: Signals) {
    while let Some(signal) = signals.next().await {
        match signal {
            SIGTERM | SIGINT => {
                info!("Received shutdown signal, stopping...");
                break;
            }
            _ => {}
        }
    }
}

/// Drive the TTL sweep and the change stream until told to stop
async fn run_stream_loop(state: AppState, interval: Duration, mut stop: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let report = state.pipeline.tick(Utc::now()).await;
                if report.dead_lettered > 0 {
                    error!(count = report.dead_lettered, "Stream records dead-lettered");
                }
            }
            _ = stop.changed() => break,
        }
    }

    info!("Stream driver stopped");
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let config = SandboxConfig::from_env()?;

    init_telemetry(TelemetryConfig {
        service_name: "sandbox".to_string(),
        log_level: config.log_level.clone(),
        json: false,
    })
    .map_err(|e| anyhow::anyhow!("failed to initialize telemetry: {}", e))?;

    info!("Starting order pipeline sandbox...");
    info!("Configuration:");
    info!("  Port: {}", config.port);
    info!("  TTL days: {}", config.ttl_days);
    info!("  Poll interval: {:?}", config.poll_interval);
    info!("  Batch size: {}", config.stream.batch_size);

    let state = AppState::new(&config);

    let (stop_tx, stop_rx) = watch::channel(false);
    let driver_task = tokio::spawn(run_stream_loop(state.clone(), config.poll_interval, stop_rx));

    let signals = Signals::new(&[SIGTERM, SIGINT])?;
    let handle = signals.handle();

    let app = routes::create_router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Sandbox listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(signals))
        .await
        .map_err(|e| {
            error!("Server error: {}", e);
            e
        })?;

    // Cleanup
    info!("Shutting down sandbox...");
    handle.close();
    let _ = stop_tx.send(true);
    if let Err(e) = driver_task.await {
        error!("Stream driver task failed: {}", e);
    }
    info!("Sandbox stopped");

    Ok(())
}
