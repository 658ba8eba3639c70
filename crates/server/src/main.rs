mod bootstrap;
mod health;
mod routes;

use std::future::IntoFuture;
use std::time::Duration;

use anyhow::Result;
use herald_core::config::{AppConfig, LoadOptions};

fn init_logging(config: &AppConfig) {
    use herald_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    // Config must load before logging can be initialized from it.
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config)?;
    let router = routes::router(app.engine.clone()).merge(health::router(app.engine.clone()));

    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;
    tracing::info!(
        event_name = "system.server.started",
        bind_address = %address,
        "herald-server listening"
    );

    serve_until_shutdown(listener, router, app.config.server.graceful_shutdown_secs).await?;

    tracing::info!(event_name = "system.server.stopped", "herald-server stopped");
    Ok(())
}

/// Serves until the process receives an interrupt, then drains open
/// connections for at most the configured grace period.
async fn serve_until_shutdown(
    listener: tokio::net::TcpListener,
    router: axum::Router,
    grace_secs: u64,
) -> Result<()> {
    let (drain_tx, drain_rx) = tokio::sync::oneshot::channel();
    let server = axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            wait_for_signal().await;
            let _ = drain_tx.send(());
        })
        .into_future();

    tokio::pin!(server);
    tokio::select! {
        result = &mut server => result?,
        _ = drain_rx => {
            match tokio::time::timeout(Duration::from_secs(grace_secs), &mut server).await {
                Ok(result) => result?,
                Err(_) => {
                    tracing::warn!(
                        event_name = "system.server.drain_timeout",
                        grace_secs,
                        "open connections outlived the shutdown grace period"
                    );
                }
            }
        }
    }
    Ok(())
}

async fn wait_for_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(
            event_name = "system.server.signal_listener_failed",
            error = %error,
            "shutdown signal listener failed"
        );
        return;
    }
    tracing::info!(event_name = "system.server.stopping", "shutdown signal received");
}
