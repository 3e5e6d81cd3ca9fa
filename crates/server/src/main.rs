mod api;
mod bootstrap;
mod health;

use std::time::Duration;

use anyhow::Result;
use bandscore_core::config::{AppConfig, LoadOptions};
use tokio_util::sync::CancellationToken;

fn init_logging(config: &AppConfig) {
    use bandscore_core::config::LogFormat::*;
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
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;
    let shutdown = CancellationToken::new();

    let state = api::ApiState::new(
        app.assessments.clone(),
        app.results.clone(),
        app.config.assessment.max_concurrent_runs,
        app.config.assessment.sender_id.clone(),
        shutdown.clone(),
    );
    let router = api::router(state)
        .merge(health::router(app.db_pool.clone(), app.config.assessment.session_mode.as_str()));

    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;
    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        bind_address = %address,
        "bandscore-server listening"
    );

    let grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);
    axum::serve(listener, router)
        .with_graceful_shutdown(wait_for_shutdown(shutdown.clone(), grace))
        .await?;

    shutdown.cancel();
    app.db_pool.close().await;
    tracing::info!(
        event_name = "system.server.stopped",
        correlation_id = "shutdown",
        "bandscore-server stopped"
    );

    Ok(())
}

/// Resolves on Ctrl-C. In-flight assessments get `grace` to finish before
/// their cancellation tokens fire.
async fn wait_for_shutdown(shutdown: CancellationToken, grace: Duration) {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(
            event_name = "system.server.signal_error",
            correlation_id = "shutdown",
            error = %error,
            "could not listen for shutdown signal"
        );
    }
    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        grace_secs = grace.as_secs(),
        "bandscore-server draining in-flight requests"
    );

    tokio::spawn(async move {
        tokio::time::sleep(grace).await;
        shutdown.cancel();
    });
}
