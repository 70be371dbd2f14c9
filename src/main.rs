// src/main.rs
use anyhow::Result;
use tokio::signal;
use tracing::{info, warn};

use rust_health_checker::{
    config,
    health::{logging_interceptor, CheckerBuilder},
    probes::http_check,
    server::{HealthHandler, ServerBuilder},
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("rust_health_checker=info".parse()?)
                .add_directive("hyper=info".parse()?),
        )
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.yaml".to_string());

    info!("Loading configuration from: {}", config_path);
    let settings = config::load_config(&config_path).await?;

    let client = reqwest::Client::new();
    let checker = settings
        .http_checks
        .iter()
        .fold(
            CheckerBuilder::from_settings(&settings).with_interceptor(logging_interceptor()),
            |builder, check| builder.with_check(http_check(check, client.clone())),
        )
        .with_status_listener(|state| {
            warn!(status = %state.status, "service availability changed");
        })
        .build()?;

    checker.start().await;
    info!(
        checks = settings.http_checks.len(),
        scheduled = checker.running_scheduled_check_count(),
        "health checker started"
    );

    let server = ServerBuilder::new(settings.server.listen_addr)
        .with_handler(HealthHandler::new(checker.clone(), settings.server.path.clone()))
        .bind()
        .await?;
    info!(
        "Serving health on http://{}{}",
        server.local_addr()?,
        settings.server.path
    );

    server.serve_with_shutdown(shutdown_signal()).await?;

    checker.stop().await;
    info!("health checker stopped");
    Ok(())
}

// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!(%err, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                warn!(%err, "failed to install SIGTERM handler");
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

    info!("Shutdown signal received");
}
