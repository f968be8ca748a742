use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

mod api;
mod config;
mod error;
mod gemini;
mod i18n;
mod service;
mod view;

use crate::config::AppConfig;
use crate::service::StorytellerService;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    init_logging();

    info!(
        "Starting Storyteller service v{}",
        env!("CARGO_PKG_VERSION")
    );

    // Missing credentials or prompt templates stop startup here
    let config = AppConfig::load().inspect_err(|e| {
        tracing::error!(error = %e, "Configuration error");
    })?;

    info!(
        host = %config.server.host,
        port = config.server.port,
        prompts = %config.prompts.dir.display(),
        locale = %config.ui.locale,
        "Configuration loaded"
    );

    let service = Arc::new(StorytellerService::from_config(&config).inspect_err(|e| {
        tracing::error!(error = %e, "Service initialization failed");
    })?);

    // Build the router
    let app = api::router(service.clone());

    // Start idle session cleanup background task
    let cleanup_service = service.clone();
    let ttl = config.session.ttl();
    let cleanup_interval = config.session.cleanup_interval();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(cleanup_interval);
        loop {
            interval.tick().await;
            let removed = cleanup_service.cleanup_sessions(ttl);
            if removed > 0 {
                info!(removed, "Cleaned up idle sessions");
            }
        }
    });

    // Start the server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let format = fmt::format()
        .with_target(true)
        .with_thread_ids(true)
        .compact();

    // Use RUST_LOG if set, otherwise default to info level for our crate
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("storyteller_service=info"));

    tracing_subscriber::registry()
        .with(fmt::layer().event_format(format))
        .with(filter)
        .init();
}
