use std::sync::Arc;

use anyhow::Context as _;

use warden_infra::{InMemoryKeyCustody, WardenConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = WardenConfig::from_env().context("invalid configuration")?;
    warden_observability::init_with(config.log_format);

    tracing::warn!("using in-process key custody; keys do not survive a restart");
    let custody = Arc::new(InMemoryKeyCustody::new());
    let services = Arc::new(warden_api::app::build_services(&config, custody).await?);

    // The CA loads lazily; a sealed custody at startup is not fatal.
    if let Err(e) = services.ca.ensure_ready().await {
        tracing::warn!(error = %e, "certificate authority not ready yet");
    }

    let app = warden_api::app::build_app(Arc::clone(&services));
    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;
    tracing::info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tokio::task::spawn_blocking(move || services.shutdown()).await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
