use anyhow::Context;

use bankapi_api::config::ApiConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = std::env::var("BANKAPI_ENV").unwrap_or_else(|_| "development".to_string());
    bankapi_observability::init(&env);

    let config = ApiConfig::from_env()?;
    tracing::info!(?config, "starting bankapi");

    let app = bankapi_api::app::build_app(&config).await?;

    let listener = tokio::net::TcpListener::bind(config.addr)
        .await
        .with_context(|| format!("failed to bind {}", config.addr))?;

    tracing::info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
}
