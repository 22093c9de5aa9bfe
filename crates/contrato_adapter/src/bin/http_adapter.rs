#![forbid(unsafe_code)]

use std::sync::Arc;

use contrato_adapter::{build_router, AdapterRuntime};
use contrato_os::config::ContratoConfig;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = ContratoConfig::from_env()?;
    let runtime = Arc::new(AdapterRuntime::from_config(&config)?);
    let app = build_router(runtime);

    info!(addr = %config.http_bind, "contrato_adapter_http listening");
    let listener = tokio::net::TcpListener::bind(config.http_bind).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        // No signal handler available; run until killed.
        std::future::pending::<()>().await;
    }
    info!("contrato_adapter_http shutting down");
}
