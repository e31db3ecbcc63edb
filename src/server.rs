use std::io;
use tokio::net::TcpListener;
use tracing::info;

use crate::api::{router, AppState};
use crate::config::ServerConfig;

/// Serve the API until Ctrl-C, then close the Oracle session
pub async fn run(config: &ServerConfig, state: AppState) -> io::Result<()> {
    let listener = TcpListener::bind(config.addr()).await?;
    info!("Server listening on http://{}", listener.local_addr()?);

    let connection_manager = state.connection_manager.clone();
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutting down");
    connection_manager.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Received Ctrl+C, initiating graceful shutdown...");
}
