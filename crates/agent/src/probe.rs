//! Reachability probe endpoint
//!
//! Tiny HTTP server on the agent's advertised port so peers can test this
//! device's reachability directly, without going through the directory.

use anyhow::{Context, Result};
use axum::{routing::get, Router};
use std::net::SocketAddr;
use tokio::sync::watch;
use tracing::info;

pub async fn serve(listen: SocketAddr, mut shutdown: watch::Receiver<bool>) -> Result<()> {
    let app = Router::new().route("/ping", get(ping_handler));

    let listener = tokio::net::TcpListener::bind(listen)
        .await
        .with_context(|| format!("failed to bind probe endpoint on {}", listen))?;
    info!("Probe endpoint listening on {}", listen);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.changed().await;
        })
        .await?;

    info!("Probe endpoint stopped");
    Ok(())
}

async fn ping_handler() -> &'static str {
    "pong"
}
