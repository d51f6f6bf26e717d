//! meshdir directory server daemon

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use meshdir_server::{
    config::ServerConfig, directory::DirectoryStore, routes, routes::AppState,
    sweeper::LivenessSweeper, transport::TransportKeyPair,
};

#[derive(Parser)]
#[command(name = "meshdird")]
#[command(about = "meshdir directory server - device registration and peer discovery")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// HTTP listen address (overrides config)
    #[arg(short, long)]
    listen: Option<String>,

    /// State directory (overrides config)
    #[arg(short, long)]
    state_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    info!("meshdir directory server v{}", env!("CARGO_PKG_VERSION"));

    let config_path = cli
        .config
        .unwrap_or_else(|| meshdir_common::default_state_dir().join("server.toml"));
    let mut config = ServerConfig::load(&config_path)?;
    if let Some(listen) = cli.listen {
        config.listen = listen;
    }
    if let Some(state_dir) = cli.state_dir {
        config.state_dir = state_dir;
    }

    tokio::fs::create_dir_all(&config.state_dir).await?;

    let db = meshdir_common::Database::open(config.db_path())?;
    let store = DirectoryStore::new(db)?;
    let transport = TransportKeyPair::load_or_generate(&config.state_dir)?;

    let state = AppState {
        store: store.clone(),
        server_public_key: transport.public_key_base64(),
        freshness_window_secs: config.freshness_window_secs,
        liveness_timeout_secs: config.liveness_timeout_secs,
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let sweeper = LivenessSweeper::new(
        store,
        Duration::from_secs(config.sweep_interval_secs),
        config.liveness_timeout_secs,
    );
    let sweeper_handle = tokio::spawn(sweeper.run(shutdown_rx));

    let app = routes::router(state);
    let listener = tokio::net::TcpListener::bind(&config.listen).await?;
    info!("Directory server listening on {}", config.listen);

    let serve = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    );

    tokio::select! {
        result = serve => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
    }

    let _ = shutdown_tx.send(true);
    let _ = sweeper_handle.await;

    info!("Directory server shutdown complete");
    Ok(())
}
