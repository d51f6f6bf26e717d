//! meshdir device agent

use anyhow::Context;
use clap::Parser;
use meshdir_common::{now_epoch_secs, DeviceKeyPair, DirectorySnapshot, Error};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use meshdir_agent::{
    cache::PeerCache, client::ControlClient, health::HealthChecker, peers::PeerList, probe,
    secrets::{provision_key, FileSecretStore}, sync::SyncLoop,
};

#[derive(Parser)]
#[command(name = "meshdir-agent")]
#[command(about = "meshdir device agent - joins the mesh and mirrors the peer directory")]
#[command(version)]
struct Cli {
    /// Directory server base URL
    #[arg(short, long, env = "MESHDIR_SERVER", default_value = "http://127.0.0.1:8080")]
    server: String,

    /// Device name advertised to the directory (defaults to the hostname)
    #[arg(short, long, env = "MESHDIR_NAME")]
    name: Option<String>,

    /// host:port other peers should dial for this device
    #[arg(short, long, env = "MESHDIR_ENDPOINT")]
    endpoint: String,

    /// Local listen address for the peer probe endpoint
    #[arg(short, long, default_value = "0.0.0.0:7946")]
    listen: SocketAddr,

    /// Agent state directory (keys, sealed cache, secrets)
    #[arg(long, env = "MESHDIR_STATE_DIR")]
    state_dir: Option<PathBuf>,

    /// Directory sync interval in seconds
    #[arg(long, default_value_t = 2)]
    sync_interval: u64,

    /// Peer health check interval in seconds
    #[arg(long, default_value_t = 5)]
    health_interval: u64,

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

    info!("meshdir agent v{}", env!("CARGO_PKG_VERSION"));

    let name = cli.name.unwrap_or_else(|| {
        hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "meshdir-device".to_string())
    });

    let state_dir = cli
        .state_dir
        .unwrap_or_else(meshdir_common::default_state_dir);
    tokio::fs::create_dir_all(&state_dir).await?;

    let keys = DeviceKeyPair::load_or_generate(&state_dir)
        .await
        .context("failed to load device identity")?;
    info!(public_key = %keys.public_key_base64(), device = %name, "device identity loaded");

    let secret_store = FileSecretStore::new(state_dir.join("secrets"));
    let cache_key = provision_key(&secret_store).context("failed to provision cache key")?;
    let cache = Arc::new(PeerCache::new(&state_dir, &cache_key));

    // Warm start from the sealed cache; a corrupt cache is discarded, not
    // trusted.
    let peer_list = PeerList::new();
    match cache.load().await {
        Ok(snapshot) => {
            info!(peers = snapshot.peers.len(), "restored peer cache");
            peer_list.replace(snapshot.peers).await;
        }
        Err(Error::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
            info!("no peer cache yet, starting empty");
        }
        Err(e) => {
            warn!("discarding unreadable peer cache: {}", e);
        }
    }

    let client = Arc::new(ControlClient::new(cli.server.clone(), keys)?);

    // Registration is the one fatal step: without a directory identity
    // there is nothing useful to do.
    let response = client
        .register(&name, &cli.endpoint)
        .await
        .context("initial registration failed")?;
    info!(
        server_public_key = %response.server_public_key,
        peers = response.peers.len(),
        "registered with directory"
    );

    let snapshot = DirectorySnapshot::new(now_epoch_secs(), response.peers);
    peer_list.replace(snapshot.peers.clone()).await;
    if let Err(e) = cache.save(&snapshot).await {
        warn!("Failed to seal peer cache: {}", e);
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let probe_handle = tokio::spawn(probe::serve(cli.listen, shutdown_rx.clone()));

    let sync_loop = SyncLoop::new(
        client.clone(),
        peer_list.clone(),
        cache,
        Duration::from_secs(cli.sync_interval),
    );
    let sync_handle = tokio::spawn(sync_loop.run(shutdown_rx.clone()));

    let health = HealthChecker::new(
        peer_list,
        client.public_key_base64(),
        Duration::from_secs(cli.health_interval),
    )?;
    let health_handle = tokio::spawn(health.run(shutdown_rx));

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
        result = probe_handle => {
            if let Ok(Err(e)) = result {
                tracing::error!("Probe endpoint error: {:#}", e);
            }
            anyhow::bail!("probe endpoint exited unexpectedly");
        }
    }

    let _ = shutdown_tx.send(true);
    let _ = sync_handle.await;
    let _ = health_handle.await;

    info!("Agent shutdown complete");
    Ok(())
}
