//! Cross-crate flows over real sockets: a directory server on an ephemeral
//! loopback port, driven by agent-side components.

use std::net::SocketAddr;
use std::time::Duration;

use meshdir_agent::{provision_key, ControlClient, FileSecretStore, PeerCache};
use meshdir_common::{now_epoch_secs, Database, DeviceKeyPair, DirectorySnapshot, Error};
use meshdir_server::{
    directory::DirectoryStore, routes, routes::AppState, sweeper::LivenessSweeper,
    transport::TransportKeyPair,
};

const TIMEOUT_SECS: i64 = 30;

async fn spawn_server() -> (String, AppState) {
    let store = DirectoryStore::new(Database::open_memory().unwrap()).unwrap();
    let state = AppState {
        store,
        server_public_key: TransportKeyPair::generate().public_key_base64(),
        freshness_window_secs: 30,
        liveness_timeout_secs: TIMEOUT_SECS,
    };

    let app = routes::router(state.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });

    (format!("http://{}", addr), state)
}

#[tokio::test]
async fn two_agents_discover_each_other() {
    let (base_url, state) = spawn_server().await;

    let alpha = ControlClient::new(&base_url, DeviceKeyPair::generate()).unwrap();
    let response = alpha.register("alpha", "127.0.0.1:9001").await.unwrap();
    assert_eq!(response.server_public_key, state.server_public_key);
    assert_eq!(response.peers.len(), 1);
    assert!(response.peers[0].connected);

    let beta = ControlClient::new(&base_url, DeviceKeyPair::generate()).unwrap();
    let response = beta.register("beta", "127.0.0.1:9002").await.unwrap();
    assert_eq!(response.peers.len(), 2);

    let peers = beta.fetch_peers().await.unwrap();
    let names: Vec<_> = peers.iter().map(|p| p.name.as_str()).collect();
    assert!(names.contains(&"alpha"));
    assert!(names.contains(&"beta"));
    assert!(peers.iter().all(|p| p.connected));
}

#[tokio::test]
async fn unauthenticated_peer_list_is_rejected() {
    let (base_url, state) = spawn_server().await;

    let alpha = ControlClient::new(&base_url, DeviceKeyPair::generate()).unwrap();
    alpha.register("alpha", "127.0.0.1:9001").await.unwrap();

    let response = reqwest::get(format!("{}/peers", base_url)).await.unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::UNAUTHORIZED);

    // The directory is unmodified: still exactly one record.
    assert_eq!(state.store.list_all().unwrap().len(), 1);
}

#[tokio::test]
async fn unregistered_identity_cannot_list_peers() {
    let (base_url, _state) = spawn_server().await;

    // Valid, fresh proof over a key the directory has never seen.
    let stranger = ControlClient::new(&base_url, DeviceKeyPair::generate()).unwrap();
    let err = stranger.fetch_peers().await.unwrap_err();
    assert!(err.to_string().contains("401"));
}

#[tokio::test]
async fn swept_record_reconnects_on_authenticated_call() {
    let (base_url, state) = spawn_server().await;

    let alpha = ControlClient::new(&base_url, DeviceKeyPair::generate()).unwrap();
    alpha.register("alpha", "127.0.0.1:9001").await.unwrap();

    // Run the sweep against a clock past the liveness timeout.
    let sweeper = LivenessSweeper::new(state.store.clone(), Duration::from_secs(10), TIMEOUT_SECS);
    let flipped = sweeper
        .sweep_once(now_epoch_secs() + TIMEOUT_SECS + 1)
        .unwrap();
    assert_eq!(flipped, 1);
    let record = state
        .store
        .find_by_key(&alpha.public_key_base64())
        .unwrap()
        .unwrap();
    assert!(!record.connected);

    // Any authenticated interaction flips it straight back.
    let peers = alpha.fetch_peers().await.unwrap();
    assert!(peers.iter().find(|p| p.name == "alpha").unwrap().connected);
}

#[tokio::test]
async fn synced_directory_survives_a_sealed_cache_round_trip() {
    let (base_url, _state) = spawn_server().await;
    let state_dir = tempfile::tempdir().unwrap();

    let alpha = ControlClient::new(&base_url, DeviceKeyPair::generate()).unwrap();
    alpha.register("alpha", "127.0.0.1:9001").await.unwrap();
    let peers = alpha.fetch_peers().await.unwrap();

    let secret_store = FileSecretStore::new(state_dir.path().join("secrets"));
    let key = provision_key(&secret_store).unwrap();

    let snapshot = DirectorySnapshot::new(now_epoch_secs(), peers);
    PeerCache::new(state_dir.path(), &key)
        .save(&snapshot)
        .await
        .unwrap();

    // A later process provisions the same key from the store and reads the
    // snapshot back.
    let key_again = provision_key(&secret_store).unwrap();
    assert_eq!(key, key_again);
    let restored = PeerCache::new(state_dir.path(), &key_again)
        .load()
        .await
        .unwrap();
    assert_eq!(restored, snapshot);

    // The wrong key never yields a snapshot.
    let mut wrong = key;
    wrong[0] ^= 0xff;
    let err = PeerCache::new(state_dir.path(), &wrong)
        .load()
        .await
        .unwrap_err();
    assert!(matches!(err, Error::DecryptionFailure(_)));
}
