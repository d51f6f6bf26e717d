//! HTTP API for the directory server
//!
//! Three endpoints: public registration, the gated peer list, and a trivial
//! health check. Handlers stay thin; the directory store owns the rules.

use axum::{
    extract::{ConnectInfo, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use meshdir_common::{
    now_epoch_secs, AuthProof, Error, PeerInfo, PeersResponse, RegisterRequest, RegisterResponse,
};
use std::net::SocketAddr;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::directory::{DirectoryStore, RecordCandidate};
use crate::gate;

/// Shared handler state, constructed once at startup and passed in
/// explicitly.
#[derive(Clone)]
pub struct AppState {
    pub store: DirectoryStore,
    /// Base64 x25519 public key advertised so clients can authenticate
    /// the server's transport identity.
    pub server_public_key: String,
    pub freshness_window_secs: i64,
    pub liveness_timeout_secs: i64,
}

/// Error wrapper mapping the domain taxonomy onto HTTP statuses.
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::MalformedKey { .. }
            | Error::MalformedSignature { .. }
            | Error::Encoding(_)
            | Error::Serialization(_) => StatusCode::BAD_REQUEST,
            Error::SignatureInvalid
            | Error::StaleProof { .. }
            | Error::Unauthenticated
            | Error::UnknownIdentity => StatusCode::UNAUTHORIZED,
            Error::RollbackRejected { .. } => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!("request failed: {}", self.0);
        } else {
            warn!(%status, "request rejected: {}", self.0);
        }

        let body = Json(serde_json::json!({ "error": self.0.to_string() }));
        (status, body).into_response()
    }
}

/// Build the API router over `state`.
pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/peers", get(peers_handler))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            gate::require_proof,
        ))
        .with_state(state.clone());

    Router::new()
        .route("/register", post(register_handler))
        .route("/healthz", get(healthz_handler))
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn register_handler(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(req): Json<RegisterRequest>,
) -> Result<Json<RegisterResponse>, ApiError> {
    let now = now_epoch_secs();

    let proof = AuthProof {
        public_key: req.public_key.clone(),
        timestamp: req.timestamp,
        signature: req.signature,
    };
    proof.verify(now, state.freshness_window_secs)?;

    // Identity is the key alone; an address previously seen under another
    // identity is expected churn (NAT, roaming), not an imposter.
    let source_address = addr.to_string();
    if let Some(prior) = state.store.find_by_address(&source_address)? {
        if prior.public_key != req.public_key {
            tracing::debug!(
                address = %source_address,
                prior = %prior.name,
                "address previously seen under a different identity"
            );
        }
    }

    let record = state.store.upsert(&RecordCandidate {
        name: req.name,
        public_key: req.public_key,
        endpoint: req.endpoint,
        source_address,
        last_seen: req.timestamp,
    })?;

    info!(device = %record.name, endpoint = %record.endpoint, "device registered");

    Ok(Json(RegisterResponse {
        server_public_key: state.server_public_key.clone(),
        peers: current_peers(&state, now)?,
    }))
}

async fn peers_handler(State(state): State<AppState>) -> Result<Json<PeersResponse>, ApiError> {
    let peers = current_peers(&state, now_epoch_secs())?;
    Ok(Json(PeersResponse { peers }))
}

async fn healthz_handler() -> &'static str {
    "ok"
}

/// Directory projection with liveness recomputed against `now`, so a query
/// between sweeps still shows a silently-expired record as disconnected.
fn current_peers(state: &AppState, now: i64) -> Result<Vec<PeerInfo>, ApiError> {
    Ok(state
        .store
        .list_all()?
        .iter()
        .map(|r| r.to_peer(now, state.liveness_timeout_secs))
        .collect())
}
