//! Authenticated request gate
//!
//! Every protected route requires a fresh signed proof, not just a bearer
//! key: `Authorization: Bearer <public key>` plus timestamp and signature
//! headers. The proof is verified before the directory lookup, so an
//! unauthenticated caller cannot use error responses to probe which keys
//! are registered. A passing request refreshes the record's `last_seen`.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use meshdir_common::identity::{SIGNATURE_HEADER, TIMESTAMP_HEADER};
use meshdir_common::{now_epoch_secs, AuthProof, DeviceRecord, Error, Result};
use tracing::debug;

use crate::routes::{ApiError, AppState};

/// Request extension carrying the resolved caller identity.
#[derive(Clone)]
pub struct AuthenticatedDevice(pub DeviceRecord);

/// Middleware that rejects requests without a valid, fresh proof of a
/// registered identity.
pub async fn require_proof(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    match authenticate(&state, request.headers()) {
        Ok(device) => {
            request.extensions_mut().insert(AuthenticatedDevice(device));
            next.run(request).await
        }
        Err(err) => ApiError::from(err).into_response(),
    }
}

fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<DeviceRecord> {
    let proof = extract_proof(headers)?;
    let now = now_epoch_secs();
    proof.verify(now, state.freshness_window_secs)?;

    let record = state
        .store
        .find_by_key(&proof.public_key)?
        .ok_or(Error::UnknownIdentity)?;
    let record = state.store.touch(&record.public_key, now)?;

    debug!(device = %record.name, "authenticated request");
    Ok(record)
}

fn extract_proof(headers: &HeaderMap) -> Result<AuthProof> {
    let public_key = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or(Error::Unauthenticated)?;

    let timestamp = headers
        .get(TIMESTAMP_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<i64>().ok())
        .ok_or(Error::Unauthenticated)?;

    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(Error::Unauthenticated)?;

    Ok(AuthProof {
        public_key: public_key.to_string(),
        timestamp,
        signature: signature.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn extract_requires_all_three_headers() {
        let mut headers = HeaderMap::new();
        assert!(matches!(
            extract_proof(&headers).unwrap_err(),
            Error::Unauthenticated
        ));

        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer abc"),
        );
        assert!(extract_proof(&headers).is_err());

        headers.insert(TIMESTAMP_HEADER, HeaderValue::from_static("12345"));
        assert!(extract_proof(&headers).is_err());

        headers.insert(SIGNATURE_HEADER, HeaderValue::from_static("sig=="));
        let proof = extract_proof(&headers).unwrap();
        assert_eq!(proof.public_key, "abc");
        assert_eq!(proof.timestamp, 12345);
    }

    #[test]
    fn non_bearer_authorization_rejected() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Basic dXNlcjpwdw=="),
        );
        headers.insert(TIMESTAMP_HEADER, HeaderValue::from_static("12345"));
        headers.insert(SIGNATURE_HEADER, HeaderValue::from_static("sig=="));
        assert!(matches!(
            extract_proof(&headers).unwrap_err(),
            Error::Unauthenticated
        ));
    }

    #[test]
    fn garbage_timestamp_rejected() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer abc"),
        );
        headers.insert(TIMESTAMP_HEADER, HeaderValue::from_static("not-a-number"));
        headers.insert(SIGNATURE_HEADER, HeaderValue::from_static("sig=="));
        assert!(matches!(
            extract_proof(&headers).unwrap_err(),
            Error::Unauthenticated
        ));
    }
}
