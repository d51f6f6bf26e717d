//! Control-plane HTTP client
//!
//! Every protected call carries a fresh signed-timestamp proof; nothing is
//! trusted from a prior request.

use anyhow::{bail, Context, Result};
use meshdir_common::identity::{SIGNATURE_HEADER, TIMESTAMP_HEADER};
use meshdir_common::{
    now_epoch_secs, DeviceKeyPair, PeerInfo, PeersResponse, RegisterRequest, RegisterResponse,
};
use std::time::Duration;

/// Client for the directory server API.
pub struct ControlClient {
    http: reqwest::Client,
    base_url: String,
    keys: DeviceKeyPair,
}

impl ControlClient {
    pub fn new(base_url: impl Into<String>, keys: DeviceKeyPair) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            keys,
        })
    }

    /// Register this device, proving key ownership with a signed current
    /// timestamp.
    pub async fn register(&self, name: &str, endpoint: &str) -> Result<RegisterResponse> {
        let timestamp = now_epoch_secs();
        let request = RegisterRequest {
            name: name.to_string(),
            public_key: self.keys.public_key_base64(),
            endpoint: endpoint.to_string(),
            timestamp,
            signature: self.keys.sign_timestamp(timestamp),
        };

        let response = self
            .http
            .post(format!("{}/register", self.base_url))
            .json(&request)
            .send()
            .await
            .context("registration request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!("registration rejected ({}): {}", status, body);
        }

        response
            .json()
            .await
            .context("invalid registration response")
    }

    /// Fetch the current peer directory with a fresh proof.
    pub async fn fetch_peers(&self) -> Result<Vec<PeerInfo>> {
        let timestamp = now_epoch_secs();
        let response = self
            .http
            .get(format!("{}/peers", self.base_url))
            .bearer_auth(self.keys.public_key_base64())
            .header(TIMESTAMP_HEADER, timestamp.to_string())
            .header(SIGNATURE_HEADER, self.keys.sign_timestamp(timestamp))
            .send()
            .await
            .context("peer list request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!("peer list rejected ({}): {}", status, body);
        }

        let body: PeersResponse = response.json().await.context("invalid peer list response")?;
        Ok(body.peers)
    }

    /// This device's identity key in wire encoding.
    pub fn public_key_base64(&self) -> String {
        self.keys.public_key_base64()
    }
}
