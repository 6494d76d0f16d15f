//! Vault initialization and seal lifecycle.
//!
//! These endpoints are unauthenticated, so they are driven through a plain
//! HTTP client rather than the token-bound admin client.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::credentials::RootCredentialBundle;
use super::types::SecretString;
use crate::config::sanitize_url;
use crate::errors::{BootstrapError, Result};

/// Observed lifecycle state of the secrets store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SealState {
    Uninitialized,
    InitializedSealed,
    Unsealed,
}

impl SealState {
    pub fn from_status(initialized: bool, sealed: bool) -> Self {
        match (initialized, sealed) {
            (false, _) => SealState::Uninitialized,
            (true, true) => SealState::InitializedSealed,
            (true, false) => SealState::Unsealed,
        }
    }
}

impl fmt::Display for SealState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SealState::Uninitialized => write!(f, "uninitialized"),
            SealState::InitializedSealed => write!(f, "initialized-sealed"),
            SealState::Unsealed => write!(f, "unsealed"),
        }
    }
}

/// Seal status as reported by `sys/seal-status` and `sys/unseal`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealStatus {
    pub sealed: bool,
    /// Unseal threshold
    pub t: u8,
    /// Number of shares
    pub n: u8,
    /// Shares submitted towards the current unseal attempt
    #[serde(default)]
    pub progress: u8,
}

#[derive(Debug, Deserialize)]
struct InitStatus {
    initialized: bool,
}

#[derive(Debug, Serialize)]
struct InitRequest {
    secret_shares: u8,
    secret_threshold: u8,
}

#[derive(Debug, Deserialize)]
struct InitResponse {
    root_token: SecretString,
    keys: Vec<SecretString>,
    keys_base64: Vec<SecretString>,
}

#[derive(Serialize)]
struct UnsealRequest<'a> {
    key: &'a str,
}

/// Initialization and unseal operations
#[async_trait]
pub trait SealLifecycle: Send + Sync {
    async fn is_initialized(&self) -> Result<bool>;

    async fn seal_status(&self) -> Result<SealStatus>;

    /// Split the master key into `shares` with the given `threshold`.
    ///
    /// The returned bundle is the only copy of the root credentials and is
    /// returned whatever the split the server actually produced.
    async fn initialize(&self, shares: u8, threshold: u8) -> Result<RootCredentialBundle>;

    /// Submit one unseal share and return the resulting status
    async fn submit_unseal_share(&self, share: &SecretString) -> Result<SealStatus>;
}

/// HTTP implementation of [`SealLifecycle`]
#[derive(Debug, Clone)]
pub struct VaultLifecycleClient {
    client: Client,
    base_url: String,
}

impl VaultLifecycleClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BootstrapError::transport(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client, base_url: base_url.trim_end_matches('/').to_string() })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.base_url, path)
    }

    async fn decode<T: DeserializeOwned>(response: Response, operation: &str) -> Result<T> {
        let status = response.status();
        debug!("Response status: {}", status);

        if !status.is_success() {
            let body = response.text().await.unwrap_or_else(|_| "<unable to read error>".to_string());
            tracing::error!(operation = %operation, status = status.as_u16(), "Vault lifecycle call failed");
            return Err(BootstrapError::seal_state(format!(
                "{} failed with status {}: {}",
                operation,
                status.as_u16(),
                body.trim()
            )));
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| BootstrapError::Serialization {
            source: e,
            context: format!("Failed to decode {} response", operation),
        })
    }
}

#[async_trait]
impl SealLifecycle for VaultLifecycleClient {
    async fn is_initialized(&self) -> Result<bool> {
        let url = self.url("sys/init");
        debug!("GET {}", sanitize_url(&url));
        let response = self.client.get(&url).send().await?;
        let status: InitStatus = Self::decode(response, "initialization status").await?;
        Ok(status.initialized)
    }

    async fn seal_status(&self) -> Result<SealStatus> {
        let url = self.url("sys/seal-status");
        debug!("GET {}", sanitize_url(&url));
        let response = self.client.get(&url).send().await?;
        Self::decode(response, "seal status").await
    }

    async fn initialize(&self, shares: u8, threshold: u8) -> Result<RootCredentialBundle> {
        let url = self.url("sys/init");
        debug!("PUT {}", sanitize_url(&url));
        let response = self
            .client
            .put(&url)
            .json(&InitRequest { secret_shares: shares, secret_threshold: threshold })
            .send()
            .await?;
        let init: InitResponse = Self::decode(response, "initialization").await?;

        // Returned as is: the caller persists before judging the split.
        Ok(RootCredentialBundle {
            root_token: init.root_token,
            keys: init.keys,
            keys_base64: init.keys_base64,
        })
    }

    async fn submit_unseal_share(&self, share: &SecretString) -> Result<SealStatus> {
        let url = self.url("sys/unseal");
        debug!("PUT {}", sanitize_url(&url));
        let response = self
            .client
            .put(&url)
            .json(&UnsealRequest { key: share.expose_secret() })
            .send()
            .await?;
        Self::decode(response, "unseal").await
    }
}
