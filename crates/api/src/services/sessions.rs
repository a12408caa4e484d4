//! Session token verification.
//!
//! Devices and customers authenticate with opaque bearer tokens minted by the
//! platform's session service. This module hides where those tokens are
//! checked behind [`SessionVerifier`]: the `http` mode asks the session
//! service, the `static` mode resolves against digests from configuration
//! (local development and single-tenant installs).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use uuid::Uuid;

use shared::crypto::sha256_hex;

use crate::config::SessionsConfig;

/// A verified device session. The device never names itself in requests;
/// this is the only source of its identity.
#[derive(Debug, Clone, Copy)]
pub struct DeviceSession {
    pub device_id: Uuid,
}

/// A verified customer session.
#[derive(Debug, Clone, Copy)]
pub struct CustomerSession {
    pub customer_id: Uuid,
}

/// Error type for session verification.
///
/// These are infrastructure failures. An unrecognized token is not an error;
/// verifiers report it as `Ok(None)`.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Session service request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Session service returned unexpected status: {0}")]
    UnexpectedStatus(reqwest::StatusCode),
}

/// Resolves bearer tokens to sessions.
#[async_trait]
pub trait SessionVerifier: Send + Sync {
    async fn verify_device(&self, token: &str) -> Result<Option<DeviceSession>, SessionError>;
    async fn verify_customer(&self, token: &str) -> Result<Option<CustomerSession>, SessionError>;
}

/// Builds the verifier named by the `[sessions]` config section.
pub fn build_verifier(config: &SessionsConfig) -> Result<Arc<dyn SessionVerifier>, SessionError> {
    match config.mode.as_str() {
        "http" => Ok(Arc::new(HttpSessionVerifier::new(config)?)),
        _ => Ok(Arc::new(StaticSessionVerifier::from_config(config))),
    }
}

// ============================================================================
// HTTP verifier
// ============================================================================

/// Verifies tokens against the platform session service.
pub struct HttpSessionVerifier {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct DeviceSessionBody {
    device_id: Uuid,
}

#[derive(Debug, Deserialize)]
struct CustomerSessionBody {
    customer_id: Uuid,
}

impl HttpSessionVerifier {
    pub fn new(config: &SessionsConfig) -> Result<Self, SessionError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
        })
    }

    async fn fetch(&self, path: &str, token: &str) -> Result<Option<reqwest::Response>, SessionError> {
        let response = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .bearer_auth(token)
            .send()
            .await?;

        match response.status() {
            reqwest::StatusCode::OK => Ok(Some(response)),
            // The session service answers 401/404 for unknown or expired
            // tokens depending on the endpoint; both mean "no session".
            reqwest::StatusCode::UNAUTHORIZED | reqwest::StatusCode::NOT_FOUND => Ok(None),
            status => Err(SessionError::UnexpectedStatus(status)),
        }
    }
}

#[async_trait]
impl SessionVerifier for HttpSessionVerifier {
    async fn verify_device(&self, token: &str) -> Result<Option<DeviceSession>, SessionError> {
        match self.fetch("/v1/sessions/device", token).await? {
            Some(response) => {
                let body: DeviceSessionBody = response.json().await?;
                Ok(Some(DeviceSession {
                    device_id: body.device_id,
                }))
            }
            None => Ok(None),
        }
    }

    async fn verify_customer(&self, token: &str) -> Result<Option<CustomerSession>, SessionError> {
        match self.fetch("/v1/sessions/customer", token).await? {
            Some(response) => {
                let body: CustomerSessionBody = response.json().await?;
                Ok(Some(CustomerSession {
                    customer_id: body.customer_id,
                }))
            }
            None => Ok(None),
        }
    }
}

// ============================================================================
// Static verifier
// ============================================================================

/// Verifies tokens against SHA-256 digests from configuration.
pub struct StaticSessionVerifier {
    devices: HashMap<String, Uuid>,
    customers: HashMap<String, Uuid>,
}

impl StaticSessionVerifier {
    pub fn from_config(config: &SessionsConfig) -> Self {
        Self {
            devices: config
                .device_tokens
                .iter()
                .map(|entry| (entry.token_sha256.to_lowercase(), entry.device_id))
                .collect(),
            customers: config
                .customer_tokens
                .iter()
                .map(|entry| (entry.token_sha256.to_lowercase(), entry.customer_id))
                .collect(),
        }
    }

    /// Builds a verifier from plaintext tokens, hashing them on the way in.
    /// Used by tests and local tooling.
    pub fn from_plain_tokens(devices: &[(&str, Uuid)], customers: &[(&str, Uuid)]) -> Self {
        Self {
            devices: devices
                .iter()
                .map(|(token, id)| (sha256_hex(token), *id))
                .collect(),
            customers: customers
                .iter()
                .map(|(token, id)| (sha256_hex(token), *id))
                .collect(),
        }
    }
}

#[async_trait]
impl SessionVerifier for StaticSessionVerifier {
    async fn verify_device(&self, token: &str) -> Result<Option<DeviceSession>, SessionError> {
        Ok(self
            .devices
            .get(&sha256_hex(token))
            .map(|&device_id| DeviceSession { device_id }))
    }

    async fn verify_customer(&self, token: &str) -> Result<Option<CustomerSession>, SessionError> {
        Ok(self
            .customers
            .get(&sha256_hex(token))
            .map(|&customer_id| CustomerSession { customer_id }))
    }
}
