use async_trait::async_trait;
use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::AuthConfig;
use crate::error::ProbeError;

/// The verified subject behind an inbound request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    #[serde(rename = "id")]
    pub user_id: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, bearer: &str) -> Result<Identity, ProbeError>;
}

/// Verifies bearer tokens against a "current user" endpoint that answers
/// `{"id": ..., "email": ...}` for a valid token.
#[derive(Debug, Clone)]
pub struct HttpIdentityVerifier {
    client: Client,
    config: AuthConfig,
}

impl HttpIdentityVerifier {
    pub fn new(config: AuthConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }
}

#[async_trait]
impl IdentityVerifier for HttpIdentityVerifier {
    async fn verify(&self, bearer: &str) -> Result<Identity, ProbeError> {
        let mut request = self
            .client
            .get(&self.config.user_url)
            .bearer_auth(bearer)
            .header("accept", "application/json");
        if let Some(api_key) = &self.config.api_key {
            request = request.header("apikey", api_key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            debug!(status = status.as_u16(), "identity endpoint rejected bearer token");
            return Err(ProbeError::AuthFailure(format!(
                "identity endpoint returned {status}"
            )));
        }

        let body = response.text().await?;
        let identity: Identity = serde_json::from_str(&body)
            .map_err(|e| ProbeError::AuthFailure(format!("unreadable identity response: {e}")))?;
        if identity.user_id.trim().is_empty() {
            return Err(ProbeError::AuthFailure("identity has no user id".to_string()));
        }
        Ok(identity)
    }
}

/// Extracts the token from `Authorization: Bearer <token>`.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, ProbeError> {
    let value = headers
        .get(AUTHORIZATION)
        .ok_or_else(|| ProbeError::AuthFailure("missing authorization header".to_string()))?
        .to_str()
        .map_err(|_| ProbeError::AuthFailure("authorization header is not ASCII".to_string()))?;

    let (scheme, token) = value
        .trim()
        .split_once(' ')
        .ok_or_else(|| ProbeError::AuthFailure("malformed authorization header".to_string()))?;
    let token = token.trim();
    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        return Err(ProbeError::AuthFailure(
            "authorization header is not a bearer token".to_string(),
        ));
    }
    Ok(token)
}
