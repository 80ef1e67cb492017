use std::fmt::{Debug, Formatter};

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::config::GmailOAuthConfig;
use crate::connectors::{
    MessageHeader, MessageList, MessageMetadata, MessageProvider, MessageSummary,
};
use crate::db::models::{mask_token, ProviderTokens};
use crate::db::CredentialStore;
use crate::error::ProbeError;

const REDACTED_BODY_MAX_LEN: usize = 200;
const METADATA_HEADERS: &[&str] = &["From", "Subject", "Date"];

/// Shared, per-process half of the Gmail client: HTTP pool, endpoints and the
/// OAuth client identity. Per-request state lives in [`GmailSession`].
#[derive(Debug, Clone)]
pub struct GmailApiConnector {
    client: Client,
    config: GmailOAuthConfig,
}

impl GmailApiConnector {
    pub fn new(config: GmailOAuthConfig) -> Self {
        Self::with_client(Client::new(), config)
    }

    pub fn with_client(client: Client, config: GmailOAuthConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &GmailOAuthConfig {
        &self.config
    }

    /// Binds a request-owned credential to this connector.
    pub fn session<'a>(
        &'a self,
        credential: &'a mut Credential,
        store: &'a dyn CredentialStore,
    ) -> GmailSession<'a> {
        GmailSession {
            connector: self,
            credential,
            store,
        }
    }

    async fn exchange_refresh_token(
        &self,
        refresh_token: &str,
    ) -> Result<OAuthTokenResponse, ProbeError> {
        let response = self
            .client
            .post(&self.config.token_url)
            .form(&[
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .map_err(|e| refresh_failure(0, &e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| refresh_failure(status.as_u16(), &e))?;
        if !status.is_success() {
            return Err(ProbeError::RefreshFailure {
                status: status.as_u16(),
                body: redact_response_body(&body),
            });
        }

        serde_json::from_str(&body).map_err(|e| {
            refresh_failure(
                status.as_u16(),
                &format!("unreadable token response: {e}"),
            )
        })
    }
}

/// The mutable access token and fixed refresh token of one subject, owned by
/// the request that loaded them.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub user_id: String,
    pub access_token: String,
    refresh_token: String,
}

impl Credential {
    pub fn new(
        user_id: impl Into<String>,
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
        }
    }

    pub fn refresh_token(&self) -> &str {
        &self.refresh_token
    }
}

impl From<ProviderTokens> for Credential {
    fn from(tokens: ProviderTokens) -> Self {
        Self::new(tokens.user_id, tokens.access_token, tokens.refresh_token)
    }
}

impl Debug for Credential {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("user_id", &self.user_id)
            .field("access_token", &mask_token(&self.access_token))
            .field("refresh_token", &mask_token(&self.refresh_token))
            .finish()
    }
}

/// Gmail client for one request. Every call carries the current access token;
/// a 401 triggers one refresh, one store write and one retry.
pub struct GmailSession<'a> {
    connector: &'a GmailApiConnector,
    credential: &'a mut Credential,
    store: &'a dyn CredentialStore,
}

impl GmailSession<'_> {
    pub fn credential(&self) -> &Credential {
        self.credential
    }

    async fn get_json<T: DeserializeOwned>(
        &mut self,
        url: &str,
        query: &[(&str, String)],
        context: &'static str,
    ) -> Result<T, ProbeError> {
        let mut response = self.send_get(url, query).await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            info!(
                user_id = %self.credential.user_id,
                "gmail rejected access token, refreshing"
            );
            self.refresh().await?;
            response = self.send_get(url, query).await?;
        }

        let body = read_success(response, url).await?;
        serde_json::from_str(&body).map_err(|e| ProbeError::decode(context, e))
    }

    async fn send_get(&self, url: &str, query: &[(&str, String)]) -> Result<Response, ProbeError> {
        let response = self
            .connector
            .client
            .get(url)
            .query(query)
            .bearer_auth(&self.credential.access_token)
            .header("accept", "application/json")
            .send()
            .await?;
        Ok(response)
    }

    async fn refresh(&mut self) -> Result<(), ProbeError> {
        let token = self
            .connector
            .exchange_refresh_token(self.credential.refresh_token())
            .await
            .inspect_err(|e| {
                warn!(user_id = %self.credential.user_id, error = %e, "gmail token refresh failed");
            })?;

        self.credential.access_token = token.access_token;
        self.store.update_access_token(
            &self.credential.user_id,
            &self.credential.access_token,
            Utc::now(),
        )?;
        debug!(
            user_id = %self.credential.user_id,
            expires_in = token.expires_in,
            "stored refreshed gmail access token"
        );
        Ok(())
    }
}

#[async_trait]
impl MessageProvider for GmailSession<'_> {
    fn name(&self) -> &str {
        "gmail_api"
    }

    async fn list_recent(
        &mut self,
        query: &str,
        max_results: u32,
    ) -> Result<MessageList, ProbeError> {
        let url = format!("{}/users/me/messages", self.connector.config.api_base);
        let params = [
            ("q", query.to_string()),
            ("maxResults", max_results.to_string()),
        ];
        let list: GmailMessageList = self.get_json(&url, &params, "gmail message list").await?;
        Ok(list.into())
    }

    async fn get_message_metadata(&mut self, id: &str) -> Result<MessageMetadata, ProbeError> {
        let url = format!("{}/users/me/messages/{id}", self.connector.config.api_base);
        let mut params = vec![("format", "metadata".to_string())];
        params.extend(
            METADATA_HEADERS
                .iter()
                .map(|header| ("metadataHeaders", (*header).to_string())),
        );
        let message: GmailMessage = self.get_json(&url, &params, "gmail message").await?;
        Ok(message.into())
    }
}

async fn read_success(response: Response, url: &str) -> Result<String, ProbeError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.text().await?);
    }

    let body = response.text().await.unwrap_or_default();
    debug!(
        url,
        status = status.as_u16(),
        body = %redact_response_body(&body),
        "gmail api request failed"
    );
    Err(ProbeError::ApiFailure {
        status: status.as_u16(),
        status_text: status.canonical_reason().unwrap_or_default().to_string(),
    })
}

/// Any failure of the token exchange is a credential failure. `status` is 0
/// when no response arrived.
fn refresh_failure(status: u16, cause: &dyn std::fmt::Display) -> ProbeError {
    ProbeError::RefreshFailure {
        status,
        body: redact_response_body(&cause.to_string()),
    }
}

fn redact_response_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.len() <= REDACTED_BODY_MAX_LEN {
        return trimmed.to_string();
    }

    let mut end = REDACTED_BODY_MAX_LEN;
    while !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    format!(
        "{}…[truncated {} bytes]",
        &trimmed[..end],
        trimmed.len() - end
    )
}

// --- OAuth types ---

#[derive(Debug, Clone, Deserialize)]
struct OAuthTokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

// --- Gmail API response types ---

#[derive(Debug, Clone, Deserialize)]
struct GmailMessageList {
    #[serde(default)]
    messages: Vec<GmailMessageStub>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
    #[serde(rename = "resultSizeEstimate")]
    result_size_estimate: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
struct GmailMessageStub {
    id: String,
    #[serde(rename = "threadId")]
    thread_id: String,
}

#[derive(Debug, Clone, Deserialize)]
struct GmailMessage {
    id: String,
    #[serde(rename = "threadId")]
    thread_id: Option<String>,
    snippet: Option<String>,
    payload: Option<GmailPayload>,
}

#[derive(Debug, Clone, Deserialize)]
struct GmailPayload {
    #[serde(default)]
    headers: Vec<GmailHeader>,
}

#[derive(Debug, Clone, Deserialize)]
struct GmailHeader {
    name: String,
    value: String,
}

impl From<GmailMessageList> for MessageList {
    fn from(list: GmailMessageList) -> Self {
        Self {
            messages: list
                .messages
                .into_iter()
                .map(|stub| MessageSummary {
                    id: stub.id,
                    thread_id: stub.thread_id,
                })
                .collect(),
            next_page_token: list.next_page_token,
            result_size_estimate: list.result_size_estimate,
        }
    }
}

impl From<GmailMessage> for MessageMetadata {
    fn from(message: GmailMessage) -> Self {
        let headers = message
            .payload
            .map(|payload| payload.headers)
            .unwrap_or_default()
            .into_iter()
            .map(|h| MessageHeader {
                name: h.name,
                value: h.value,
            })
            .collect();

        Self {
            id: message.id,
            thread_id: message.thread_id,
            snippet: message.snippet,
            headers,
        }
    }
}
