//! Local stand-ins for the Gmail API and the Google token endpoint.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::{Path, Query, RawQuery, State};
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use chrono::{DateTime, Utc};
use serde_json::json;

use inbox_probe::config::GmailOAuthConfig;
use inbox_probe::db::models::ProviderTokens;
use inbox_probe::db::{CredentialStore, DbError};

pub const FRESH_TOKEN: &str = "fresh-token";
pub const STALE_TOKEN: &str = "stale-token";
pub const REFRESH_TOKEN: &str = "1//refresh-token";

pub const SENDERS: &[(&str, &str)] = &[
    ("m0", "Weekly Digest <weekly@substack.com>"),
    ("m1", "Friend <friend@example.com>"),
    ("m2", "Example News <digest@news.example.org>"),
    ("m3", "alerts@mail.beehiiv.com"),
];

#[derive(Debug, Clone)]
pub struct FakeGoogleConfig {
    pub token_status: StatusCode,
    pub omit_access_token: bool,
    pub always_unauthorized: bool,
    pub reject_details: bool,
    pub failing_listing: Option<StatusCode>,
    pub failing_message: Option<&'static str>,
}

impl Default for FakeGoogleConfig {
    fn default() -> Self {
        Self {
            token_status: StatusCode::OK,
            omit_access_token: false,
            always_unauthorized: false,
            reject_details: false,
            failing_listing: None,
            failing_message: None,
        }
    }
}

#[derive(Default)]
pub struct FakeGoogleState {
    config: Mutex<Option<FakeGoogleConfig>>,
    list_calls: AtomicUsize,
    detail_calls: AtomicUsize,
    token_calls: AtomicUsize,
    last_token_form: Mutex<HashMap<String, String>>,
    last_list_query: Mutex<HashMap<String, String>>,
    last_detail_query: Mutex<String>,
}

impl FakeGoogleState {
    fn config(&self) -> FakeGoogleConfig {
        self.config
            .lock()
            .expect("config lock")
            .clone()
            .unwrap_or_default()
    }
}

pub struct FakeGoogle {
    pub base_url: String,
    pub state: Arc<FakeGoogleState>,
}

impl FakeGoogle {
    pub async fn start(config: FakeGoogleConfig) -> Self {
        let state = Arc::new(FakeGoogleState::default());
        *state.config.lock().expect("config lock") = Some(config);

        let app = Router::new()
            .route("/gmail/v1/users/me/messages", get(list_messages))
            .route("/gmail/v1/users/me/messages/:id", get(get_message))
            .route("/token", post(exchange_token))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind fake google");
        let addr = listener.local_addr().expect("fake google addr");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("serve fake google");
        });

        Self {
            base_url: format!("http://{addr}"),
            state,
        }
    }

    pub fn oauth_config(&self) -> GmailOAuthConfig {
        GmailOAuthConfig::new("client-id", "client-secret").with_endpoints(
            format!("{}/gmail/v1", self.base_url),
            format!("{}/token", self.base_url),
        )
    }

    pub fn list_calls(&self) -> usize {
        self.state.list_calls.load(Ordering::SeqCst)
    }

    pub fn detail_calls(&self) -> usize {
        self.state.detail_calls.load(Ordering::SeqCst)
    }

    pub fn token_calls(&self) -> usize {
        self.state.token_calls.load(Ordering::SeqCst)
    }

    pub fn last_token_form(&self) -> HashMap<String, String> {
        self.state.last_token_form.lock().expect("form lock").clone()
    }

    pub fn last_list_query(&self) -> HashMap<String, String> {
        self.state.last_list_query.lock().expect("query lock").clone()
    }

    pub fn last_detail_query(&self) -> String {
        self.state
            .last_detail_query
            .lock()
            .expect("query lock")
            .clone()
    }
}

fn authorized(state: &FakeGoogleState, headers: &HeaderMap) -> bool {
    if state.config().always_unauthorized {
        return false;
    }
    let expected = format!("Bearer {FRESH_TOKEN}");
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        == Some(expected.as_str())
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "error": { "code": 401, "message": "Invalid Credentials" } })),
    )
        .into_response()
}

async fn list_messages(
    State(state): State<Arc<FakeGoogleState>>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    state.list_calls.fetch_add(1, Ordering::SeqCst);
    *state.last_list_query.lock().expect("query lock") = query.clone();
    if !authorized(&state, &headers) {
        return unauthorized();
    }
    if let Some(status) = state.config().failing_listing {
        return (
            status,
            Json(json!({ "error": { "code": status.as_u16(), "message": "Backend Error" } })),
        )
            .into_response();
    }

    let max_results = query
        .get("maxResults")
        .and_then(|value| value.parse::<usize>().ok())
        .unwrap_or(100);
    let messages: Vec<_> = SENDERS
        .iter()
        .take(max_results)
        .map(|(id, _)| json!({ "id": id, "threadId": format!("thread-{id}") }))
        .collect();
    Json(json!({ "messages": messages, "resultSizeEstimate": messages.len() })).into_response()
}

async fn get_message(
    State(state): State<Arc<FakeGoogleState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    RawQuery(raw_query): RawQuery,
) -> Response {
    state.detail_calls.fetch_add(1, Ordering::SeqCst);
    *state.last_detail_query.lock().expect("query lock") = raw_query.unwrap_or_default();
    if state.config().reject_details || !authorized(&state, &headers) {
        return unauthorized();
    }
    if state.config().failing_message == Some(id.as_str()) {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": { "code": 500, "message": "Backend Error" } })),
        )
            .into_response();
    }

    let Some((_, from)) = SENDERS.iter().find(|(sender_id, _)| *sender_id == id) else {
        return (StatusCode::NOT_FOUND, Json(json!({ "error": "not found" }))).into_response();
    };
    Json(json!({
        "id": id,
        "threadId": format!("thread-{id}"),
        "payload": {
            "headers": [
                { "name": "From", "value": from },
                { "name": "Subject", "value": format!("Subject for {id}") },
                { "name": "Date", "value": "Mon, 2 Mar 2026 09:00:00 +0000" }
            ]
        }
    }))
    .into_response()
}

async fn exchange_token(
    State(state): State<Arc<FakeGoogleState>>,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    state.token_calls.fetch_add(1, Ordering::SeqCst);
    *state.last_token_form.lock().expect("form lock") = form;

    let config = state.config();
    let status = config.token_status;
    if !status.is_success() {
        return (
            status,
            Json(json!({ "error": "invalid_grant", "error_description": "Token has been expired or revoked." })),
        )
            .into_response();
    }
    if config.omit_access_token {
        return Json(json!({ "token_type": "Bearer", "expires_in": 3599 })).into_response();
    }
    Json(json!({
        "access_token": FRESH_TOKEN,
        "expires_in": 3599,
        "token_type": "Bearer",
        "scope": "https://www.googleapis.com/auth/gmail.readonly"
    }))
    .into_response()
}

/// Credential store that records every access-token write.
#[derive(Default)]
pub struct RecordingStore {
    pub tokens: Mutex<Option<ProviderTokens>>,
    pub writes: Mutex<Vec<(String, String)>>,
}

impl RecordingStore {
    pub fn with_tokens(user_id: &str, access_token: &str) -> Self {
        Self {
            tokens: Mutex::new(Some(ProviderTokens {
                user_id: user_id.to_string(),
                access_token: access_token.to_string(),
                refresh_token: REFRESH_TOKEN.to_string(),
                updated_at: None,
            })),
            writes: Mutex::new(Vec::new()),
        }
    }

    pub fn writes(&self) -> Vec<(String, String)> {
        self.writes.lock().expect("writes lock").clone()
    }
}

impl CredentialStore for RecordingStore {
    fn load_tokens(&self, user_id: &str) -> Result<Option<ProviderTokens>, DbError> {
        Ok(self
            .tokens
            .lock()
            .expect("tokens lock")
            .clone()
            .filter(|tokens| tokens.user_id == user_id))
    }

    fn update_access_token(
        &self,
        user_id: &str,
        access_token: &str,
        _updated_at: DateTime<Utc>,
    ) -> Result<(), DbError> {
        self.writes
            .lock()
            .expect("writes lock")
            .push((user_id.to_string(), access_token.to_string()));
        Ok(())
    }
}
