//! HTTP surface for the probe.
//!
//! Business outcomes (including "no stored tokens") answer 200 with a
//! `success` flag; every other failure answers 500 with the error chain.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::auth::{bearer_token, IdentityVerifier};
use crate::connectors::GmailApiConnector;
use crate::db::{CredentialStore, Database, PatternSource};
use crate::error::ProbeError;
use crate::probe::{self, ClassifiedMessage, ItemFailure, ProbeOptions, ProbeReport, ProbeStats};

#[derive(Clone)]
pub struct AppState {
    pub connector: GmailApiConnector,
    pub credentials: Arc<dyn CredentialStore>,
    pub patterns: Arc<dyn PatternSource>,
    pub verifier: Arc<dyn IdentityVerifier>,
    pub options: ProbeOptions,
    /// Where finished runs are recorded; `None` skips recording.
    pub history: Option<Arc<Database>>,
}

impl AppState {
    /// State backed by a single SQLite database for credentials, patterns and
    /// run history.
    pub fn with_database(
        connector: GmailApiConnector,
        db: Arc<Database>,
        verifier: Arc<dyn IdentityVerifier>,
    ) -> Self {
        Self {
            connector,
            credentials: db.clone(),
            patterns: db.clone(),
            verifier,
            options: ProbeOptions::default(),
            history: Some(db),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeEnvelope {
    pub success: bool,
    pub user_id: String,
    pub query: String,
    pub stats: ProbeStats,
    pub newsletters: Vec<ClassifiedMessage>,
    pub messages: Vec<ClassifiedMessage>,
    pub errors: Vec<ItemFailure>,
}

impl ProbeEnvelope {
    fn from_report(user_id: String, report: ProbeReport) -> Self {
        let newsletters = report.newsletters().cloned().collect();
        Self {
            success: true,
            user_id,
            query: report.query,
            stats: report.stats,
            newsletters,
            messages: report.messages,
            errors: report.failures,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReauthEnvelope {
    pub success: bool,
    pub needs_reauth: bool,
    pub message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEnvelope {
    pub success: bool,
    pub error: String,
    pub details: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/test-gmail", get(test_gmail).post(test_gmail))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(addr: SocketAddr, state: AppState) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind http listener on {addr}"))?;
    info!(%addr, "inbox-probe listening");
    axum::serve(listener, router(state))
        .await
        .context("serve http")
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn test_gmail(State(state): State<AppState>, headers: HeaderMap) -> Response {
    match handle_probe(&state, &headers).await {
        Ok(envelope) => (StatusCode::OK, Json(envelope)).into_response(),
        Err(ProbeError::CredentialsMissing { user_id }) => {
            info!(%user_id, "no stored gmail tokens, asking caller to re-authenticate");
            (
                StatusCode::OK,
                Json(ReauthEnvelope {
                    success: false,
                    needs_reauth: true,
                    message: "No Gmail tokens found. Please reconnect your Gmail account."
                        .to_string(),
                }),
            )
                .into_response()
        }
        Err(err) => {
            error!(error = %err.chain(), "gmail probe failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorEnvelope {
                    success: false,
                    error: err.to_string(),
                    details: err.chain(),
                }),
            )
                .into_response()
        }
    }
}

async fn handle_probe(state: &AppState, headers: &HeaderMap) -> Result<ProbeEnvelope, ProbeError> {
    let bearer = bearer_token(headers)?;
    let identity = state.verifier.verify(bearer).await?;
    info!(user_id = %identity.user_id, "running gmail probe");

    let report = probe::probe_stored_user(
        &state.connector,
        state.credentials.as_ref(),
        state.patterns.as_ref(),
        &identity.user_id,
        &state.options,
    )
    .await?;

    if let Some(history) = &state.history {
        if let Err(err) = history.record_probe_run(&identity.user_id, &report.stats) {
            tracing::warn!(error = %err, "could not record probe run");
        }
    }

    Ok(ProbeEnvelope::from_report(identity.user_id, report))
}
