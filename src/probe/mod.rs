//! One probe run: list recent messages, fetch sender metadata one message at a
//! time, classify each sender and fold the outcome into a [`ProbeReport`].

use std::sync::LazyLock;

use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use serde::Serialize;
use tracing::{info, warn};

use crate::connectors::{
    Credential, GmailApiConnector, MessageMetadata, MessageProvider, DEFAULT_MAX_RESULTS,
};
use crate::db::{CredentialStore, PatternSource};
use crate::error::ProbeError;
use crate::matcher::PatternSet;

/// Upper bound on detail fetches per run, whatever the listing returned.
pub const MAX_PROCESSED: usize = 10;
pub const RECENCY_WINDOW_HOURS: i64 = 24;

static ANGLE_ADDRESS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<\s*([^<>\s]+@[^<>\s]+)\s*>").expect("compile angle address regex")
});
static BARE_ADDRESS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([^\s<>]+@[^\s<>]+)").expect("compile bare address regex"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeOptions {
    pub max_results: u32,
    pub max_processed: usize,
    pub window: Duration,
}

impl Default for ProbeOptions {
    fn default() -> Self {
        Self {
            max_results: DEFAULT_MAX_RESULTS,
            max_processed: MAX_PROCESSED,
            window: Duration::hours(RECENCY_WINDOW_HOURS),
        }
    }
}

impl ProbeOptions {
    pub fn with_max_results(mut self, max_results: u32) -> Self {
        self.max_results = max_results.max(1);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifiedMessage {
    pub id: String,
    pub thread_id: Option<String>,
    pub from: String,
    pub email: String,
    pub subject: String,
    pub date: String,
    pub is_newsletter: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_pattern: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemFailure {
    pub message_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeStats {
    pub total_found: usize,
    pub processed: usize,
    pub newsletters_found: usize,
    pub failed: usize,
    pub patterns_checked: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeReport {
    pub provider: String,
    pub query: String,
    pub ran_at: DateTime<Utc>,
    pub stats: ProbeStats,
    pub messages: Vec<ClassifiedMessage>,
    pub failures: Vec<ItemFailure>,
}

impl ProbeReport {
    pub fn newsletters(&self) -> impl Iterator<Item = &ClassifiedMessage> {
        self.messages.iter().filter(|m| m.is_newsletter)
    }
}

/// `after:<epoch seconds>` for the window ending at `now`.
pub fn recent_query(now: DateTime<Utc>, window: Duration) -> String {
    format!("after:{}", (now - window).timestamp())
}

const WRAPPING_PUNCTUATION: &[char] = &['(', ')', '"', '\'', ',', ';'];

/// Pulls the address out of a raw `From` value: `Name <addr>` first, then the
/// first whitespace-free token containing `@`, minus wrapping punctuation.
pub fn extract_sender_address(raw: &str) -> Option<String> {
    let angle = ANGLE_ADDRESS
        .captures(raw)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str());
    let address = angle.or_else(|| {
        BARE_ADDRESS
            .captures(raw)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().trim_matches(WRAPPING_PUNCTUATION))
    })?;

    match address.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => {
            Some(address.to_string())
        }
        _ => None,
    }
}

pub fn classify_message(
    metadata: &MessageMetadata,
    patterns: &PatternSet,
) -> Result<ClassifiedMessage, ProbeError> {
    let from = metadata
        .header("From")
        .ok_or_else(|| ProbeError::MissingHeader {
            message_id: metadata.id.clone(),
            header: "From",
        })?;
    let email = extract_sender_address(from).ok_or_else(|| ProbeError::SenderNotFound {
        raw: from.to_string(),
    })?;
    let hit = patterns.first_match(&email);

    Ok(ClassifiedMessage {
        id: metadata.id.clone(),
        thread_id: metadata.thread_id.clone(),
        from: from.to_string(),
        subject: metadata.header("Subject").unwrap_or_default().to_string(),
        date: metadata.header("Date").unwrap_or_default().to_string(),
        is_newsletter: hit.is_some(),
        matched_pattern: hit.map(|p| p.raw.clone()),
        platform: hit.and_then(|p| p.display_name.clone()),
        email,
    })
}

/// Runs one probe against `provider`. A failing listing call aborts the run;
/// message-level failures are logged, recorded and skipped.
pub async fn run_probe<P: MessageProvider + ?Sized>(
    provider: &mut P,
    patterns: &PatternSet,
    options: &ProbeOptions,
    now: DateTime<Utc>,
) -> Result<ProbeReport, ProbeError> {
    let query = recent_query(now, options.window);
    let listing = provider.list_recent(&query, options.max_results).await?;

    let mut report = ProbeReport {
        provider: provider.name().to_string(),
        query,
        ran_at: now,
        stats: ProbeStats {
            total_found: listing.messages.len(),
            patterns_checked: patterns.len(),
            ..ProbeStats::default()
        },
        messages: Vec::new(),
        failures: Vec::new(),
    };

    for summary in listing.messages.iter().take(options.max_processed) {
        let outcome = match provider.get_message_metadata(&summary.id).await {
            Ok(metadata) => classify_message(&metadata, patterns),
            Err(error) => Err(error),
        };

        match outcome {
            Ok(classified) => {
                report.stats.processed += 1;
                if classified.is_newsletter {
                    report.stats.newsletters_found += 1;
                }
                report.messages.push(classified);
            }
            Err(error) if error.is_item_scoped() => {
                warn!(message_id = %summary.id, error = %error, "skipping message");
                report.stats.failed += 1;
                report.failures.push(ItemFailure {
                    message_id: summary.id.clone(),
                    reason: error.to_string(),
                });
            }
            Err(error) => return Err(error),
        }
    }

    info!(
        provider = %report.provider,
        total_found = report.stats.total_found,
        processed = report.stats.processed,
        newsletters = report.stats.newsletters_found,
        failed = report.stats.failed,
        "probe finished"
    );
    Ok(report)
}

/// Loads the stored credential for `user_id`, merges curated patterns with the
/// built-in list and runs the probe through a Gmail session.
pub async fn probe_stored_user(
    connector: &GmailApiConnector,
    store: &dyn CredentialStore,
    pattern_source: &dyn PatternSource,
    user_id: &str,
    options: &ProbeOptions,
) -> Result<ProbeReport, ProbeError> {
    let tokens = store
        .load_tokens(user_id)?
        .filter(|tokens| tokens.is_usable())
        .ok_or_else(|| ProbeError::CredentialsMissing {
            user_id: user_id.to_string(),
        })?;

    let patterns = PatternSet::with_curated(&pattern_source.active_patterns()?);
    let mut credential = Credential::from(tokens);
    let mut session = connector.session(&mut credential, store);
    run_probe(&mut session, &patterns, options, Utc::now()).await
}
