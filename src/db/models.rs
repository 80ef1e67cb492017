use std::fmt::{Debug, Formatter};

use rusqlite::{Result as SqlResult, Row};
use serde::{Deserialize, Serialize};

/// Stored Gmail OAuth credentials for one subject.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProviderTokens {
    pub user_id: String,
    pub access_token: String,
    pub refresh_token: String,
    pub updated_at: Option<String>,
}

impl Debug for ProviderTokens {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderTokens")
            .field("user_id", &self.user_id)
            .field("access_token", &mask_token(&self.access_token))
            .field("refresh_token", &mask_token(&self.refresh_token))
            .field("updated_at", &self.updated_at)
            .finish()
    }
}

/// A curated row of the `newsletter_patterns` table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CuratedPattern {
    pub id: i64,
    pub pattern: String,
    pub display_name: Option<String>,
    pub is_active: bool,
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncState {
    pub key: String,
    pub value: Option<String>,
    pub updated_at: Option<String>,
}

/// Keeps the first and last four characters of a secret.
pub fn mask_token(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}…{tail}")
}

impl ProviderTokens {
    pub fn from_row(row: &Row<'_>) -> SqlResult<Self> {
        Ok(Self {
            user_id: row.get("user_id")?,
            access_token: row.get("access_token")?,
            refresh_token: row.get("refresh_token")?,
            updated_at: row.get("updated_at")?,
        })
    }

    /// Both tokens present and non-blank.
    pub fn is_usable(&self) -> bool {
        !self.access_token.trim().is_empty() && !self.refresh_token.trim().is_empty()
    }
}

impl CuratedPattern {
    pub fn from_row(row: &Row<'_>) -> SqlResult<Self> {
        Ok(Self {
            id: row.get("id")?,
            pattern: row.get("pattern")?,
            display_name: row.get("display_name")?,
            is_active: row.get("is_active")?,
            created_at: row.get("created_at")?,
        })
    }
}

impl SyncState {
    pub fn from_row(row: &Row<'_>) -> SqlResult<Self> {
        Ok(Self {
            key: row.get("key")?,
            value: row.get("value")?,
            updated_at: row.get("updated_at")?,
        })
    }
}
