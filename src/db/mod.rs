use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;

use self::models::{CuratedPattern, ProviderTokens, SyncState};

#[derive(Debug, Error)]
pub enum DbError {
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error("json serialization: {0}")]
    Json(#[from] serde_json::Error),

    #[error("filesystem: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Config(String),
}

pub mod migrations;
pub mod models;
pub mod schema;

/// Read/update access to the per-user provider credential row.
///
/// Writers do not coordinate: the last `update_access_token` wins.
pub trait CredentialStore: Send + Sync {
    fn load_tokens(&self, user_id: &str) -> Result<Option<ProviderTokens>, DbError>;

    fn update_access_token(
        &self,
        user_id: &str,
        access_token: &str,
        updated_at: DateTime<Utc>,
    ) -> Result<(), DbError>;
}

/// Read-only source of curated sender patterns.
pub trait PatternSource: Send + Sync {
    fn active_patterns(&self) -> Result<Vec<CuratedPattern>, DbError>;
}

pub struct Database {
    conn: Mutex<Connection>,
    path: PathBuf,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self, DbError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        migrations::migrate(&conn)
            .map_err(|e| DbError::Config(format!("migration failed: {e}")))?;

        Ok(Self {
            conn: Mutex::new(conn),
            path: path.to_path_buf(),
        })
    }

    pub fn default_db_path() -> Result<PathBuf, DbError> {
        let home = dirs::home_dir()
            .ok_or_else(|| DbError::Config("failed to determine home directory".to_string()))?;
        Ok(home.join(".inbox-probe").join("inbox-probe.db"))
    }

    pub fn conn(&self) -> Result<MutexGuard<'_, Connection>, DbError> {
        self.conn
            .lock()
            .map_err(|_| DbError::Config("database connection lock poisoned".to_string()))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn upsert_tokens(
        &self,
        user_id: &str,
        access_token: &str,
        refresh_token: &str,
    ) -> Result<(), DbError> {
        self.conn()?.execute(
            r#"
            INSERT INTO provider_tokens (user_id, access_token, refresh_token, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(user_id) DO UPDATE SET
                access_token = excluded.access_token,
                refresh_token = excluded.refresh_token,
                updated_at = excluded.updated_at
            "#,
            params![user_id, access_token, refresh_token, timestamp(Utc::now())],
        )?;
        Ok(())
    }

    pub fn add_pattern(&self, pattern: &str, display_name: Option<&str>) -> Result<i64, DbError> {
        let pattern = pattern.trim();
        if pattern.is_empty() {
            return Err(DbError::Config("pattern must not be empty".to_string()));
        }

        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO newsletter_patterns (pattern, display_name, is_active)
            VALUES (?, ?, true)
            ON CONFLICT(pattern) DO UPDATE SET
                display_name = COALESCE(excluded.display_name, newsletter_patterns.display_name),
                is_active = true
            "#,
            params![pattern, display_name],
        )?;
        let id = conn.query_row(
            "SELECT id FROM newsletter_patterns WHERE pattern = ?",
            [pattern],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    /// Returns false when no row has the given id.
    pub fn set_pattern_active(&self, id: i64, active: bool) -> Result<bool, DbError> {
        let changed = self.conn()?.execute(
            "UPDATE newsletter_patterns SET is_active = ? WHERE id = ?",
            params![active, id],
        )?;
        Ok(changed > 0)
    }

    pub fn list_patterns(&self) -> Result<Vec<CuratedPattern>, DbError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, pattern, display_name, is_active, created_at
            FROM newsletter_patterns
            ORDER BY pattern ASC
            "#,
        )?;
        let patterns = stmt
            .query_map([], CuratedPattern::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(patterns)
    }

    pub fn get_sync_state(&self, key: &str) -> Result<Option<SyncState>, DbError> {
        let conn = self.conn()?;
        let state = conn
            .query_row(
                "SELECT key, value, updated_at FROM sync_state WHERE key = ? LIMIT 1",
                [key],
                SyncState::from_row,
            )
            .optional()?;
        Ok(state)
    }

    pub fn set_sync_state(&self, key: &str, value: &str) -> Result<(), DbError> {
        self.conn()?.execute(
            r#"
            INSERT INTO sync_state (key, value, updated_at)
            VALUES (?, ?, strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
            params![key, value],
        )?;
        Ok(())
    }

    /// Stores the latest probe summary for a user under `last_probe:<user_id>`.
    pub fn record_probe_run<T: serde::Serialize>(
        &self,
        user_id: &str,
        summary: &T,
    ) -> Result<(), DbError> {
        let value = serde_json::to_string(summary)?;
        self.set_sync_state(&last_probe_key(user_id), &value)
    }

    pub fn last_probe_run(&self, user_id: &str) -> Result<Option<serde_json::Value>, DbError> {
        let Some(state) = self.get_sync_state(&last_probe_key(user_id))? else {
            return Ok(None);
        };
        state
            .value
            .map(|raw| serde_json::from_str(&raw))
            .transpose()
            .map_err(DbError::from)
    }
}

impl CredentialStore for Database {
    fn load_tokens(&self, user_id: &str) -> Result<Option<ProviderTokens>, DbError> {
        let conn = self.conn()?;
        let tokens = conn
            .query_row(
                r#"
                SELECT user_id, access_token, refresh_token, updated_at
                FROM provider_tokens
                WHERE user_id = ?
                LIMIT 1
                "#,
                [user_id],
                ProviderTokens::from_row,
            )
            .optional()?;
        Ok(tokens)
    }

    fn update_access_token(
        &self,
        user_id: &str,
        access_token: &str,
        updated_at: DateTime<Utc>,
    ) -> Result<(), DbError> {
        let changed = self.conn()?.execute(
            "UPDATE provider_tokens SET access_token = ?, updated_at = ? WHERE user_id = ?",
            params![access_token, timestamp(updated_at), user_id],
        )?;
        if changed == 0 {
            tracing::warn!(user_id, "refreshed access token for user without a token row");
        }
        Ok(())
    }
}

impl PatternSource for Database {
    fn active_patterns(&self) -> Result<Vec<CuratedPattern>, DbError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, pattern, display_name, is_active, created_at
            FROM newsletter_patterns
            WHERE is_active = true
            ORDER BY id ASC
            "#,
        )?;
        let patterns = stmt
            .query_map([], CuratedPattern::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(patterns)
    }
}

fn last_probe_key(user_id: &str) -> String {
    format!("last_probe:{user_id}")
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}
