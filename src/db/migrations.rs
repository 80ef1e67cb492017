use anyhow::{anyhow, Context, Result};
use rusqlite::{params, Connection, OptionalExtension};

use crate::db::schema;

const SCHEMA_VERSION_KEY: &str = "schema_version";

type Step = fn(&Connection) -> Result<()>;

/// Ordered schema steps; entry `i` upgrades the database to version `i + 1`.
const STEPS: &[Step] = &[apply_v1];

fn latest_schema_version() -> u32 {
    STEPS.len() as u32
}

pub fn migrate(conn: &Connection) -> Result<()> {
    ensure_sync_state_table(conn)?;

    let current = current_schema_version(conn)?;
    let latest = latest_schema_version();
    if current > latest {
        return Err(anyhow!(
            "database schema version {current} is newer than supported version {latest}"
        ));
    }

    for (index, step) in STEPS.iter().enumerate().skip(current as usize) {
        let version = index as u32 + 1;
        step(conn).with_context(|| format!("apply schema migration v{version}"))?;
        set_schema_version(conn, version)?;
        tracing::debug!(version, "applied schema migration");
    }

    Ok(())
}

fn ensure_sync_state_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS sync_state (
            key TEXT PRIMARY KEY,
            value TEXT,
            updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
        );
        "#,
    )
    .context("ensure sync_state table for migration tracking")?;

    Ok(())
}

fn current_schema_version(conn: &Connection) -> Result<u32> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value FROM sync_state WHERE key = ?1 LIMIT 1",
            params![SCHEMA_VERSION_KEY],
            |row| row.get(0),
        )
        .optional()
        .context("read current schema version from sync_state")?;

    raw.map_or(Ok(0), |version| {
        version
            .parse::<u32>()
            .with_context(|| format!("invalid schema version in database: {version}"))
    })
}

fn set_schema_version(conn: &Connection, version: u32) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO sync_state (key, value, updated_at)
        VALUES (?1, ?2, strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
        ON CONFLICT(key) DO UPDATE SET
            value = excluded.value,
            updated_at = excluded.updated_at
        "#,
        params![SCHEMA_VERSION_KEY, version.to_string()],
    )
    .with_context(|| format!("set schema version to {version}"))?;

    Ok(())
}

fn apply_v1(conn: &Connection) -> Result<()> {
    schema::create_schema(conn)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use anyhow::Result;
    use rusqlite::Connection;
    use uuid::Uuid;

    use super::{current_schema_version, migrate, set_schema_version};

    fn temp_db_path() -> PathBuf {
        std::env::temp_dir().join(format!("inbox-probe-migrations-{}.db", Uuid::new_v4()))
    }

    #[test]
    fn fresh_database_reaches_latest_version() -> Result<()> {
        let db_path = temp_db_path();
        let conn = Connection::open(&db_path)?;

        migrate(&conn)?;
        assert_eq!(current_schema_version(&conn)?, 1);

        let tables: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN ('provider_tokens', 'newsletter_patterns')",
            [],
            |row| row.get(0),
        )?;
        assert_eq!(tables, 2);

        let _ = std::fs::remove_file(db_path);
        Ok(())
    }

    #[test]
    fn rerunning_migrations_keeps_version() -> Result<()> {
        let db_path = temp_db_path();
        let conn = Connection::open(&db_path)?;

        migrate(&conn)?;
        migrate(&conn)?;
        assert_eq!(current_schema_version(&conn)?, 1);

        let _ = std::fs::remove_file(db_path);
        Ok(())
    }

    #[test]
    fn newer_schema_is_rejected() -> Result<()> {
        let db_path = temp_db_path();
        let conn = Connection::open(&db_path)?;

        migrate(&conn)?;
        set_schema_version(&conn, 99)?;
        let error = migrate(&conn).expect_err("newer schema must be rejected");
        assert!(error.to_string().contains("newer than supported"));

        let _ = std::fs::remove_file(db_path);
        Ok(())
    }
}
