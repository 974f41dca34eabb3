//! Database schema migrations for SQLite.
//!
//! We use a simple versioned migration system. Each migration is a SQL string
//! that transforms the schema from version N to N+1.

use rusqlite::Connection;

use crate::error::{FeedError, Result};

/// Current schema version.
pub const CURRENT_VERSION: u32 = 1;

/// Initialize or migrate the database schema.
///
/// This function is idempotent - it can be called multiple times safely.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let current: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )?;

    if current > CURRENT_VERSION {
        return Err(FeedError::Migration(format!(
            "database schema version {} is newer than supported version {}",
            current, CURRENT_VERSION
        )));
    }

    if current < CURRENT_VERSION {
        let tx = conn.transaction()?;

        for version in (current + 1)..=CURRENT_VERSION {
            apply_migration(&tx, version)?;

            tx.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                rusqlite::params![version, now_millis()],
            )?;
        }

        tx.commit()?;
        tracing::debug!(from = current, to = CURRENT_VERSION, "feed schema migrated");
    }

    Ok(())
}

fn apply_migration(conn: &Connection, version: u32) -> Result<()> {
    match version {
        1 => apply_v1(conn),
        _ => Err(FeedError::Migration(format!(
            "unknown migration version: {}",
            version
        ))),
    }
}

/// Migration v1: feeds namespaced by channel, and their entries.
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- One row per feed opened in a channel
        CREATE TABLE feeds (
            channel_id BLOB NOT NULL,         -- 32 bytes, session identifier
            feed_key BLOB NOT NULL,           -- 32 bytes, Ed25519 public key
            writable INTEGER NOT NULL,        -- 1 if this store owns the feed
            created_at INTEGER NOT NULL,      -- Unix ms
            PRIMARY KEY (channel_id, feed_key)
        );

        -- Feed entries, stored as canonical entry bytes
        CREATE TABLE feed_entries (
            channel_id BLOB NOT NULL,
            feed_key BLOB NOT NULL,
            seq INTEGER NOT NULL,             -- 0-based position in the feed
            data BLOB NOT NULL,
            PRIMARY KEY (channel_id, feed_key, seq)
        );
        "#,
    )?;

    Ok(())
}

fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
