//! Versioned schema for the SQLite coder store.

use rusqlite::Connection;

use crate::error::{Result, StoreError};

/// Schema steps; entry `i` upgrades version `i` to `i + 1`.
const MIGRATIONS: &[&str] = &[
    // v1: one opaque coder-state blob per remote peer.
    "CREATE TABLE coder_states (
        peer_id TEXT PRIMARY KEY,
        state BLOB NOT NULL,
        updated_at INTEGER NOT NULL
    );
    CREATE INDEX idx_coder_states_updated ON coder_states(updated_at);",
];

/// Schema version this build writes.
pub const CURRENT_VERSION: u32 = MIGRATIONS.len() as u32;

/// Bring the schema up to [`CURRENT_VERSION`] in one transaction.
///
/// A database written by a newer build is refused rather than touched.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        );",
    )?;

    let found = current_version(conn)?;
    if found > CURRENT_VERSION {
        return Err(StoreError::Migration(format!(
            "schema version {found} is newer than {CURRENT_VERSION}"
        )));
    }
    if found == CURRENT_VERSION {
        return Ok(());
    }

    let tx = conn.transaction()?;
    for (version, sql) in MIGRATIONS
        .iter()
        .enumerate()
        .map(|(i, sql)| (i as u32 + 1, sql))
        .skip(found as usize)
    {
        tx.execute_batch(sql)?;
        tx.execute(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
            rusqlite::params![version, now_millis()],
        )?;
    }
    tx.commit()?;

    tracing::debug!(from = found, to = CURRENT_VERSION, "migrated coder store schema");
    Ok(())
}

/// Highest applied version, 0 for a fresh database.
pub fn current_version(conn: &Connection) -> Result<u32> {
    Ok(conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )?)
}

pub(crate) fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis() as i64)
}
