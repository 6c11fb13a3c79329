//! Database schema definitions and forward-only migrations
//!
//! Migrations are applied in order, never skipped or reordered. Each one
//! runs inside its own transaction together with the version bump, so a
//! failure leaves the previous version fully intact and the engine
//! refuses to start rather than run against a half-migrated schema.

use crate::storage::{StoreError, StoreResult};
use rusqlite::Connection;

/// Schema version the code expects after all migrations have run
pub const SCHEMA_VERSION: u32 = 2;

/// Ordered migration scripts; index + 1 is the version they produce
const MIGRATIONS: &[&str] = &[
    // v1: core tables
    r#"
    -- Discovered hosts with cumulative fetch history
    CREATE TABLE hosts (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        host TEXT NOT NULL UNIQUE,
        first_seen TEXT NOT NULL,
        last_seen TEXT NOT NULL,
        fetch_attempts INTEGER NOT NULL DEFAULT 0,
        fetch_successes INTEGER NOT NULL DEFAULT 0,
        trust_score REAL NOT NULL DEFAULT 0.5
    );

    -- Append-only fetch outcomes; a re-fetch inserts a new row
    CREATE TABLE pages (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        address TEXT NOT NULL,
        host_id INTEGER NOT NULL REFERENCES hosts(id),
        status_code INTEGER,
        content_hash TEXT,
        byte_size INTEGER NOT NULL DEFAULT 0,
        fetch_ms INTEGER NOT NULL DEFAULT 0,
        outcome TEXT NOT NULL,
        title TEXT,
        fetched_at TEXT NOT NULL
    );

    CREATE INDEX idx_pages_host ON pages(host_id);
    CREATE INDEX idx_pages_address ON pages(address);

    -- Extracted facts, deduplicated per (page, kind, text)
    CREATE TABLE findings (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        page_id INTEGER NOT NULL REFERENCES pages(id),
        kind TEXT NOT NULL,
        matched_text TEXT NOT NULL,
        byte_offset INTEGER NOT NULL,
        UNIQUE(page_id, kind, matched_text)
    );

    CREATE INDEX idx_findings_page ON findings(page_id);

    -- Every address ever enqueued; rows are never deleted, so this table
    -- is the deduplication source of truth across restarts
    CREATE TABLE frontier (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        address TEXT NOT NULL UNIQUE,
        host TEXT NOT NULL,
        state TEXT NOT NULL,
        retry_count INTEGER NOT NULL DEFAULT 0,
        discovered_at TEXT NOT NULL
    );

    CREATE INDEX idx_frontier_state ON frontier(state);
    "#,
    // v2: dashboard query indexes
    r#"
    CREATE INDEX idx_hosts_trust ON hosts(trust_score);
    CREATE INDEX idx_hosts_first_seen ON hosts(first_seen);
    CREATE INDEX idx_findings_text ON findings(matched_text);
    CREATE INDEX idx_pages_hash ON pages(content_hash);
    "#,
];

/// Applies any missing migrations, bringing the database to
/// [`SCHEMA_VERSION`].
///
/// A database created by a newer build is rejected rather than guessed at.
pub fn run_migrations(conn: &mut Connection) -> StoreResult<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)",
        [],
    )?;

    let installed: u32 = conn
        .query_row("SELECT MAX(version) FROM schema_version", [], |row| {
            row.get::<_, Option<u32>>(0)
        })?
        .unwrap_or(0);

    if installed > SCHEMA_VERSION {
        return Err(StoreError::SchemaTooNew {
            installed,
            supported: SCHEMA_VERSION,
        });
    }

    for (idx, script) in MIGRATIONS.iter().enumerate().skip(installed as usize) {
        let version = (idx + 1) as u32;
        let tx = conn.transaction()?;
        tx.execute_batch(script)
            .and_then(|_| {
                tx.execute("DELETE FROM schema_version", [])?;
                tx.execute(
                    "INSERT INTO schema_version (version) VALUES (?1)",
                    [version],
                )
            })
            .map_err(|source| StoreError::Migration { version, source })?;
        tx.commit()
            .map_err(|source| StoreError::Migration { version, source })?;
        tracing::info!("Applied schema migration v{}", version);
    }

    Ok(())
}

/// Returns the schema version currently installed in the database
pub fn installed_version(conn: &Connection) -> StoreResult<u32> {
    let version: Option<u32> =
        conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| {
            row.get(0)
        })?;
    Ok(version.unwrap_or(0))
}
