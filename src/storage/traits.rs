//! Store trait and error types

use crate::storage::{
    FetchCycle, FindingHit, FrontierRecord, FrontierState, HostAggregate, HostRecord,
};
use std::collections::HashMap;
use thiserror::Error;

/// Errors that can occur during store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Migration to schema v{version} failed: {source}")]
    Migration {
        version: u32,
        source: rusqlite::Error,
    },

    #[error("Database schema v{installed} is newer than supported v{supported}")]
    SchemaTooNew { installed: u32, supported: u32 },

    #[error("Host not found: {0}")]
    HostNotFound(String),

    #[error("Unknown frontier address: {0}")]
    UnknownAddress(String),

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Trait for the persistent crawl repository
///
/// Implementations own the durable Host/Page/Finding/Frontier records.
/// All writes belonging to one fetch cycle go through
/// [`Store::record_fetch_cycle`] and commit atomically.
pub trait Store {
    // ===== Frontier / dedup =====

    /// Returns whether an address has ever been enqueued, in any state.
    /// This is the dedup check that survives process restarts.
    fn has_seen_address(&self, address: &str) -> StoreResult<bool>;

    /// Inserts a pending frontier row if the address has never been seen.
    /// Returns whether it was newly inserted.
    fn enqueue_address(&mut self, address: &str, host: &str) -> StoreResult<bool>;

    /// Marks an address as in_flight (one worker owns it until completion)
    fn mark_in_flight(&mut self, address: &str) -> StoreResult<()>;

    /// Loads the full frontier for resume. Any `in_flight` rows left by a
    /// crash are reset to `pending` first.
    fn load_frontier_snapshot(&mut self) -> StoreResult<Vec<FrontierRecord>>;

    // ===== Fetch cycle =====

    /// Applies one complete fetch cycle (page, findings, host counters,
    /// frontier transition, newly discovered links) as a single
    /// transaction. Returns the addresses that were newly enqueued.
    fn record_fetch_cycle(&mut self, cycle: &FetchCycle) -> StoreResult<Vec<String>>;

    // ===== Trust =====

    /// Loads the stored aggregates the trust scorer operates on
    fn host_aggregate(&self, host: &str) -> StoreResult<Option<HostAggregate>>;

    /// Persists a recomputed trust score for a host
    fn update_trust_score(&mut self, host: &str, score: f64) -> StoreResult<()>;

    // ===== Dashboard reads =====

    /// Hosts ordered by trust score, best first
    fn hosts_by_trust(&self, limit: u32) -> StoreResult<Vec<HostRecord>>;

    /// Full-text search over finding text and page content hashes
    fn search_findings(&self, query: &str, limit: u32) -> StoreResult<Vec<FindingHit>>;

    /// Time-ordered discovery feed (oldest hosts first)
    fn discovery_feed(&self, limit: u32) -> StoreResult<Vec<HostRecord>>;

    // ===== Counters =====

    fn count_hosts(&self) -> StoreResult<u64>;
    fn count_pages(&self) -> StoreResult<u64>;
    fn count_findings(&self) -> StoreResult<u64>;
    fn frontier_counts(&self) -> StoreResult<HashMap<FrontierState, u64>>;
}
