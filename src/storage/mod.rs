//! Storage module for persisting crawl data
//!
//! This module handles all database operations for the engine, including:
//! - SQLite initialization and forward-only schema migrations
//! - Host, page and finding persistence
//! - Durable frontier state (the deduplication source of truth)
//! - Atomic fetch-cycle commits
//! - Read queries for the external dashboard and the JSON export

mod schema;
mod sqlite;
mod traits;

pub use schema::{installed_version, run_migrations, SCHEMA_VERSION};
pub use sqlite::SqliteStore;
pub use traits::{Store, StoreError, StoreResult};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Outcome of one fetch of one address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PageOutcome {
    Ok,
    Timeout,
    Refused,
    Error,
}

impl PageOutcome {
    pub fn to_db_string(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Timeout => "timeout",
            Self::Refused => "refused",
            Self::Error => "error",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "ok" => Some(Self::Ok),
            "timeout" => Some(Self::Timeout),
            "refused" => Some(Self::Refused),
            "error" => Some(Self::Error),
            _ => None,
        }
    }

    pub fn is_success(self) -> bool {
        matches!(self, Self::Ok)
    }
}

/// Lifecycle state of a frontier entry
///
/// An address transitions `pending -> in_flight -> {done|failed}` and
/// never returns to `pending` once done. A failed fetch below the retry
/// bound goes back to `pending`; past the bound it is terminally `failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrontierState {
    Pending,
    InFlight,
    Done,
    Failed,
}

impl FrontierState {
    pub fn to_db_string(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InFlight => "in_flight",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "in_flight" => Some(Self::InFlight),
            "done" => Some(Self::Done),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Category of an extracted finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingKind {
    Secret,
    CryptoAddress,
    SocialHandle,
    Email,
    LeakedIp,
    TechFingerprint,
}

impl FindingKind {
    pub fn to_db_string(self) -> &'static str {
        match self {
            Self::Secret => "secret",
            Self::CryptoAddress => "crypto_address",
            Self::SocialHandle => "social_handle",
            Self::Email => "email",
            Self::LeakedIp => "leaked_ip",
            Self::TechFingerprint => "tech_fingerprint",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "secret" => Some(Self::Secret),
            "crypto_address" => Some(Self::CryptoAddress),
            "social_handle" => Some(Self::SocialHandle),
            "email" => Some(Self::Email),
            "leaked_ip" => Some(Self::LeakedIp),
            "tech_fingerprint" => Some(Self::TechFingerprint),
            _ => None,
        }
    }
}

/// A discovered host and its cumulative fetch history
#[derive(Debug, Clone)]
pub struct HostRecord {
    pub id: i64,
    pub host: String,
    pub first_seen: String,
    pub last_seen: String,
    pub fetch_attempts: u64,
    pub fetch_successes: u64,
    pub trust_score: f64,
}

/// Durable frontier row
#[derive(Debug, Clone)]
pub struct FrontierRecord {
    pub id: i64,
    pub address: String,
    pub host: String,
    pub state: FrontierState,
    pub retry_count: u32,
    pub discovered_at: String,
}

/// A finding about to be written (no id yet)
#[derive(Debug, Clone)]
pub struct NewFinding {
    pub kind: FindingKind,
    pub matched_text: String,
    pub byte_offset: u64,
}

/// Frontier transition applied as part of a fetch cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrontierTransition {
    /// The address is fully processed and will never be revisited
    Done,
    /// The fetch failed below the retry bound; back to pending
    Retry,
    /// The fetch failed at the retry bound; terminally failed
    Failed,
}

/// Everything one fetch cycle writes, committed as a single atomic unit.
///
/// A partial write (page recorded but findings lost, or a discovered link
/// enqueued without its page) must never be observable.
#[derive(Debug, Clone)]
pub struct FetchCycle {
    pub address: String,
    pub host: String,
    pub outcome: PageOutcome,
    pub status_code: Option<u16>,
    pub content_hash: Option<String>,
    pub byte_size: u64,
    pub fetch_ms: u64,
    pub title: Option<String>,
    pub findings: Vec<NewFinding>,
    /// Newly discovered (address, host) pairs, already normalized
    pub discovered: Vec<(String, String)>,
    pub transition: FrontierTransition,
}

/// Stored aggregates for one host, the sole input to the trust scorer
#[derive(Debug, Clone)]
pub struct HostAggregate {
    pub host: String,
    pub fetch_attempts: u64,
    pub fetch_successes: u64,
    /// Distinct finding kinds ever extracted from this host
    pub finding_kinds: Vec<FindingKind>,
    pub total_findings: u64,
    pub last_seen: DateTime<Utc>,
}

/// One row of the dashboard finding search
#[derive(Debug, Clone)]
pub struct FindingHit {
    pub host: String,
    pub address: String,
    pub kind: FindingKind,
    pub matched_text: String,
    pub fetched_at: String,
}

// ===== Export document =====

/// Root of the JSON export, one document per crawl
#[derive(Debug, Serialize)]
pub struct ExportDocument {
    pub generated_at: String,
    pub hosts: Vec<ExportHost>,
}

#[derive(Debug, Serialize)]
pub struct ExportHost {
    pub host: String,
    pub trust_score: f64,
    pub first_seen: String,
    pub last_seen: String,
    pub fetch_attempts: u64,
    pub fetch_successes: u64,
    pub pages: Vec<ExportPage>,
}

#[derive(Debug, Serialize)]
pub struct ExportPage {
    pub address: String,
    pub outcome: PageOutcome,
    pub status_code: Option<u16>,
    pub content_hash: Option<String>,
    pub byte_size: u64,
    pub fetch_ms: u64,
    pub title: Option<String>,
    pub fetched_at: String,
    pub findings: Vec<ExportFinding>,
}

#[derive(Debug, Serialize)]
pub struct ExportFinding {
    pub kind: FindingKind,
    pub matched_text: String,
    pub byte_offset: u64,
}
