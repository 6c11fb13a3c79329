//! Veilcrawl: a hidden-service intelligence crawler
//!
//! This crate crawls `.onion` sites through a Tor SOCKS proxy, extracts
//! structured findings (secrets, crypto addresses, contact handles, leaked
//! IPs, technology fingerprints) and maintains a trust-ranked map of
//! discovered hosts in SQLite.

pub mod addr;
pub mod analyzer;
pub mod config;
pub mod frontier;
pub mod output;
pub mod storage;
pub mod supervisor;
pub mod transport;
pub mod trust;
pub mod workers;

use thiserror::Error;

/// Main error type for veilcrawl operations
#[derive(Debug, Error)]
pub enum VeilError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Address error: {0}")]
    Addr(#[from] AddrError),

    #[error("Store error: {0}")]
    Store(#[from] storage::StoreError),

    #[error("Proxy unavailable: {0}")]
    ProxyUnavailable(String),

    #[error("Pattern error: {0}")]
    Pattern(#[from] regex::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid seed address '{seed}': {reason}")]
    InvalidSeed { seed: String, reason: String },
}

/// Address-specific errors
#[derive(Debug, Error)]
pub enum AddrError {
    #[error("Failed to parse address: {0}")]
    Parse(String),

    #[error("Invalid scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing host in address")]
    MissingHost,

    #[error("Host is not a hidden-service address: {0}")]
    NotOnion(String),

    #[error("Ignored binary asset: {0}")]
    IgnoredExtension(String),
}

/// Result type alias for veilcrawl operations
pub type Result<T> = std::result::Result<T, VeilError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for address operations
pub type AddrResult<T> = std::result::Result<T, AddrError>;

// Re-export commonly used types
pub use addr::{extract_host, normalize_addr};
pub use analyzer::{Analysis, Analyzer, Finding};
pub use config::Config;
pub use frontier::{Frontier, FrontierEntry};
pub use storage::{FindingKind, FrontierState, PageOutcome, SqliteStore, Store};
pub use supervisor::{CrawlState, Supervisor, SupervisorState};
pub use transport::{FetchOutcome, ProxyTransport, TorTransport};
