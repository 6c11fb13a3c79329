use serde::Deserialize;

/// Main configuration structure for veilcrawl
///
/// Built once at startup from the optional TOML file plus CLI overrides,
/// then treated as an immutable snapshot for the whole run.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub proxy: ProxyConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub web: WebConfig,
    /// Seed addresses injected into the frontier at startup
    #[serde(default)]
    pub seeds: Vec<String>,
}

/// Crawl behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Number of concurrent workers
    #[serde(default = "defaults::workers")]
    pub workers: u32,

    /// Per-request timeout in seconds
    #[serde(rename = "request-timeout-secs", default = "defaults::request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Maximum number of pages fetched in one run
    #[serde(rename = "page-budget", default = "defaults::page_budget")]
    pub page_budget: u64,

    /// Minimum spacing between two requests to the same host (milliseconds)
    #[serde(rename = "courtesy-interval-ms", default = "defaults::courtesy_interval_ms")]
    pub courtesy_interval_ms: u64,

    /// How many times a failed address is re-queued before becoming
    /// terminally failed
    #[serde(rename = "retry-bound", default = "defaults::retry_bound")]
    pub retry_bound: u32,
}

/// Tor proxy configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ProxyConfig {
    /// SOCKS5 port of the local Tor daemon
    #[serde(rename = "socks-port", default = "defaults::socks_port")]
    pub socks_port: u16,

    /// Fallback SOCKS5 port (Tor Browser bundles listen on 9150)
    #[serde(rename = "fallback-port", default = "defaults::fallback_port")]
    pub fallback_port: u16,

    /// Whether to probe the proxy before starting workers
    #[serde(default = "defaults::probe")]
    pub probe: bool,
}

/// Output locations
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path", default = "defaults::database_path")]
    pub database_path: String,

    /// Path of the JSON export document
    #[serde(rename = "export-path", default = "defaults::export_path")]
    pub export_path: String,
}

/// Dashboard web layer configuration (the HTML layer itself is external;
/// the engine only carries the snapshot)
#[derive(Debug, Clone, Deserialize)]
pub struct WebConfig {
    #[serde(default = "defaults::web_port")]
    pub port: u16,

    #[serde(default = "defaults::web_enabled")]
    pub enabled: bool,
}

mod defaults {
    pub fn workers() -> u32 {
        15
    }
    pub fn request_timeout_secs() -> u64 {
        90
    }
    pub fn page_budget() -> u64 {
        50_000
    }
    pub fn courtesy_interval_ms() -> u64 {
        1000
    }
    pub fn retry_bound() -> u32 {
        2
    }
    pub fn socks_port() -> u16 {
        9050
    }
    pub fn fallback_port() -> u16 {
        9150
    }
    pub fn probe() -> bool {
        true
    }
    pub fn database_path() -> String {
        "./veilcrawl.db".to_string()
    }
    pub fn export_path() -> String {
        "./veilcrawl_report.json".to_string()
    }
    pub fn web_port() -> u16 {
        4587
    }
    pub fn web_enabled() -> bool {
        true
    }
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            workers: defaults::workers(),
            request_timeout_secs: defaults::request_timeout_secs(),
            page_budget: defaults::page_budget(),
            courtesy_interval_ms: defaults::courtesy_interval_ms(),
            retry_bound: defaults::retry_bound(),
        }
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            socks_port: defaults::socks_port(),
            fallback_port: defaults::fallback_port(),
            probe: defaults::probe(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            database_path: defaults::database_path(),
            export_path: defaults::export_path(),
        }
    }
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            port: defaults::web_port(),
            enabled: defaults::web_enabled(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            crawler: CrawlerConfig::default(),
            proxy: ProxyConfig::default(),
            output: OutputConfig::default(),
            web: WebConfig::default(),
            seeds: Vec::new(),
        }
    }
}
