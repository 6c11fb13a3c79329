//! Proxy transport layer
//!
//! All crawl traffic leaves through a SOCKS5 proxy; the engine never
//! touches the network directly. The transport is a trait so the worker
//! pool can be driven by a scripted implementation in tests.

use crate::config::ProxyConfig;
use async_trait::async_trait;
use rand::seq::SliceRandom;
use reqwest::{redirect::Policy, Client, Proxy};
use std::time::{Duration, Instant};

/// Browser user agents rotated per request so the crawler does not
/// present one stable fingerprint
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; rv:109.0) Gecko/20100101 Firefox/115.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:109.0) Gecko/20100101 Firefox/115.0",
    "Mozilla/5.0 (X11; Linux x86_64; rv:109.0) Gecko/20100101 Firefox/115.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:109.0) Gecko/20100101 Firefox/115.0",
];

/// A successfully transported response, regardless of HTTP status
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub status: u16,
    pub content_type: Option<String>,
    /// All response headers, in arrival order
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub elapsed: Duration,
}

/// Classified result of one fetch attempt
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    /// The proxy returned a response (any status code)
    Fetched(FetchedPage),
    /// The request exceeded the configured timeout
    Timeout,
    /// The connection was refused (host down or unreachable circuit)
    Refused,
    /// Any other transport failure
    Error(String),
}

/// Something that can fetch an address on the crawler's behalf
#[async_trait]
pub trait ProxyTransport: Send + Sync {
    async fn fetch(&self, address: &str) -> FetchOutcome;
}

/// Transport backed by a local Tor SOCKS5 daemon.
///
/// Uses the `socks5h` scheme so hostname resolution happens inside the
/// proxy; resolving a `.onion` name locally would both fail and leak the
/// lookup to the system resolver.
pub struct TorTransport {
    client: Client,
}

impl TorTransport {
    /// Builds a transport against a specific SOCKS port
    pub fn new(socks_port: u16, timeout: Duration) -> Result<Self, reqwest::Error> {
        let proxy = Proxy::all(format!("socks5h://127.0.0.1:{}", socks_port))?;

        let client = Client::builder()
            .proxy(proxy)
            .timeout(timeout)
            .connect_timeout(timeout.min(Duration::from_secs(30)))
            .redirect(Policy::limited(3))
            .gzip(true)
            .brotli(true)
            .danger_accept_invalid_certs(true) // self-signed certs are the norm on hidden services
            .build()?;

        Ok(Self { client })
    }

    /// Connects to the configured port, falling back to the secondary
    /// port (Tor Browser bundles listen on 9150 instead of 9050).
    /// When probing is enabled, a port must answer a probe request before
    /// it is accepted.
    pub async fn connect(config: &ProxyConfig, timeout: Duration) -> Result<Self, crate::VeilError> {
        let ports = [config.socks_port, config.fallback_port];
        let mut last_failure = String::new();

        for port in ports {
            let transport = Self::new(port, timeout)?;
            if !config.probe {
                tracing::info!(port, "Using SOCKS proxy without probe");
                return Ok(transport);
            }
            match transport.check_proxy().await {
                Ok(()) => {
                    tracing::info!(port, "SOCKS proxy answered probe");
                    return Ok(transport);
                }
                Err(reason) => {
                    tracing::warn!(port, %reason, "SOCKS probe failed");
                    last_failure = reason;
                }
            }
        }

        Err(crate::VeilError::ProxyUnavailable(last_failure))
    }

    /// Sends one request through the proxy to verify it is reachable.
    /// The target only needs to be resolvable by the proxy; any response,
    /// even an error status, proves the SOCKS circuit works.
    pub async fn check_proxy(&self) -> Result<(), String> {
        let probe = "https://check.torproject.org/";
        match self.client.get(probe).send().await {
            Ok(_) => Ok(()),
            Err(e) if e.is_timeout() => Err("probe timed out".to_string()),
            Err(e) => Err(e.to_string()),
        }
    }

    fn pick_user_agent() -> &'static str {
        let mut rng = rand::thread_rng();
        USER_AGENTS
            .choose(&mut rng)
            .copied()
            .unwrap_or(USER_AGENTS[0])
    }
}

#[async_trait]
impl ProxyTransport for TorTransport {
    async fn fetch(&self, address: &str) -> FetchOutcome {
        let started = Instant::now();

        let response = self
            .client
            .get(address)
            .header(reqwest::header::USER_AGENT, Self::pick_user_agent())
            .send()
            .await;

        let response = match response {
            Ok(r) => r,
            Err(e) if e.is_timeout() => return FetchOutcome::Timeout,
            Err(e) if e.is_connect() => return FetchOutcome::Refused,
            Err(e) => return FetchOutcome::Error(e.to_string()),
        };

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string());

        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        let body = match response.bytes().await {
            Ok(b) => b.to_vec(),
            Err(e) if e.is_timeout() => return FetchOutcome::Timeout,
            Err(e) => return FetchOutcome::Error(e.to_string()),
        };

        FetchOutcome::Fetched(FetchedPage {
            status,
            content_type,
            headers,
            body,
            elapsed: started.elapsed(),
        })
    }
}
