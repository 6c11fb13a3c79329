use crate::AddrError;
use url::Url;

/// Binary asset extensions that are never worth fetching through the proxy.
pub const IGNORED_EXTENSIONS: &[&str] = &[
    ".jpg", ".jpeg", ".png", ".gif", ".bmp", ".pdf", ".css", ".ico", ".svg", ".mp4", ".zip",
    ".tar", ".gz", ".iso", ".xml", ".json", ".woff", ".woff2", ".ttf", ".eot",
];

/// Maximum query string length kept during normalization. Longer queries
/// are almost always session tokens and would defeat deduplication.
const MAX_QUERY_LEN: usize = 100;

/// Normalizes a hidden-service address.
///
/// # Normalization steps
///
/// 1. Parse the address; reject if malformed
/// 2. Require an `http` or `https` scheme
/// 3. Require a `.onion` authority (the host is lowercased by the parser)
/// 4. Reject binary asset paths (images, archives, fonts, ...)
/// 5. Remove the fragment
/// 6. Drop the query string when it exceeds 100 bytes
/// 7. Append a trailing slash when the final path segment has no dot
///
/// The result is idempotent: normalizing an already-normalized address
/// yields the same value, so it can serve as a deduplication key.
///
/// # Examples
///
/// ```
/// use veilcrawl::addr::normalize_addr;
///
/// let url = normalize_addr("http://darkexample.onion/market#top").unwrap();
/// assert_eq!(url.as_str(), "http://darkexample.onion/market/");
/// ```
pub fn normalize_addr(raw: &str) -> Result<Url, AddrError> {
    let mut url = Url::parse(raw).map_err(|e| AddrError::Parse(e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(AddrError::InvalidScheme(url.scheme().to_string()));
    }

    let host = url.host_str().ok_or(AddrError::MissingHost)?;
    if !host.ends_with(".onion") {
        return Err(AddrError::NotOnion(host.to_string()));
    }

    let path_lower = url.path().to_lowercase();
    for ext in IGNORED_EXTENSIONS {
        if path_lower.ends_with(ext) {
            return Err(AddrError::IgnoredExtension(raw.to_string()));
        }
    }

    url.set_fragment(None);

    if let Some(query) = url.query() {
        if query.len() > MAX_QUERY_LEN {
            url.set_query(None);
        }
    }

    let path = url.path().to_string();
    if !path.ends_with('/') {
        let last_segment = path.rsplit('/').next().unwrap_or("");
        if !last_segment.contains('.') {
            url.set_path(&format!("{}/", path));
        }
    }

    Ok(url)
}

/// Returns whether an address is reachable through the same proxy network.
///
/// Only same-network links are ever enqueued; everything else discovered
/// on a page is outside the crawl's address namespace.
pub fn is_same_network(url: &Url) -> bool {
    url.host_str().is_some_and(|h| h.ends_with(".onion"))
}
