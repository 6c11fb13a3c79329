//! Address handling for hidden-service locators
//!
//! An address is a normalized `scheme://host.onion/path` locator. The
//! normalized form is the deduplication key for the whole engine, so
//! normalization must be idempotent.

mod normalize;

pub use normalize::{is_same_network, normalize_addr, IGNORED_EXTENSIONS};

use crate::AddrError;
use url::Url;

/// Extracts the authority (host) component of an address.
///
/// Addresses produced by [`normalize_addr`] always carry a host, but raw
/// URLs from page content may not.
pub fn extract_host(url: &Url) -> Result<String, AddrError> {
    url.host_str()
        .map(|h| h.to_string())
        .ok_or(AddrError::MissingHost)
}
