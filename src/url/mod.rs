//! URL handling module for Veil-Fetch
//!
//! This module provides:
//! - `UrlValidator`: the reject-unless-allowed predicate over scheme, path,
//!   host and query parameter allow-lists
//! - Host patterns (exact, `*`-glob, and `re:` regular expressions)
//! - URL normalization for visit keys
//! - Domain extraction for per-host rate limiting

mod matcher;
mod normalize;
mod validator;

pub use matcher::{matches_wildcard, HostPattern};
pub use normalize::{normalize_url, visit_key};
pub use validator::{Rejection, UrlValidator};

use url::Url;

/// Reads a query parameter by name from a URL
///
/// # Examples
///
/// ```
/// use url::Url;
/// use veil_fetch::url::query_param;
///
/// let url = Url::parse("https://libgen.li/get.php?md5=ABC&key=1").unwrap();
/// assert_eq!(query_param(&url, "md5"), Some("ABC".to_string()));
/// assert_eq!(query_param(&url, "id"), None);
/// ```
pub fn query_param(url: &Url, name: &str) -> Option<String> {
    url.query_pairs()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}

/// Lowercased host of a URL, the key for per-domain limits
///
/// Ports are ignored, so two services on one host share a budget.
pub fn extract_domain(url: &Url) -> Option<String> {
    url.host_str()
        .filter(|h| !h.is_empty())
        .map(|h| h.to_lowercase())
}
