use crate::UrlError;
use url::Url;

/// List of tracking query parameters to remove during normalization
const TRACKING_PARAMS: &[&str] = &[
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
    "fbclid",
    "gclid",
    "mc_eid",
];

/// Normalizes a URL so equivalent spellings share one visit record
///
/// # Normalization Steps
///
/// 1. Parse the URL; reject if malformed (dot segments are resolved here)
/// 2. Require HTTP or HTTPS and a host
/// 3. Lowercase the host
/// 4. Remove fragment
/// 5. Remove tracking query parameters
/// 6. Sort remaining query parameters by name (stable for repeated names)
/// 7. Remove empty query string
///
/// Unlike link canonicalization for display, the path is left as-is:
/// trailing slashes and `www.` may be significant to the servers we fetch from.
///
/// # Examples
///
/// ```
/// use veil_fetch::url::normalize_url;
///
/// let url = normalize_url("https://LIBGEN.li/index.php?req=x&id=1#top").unwrap();
/// assert_eq!(url.as_str(), "https://libgen.li/index.php?id=1&req=x");
/// ```
pub fn normalize_url(url_str: &str) -> Result<Url, UrlError> {
    // Step 1: Parse the URL
    let mut url = Url::parse(url_str.trim()).map_err(|e| UrlError::Parse(e.to_string()))?;

    // Step 2: Validate scheme and host
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(url.scheme().to_string()));
    }

    // Step 3: Lowercase the host
    let host = url
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or(UrlError::MissingDomain)?
        .to_lowercase();
    url.set_host(Some(&host))
        .map_err(|e| UrlError::Parse(format!("Failed to set host: {}", e)))?;

    // Step 4: Remove fragment
    url.set_fragment(None);

    // Step 5 & 6: Filter and sort query parameters
    if url.query().is_some() {
        let params = filter_and_sort_query_params(&url);

        // Step 7: Set query or remove if empty
        if params.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(params);
        }
    }

    Ok(url)
}

/// Returns the key under which a URL's visits are counted
///
/// Falls back to the raw string when the URL cannot be normalized, so
/// every input still maps to exactly one record.
pub fn visit_key(url: &str) -> String {
    normalize_url(url)
        .map(String::from)
        .unwrap_or_else(|_| url.trim().to_string())
}

/// Filters out tracking parameters and sorts remaining query parameters
fn filter_and_sort_query_params(url: &Url) -> Vec<(String, String)> {
    let mut params: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !is_tracking_param(key))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    params.sort_by(|a, b| a.0.cmp(&b.0));
    params
}

/// Checks if a query parameter is a tracking parameter
fn is_tracking_param(key: &str) -> bool {
    TRACKING_PARAMS.contains(&key) || key.starts_with("utm_")
}
