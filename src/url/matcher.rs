use crate::{UrlError, UrlResult};
use regex::Regex;

/// Prefix that marks a host pattern as a regular expression
const REGEX_PREFIX: &str = "re:";

/// A compiled allow-list entry for hosts
///
/// Three forms are accepted:
/// 1. Exact: `"libgen.li"` matches only `libgen.li`
/// 2. Glob: any pattern containing `*`, where `*` matches any run of
///    characters. `"*.example.com"` additionally matches the bare domain.
/// 3. Regex: `"re:^cdn\d*\.example\.cdn$"` for structured CDN-subdomain patterns
#[derive(Debug, Clone)]
pub enum HostPattern {
    Exact(String),
    Glob(String),
    Regex(Regex),
}

impl HostPattern {
    /// Parses a host pattern from its configuration form
    ///
    /// # Arguments
    ///
    /// * `pattern` - The pattern string from the allow-list
    ///
    /// # Returns
    ///
    /// * `Ok(HostPattern)` - The compiled pattern
    /// * `Err(UrlError)` - The pattern is empty or the regex does not compile
    pub fn parse(pattern: &str) -> UrlResult<Self> {
        let trimmed = pattern.trim();
        if trimmed.is_empty() {
            return Err(UrlError::InvalidPattern {
                pattern: pattern.to_string(),
                reason: "pattern cannot be empty".to_string(),
            });
        }

        if let Some(expr) = trimmed.strip_prefix(REGEX_PREFIX) {
            let regex = Regex::new(expr).map_err(|e| UrlError::InvalidPattern {
                pattern: pattern.to_string(),
                reason: e.to_string(),
            })?;
            return Ok(Self::Regex(regex));
        }

        let lowered = trimmed.to_lowercase();
        if lowered.contains('*') {
            Ok(Self::Glob(lowered))
        } else {
            Ok(Self::Exact(lowered))
        }
    }

    /// Checks whether a host is accepted by this pattern
    pub fn matches(&self, host: &str) -> bool {
        let host = host.to_lowercase();
        match self {
            Self::Exact(expected) => host == *expected,
            Self::Glob(glob) => matches_wildcard(glob, &host),
            Self::Regex(regex) => regex.is_match(&host),
        }
    }
}

/// Checks if a domain matches a wildcard pattern
///
/// `*` matches any (possibly empty) run of characters. A leading `*.` also
/// matches the bare base domain, so `*.example.com` accepts `example.com`.
///
/// # Examples
///
/// ```
/// use veil_fetch::url::matches_wildcard;
///
/// assert!(matches_wildcard("example.com", "example.com"));
/// assert!(matches_wildcard("*.example.com", "example.com"));
/// assert!(matches_wildcard("*.example.com", "api.v2.example.com"));
/// assert!(matches_wildcard("cdn*.example.cdn", "cdn3.example.cdn"));
/// assert!(!matches_wildcard("*.example.com", "example.org"));
/// ```
pub fn matches_wildcard(pattern: &str, candidate: &str) -> bool {
    if let Some(base) = pattern.strip_prefix("*.") {
        if candidate == base {
            return true;
        }
    }
    glob_match(pattern.as_bytes(), candidate.as_bytes())
}

/// Iterative glob matcher with single-star backtracking
fn glob_match(pattern: &[u8], text: &[u8]) -> bool {
    let (mut p, mut t) = (0, 0);
    let mut star: Option<usize> = None;
    let mut resume = 0;

    while t < text.len() {
        if p < pattern.len() && pattern[p] == b'*' {
            star = Some(p);
            p += 1;
            resume = t;
        } else if p < pattern.len() && pattern[p] == text[t] {
            p += 1;
            t += 1;
        } else if let Some(s) = star {
            p = s + 1;
            resume += 1;
            t = resume;
        } else {
            return false;
        }
    }

    while p < pattern.len() && pattern[p] == b'*' {
        p += 1;
    }
    p == pattern.len()
}
