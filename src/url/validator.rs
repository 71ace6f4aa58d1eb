use crate::config::FilterConfig;
use crate::url::matcher::HostPattern;
use crate::UrlResult;
use std::collections::HashSet;
use std::fmt;
use url::Url;

/// Why a URL was rejected by the validator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// The URL has no host component
    MissingHost,
    /// The scheme is not in the allowed set
    Scheme(String),
    /// Neither the path nor the host is allow-listed
    PathAndHost { path: String, host: String },
    /// A query parameter name is not in the allowed set
    Param(String),
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingHost => write!(f, "missing host"),
            Self::Scheme(scheme) => write!(f, "scheme '{}' not allowed", scheme),
            Self::PathAndHost { path, host } => {
                write!(f, "neither path '{}' nor host '{}' allowed", path, host)
            }
            Self::Param(name) => write!(f, "query parameter '{}' not allowed", name),
        }
    }
}

/// Stateless allow-list predicate over URLs
///
/// Rules are evaluated in order and short-circuit on the first failure.
/// Anything not explicitly allowed is rejected.
#[derive(Debug, Clone)]
pub struct UrlValidator {
    schemes: HashSet<String>,
    paths: HashSet<String>,
    params: HashSet<String>,
    hosts: Vec<HostPattern>,
}

impl UrlValidator {
    /// Builds a validator from the filter section of the configuration
    ///
    /// # Arguments
    ///
    /// * `config` - Allowed schemes, paths, query parameter names and host patterns
    ///
    /// # Returns
    ///
    /// * `Ok(UrlValidator)` - All host patterns compiled
    /// * `Err(UrlError)` - A host pattern is invalid
    pub fn from_config(config: &FilterConfig) -> UrlResult<Self> {
        let hosts = config
            .allowed_hosts
            .iter()
            .map(|p| HostPattern::parse(p))
            .collect::<UrlResult<Vec<_>>>()?;

        Ok(Self {
            schemes: config
                .allowed_schemes
                .iter()
                .map(|s| s.to_lowercase())
                .collect(),
            paths: config.allowed_paths.iter().cloned().collect(),
            params: config.allowed_params.iter().cloned().collect(),
            hosts,
        })
    }

    /// Returns true if the URL passes every allow-list rule
    ///
    /// # Examples
    ///
    /// ```
    /// use veil_fetch::config::FilterConfig;
    /// use veil_fetch::url::UrlValidator;
    /// use url::Url;
    ///
    /// let validator = UrlValidator::from_config(&FilterConfig {
    ///     allowed_schemes: vec!["https".to_string()],
    ///     allowed_paths: vec!["/get.php".to_string()],
    ///     allowed_params: vec!["md5".to_string()],
    ///     allowed_hosts: vec!["cdn*.example.cdn".to_string()],
    /// })
    /// .unwrap();
    ///
    /// let ok = Url::parse("https://cdn3.example.cdn/get.php?md5=abc").unwrap();
    /// let bad = Url::parse("http://cdn3.example.cdn/get.php?md5=abc").unwrap();
    /// assert!(validator.is_valid_download_url(&ok));
    /// assert!(!validator.is_valid_download_url(&bad));
    /// ```
    pub fn is_valid_download_url(&self, url: &Url) -> bool {
        self.check(url).is_ok()
    }

    /// Parses and validates a URL string; unparseable input is invalid
    pub fn is_valid_str(&self, url: &str) -> bool {
        Url::parse(url)
            .map(|u| self.is_valid_download_url(&u))
            .unwrap_or(false)
    }

    /// Evaluates the rules in order and reports the first violation
    pub fn check(&self, url: &Url) -> Result<(), Rejection> {
        // Rule 1: host present
        let host = match url.host_str() {
            Some(h) if !h.is_empty() => h,
            _ => return Err(Rejection::MissingHost),
        };

        // Rule 2: scheme allowed
        if !self.schemes.contains(url.scheme()) {
            return Err(Rejection::Scheme(url.scheme().to_string()));
        }

        // Rule 3: path allowed, or host matches a pattern
        let path_allowed = self.paths.contains(url.path());
        if !path_allowed && !self.hosts.iter().any(|p| p.matches(host)) {
            return Err(Rejection::PathAndHost {
                path: url.path().to_string(),
                host: host.to_string(),
            });
        }

        // Rule 4: every query parameter name allowed
        for (name, _) in url.query_pairs() {
            if !self.params.contains(&*name) {
                return Err(Rejection::Param(name.into_owned()));
            }
        }

        Ok(())
    }
}
