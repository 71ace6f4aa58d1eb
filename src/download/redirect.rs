use crate::config::DownloadConfig;
use crate::url::{extract_domain, query_param};
use thiserror::Error;
use url::Url;

/// Why a redirect hop was refused
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RedirectViolation {
    #[error("Redirect to non-https target: {0}")]
    InsecureScheme(String),

    #[error("Redirect to host outside the allowed suffixes: {0}")]
    HostNotAllowed(String),

    #[error("Redirect changed checksum parameter '{param}' from {original} to {redirected:?}")]
    ChecksumChanged {
        param: String,
        original: String,
        redirected: Option<String>,
    },

    #[error("Too many redirects ({0})")]
    TooManyRedirects(usize),
}

/// Redirect-following rules for the download client
///
/// Every hop is checked against the URL that started the chain, so a
/// checksum carried by the original request cannot be swapped out by an
/// intermediate server.
#[derive(Debug, Clone)]
pub struct RedirectSafety {
    require_https: bool,
    host_suffixes: Vec<String>,
    checksum_param: String,
    max_redirects: usize,
}

impl RedirectSafety {
    pub fn from_config(config: &DownloadConfig) -> Self {
        Self {
            require_https: config.require_https_redirects,
            host_suffixes: config
                .redirect_host_suffixes
                .iter()
                .map(|s| s.trim_start_matches('.').to_lowercase())
                .collect(),
            checksum_param: config.checksum_param.clone(),
            max_redirects: config.max_redirects,
        }
    }

    /// Checks one hop from `original` (start of the chain) to `next`
    ///
    /// `hops` is the number of URLs already requested in this chain.
    pub fn check(&self, original: &Url, next: &Url, hops: usize) -> Result<(), RedirectViolation> {
        if hops > self.max_redirects {
            return Err(RedirectViolation::TooManyRedirects(hops));
        }

        if self.require_https && next.scheme() != "https" {
            return Err(RedirectViolation::InsecureScheme(next.to_string()));
        }

        if !self.host_suffixes.is_empty() {
            let host = extract_domain(next).unwrap_or_default();
            let allowed = self
                .host_suffixes
                .iter()
                .any(|suffix| host == *suffix || host.ends_with(&format!(".{}", suffix)));
            if !allowed {
                return Err(RedirectViolation::HostNotAllowed(host));
            }
        }

        if let Some(expected) = query_param(original, &self.checksum_param) {
            let redirected = query_param(next, &self.checksum_param);
            let unchanged = redirected
                .as_deref()
                .is_some_and(|value| value.eq_ignore_ascii_case(&expected));
            if !unchanged {
                return Err(RedirectViolation::ChecksumChanged {
                    param: self.checksum_param.clone(),
                    original: expected,
                    redirected,
                });
            }
        }

        Ok(())
    }

    /// Builds the reqwest redirect policy enforcing these rules
    pub fn policy(&self) -> reqwest::redirect::Policy {
        let rules = self.clone();
        reqwest::redirect::Policy::custom(move |attempt| {
            let verdict = match attempt.previous().first() {
                Some(original) => rules.check(original, attempt.url(), attempt.previous().len()),
                None => Ok(()),
            };

            match verdict {
                Ok(()) => attempt.follow(),
                Err(violation) => {
                    tracing::warn!("Refusing redirect: {}", violation);
                    attempt.error(violation)
                }
            }
        })
    }
}

/// Finds the redirect violation behind a reqwest error, if any
pub fn redirect_violation(error: &reqwest::Error) -> Option<RedirectViolation> {
    if !error.is_redirect() {
        return None;
    }

    let mut source = std::error::Error::source(error);
    while let Some(err) = source {
        if let Some(violation) = err.downcast_ref::<RedirectViolation>() {
            return Some(violation.clone());
        }
        source = err.source();
    }
    None
}
