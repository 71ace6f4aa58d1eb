//! Shared fixtures for the integration tests

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use veil_fetch::config::DownloadConfig;
use veil_fetch::download::{ChecksumAlgorithm, ChecksumVerifier};
use veil_fetch::identity::{IdentityEpoch, SharedIdentity, TransportSettings};
use wiremock::{Request, Respond, ResponseTemplate};

/// Deterministic, non-repeating-looking test payload
pub fn test_body(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}

pub fn md5_hex(bytes: &[u8]) -> String {
    ChecksumVerifier::digest_bytes(ChecksumAlgorithm::Md5, bytes)
}

/// Download settings for plain-http mock servers
pub fn download_config(dir: &Path) -> DownloadConfig {
    DownloadConfig {
        directory: dir.display().to_string(),
        chunk_size: 1024,
        max_concurrent: 2,
        chunk_retries: 2,
        chunk_retry_delay: 10,
        require_https_redirects: false,
        redirect_host_suffixes: Vec::new(),
        ..DownloadConfig::default()
    }
}

/// Generation 0 with direct connections
pub fn direct_identity(config: &DownloadConfig) -> Arc<SharedIdentity> {
    let settings = TransportSettings::direct(config);
    Arc::new(SharedIdentity::new(
        IdentityEpoch::build(0, &settings).unwrap(),
    ))
}

/// Serves a fixed body honoring `Range: bytes=start-end`
///
/// Requests past the end get 416, requests without a range get the whole
/// body with 200.
#[derive(Clone)]
pub struct RangeResponder {
    pub body: Vec<u8>,
    /// Answer every request with 200 and the whole body
    pub ignore_range: bool,
    /// Added to the start reported in `Content-Range`
    pub skew: u64,
    pub headers: Vec<(&'static str, String)>,
    pub delay: Option<Duration>,
}

impl RangeResponder {
    pub fn new(body: Vec<u8>) -> Self {
        Self {
            body,
            ignore_range: false,
            skew: 0,
            headers: Vec::new(),
            delay: None,
        }
    }

    pub fn header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }

    fn template(&self, status: u16, body: Vec<u8>) -> ResponseTemplate {
        let mut template =
            ResponseTemplate::new(status).set_body_raw(body, "application/octet-stream");
        for (name, value) in &self.headers {
            template = template.insert_header(*name, value.as_str());
        }
        if let Some(delay) = self.delay {
            template = template.set_delay(delay);
        }
        template
    }
}

impl Respond for RangeResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let len = self.body.len() as u64;
        let range = request
            .headers
            .get("range")
            .and_then(|v| v.to_str().ok())
            .and_then(parse_range);

        let (start, end) = match range {
            Some(range) if !self.ignore_range => range,
            _ => return self.template(200, self.body.clone()),
        };

        if start >= len {
            return self
                .template(416, Vec::new())
                .insert_header("content-range", format!("bytes */{}", len).as_str());
        }

        let end = end.unwrap_or(len - 1).min(len - 1);
        let slice = self.body[start as usize..=end as usize].to_vec();
        self.template(206, slice).insert_header(
            "content-range",
            format!("bytes {}-{}/{}", start + self.skew, end + self.skew, len).as_str(),
        )
    }
}

fn parse_range(value: &str) -> Option<(u64, Option<u64>)> {
    let range = value.strip_prefix("bytes=")?;
    let (start, end) = range.split_once('-')?;
    let start = start.parse().ok()?;
    let end = if end.is_empty() {
        None
    } else {
        Some(end.parse().ok()?)
    };
    Some((start, end))
}

/// Range headers of every GET the server received, in order
pub async fn received_ranges(server: &wiremock::MockServer) -> Vec<String> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.method.as_str() == "GET")
        .filter_map(|r| r.headers.get("range"))
        .filter_map(|v| v.to_str().ok().map(str::to_string))
        .collect()
}
