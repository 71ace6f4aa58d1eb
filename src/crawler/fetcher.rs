//! HTTP page fetching for the crawl path
//!
//! This module handles:
//! - GET requests through the current crawl client
//! - Classifying responses as HTML pages, attachments, or other content
//! - Telling transient failures apart from permanent ones
//!
//! Attachment bodies are never read here; the download manager fetches
//! them again with byte ranges.

use crate::download::filename_from_content_disposition;
use reqwest::header::{HeaderMap, CONTENT_DISPOSITION, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use thiserror::Error;
use url::Url;

/// Content types treated as binary artifacts even without `Content-Disposition`
const BINARY_CONTENT_TYPES: &[&str] = &[
    "application/octet-stream",
    "application/pdf",
    "application/epub+zip",
    "application/zip",
    "application/x-rar-compressed",
    "application/vnd.rar",
    "application/x-7z-compressed",
    "application/x-mobipocket-ebook",
    "image/vnd.djvu",
];

/// Errors from fetching one page
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    #[error("Failed to extract content from {url}: {reason}")]
    Extract { url: String, reason: String },

    #[error("Giving up on {url} after {attempts} attempts: {source}")]
    RetriesExhausted {
        url: String,
        attempts: u32,
        #[source]
        source: Box<FetchError>,
    },
}

impl FetchError {
    /// Timeouts, connection failures, 5xx, 408 and 429
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Request { source, .. } => {
                source.is_timeout() || source.is_connect() || source.is_request() || source.is_body()
            }
            Self::Status { status, .. } => *status >= 500 || *status == 408 || *status == 429,
            _ => false,
        }
    }
}

/// What kind of resource a response carries
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseKind {
    /// An HTML page to extract and mine for links
    Html,

    /// A file to hand to the download manager
    Attachment { filename: Option<String> },

    /// Anything else; ignored
    Other(String),
}

/// A fetched response, with the body read only for HTML
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// URL after redirects
    pub final_url: Url,
    pub status: u16,
    pub content_type: String,
    pub kind: ResponseKind,
    pub body: Option<String>,
}

/// Classifies a response from its headers
///
/// `Content-Disposition: attachment` or a binary content type marks an
/// attachment; `text/html` and XHTML are pages.
pub fn classify_response(headers: &HeaderMap) -> ResponseKind {
    let disposition = headers
        .get(CONTENT_DISPOSITION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_ascii_lowercase();
    let mime = content_type.split(';').next().unwrap_or("").trim();

    if disposition.to_ascii_lowercase().contains("attachment") || is_binary_content_type(mime) {
        return ResponseKind::Attachment {
            filename: filename_from_content_disposition(disposition),
        };
    }

    if mime == "text/html" || mime == "application/xhtml+xml" {
        ResponseKind::Html
    } else {
        ResponseKind::Other(content_type)
    }
}

pub fn is_binary_content_type(mime: &str) -> bool {
    BINARY_CONTENT_TYPES.contains(&mime)
}

/// Fetches `url` once
pub async fn fetch_page(client: &Client, url: &Url) -> Result<FetchedPage, FetchError> {
    let request_err = |source| FetchError::Request {
        url: url.to_string(),
        source,
    };

    let response = client.get(url.clone()).send().await.map_err(request_err)?;
    let status = response.status();
    if status != StatusCode::OK {
        return Err(FetchError::Status {
            status: status.as_u16(),
            url: url.to_string(),
        });
    }

    let final_url = response.url().clone();
    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    let kind = classify_response(response.headers());

    let body = match kind {
        ResponseKind::Html => Some(response.text().await.map_err(request_err)?),
        _ => None,
    };

    Ok(FetchedPage {
        final_url,
        status: status.as_u16(),
        content_type,
        kind,
        body,
    })
}
