//! Veil-Fetch: a privacy-preserving, resumable content-acquisition engine
//!
//! This crate discovers candidate URLs, decides which are worth fetching,
//! fetches them through an anonymizing SOCKS proxy with retry and resumption
//! guarantees, and verifies downloaded artifacts against their checksums.

pub mod config;
pub mod crawler;
pub mod download;
pub mod identity;
pub mod relevance;
pub mod robots;
pub mod state;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for Veil-Fetch operations
#[derive(Debug, Error)]
pub enum VeilError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Relevance error: {0}")]
    Relevance(#[from] relevance::RelevanceError),

    #[error("Download error: {0}")]
    Download(#[from] download::DownloadError),

    #[error("Identity rotation error: {0}")]
    Rotation(#[from] identity::ControlError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] crawler::FetchError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid host pattern: {0}")]
    InvalidPattern(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,

    #[error("Invalid host pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

/// Result type alias for Veil-Fetch operations
pub type Result<T> = std::result::Result<T, VeilError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{CrawlOrchestrator, SessionStats};
pub use download::{ChecksumVerifier, DownloadManager};
pub use identity::{RotationController, SharedIdentity};
pub use relevance::{RelevanceClassifier, Verdict};
pub use state::{LoopDetector, VisitTracker};
pub use url::{normalize_url, visit_key, UrlValidator};
