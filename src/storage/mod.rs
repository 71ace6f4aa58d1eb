//! Storage module for persisting crawl output
//!
//! This module handles the external collaborators the crawl writes to:
//! - Relevant documents (URL, text, optional embedding)
//! - The artifact ledger of finished and discarded downloads
//! - Crawl session records
//!
//! `SqliteStorage` implements all three traits.

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{ArtifactLedger, DocumentStore, SessionLog, StorageError, StorageResult};

use chrono::{DateTime, Utc};
use std::path::Path;

/// Opens (or creates) the SQLite database at `path`
pub fn open_storage(path: &Path) -> StorageResult<SqliteStorage> {
    SqliteStorage::new(path)
}

/// A relevant page handed to the document store
#[derive(Debug, Clone, PartialEq)]
pub struct CrawlDocument {
    pub url: String,
    pub title: Option<String>,
    pub content: String,
    pub embedding: Option<Vec<f32>>,
    pub score: Option<f32>,
    pub fetched_at: DateTime<Utc>,
}

/// One row of the artifact ledger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactRecord {
    pub source_url: String,
    pub path: String,
    pub bytes: u64,
    pub checksum: Option<String>,
    /// `DownloadState` label the job ended in
    pub state: String,
    pub recorded_at: DateTime<Utc>,
}

/// A crawl session as stored
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub session_id: String,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub status: SessionStatus,
}

/// Status of a crawl session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl SessionStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "cancelled" => Some(Self::Cancelled),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}
