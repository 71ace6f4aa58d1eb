//! Storage traits and error types
//!
//! The crawl only ever talks to storage through these narrow traits, so any
//! backend can stand in for the bundled SQLite one.

use crate::storage::{ArtifactRecord, CrawlDocument, SessionRecord, SessionStatus};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Sink for relevant documents
pub trait DocumentStore: Send + Sync {
    /// Stores one document; the same URL stored twice keeps the latest copy
    fn insert_one(&self, doc: &CrawlDocument) -> StorageResult<()>;

    /// Number of stored documents
    fn document_count(&self) -> StorageResult<u64>;
}

/// Record of every download that reached a terminal state
pub trait ArtifactLedger: Send + Sync {
    fn record_artifact(&self, record: &ArtifactRecord) -> StorageResult<()>;

    /// The most recent record for `source_url`
    fn find_artifact(&self, source_url: &str) -> StorageResult<Option<ArtifactRecord>>;
}

/// Start and end of crawl sessions
pub trait SessionLog: Send + Sync {
    fn start_session(&self, session_id: &str, config_hash: &str) -> StorageResult<()>;

    fn finish_session(&self, session_id: &str, status: SessionStatus) -> StorageResult<()>;

    fn get_session(&self, session_id: &str) -> StorageResult<SessionRecord>;
}
