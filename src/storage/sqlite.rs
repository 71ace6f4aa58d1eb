//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the storage traits.

use crate::storage::schema::initialize_schema;
use crate::storage::traits::{
    ArtifactLedger, DocumentStore, SessionLog, StorageError, StorageResult,
};
use crate::storage::{ArtifactRecord, CrawlDocument, SessionRecord, SessionStatus};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// SQLite storage backend
///
/// The connection sits behind a mutex so one instance can be shared by
/// every crawl and download task.
pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    /// Opens or creates the database at `path`
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        // Configure SQLite for better performance
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

impl DocumentStore for SqliteStorage {
    fn insert_one(&self, doc: &CrawlDocument) -> StorageResult<()> {
        let embedding = doc
            .embedding
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        self.conn().execute(
            "INSERT INTO documents (url, title, content, embedding, score, fetched_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(url) DO UPDATE SET
                title = excluded.title,
                content = excluded.content,
                embedding = excluded.embedding,
                score = excluded.score,
                fetched_at = excluded.fetched_at",
            params![
                doc.url,
                doc.title,
                doc.content,
                embedding,
                doc.score.map(f64::from),
                doc.fetched_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn document_count(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn()
            .query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

impl ArtifactLedger for SqliteStorage {
    fn record_artifact(&self, record: &ArtifactRecord) -> StorageResult<()> {
        self.conn().execute(
            "INSERT INTO artifacts (source_url, path, bytes, checksum, state, recorded_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                record.source_url,
                record.path,
                record.bytes as i64,
                record.checksum,
                record.state,
                record.recorded_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn find_artifact(&self, source_url: &str) -> StorageResult<Option<ArtifactRecord>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT source_url, path, bytes, checksum, state, recorded_at
             FROM artifacts WHERE source_url = ?1 ORDER BY id DESC LIMIT 1",
        )?;

        let record = stmt
            .query_row(params![source_url], |row| {
                Ok(ArtifactRecord {
                    source_url: row.get(0)?,
                    path: row.get(1)?,
                    bytes: row.get::<_, i64>(2)? as u64,
                    checksum: row.get(3)?,
                    state: row.get(4)?,
                    recorded_at: parse_timestamp(&row.get::<_, String>(5)?),
                })
            })
            .optional()?;

        Ok(record)
    }
}

impl SessionLog for SqliteStorage {
    fn start_session(&self, session_id: &str, config_hash: &str) -> StorageResult<()> {
        self.conn().execute(
            "INSERT INTO sessions (session_id, started_at, config_hash, status)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                session_id,
                Utc::now().to_rfc3339(),
                config_hash,
                SessionStatus::Running.to_db_string()
            ],
        )?;
        Ok(())
    }

    fn finish_session(&self, session_id: &str, status: SessionStatus) -> StorageResult<()> {
        let updated = self.conn().execute(
            "UPDATE sessions SET status = ?1, finished_at = ?2 WHERE session_id = ?3",
            params![status.to_db_string(), Utc::now().to_rfc3339(), session_id],
        )?;
        if updated == 0 {
            return Err(StorageError::SessionNotFound(session_id.to_string()));
        }
        Ok(())
    }

    fn get_session(&self, session_id: &str) -> StorageResult<SessionRecord> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT session_id, started_at, finished_at, config_hash, status
             FROM sessions WHERE session_id = ?1",
        )?;

        stmt.query_row(params![session_id], |row| {
            Ok(SessionRecord {
                session_id: row.get(0)?,
                started_at: row.get(1)?,
                finished_at: row.get(2)?,
                config_hash: row.get(3)?,
                status: SessionStatus::from_db_string(&row.get::<_, String>(4)?)
                    .unwrap_or(SessionStatus::Running),
            })
        })
        .optional()?
        .ok_or_else(|| StorageError::SessionNotFound(session_id.to_string()))
    }
}
