//! Resumable chunked downloads
//!
//! A job moves through size lookup, chunk and verify phases (see `DownloadState`).
//! Bytes land in `<name>.download.tmp` at exact offsets, each chunk is
//! fsynced before the offset advances, and only a verified file is renamed
//! to its final name.

use crate::config::DownloadConfig;
use crate::download::filename::{fallback_filename, sanitize_filename};
use crate::download::job::{DownloadJob, DownloadOutcome, DownloadRequest};
use crate::download::range::{parse_content_range, range_header};
use crate::download::redirect::{redirect_violation, RedirectViolation};
use crate::download::{ChecksumAlgorithm, ChecksumError, ChecksumVerifier};
use crate::identity::SharedIdentity;
use crate::state::DownloadState;
use crate::storage::{ArtifactLedger, ArtifactRecord};
use crate::url::query_param;
use futures::StreamExt;
use reqwest::header::{CONTENT_LENGTH, CONTENT_RANGE, RANGE};
use reqwest::{Client, StatusCode};
use std::collections::HashSet;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Errors that end or interrupt a download job
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("Transport error: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("Redirect rejected: {0}")]
    RedirectRejected(RedirectViolation),

    #[error("Unexpected HTTP status {status} for bytes starting at {start}")]
    HttpStatus { status: u16, start: u64 },

    #[error("Content-Range mismatch: requested start {expected}, got {got:?}")]
    ContentRangeMismatch { expected: u64, got: Option<String> },

    #[error("Server ignored the Range header while resuming at offset {0}")]
    RangeIgnored(u64),

    #[error("Short chunk at offset {start}: expected {expected} bytes, got {got}")]
    ShortChunk { start: u64, expected: u64, got: u64 },

    #[error(transparent)]
    Checksum(#[from] ChecksumError),

    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Another download is already writing {0}")]
    TargetBusy(PathBuf),

    #[error("Chunk at offset {start} failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        start: u64,
        attempts: u32,
        #[source]
        source: Box<DownloadError>,
    },

    #[error("Download cancelled")]
    Cancelled,

    #[error("Invalid download state transition: {from} -> {to}")]
    InvalidTransition {
        from: DownloadState,
        to: DownloadState,
    },
}

impl DownloadError {
    /// Transient failures worth another attempt at the same chunk
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) | Self::ShortChunk { .. } => true,
            Self::HttpStatus { status, .. } => {
                *status >= 500 || *status == 408 || *status == 429
            }
            _ => false,
        }
    }

    /// Failures that mean the bytes on disk cannot be trusted
    pub fn is_integrity(&self) -> bool {
        matches!(
            self,
            Self::RedirectRejected(_)
                | Self::ContentRangeMismatch { .. }
                | Self::RangeIgnored(_)
                | Self::Checksum(ChecksumError::Mismatch { .. })
                | Self::Checksum(ChecksumError::UnknownFormat(_))
        )
    }

    fn from_reqwest(error: reqwest::Error) -> Self {
        match redirect_violation(&error) {
            Some(violation) => Self::RedirectRejected(violation),
            None => Self::Transport(error),
        }
    }
}

/// What one chunk request produced
enum ChunkOutcome {
    /// `written` bytes landed at the requested offset
    Written(u64),
    /// The server has nothing past the requested offset
    EndOfStream,
    /// The server ignored the range at offset 0 and sent the whole body
    WholeBody(u64),
}

/// Removes a target from the in-flight set when its job ends
struct InFlightGuard {
    targets: Arc<Mutex<HashSet<PathBuf>>>,
    path: PathBuf,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.targets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.path);
    }
}

/// Runs resumable, checksum-verified downloads behind a counting gate
pub struct DownloadManager {
    identity: Arc<SharedIdentity>,
    config: DownloadConfig,
    directory: PathBuf,
    verifier: ChecksumVerifier,
    gate: Arc<Semaphore>,
    in_flight: Arc<Mutex<HashSet<PathBuf>>>,
    ledger: Option<Arc<dyn ArtifactLedger>>,
}

impl DownloadManager {
    pub fn new(identity: Arc<SharedIdentity>, config: DownloadConfig) -> Self {
        let directory = PathBuf::from(&config.directory);
        let gate = Arc::new(Semaphore::new(config.max_concurrent.max(1)));

        Self {
            identity,
            config,
            directory,
            verifier: ChecksumVerifier::new(),
            gate,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            ledger: None,
        }
    }

    /// Records every promoted or discarded artifact in `ledger`
    pub fn with_ledger(mut self, ledger: Arc<dyn ArtifactLedger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    /// Free slots in the admission gate
    pub fn available_slots(&self) -> usize {
        self.gate.available_permits()
    }

    /// Builds the job for `request` without touching the network
    ///
    /// The expected checksum comes from the request, or failing that from
    /// the checksum query parameter of the URL.
    pub fn prepare_job(&self, request: &DownloadRequest) -> DownloadJob {
        let expected = request
            .expected_checksum
            .clone()
            .or_else(|| query_param(&request.url, &self.config.checksum_param))
            .filter(|c| !c.trim().is_empty());

        let raw_name = request
            .filename
            .clone()
            .or_else(|| name_from_url(&request.url))
            .or_else(|| expected.clone());
        let filename = match raw_name {
            Some(name) => sanitize_filename(&name, self.config.max_filename_length),
            None => fallback_filename(),
        };

        DownloadJob::new(request.url.clone(), &self.directory, filename, expected)
    }

    /// Downloads `request` to the download directory
    ///
    /// Waits for a gate slot first. On failure or cancellation the temp file
    /// is left truncated to its last fsynced offset so a later call resumes;
    /// it is removed only when the content is known to be wrong.
    pub async fn download(
        &self,
        request: DownloadRequest,
        cancel: &CancellationToken,
    ) -> Result<DownloadOutcome, DownloadError> {
        let _permit = tokio::select! {
            permit = self.gate.acquire() => permit.map_err(|_| DownloadError::Cancelled)?,
            _ = cancel.cancelled() => return Err(DownloadError::Cancelled),
        };

        let mut job = self.prepare_job(&request);
        let _guard = self.claim_target(&job.final_path)?;

        tokio::fs::create_dir_all(&self.directory)
            .await
            .map_err(|source| DownloadError::Io {
                path: self.directory.clone(),
                source,
            })?;

        let result = self.run_job(&mut job, cancel).await;

        match &result {
            Ok(outcome) => {
                tracing::info!(
                    "Saved {} ({} bytes{})",
                    outcome.path.display(),
                    outcome.bytes,
                    if outcome.resumed_from > 0 {
                        format!(", resumed at {}", outcome.resumed_from)
                    } else {
                        String::new()
                    }
                );
            }
            Err(DownloadError::Cancelled) => {
                tracing::info!(
                    "Download of {} cancelled at offset {}",
                    job.source_url,
                    job.committed_offset
                );
            }
            Err(e) => {
                tracing::warn!("Download of {} failed: {}", job.source_url, e);
            }
        }

        if !matches!(result, Err(DownloadError::Cancelled)) {
            self.record(&job, result.as_ref().ok());
        }
        result
    }

    fn claim_target(&self, path: &Path) -> Result<InFlightGuard, DownloadError> {
        let mut targets = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if !targets.insert(path.to_path_buf()) {
            return Err(DownloadError::TargetBusy(path.to_path_buf()));
        }

        Ok(InFlightGuard {
            targets: Arc::clone(&self.in_flight),
            path: path.to_path_buf(),
        })
    }

    async fn run_job(
        &self,
        job: &mut DownloadJob,
        cancel: &CancellationToken,
    ) -> Result<DownloadOutcome, DownloadError> {
        // An unusable checksum can never verify, so nothing is fetched for it
        if let Some(expected) = job.expected_checksum.clone() {
            if ChecksumAlgorithm::for_hex_digest(&expected).is_none() {
                remove_file(&job.temp_path).await?;
                job.transition(DownloadState::Discarded)?;
                return Err(ChecksumError::UnknownFormat(expected).into());
            }
        }

        if let Some(outcome) = self.already_present(job).await {
            job.transition(DownloadState::Promoted)?;
            return Ok(outcome);
        }

        let client = self.identity.current().download_client().clone();
        job.total_size = self.fetch_remote_size(&client, &job.source_url).await?;
        match job.total_size {
            Some(total) => job.transition(DownloadState::SizeKnown { total })?,
            None => {
                tracing::debug!("Size of {} unknown, streaming", job.source_url);
                job.transition(DownloadState::SizeUnknown)?;
            }
        }

        job.committed_offset = file_len(&job.temp_path).await?;
        if let Some(total) = job.total_size {
            if job.committed_offset > total {
                tracing::warn!(
                    "{} is larger than the remote file ({} > {}), restarting",
                    job.temp_path.display(),
                    job.committed_offset,
                    total
                );
                remove_file(&job.temp_path).await?;
                job.committed_offset = 0;
            }
        }
        let resumed_from = job.committed_offset;
        if resumed_from > 0 {
            tracing::info!(
                "Resuming {} at offset {}",
                job.target_filename,
                resumed_from
            );
        }

        if !job.is_complete() {
            let result = self.fetch_chunks(job, cancel).await;
            if let Err(e) = result {
                job.transition(DownloadState::Aborted)?;
                if e.is_integrity() {
                    remove_file(&job.temp_path).await?;
                }
                return Err(e);
            }
        }

        job.transition(DownloadState::Verifying)?;
        let checksum = self.verify(job).await?;

        tokio::fs::rename(&job.temp_path, &job.final_path)
            .await
            .map_err(|source| DownloadError::Io {
                path: job.final_path.clone(),
                source,
            })?;
        job.transition(DownloadState::Promoted)?;

        Ok(DownloadOutcome {
            path: job.final_path.clone(),
            bytes: job.committed_offset,
            checksum,
            resumed_from,
            already_present: false,
        })
    }

    /// A final file that verifies (or needs no verification) short-circuits the job
    async fn already_present(&self, job: &DownloadJob) -> Option<DownloadOutcome> {
        let bytes = tokio::fs::metadata(&job.final_path).await.ok()?.len();
        let checksum = match &job.expected_checksum {
            Some(expected) => Some(
                self.verifier
                    .verify_file(&job.final_path, expected)
                    .await
                    .ok()?,
            ),
            None => None,
        };

        tracing::info!("{} already present, skipping", job.final_path.display());
        Some(DownloadOutcome {
            path: job.final_path.clone(),
            bytes,
            checksum,
            resumed_from: 0,
            already_present: true,
        })
    }

    /// HEAD request for the total size; any failure but a redirect violation means unknown
    async fn fetch_remote_size(
        &self,
        client: &Client,
        url: &Url,
    ) -> Result<Option<u64>, DownloadError> {
        let response = match client
            .head(url.clone())
            .timeout(self.config.chunk_timeout())
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                if let Some(violation) = redirect_violation(&e) {
                    return Err(DownloadError::RedirectRejected(violation));
                }
                tracing::debug!("HEAD {} failed: {}", url, e);
                return Ok(None);
            }
        };

        if !response.status().is_success() {
            tracing::debug!("HEAD {} returned {}", url, response.status());
            return Ok(None);
        }

        // reqwest reports the (empty) body length for HEAD, so read the header
        let size = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .filter(|&n| n > 0);
        Ok(size)
    }

    async fn fetch_chunks(
        &self,
        job: &mut DownloadJob,
        cancel: &CancellationToken,
    ) -> Result<(), DownloadError> {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .open(&job.temp_path)
            .await
            .map_err(|source| DownloadError::Io {
                path: job.temp_path.clone(),
                source,
            })?;
        let attempts = self.config.chunk_retries.max(1);
        let chunk_size = self.config.chunk_size.max(1);

        loop {
            let start = job.committed_offset;
            let end = match job.total_size {
                Some(total) if start >= total => return Ok(()),
                Some(total) => (start + chunk_size - 1).min(total - 1),
                None => start + chunk_size - 1,
            };
            let requested = end - start + 1;

            let mut attempt = 0;
            let outcome = loop {
                attempt += 1;
                job.transition(DownloadState::ChunkInProgress {
                    start,
                    end: Some(end),
                })?;

                let result = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Err(DownloadError::Cancelled),
                    r = self.fetch_chunk(&mut file, job, start, end) => r,
                };

                match result {
                    Ok(outcome) => break outcome,
                    Err(e) => {
                        rollback(&mut file, &job.temp_path, start).await?;

                        if !e.is_retryable() {
                            return Err(e);
                        }
                        if attempt >= attempts {
                            return Err(DownloadError::RetriesExhausted {
                                start,
                                attempts: attempt,
                                source: Box::new(e),
                            });
                        }

                        tracing::warn!(
                            "Chunk {}-{} of {} failed (attempt {}/{}): {}",
                            start,
                            end,
                            job.target_filename,
                            attempt,
                            attempts,
                            e
                        );
                        tokio::select! {
                            _ = cancel.cancelled() => return Err(DownloadError::Cancelled),
                            _ = tokio::time::sleep(self.config.chunk_retry_delay()) => {}
                        }
                    }
                }
            };

            match outcome {
                ChunkOutcome::Written(written) => {
                    job.committed_offset = start + written;
                    job.transition(DownloadState::ChunkComplete {
                        offset: job.committed_offset,
                    })?;
                    if job.total_size.is_none() && written < requested {
                        return Ok(());
                    }
                }
                ChunkOutcome::EndOfStream => {
                    job.transition(DownloadState::ChunkComplete { offset: start })?;
                    return Ok(());
                }
                ChunkOutcome::WholeBody(written) => {
                    job.committed_offset = written;
                    job.total_size = Some(written);
                    job.transition(DownloadState::ChunkComplete { offset: written })?;
                    return Ok(());
                }
            }
        }
    }

    /// One ranged GET for `[start, end]`, written at `start` and fsynced
    async fn fetch_chunk(
        &self,
        file: &mut File,
        job: &DownloadJob,
        start: u64,
        end: u64,
    ) -> Result<ChunkOutcome, DownloadError> {
        let url = &job.source_url;
        let total = job.total_size;
        // Re-read per attempt so a rotation mid-download takes effect
        let client = self.identity.current().download_client().clone();
        let response = client
            .get(url.clone())
            .header(RANGE, range_header(start, Some(end)))
            .timeout(self.config.chunk_timeout())
            .send()
            .await
            .map_err(DownloadError::from_reqwest)?;

        let status = response.status();
        let requested = end - start + 1;

        match status {
            StatusCode::PARTIAL_CONTENT => {
                let header = response
                    .headers()
                    .get(CONTENT_RANGE)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                let range = header.as_deref().and_then(parse_content_range);
                let consistent = match (range, total) {
                    (Some(r), Some(t)) => r.start == start && r.total.map_or(true, |rt| rt == t),
                    (Some(r), None) => r.start == start,
                    (None, _) => false,
                };
                if !consistent {
                    return Err(DownloadError::ContentRangeMismatch {
                        expected: start,
                        got: header,
                    });
                }

                let written = write_body(file, &job.temp_path, response, start, Some(requested)).await?;
                if total.is_some() && written < requested {
                    return Err(DownloadError::ShortChunk {
                        start,
                        expected: requested,
                        got: written,
                    });
                }
                Ok(ChunkOutcome::Written(written))
            }
            StatusCode::OK if start == 0 => {
                tracing::debug!("{} ignored the Range header, taking the whole body", url);
                let written = write_body(file, &job.temp_path, response, 0, None).await?;
                match total {
                    Some(t) if written != t => Err(DownloadError::ShortChunk {
                        start,
                        expected: t,
                        got: written,
                    }),
                    _ => Ok(ChunkOutcome::WholeBody(written)),
                }
            }
            StatusCode::OK => Err(DownloadError::RangeIgnored(start)),
            StatusCode::RANGE_NOT_SATISFIABLE if start > 0 && total.is_none() => {
                Ok(ChunkOutcome::EndOfStream)
            }
            other => Err(DownloadError::HttpStatus {
                status: other.as_u16(),
                start,
            }),
        }
    }

    /// Verifies the finished temp file; a mismatch removes it
    async fn verify(&self, job: &mut DownloadJob) -> Result<Option<String>, DownloadError> {
        let Some(expected) = job.expected_checksum.clone() else {
            tracing::debug!(
                "No checksum for {}, skipping verification",
                job.target_filename
            );
            return Ok(None);
        };

        match self.verifier.verify_file(&job.temp_path, &expected).await {
            Ok(actual) => Ok(Some(actual)),
            Err(e) => {
                if matches!(e, ChecksumError::Mismatch { .. }) {
                    remove_file(&job.temp_path).await?;
                    job.transition(DownloadState::Discarded)?;
                } else {
                    job.transition(DownloadState::Aborted)?;
                }
                Err(e.into())
            }
        }
    }

    fn record(&self, job: &DownloadJob, outcome: Option<&DownloadOutcome>) {
        let Some(ledger) = &self.ledger else {
            return;
        };

        let record = ArtifactRecord {
            source_url: job.source_url.to_string(),
            path: job.final_path.display().to_string(),
            bytes: outcome.map_or(job.committed_offset, |o| o.bytes),
            checksum: outcome
                .and_then(|o| o.checksum.clone())
                .or_else(|| job.expected_checksum.clone()),
            state: job.state().label().to_string(),
            recorded_at: chrono::Utc::now(),
        };
        if let Err(e) = ledger.record_artifact(&record) {
            tracing::warn!("Failed to record artifact {}: {}", record.path, e);
        }
    }
}

/// Last path segment of a URL, unless it names a script
fn name_from_url(url: &Url) -> Option<String> {
    let segment = url.path_segments()?.last()?.to_string();
    let is_script = [".php", ".asp", ".aspx", ".cgi", ".jsp"]
        .iter()
        .any(|ext| segment.to_ascii_lowercase().ends_with(ext));
    if segment.is_empty() || is_script {
        None
    } else {
        Some(segment)
    }
}

async fn file_len(path: &Path) -> Result<u64, DownloadError> {
    match tokio::fs::metadata(path).await {
        Ok(meta) => Ok(meta.len()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
        Err(source) => Err(DownloadError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

async fn remove_file(path: &Path) -> Result<(), DownloadError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(DownloadError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Streams a response body into `file` at `offset`, at most `limit` bytes
async fn write_body(
    file: &mut File,
    path: &Path,
    response: reqwest::Response,
    offset: u64,
    limit: Option<u64>,
) -> Result<u64, DownloadError> {
    let io_err = |source| DownloadError::Io {
        path: path.to_path_buf(),
        source,
    };

    if offset == 0 && limit.is_none() {
        file.set_len(0).await.map_err(io_err)?;
    }
    file.seek(SeekFrom::Start(offset)).await.map_err(io_err)?;

    let mut written: u64 = 0;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let bytes = chunk.map_err(DownloadError::from_reqwest)?;
        let take = match limit {
            Some(limit) => (limit - written).min(bytes.len() as u64) as usize,
            None => bytes.len(),
        };
        file.write_all(&bytes[..take]).await.map_err(io_err)?;
        written += take as u64;
        if limit.is_some_and(|limit| written >= limit) {
            break;
        }
    }

    file.flush().await.map_err(io_err)?;
    file.sync_all().await.map_err(io_err)?;
    Ok(written)
}

/// Truncates a partially written chunk back to its start
async fn rollback(file: &mut File, path: &Path, start: u64) -> Result<(), DownloadError> {
    let io_err = |source| DownloadError::Io {
        path: path.to_path_buf(),
        source,
    };
    file.set_len(start).await.map_err(io_err)?;
    file.sync_all().await.map_err(io_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{IdentityEpoch, TransportSettings};

    fn manager(config: DownloadConfig) -> DownloadManager {
        let settings = TransportSettings::direct(&config);
        let epoch = IdentityEpoch::build(0, &settings).unwrap();
        DownloadManager::new(Arc::new(SharedIdentity::new(epoch)), config)
    }

    fn request(url: &str) -> DownloadRequest {
        DownloadRequest::new(Url::parse(url).unwrap())
    }

    #[test]
    fn test_prepare_job_takes_checksum_from_query() {
        let manager = manager(DownloadConfig::default());
        let job = manager.prepare_job(&request("https://libgen.li/get.php?md5=ABC123&key=1"));

        assert_eq!(job.expected_checksum.as_deref(), Some("ABC123"));
        assert_eq!(job.target_filename, "ABC123");
    }

    #[test]
    fn test_prepare_job_prefers_explicit_values() {
        let manager = manager(DownloadConfig::default());
        let job = manager.prepare_job(
            &request("https://libgen.li/get.php?md5=abc")
                .with_filename("../My Book.pdf")
                .with_checksum("def"),
        );

        assert_eq!(job.target_filename, "My_Book.pdf");
        assert_eq!(job.expected_checksum.as_deref(), Some("def"));
        assert!(job.temp_path.ends_with("My_Book.pdf.download.tmp"));
    }

    #[test]
    fn test_prepare_job_uses_url_segment() {
        let manager = manager(DownloadConfig::default());
        let job = manager.prepare_job(&request("https://cdn.booksdl.lc/files/report.pdf"));
        assert_eq!(job.target_filename, "report.pdf");
        assert_eq!(job.expected_checksum, None);
    }

    #[test]
    fn test_claim_target_is_exclusive() {
        let manager = manager(DownloadConfig::default());
        let path = PathBuf::from("/tmp/veil/a.pdf");

        let guard = manager.claim_target(&path).unwrap();
        assert!(matches!(
            manager.claim_target(&path),
            Err(DownloadError::TargetBusy(_))
        ));
        drop(guard);
        assert!(manager.claim_target(&path).is_ok());
    }

    #[test]
    fn test_error_classification() {
        assert!(DownloadError::HttpStatus { status: 503, start: 0 }.is_retryable());
        assert!(DownloadError::HttpStatus { status: 429, start: 0 }.is_retryable());
        assert!(!DownloadError::HttpStatus { status: 404, start: 0 }.is_retryable());
        assert!(!DownloadError::RangeIgnored(10).is_retryable());
        assert!(DownloadError::RangeIgnored(10).is_integrity());
        assert!(DownloadError::Checksum(ChecksumError::UnknownFormat("abc".into())).is_integrity());
        assert!(DownloadError::ShortChunk {
            start: 0,
            expected: 10,
            got: 5
        }
        .is_retryable());
    }

    #[tokio::test]
    async fn test_unrecognized_checksum_fails_before_fetching() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(DownloadConfig {
            directory: dir.path().display().to_string(),
            ..Default::default()
        });
        // Nothing listens here; any network attempt would surface as Transport
        let req = request("http://127.0.0.1:9/get.php?md5=abc");
        let job = manager.prepare_job(&req);
        std::fs::write(&job.temp_path, b"stale bytes").unwrap();

        let err = manager
            .download(req, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(
            matches!(err, DownloadError::Checksum(ChecksumError::UnknownFormat(ref c)) if c == "abc"),
            "{err:?}"
        );
        assert!(!job.temp_path.exists());
        assert!(!job.final_path.exists());
    }

    #[test]
    fn test_gate_size() {
        let config = DownloadConfig {
            max_concurrent: 2,
            ..Default::default()
        };
        assert_eq!(manager(config).available_slots(), 2);
    }
}
