use crate::download::DownloadError;
use crate::state::DownloadState;
use std::path::{Path, PathBuf};
use url::Url;

/// Suffix appended to the final filename while bytes are still arriving
pub const TEMP_SUFFIX: &str = ".download.tmp";

/// What the caller asks the manager to fetch
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub url: Url,

    /// Server-suggested name (usually from `Content-Disposition`), unsanitized
    pub filename: Option<String>,

    /// Hex digest the finished file must match
    pub expected_checksum: Option<String>,
}

impl DownloadRequest {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            filename: None,
            expected_checksum: None,
        }
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn with_checksum(mut self, checksum: impl Into<String>) -> Self {
        self.expected_checksum = Some(checksum.into());
        self
    }
}

/// One resumable transfer, exclusively owned by the task running it
#[derive(Debug)]
pub struct DownloadJob {
    pub source_url: Url,
    pub target_filename: String,
    pub expected_checksum: Option<String>,

    /// Remote size from HEAD, `None` in streaming mode
    pub total_size: Option<u64>,

    /// Bytes durably written to the temp file
    pub committed_offset: u64,

    pub temp_path: PathBuf,
    pub final_path: PathBuf,
    state: DownloadState,
}

impl DownloadJob {
    /// Creates a pending job; the temp path is derived from the final name
    pub fn new(
        source_url: Url,
        directory: &Path,
        target_filename: String,
        expected_checksum: Option<String>,
    ) -> Self {
        let final_path = directory.join(&target_filename);
        let temp_path = directory.join(format!("{}{}", target_filename, TEMP_SUFFIX));

        Self {
            source_url,
            target_filename,
            expected_checksum,
            total_size: None,
            committed_offset: 0,
            temp_path,
            final_path,
            state: DownloadState::Pending,
        }
    }

    pub fn state(&self) -> DownloadState {
        self.state
    }

    /// Moves the job to `next`, refusing transitions the lifecycle forbids
    pub fn transition(&mut self, next: DownloadState) -> Result<(), DownloadError> {
        if !self.state.can_transition_to(&next) {
            return Err(DownloadError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }

        tracing::trace!(
            "{}: {} -> {}",
            self.target_filename,
            self.state.label(),
            next.label()
        );
        self.state = next;
        Ok(())
    }

    /// True once every byte of a known-size file is committed
    pub fn is_complete(&self) -> bool {
        matches!(self.total_size, Some(total) if self.committed_offset >= total)
    }
}

/// Result of a finished download
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadOutcome {
    pub path: PathBuf,
    pub bytes: u64,

    /// Verified digest, `None` when no checksum was expected
    pub checksum: Option<String>,

    /// Offset the transfer resumed from (0 for a fresh download)
    pub resumed_from: u64,

    /// The verified file was already on disk; nothing was fetched
    pub already_present: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> DownloadJob {
        DownloadJob::new(
            Url::parse("https://libgen.li/get.php?md5=abc").unwrap(),
            Path::new("/tmp/veil"),
            "book.pdf".to_string(),
            Some("abc".to_string()),
        )
    }

    #[test]
    fn test_paths_are_derived_from_filename() {
        let job = job();
        assert_eq!(job.final_path, PathBuf::from("/tmp/veil/book.pdf"));
        assert_eq!(
            job.temp_path,
            PathBuf::from("/tmp/veil/book.pdf.download.tmp")
        );
        assert_eq!(job.state(), DownloadState::Pending);
    }

    #[test]
    fn test_transition_enforces_lifecycle() {
        let mut job = job();
        job.transition(DownloadState::SizeKnown { total: 10 }).unwrap();
        assert!(matches!(
            job.transition(DownloadState::Promoted),
            Err(DownloadError::InvalidTransition { .. })
        ));
        job.transition(DownloadState::Verifying).unwrap();
        job.transition(DownloadState::Promoted).unwrap();
        assert!(job.state().is_terminal());
    }

    #[test]
    fn test_is_complete() {
        let mut job = job();
        assert!(!job.is_complete());
        job.total_size = Some(100);
        job.committed_offset = 100;
        assert!(job.is_complete());
    }

    #[test]
    fn test_request_builder() {
        let request = DownloadRequest::new(Url::parse("https://libgen.li/get.php").unwrap())
            .with_filename("a.pdf")
            .with_checksum("ABC");
        assert_eq!(request.filename.as_deref(), Some("a.pdf"));
        assert_eq!(request.expected_checksum.as_deref(), Some("ABC"));
    }
}
