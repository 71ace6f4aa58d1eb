/// Download state definitions for tracking a transfer through its lifecycle
use std::fmt;

/// Represents the current state of a download job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DownloadState {
    // ===== Active States =====
    /// Job created, remote size not yet requested
    Pending,

    /// HEAD succeeded and reported the total size
    SizeKnown { total: u64 },

    /// Size unavailable; the body is streamed until a short read
    SizeUnknown,

    /// A ranged GET for `[start, end]` is being written
    ChunkInProgress { start: u64, end: Option<u64> },

    /// Bytes up to `offset` are written and fsynced
    ChunkComplete { offset: u64 },

    /// The temp file is being hashed
    Verifying,

    // ===== Terminal States =====
    /// Verified file renamed to its final path
    Promoted,

    /// The content cannot verify (bad digest or unusable checksum); the temp file was removed
    Discarded,

    /// Chunk retries exhausted or cancelled; the temp file is kept for resume
    Aborted,
}

impl DownloadState {
    /// Returns true if this is a terminal state (no further processing needed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Promoted | Self::Discarded | Self::Aborted)
    }

    /// Returns true if moving from `self` to `next` is a legal transition
    pub fn can_transition_to(&self, next: &DownloadState) -> bool {
        use DownloadState::*;

        if self.is_terminal() {
            return false;
        }
        if matches!(next, Aborted) {
            return true;
        }

        match (self, next) {
            (Pending, SizeKnown { .. } | SizeUnknown | Promoted | Discarded) => true,
            (SizeKnown { .. }, ChunkInProgress { .. } | Verifying) => true,
            (SizeUnknown, ChunkInProgress { .. }) => true,
            (ChunkInProgress { .. }, ChunkInProgress { .. } | ChunkComplete { .. }) => true,
            (ChunkComplete { .. }, ChunkInProgress { .. } | Verifying) => true,
            (Verifying, Promoted | Discarded) => true,
            _ => false,
        }
    }

    /// Short label used in logs and the artifact ledger
    pub fn label(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::SizeKnown { .. } => "size_known",
            Self::SizeUnknown => "size_unknown",
            Self::ChunkInProgress { .. } => "chunk_in_progress",
            Self::ChunkComplete { .. } => "chunk_complete",
            Self::Verifying => "verifying",
            Self::Promoted => "promoted",
            Self::Discarded => "discarded",
            Self::Aborted => "aborted",
        }
    }
}

impl fmt::Display for DownloadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SizeKnown { total } => write!(f, "size_known({} bytes)", total),
            Self::ChunkInProgress {
                start,
                end: Some(end),
            } => write!(f, "chunk_in_progress({}-{})", start, end),
            Self::ChunkInProgress { start, end: None } => {
                write!(f, "chunk_in_progress({}-)", start)
            }
            Self::ChunkComplete { offset } => write!(f, "chunk_complete({})", offset),
            other => f.write_str(other.label()),
        }
    }
}
