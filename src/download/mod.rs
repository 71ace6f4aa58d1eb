//! Resumable, checksum-verified artifact downloads
//!
//! # Components
//!
//! - `DownloadManager`: the chunked transfer protocol and admission gate
//! - `ChecksumVerifier`: MD5/SHA-256 digests of finished files
//! - `RedirectSafety`: the redirect policy installed on the download client
//! - filename and byte-range helpers

mod checksum;
mod filename;
mod job;
mod manager;
mod range;
mod redirect;

pub use checksum::{ChecksumAlgorithm, ChecksumError, ChecksumVerifier};
pub use filename::{fallback_filename, filename_from_content_disposition, sanitize_filename};
pub use job::{DownloadJob, DownloadOutcome, DownloadRequest, TEMP_SUFFIX};
pub use manager::{DownloadError, DownloadManager};
pub use range::{parse_content_range, range_header, ContentRange};
pub use redirect::{redirect_violation, RedirectSafety, RedirectViolation};
