use md5::Md5;
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;

const READ_BUFFER: usize = 64 * 1024;

/// Digest algorithms recognized from the expected checksum's length
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumAlgorithm {
    Md5,
    Sha256,
}

impl ChecksumAlgorithm {
    /// Infers the algorithm from a hex digest (32 chars MD5, 64 chars SHA-256)
    pub fn for_hex_digest(digest: &str) -> Option<Self> {
        let digest = digest.trim();
        if !digest.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        match digest.len() {
            32 => Some(Self::Md5),
            64 => Some(Self::Sha256),
            _ => None,
        }
    }
}

/// Errors raised while verifying an artifact
#[derive(Debug, Error)]
pub enum ChecksumError {
    #[error("Checksum mismatch for {path}: expected {expected}, got {actual}")]
    Mismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("Unrecognized checksum format: '{0}'")]
    UnknownFormat(String),

    #[error("IO error while hashing {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Computes and compares content digests
#[derive(Debug, Clone, Copy, Default)]
pub struct ChecksumVerifier;

impl ChecksumVerifier {
    pub fn new() -> Self {
        Self
    }

    /// Hex digest of an in-memory buffer
    pub fn digest_bytes(algorithm: ChecksumAlgorithm, bytes: &[u8]) -> String {
        match algorithm {
            ChecksumAlgorithm::Md5 => hex::encode(Md5::digest(bytes)),
            ChecksumAlgorithm::Sha256 => hex::encode(Sha256::digest(bytes)),
        }
    }

    /// Case-insensitive comparison of two hex digests
    pub fn matches(expected: &str, actual: &str) -> bool {
        expected.trim().eq_ignore_ascii_case(actual.trim())
    }

    /// Hex digest of a file, computed on the blocking pool
    pub async fn digest_file(
        &self,
        path: &Path,
        algorithm: ChecksumAlgorithm,
    ) -> Result<String, ChecksumError> {
        let owned = path.to_path_buf();
        tokio::task::spawn_blocking(move || hash_file(&owned, algorithm))
            .await
            .map_err(|e| ChecksumError::Io {
                path: path.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::Other, e),
            })?
    }

    /// Verifies a file against an expected hex digest
    ///
    /// # Returns
    ///
    /// * `Ok(String)` - The computed digest, equal to `expected` ignoring case
    /// * `Err(ChecksumError::Mismatch)` - The file does not match
    pub async fn verify_file(&self, path: &Path, expected: &str) -> Result<String, ChecksumError> {
        let algorithm = ChecksumAlgorithm::for_hex_digest(expected)
            .ok_or_else(|| ChecksumError::UnknownFormat(expected.to_string()))?;

        let actual = self.digest_file(path, algorithm).await?;
        if Self::matches(expected, &actual) {
            Ok(actual)
        } else {
            Err(ChecksumError::Mismatch {
                path: path.to_path_buf(),
                expected: expected.to_lowercase(),
                actual,
            })
        }
    }
}

fn hash_file(path: &Path, algorithm: ChecksumAlgorithm) -> Result<String, ChecksumError> {
    let io_err = |source| ChecksumError::Io {
        path: path.to_path_buf(),
        source,
    };

    let mut file = std::fs::File::open(path).map_err(io_err)?;
    let mut buffer = vec![0u8; READ_BUFFER];

    match algorithm {
        ChecksumAlgorithm::Md5 => {
            let mut hasher = Md5::new();
            loop {
                let n = file.read(&mut buffer).map_err(io_err)?;
                if n == 0 {
                    break;
                }
                hasher.update(&buffer[..n]);
            }
            Ok(hex::encode(hasher.finalize()))
        }
        ChecksumAlgorithm::Sha256 => {
            let mut hasher = Sha256::new();
            loop {
                let n = file.read(&mut buffer).map_err(io_err)?;
                if n == 0 {
                    break;
                }
                hasher.update(&buffer[..n]);
            }
            Ok(hex::encode(hasher.finalize()))
        }
    }
}
