//! Content digests for uploaded audio.
//!
//! A digest is the lowercase hex SHA-256 of the upload bytes. It is the cache
//! key and the root of every output filename, so it is also the only piece of
//! client input that ever becomes part of a path.

use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Length of a hex-encoded SHA-256 digest.
pub const DIGEST_HEX_LEN: usize = 64;

/// Why a client-supplied digest was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DigestParseError {
    #[error("digest is empty")]
    Empty,

    #[error("digest must contain only lowercase hex characters")]
    NotLowercaseHex,

    #[error("digest must be 64 characters, got {0}")]
    BadLength(usize),
}

/// A validated, lowercase hex SHA-256 digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentDigest(String);

impl ContentDigest {
    /// Digest of a byte slice in one shot.
    pub fn of(bytes: &[u8]) -> Self {
        let mut hasher = ContentHasher::new();
        hasher.update(bytes);
        hasher.finalize().digest
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for ContentDigest {
    type Err = DigestParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(DigestParseError::Empty);
        }
        // Checked before length so that traversal attempts get the charset error.
        if !s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
            return Err(DigestParseError::NotLowercaseHex);
        }
        if s.len() != DIGEST_HEX_LEN {
            return Err(DigestParseError::BadLength(s.len()));
        }
        Ok(Self(s.to_string()))
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Result of hashing a complete upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashedContent {
    pub digest: ContentDigest,
    pub bytes: u64,
}

/// Incremental hasher fed chunk by chunk in arrival order.
///
/// Chunk boundaries do not affect the result.
#[derive(Debug, Clone, Default)]
pub struct ContentHasher {
    hasher: Sha256,
    bytes: u64,
}

impl ContentHasher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one chunk into the digest. Returns the cumulative byte count.
    pub fn update(&mut self, chunk: &[u8]) -> u64 {
        self.hasher.update(chunk);
        self.bytes += chunk.len() as u64;
        self.bytes
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes
    }

    pub fn finalize(self) -> HashedContent {
        HashedContent {
            digest: ContentDigest(format!("{:x}", self.hasher.finalize())),
            bytes: self.bytes,
        }
    }
}
