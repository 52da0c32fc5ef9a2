//! Upload spooling.
//!
//! An [`UploadSession`] owns one temp file (and, once a job runs, one scratch
//! directory for raw model output). Both are removed when the session is
//! closed, and again on drop if the owning task never got that far.

use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs::{self, File};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt, BufWriter};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::digest::{ContentHasher, HashedContent};

/// Extension assumed when the client declares none.
pub const DEFAULT_EXTENSION: &str = "wav";

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("failed to create upload spool in {path}: {source}")]
    Spool {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read upload: {0}")]
    Read(#[source] std::io::Error),

    #[error("failed to write upload to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Reduce a client-supplied filename to a safe lowercase extension.
pub fn sanitize_extension(filename: Option<&str>) -> String {
    filename
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.len() <= 8)
        .filter(|ext| ext.bytes().all(|b| b.is_ascii_alphanumeric()))
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_else(|| DEFAULT_EXTENSION.to_string())
}

/// One in-flight upload.
#[derive(Debug)]
pub struct UploadSession {
    path: PathBuf,
    scratch_dir: PathBuf,
    extension: String,
    released: bool,
}

impl UploadSession {
    /// Create the spool file under `dir`. The file is named by a fresh UUID and
    /// keeps the declared extension so decoders can sniff the container.
    pub async fn create(dir: &Path, extension: &str) -> Result<Self, UploadError> {
        fs::create_dir_all(dir)
            .await
            .map_err(|source| UploadError::Spool {
                path: dir.to_path_buf(),
                source,
            })?;

        let id = Uuid::new_v4();
        let path = dir.join(format!("{}.{}", id, extension));
        let scratch_dir = dir.join(format!("{}.out", id));

        Ok(Self {
            path,
            scratch_dir,
            extension: extension.to_string(),
            released: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Directory handed to the separator for its raw output.
    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    /// Stream `reader` into the spool file in `chunk_bytes` chunks, hashing as
    /// it goes. `on_chunk` sees the cumulative byte count after every non-empty
    /// chunk.
    pub async fn ingest<R, F>(
        &mut self,
        reader: &mut R,
        chunk_bytes: usize,
        mut on_chunk: F,
    ) -> Result<HashedContent, UploadError>
    where
        R: AsyncRead + Unpin + ?Sized,
        F: FnMut(u64),
    {
        let file = File::create(&self.path)
            .await
            .map_err(|source| self.write_error(source))?;
        let mut writer = BufWriter::new(file);
        let mut hasher = ContentHasher::new();
        let mut buffer = vec![0u8; chunk_bytes];

        loop {
            let filled = fill_chunk(reader, &mut buffer).await?;
            if filled == 0 {
                break;
            }

            let chunk = &buffer[..filled];
            writer
                .write_all(chunk)
                .await
                .map_err(|source| self.write_error(source))?;
            let read = hasher.update(chunk);
            on_chunk(read);

            if filled < buffer.len() {
                break;
            }
        }

        writer
            .flush()
            .await
            .map_err(|source| self.write_error(source))?;

        let hashed = hasher.finalize();
        debug!(
            "Spooled {} bytes to {:?} (sha256 {})",
            hashed.bytes, self.path, hashed.digest
        );
        Ok(hashed)
    }

    /// Remove the spool file and scratch directory.
    pub async fn close(mut self) {
        remove_quietly(&self.path).await;
        if let Err(e) = fs::remove_dir_all(&self.scratch_dir).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove scratch dir {:?}: {}", self.scratch_dir, e);
            }
        }
        self.released = true;
    }

    fn write_error(&self, source: std::io::Error) -> UploadError {
        UploadError::Write {
            path: self.path.clone(),
            source,
        }
    }
}

impl Drop for UploadSession {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let _ = std::fs::remove_file(&self.path);
        let _ = std::fs::remove_dir_all(&self.scratch_dir);
    }
}

/// Read until `buffer` is full or the stream ends. Returns the bytes filled.
async fn fill_chunk<R>(reader: &mut R, buffer: &mut [u8]) -> Result<usize, UploadError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut filled = 0;
    while filled < buffer.len() {
        let n = reader
            .read(&mut buffer[filled..])
            .await
            .map_err(UploadError::Read)?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

async fn remove_quietly(path: &Path) {
    if let Err(e) = fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Failed to remove upload spool {:?}: {}", path, e);
        }
    }
}
