//! Content-addressed result store.
//!
//! Layout is a flat directory: per digest one stem file `<digest>.<stem_ext>`
//! (a verbatim copy of the upload) and part files `<digest>.<index>.<ext>`.
//! Presence of the stem file is the sole cache-hit criterion, so the stem is
//! always written last.

use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, info, warn};

use crate::config::SeparationConfig;
use crate::digest::ContentDigest;

/// Extension of the cached stem file.
pub const STEM_EXTENSION: &str = "wav";

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("failed to move {source_path} to {destination}: {error}")]
    MoveFailed {
        source_path: PathBuf,
        destination: PathBuf,
        #[source]
        error: std::io::Error,
    },

    #[error("separator produced {produced} file(s), expected {expected}")]
    MissingParts { expected: usize, produced: usize },

    #[error("failed to copy stem {source_path} to {destination}: {error}")]
    CopyFailed {
        source_path: PathBuf,
        destination: PathBuf,
        #[source]
        error: std::io::Error,
    },
}

/// Files known for one digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub digest: ContentDigest,
    pub stem_path: PathBuf,
    pub part_paths: Vec<PathBuf>,
}

impl CacheEntry {
    /// Part file names as exposed under the static serving path.
    pub fn part_filenames(&self) -> Vec<String> {
        self.part_paths
            .iter()
            .filter_map(|p| p.file_name())
            .map(|name| name.to_string_lossy().into_owned())
            .collect()
    }
}

/// The output directory viewed as a cache.
#[derive(Debug, Clone)]
pub struct ResultCache {
    dir: PathBuf,
    part_extension: String,
    part_count: usize,
}

impl ResultCache {
    pub fn new(dir: impl Into<PathBuf>, separation: &SeparationConfig) -> Self {
        Self {
            dir: dir.into(),
            part_extension: separation.output_format.clone(),
            part_count: separation.part_count,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn stem_path(&self, digest: &ContentDigest) -> PathBuf {
        self.dir.join(format!("{}.{}", digest, STEM_EXTENSION))
    }

    pub fn part_path(&self, digest: &ContentDigest, index: usize) -> PathBuf {
        self.dir
            .join(format!("{}.{}.{}", digest, index, self.part_extension))
    }

    /// The entry for `digest` if its stem file exists. Part files are assumed
    /// to exist alongside it and are not checked.
    pub async fn lookup(&self, digest: &ContentDigest) -> Option<CacheEntry> {
        let stem_path = self.stem_path(digest);
        match fs::try_exists(&stem_path).await {
            Ok(true) => Some(CacheEntry {
                digest: digest.clone(),
                stem_path,
                part_paths: (0..self.part_count)
                    .map(|i| self.part_path(digest, i))
                    .collect(),
            }),
            Ok(false) => None,
            Err(e) => {
                warn!("Cache lookup for {} failed, treating as miss: {}", digest, e);
                None
            }
        }
    }

    /// Materialize a fresh separation.
    ///
    /// Produced files are renamed into canonical part names in the order
    /// given; files beyond the configured part count are discarded. Then the
    /// stem is copied from `stem_source`; that copy is best effort and its
    /// failure only means the next identical upload recomputes.
    pub async fn store(
        &self,
        digest: &ContentDigest,
        stem_source: &Path,
        produced: &[PathBuf],
    ) -> Result<CacheEntry, CacheError> {
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|error| CacheError::MoveFailed {
                source_path: stem_source.to_path_buf(),
                destination: self.dir.clone(),
                error,
            })?;

        if produced.len() < self.part_count {
            return Err(CacheError::MissingParts {
                expected: self.part_count,
                produced: produced.len(),
            });
        }

        let (parts, extra) = produced.split_at(self.part_count);
        for source in extra {
            warn!("Discarding unexpected separator output {:?}", source);
            if let Err(e) = fs::remove_file(source).await {
                warn!("Failed to remove {:?}: {}", source, e);
            }
        }

        let mut part_paths = Vec::with_capacity(parts.len());
        for (index, source) in parts.iter().enumerate() {
            let destination = self.part_path(digest, index);
            place_part(source, &destination).await?;
            part_paths.push(destination);
        }

        let stem_path = self.stem_path(digest);
        if let Err(e) = copy_stem(stem_source, &stem_path).await {
            warn!("Could not cache stem for {}: {}", digest, e);
        }

        info!("Stored {} part(s) for {}", part_paths.len(), digest);
        Ok(CacheEntry {
            digest: digest.clone(),
            stem_path,
            part_paths,
        })
    }
}

/// Rename `source` onto `destination`. An existing destination wins and the
/// new file is discarded.
async fn place_part(source: &Path, destination: &Path) -> Result<(), CacheError> {
    let move_failed = |error| CacheError::MoveFailed {
        source_path: source.to_path_buf(),
        destination: destination.to_path_buf(),
        error,
    };

    if fs::try_exists(destination).await.map_err(move_failed)? {
        debug!(
            "{:?} already exists, discarding duplicate {:?}",
            destination, source
        );
        if let Err(e) = fs::remove_file(source).await {
            warn!("Failed to discard duplicate part {:?}: {}", source, e);
        }
        return Ok(());
    }

    match fs::rename(source, destination).await {
        Ok(()) => Ok(()),
        // Cross-filesystem moves fail with EXDEV; fall back to copy + remove.
        Err(e) if e.kind() == std::io::ErrorKind::CrossesDevices || e.raw_os_error() == Some(18) => {
            fs::copy(source, destination).await.map_err(move_failed)?;
            if let Err(e) = fs::remove_file(source).await {
                warn!("Failed to remove {:?} after copy: {}", source, e);
            }
            Ok(())
        }
        Err(e) => Err(move_failed(e)),
    }
}

/// Copy via a sibling temp name so the stem never appears half-written.
async fn copy_stem(source: &Path, destination: &Path) -> Result<(), CacheError> {
    if fs::try_exists(destination).await.unwrap_or(false) {
        return Ok(());
    }

    let partial = destination.with_extension("partial");
    let copy_failed = |error| CacheError::CopyFailed {
        source_path: source.to_path_buf(),
        destination: destination.to_path_buf(),
        error,
    };

    fs::copy(source, &partial).await.map_err(copy_failed)?;
    if let Err(e) = fs::rename(&partial, destination).await {
        let _ = fs::remove_file(&partial).await;
        return Err(copy_failed(e));
    }
    Ok(())
}
