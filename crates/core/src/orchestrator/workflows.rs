//! Separate and Align workflows.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::io::AsyncRead;
use tracing::{error, info, warn};

use super::types::{JobOutcome, PreparedAlignment, RejectReason};
use crate::alignment::{AlignableCharset, AlignmentTask, ReferenceTrack};
use crate::cache::{CacheEntry, ResultCache};
use crate::config::Config;
use crate::digest::ContentDigest;
use crate::gate::{AdmissionGate, AdmissionPermit};
use crate::metrics::{CACHE_LOOKUPS, JOBS_TOTAL, UPLOAD_BYTES};
use crate::model::{Aligner, Separator};
use crate::progress::{EventPayload, ProgressSink};
use crate::runner::{JobKind, JobRunner};
use crate::upload::UploadSession;

/// Process-scoped owner of the cache, the gate and the models.
///
/// Built once at startup and shared by reference with every request.
pub struct Orchestrator {
    cache: ResultCache,
    gate: AdmissionGate,
    runner: JobRunner,
    separator: Arc<dyn Separator>,
    aligner: Arc<dyn Aligner>,
    upload_dir: PathBuf,
    chunk_bytes: usize,
    charset: AlignableCharset,
    vocals_part: usize,
    instrumental_part: usize,
}

impl Orchestrator {
    pub fn new(config: &Config, separator: Arc<dyn Separator>, aligner: Arc<dyn Aligner>) -> Self {
        Self {
            cache: ResultCache::new(&config.storage.data_dir, &config.separation),
            gate: AdmissionGate::new(),
            runner: JobRunner::from_config(&config.jobs),
            separator,
            aligner,
            upload_dir: config.storage.upload_dir(),
            chunk_bytes: config.jobs.upload_chunk_bytes,
            charset: AlignableCharset::new(&config.alignment.alignable_chars),
            vocals_part: config.alignment.vocals_part,
            instrumental_part: config.alignment.instrumental_part,
        }
    }

    /// Create the output and upload directories.
    pub async fn prepare(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(self.cache.dir()).await?;
        tokio::fs::create_dir_all(&self.upload_dir).await?;
        info!(
            "Storage ready (data: {:?}, uploads: {:?}, separator: {}, aligner: {})",
            self.cache.dir(),
            self.upload_dir,
            self.separator.name(),
            self.aligner.name()
        );
        Ok(())
    }

    pub fn gate(&self) -> &AdmissionGate {
        &self.gate
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    // =========================================================================
    // Separate
    // =========================================================================

    /// Run the Separate workflow over `upload`.
    ///
    /// The spooled upload is removed before this returns, whichever branch
    /// was taken.
    pub async fn separate<R>(&self, upload: &mut R, extension: &str, sink: &ProgressSink) -> JobOutcome
    where
        R: AsyncRead + Unpin + Send + ?Sized,
    {
        sink.emit(EventPayload::Init);

        let outcome = match UploadSession::create(&self.upload_dir, extension).await {
            Ok(mut session) => {
                let outcome = self.separate_session(&mut session, upload, sink).await;
                session.close().await;
                outcome
            }
            Err(e) => {
                error!("Cannot accept upload: {}", e);
                sink.emit(EventPayload::Error {
                    hash: None,
                    error: e.to_string(),
                });
                JobOutcome::Failed
            }
        };

        record(JobKind::Separate, outcome);
        outcome
    }

    async fn separate_session<R>(
        &self,
        session: &mut UploadSession,
        upload: &mut R,
        sink: &ProgressSink,
    ) -> JobOutcome
    where
        R: AsyncRead + Unpin + Send + ?Sized,
    {
        let hashed = match session
            .ingest(upload, self.chunk_bytes, |read| {
                sink.emit(EventPayload::LoadProgress { read })
            })
            .await
        {
            Ok(hashed) => hashed,
            Err(e) => {
                warn!("Upload failed: {}", e);
                sink.emit(EventPayload::Error {
                    hash: None,
                    error: e.to_string(),
                });
                return JobOutcome::Failed;
            }
        };

        UPLOAD_BYTES.inc_by(hashed.bytes);
        let digest = hashed.digest;
        let hash = digest.to_string();
        sink.emit(EventPayload::LoadComplete {
            read: hashed.bytes,
            sha256: hash.clone(),
        });

        if let Some(entry) = self.cache.lookup(&digest).await {
            CACHE_LOOKUPS.with_label_values(&["hit"]).inc();
            info!("Cache hit for {}", digest);
            sink.emit(results(&entry, true));
            return JobOutcome::Cached;
        }
        CACHE_LOOKUPS.with_label_values(&["miss"]).inc();

        let Some(_permit) = self.admit(&hash, sink).await else {
            return JobOutcome::Failed;
        };

        let separator = Arc::clone(&self.separator);
        let input = session.path().to_path_buf();
        let scratch = session.scratch_dir().to_path_buf();
        let result = self
            .runner
            .run(
                JobKind::Separate,
                move || separator.separate(&input, &scratch),
                || sink.emit(EventPayload::InferProgress),
            )
            .await;
        sink.emit(EventPayload::InferComplete { hash: hash.clone() });

        let produced = match result {
            Ok(produced) => produced,
            Err(e) => {
                error!("Separation of {} failed: {}", digest, e);
                sink.emit(EventPayload::Error {
                    hash: Some(hash),
                    error: e.to_string(),
                });
                return JobOutcome::Failed;
            }
        };

        // Still holding the slot: no other job touches the output directory.
        match self.cache.store(&digest, session.path(), &produced).await {
            Ok(entry) => {
                info!("Separated {}", digest);
                sink.emit(results(&entry, false));
                JobOutcome::Completed
            }
            Err(e) => {
                error!("Failed to materialize results for {}: {}", digest, e);
                sink.emit(EventPayload::Error {
                    hash: Some(hash),
                    error: e.to_string(),
                });
                JobOutcome::Failed
            }
        }
    }

    // =========================================================================
    // Align
    // =========================================================================

    /// Validate `task` against the cache. Nothing is queued or streamed when
    /// this fails.
    pub async fn prepare_alignment(
        &self,
        task: &AlignmentTask,
    ) -> Result<PreparedAlignment, RejectReason> {
        let digest: ContentDigest = task.input_hash.parse()?;
        let reference: ReferenceTrack = task.reference.parse()?;
        let entry = self
            .cache
            .lookup(&digest)
            .await
            .ok_or_else(|| RejectReason::NotCached(digest.to_string()))?;

        let audio_path = match reference {
            ReferenceTrack::Vocals => self.cache.part_path(&digest, self.vocals_part),
            ReferenceTrack::Instrumental => self.cache.part_path(&digest, self.instrumental_part),
            ReferenceTrack::Combined => entry.stem_path,
        };

        Ok(PreparedAlignment {
            request: task.to_request(audio_path, &self.charset),
            digest,
            reference,
        })
    }

    /// Run the Align workflow for an already validated task.
    pub async fn align(&self, prepared: PreparedAlignment, sink: &ProgressSink) -> JobOutcome {
        sink.emit(EventPayload::Init);
        let outcome = self.align_inner(prepared, sink).await;
        record(JobKind::Align, outcome);
        outcome
    }

    async fn align_inner(&self, prepared: PreparedAlignment, sink: &ProgressSink) -> JobOutcome {
        let hash = prepared.digest.to_string();
        let Some(_permit) = self.admit(&hash, sink).await else {
            return JobOutcome::Failed;
        };

        info!(
            "Aligning {} line(s) against {} of {}",
            prepared.request.segments.len(),
            prepared.reference,
            hash
        );
        let aligner = Arc::clone(&self.aligner);
        let request = prepared.request;
        let result = self
            .runner
            .run(
                JobKind::Align,
                move || aligner.align(&request),
                || sink.emit(EventPayload::InferProgress),
            )
            .await;
        sink.emit(EventPayload::InferComplete { hash: hash.clone() });

        match result {
            Ok(alignment) => {
                sink.emit(EventPayload::Alignment { hash, alignment });
                JobOutcome::Completed
            }
            Err(e) => {
                error!("Alignment of {} failed: {}", hash, e);
                sink.emit(EventPayload::Error {
                    hash: Some(hash),
                    error: e.to_string(),
                });
                JobOutcome::Failed
            }
        }
    }

    /// Queue for the compute slot, bracketed by `infer_queued` / `infer_start`.
    async fn admit(&self, hash: &str, sink: &ProgressSink) -> Option<AdmissionPermit> {
        sink.emit(EventPayload::InferQueued);
        match self.gate.acquire().await {
            Ok(permit) => {
                sink.emit(EventPayload::InferStart);
                Some(permit)
            }
            Err(e) => {
                warn!("Job for {} not admitted: {}", hash, e);
                sink.emit(EventPayload::Error {
                    hash: Some(hash.to_string()),
                    error: e.to_string(),
                });
                None
            }
        }
    }
}

fn results(entry: &CacheEntry, cache: bool) -> EventPayload {
    EventPayload::Results {
        filenames: entry.part_filenames(),
        hash: entry.digest.to_string(),
        cache,
    }
}

fn record(kind: JobKind, outcome: JobOutcome) {
    JOBS_TOTAL
        .with_label_values(&[kind.as_str(), outcome.as_str()])
        .inc();
}
