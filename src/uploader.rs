// src/uploader.rs
//
// Resumable, strictly sequential Multipart Upload (MPU) of one local file.
//
// Design:
// - Uploader holds the store, the config and a progress tracker; it can run any
//   number of uploads one after another.
// - Each start/resume builds an UploadRun that exclusively owns the ledger for
//   that run and walks Idle -> Initiated -> Uploading -> Completing -> Completed,
//   or to Aborted from any of the three middle states.
// - Parts go up one at a time in ascending order; the ledger is saved after every
//   acknowledged part, so a crash loses at most the part in flight.
// - Remote abort and ledger save/delete are compensating actions: their errors are
//   logged and never replace the error being returned.

use anyhow::Context;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Instant, SystemTime};
use tracing::{debug, error, info, warn};

use crate::chunk::{part_count, plan_chunks, read_chunk, Chunk};
use crate::config::UploaderConfig;
use crate::constants::{MAX_MULTIPART_PARTS, MIN_S3_MULTIPART_PART_SIZE};
use crate::error::UploadError;
use crate::ledger::{self, ledger_path_for, UploadLedger};
use crate::progress::UploadProgress;
use crate::storage::{MultipartStore, OpenUpload};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UploadState {
    Idle,
    Initiated,
    Uploading,
    Completing,
    Completed,
    Aborted,
}

impl UploadState {
    /// Whether `self -> next` is an edge of the upload state machine.
    pub fn can_transition_to(self, next: UploadState) -> bool {
        use UploadState::*;
        matches!(
            (self, next),
            (Idle, Initiated)
                | (Initiated, Uploading)
                | (Uploading, Completing)
                | (Completing, Completed)
                | (Initiated | Uploading | Completing, Aborted)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, UploadState::Completed | UploadState::Aborted)
    }
}

/// Result info returned by a completed upload.
#[derive(Clone, Debug)]
pub struct UploadSummary {
    pub bucket: String,
    pub key: String,
    pub upload_id: String,
    pub parts: usize,
    /// Parts sent during this run.
    pub parts_uploaded: usize,
    /// Parts an earlier run had already sent.
    pub parts_skipped: usize,
    pub total_bytes: u64,
    pub ledger_path: PathBuf,
    pub started_at: SystemTime,
    pub completed_at: SystemTime,
}

/// Drives multipart uploads against a [`MultipartStore`].
pub struct Uploader {
    store: Arc<dyn MultipartStore>,
    config: UploaderConfig,
    progress: Arc<UploadProgress>,
}

impl Uploader {
    pub fn new(store: Arc<dyn MultipartStore>, config: UploaderConfig) -> Self {
        Self {
            store,
            config,
            progress: Arc::new(UploadProgress::hidden()),
        }
    }

    pub fn with_progress(mut self, progress: Arc<UploadProgress>) -> Self {
        self.progress = progress;
        self
    }

    pub fn config(&self) -> &UploaderConfig {
        &self.config
    }

    /// Where `start_upload` keeps the ledger for `source`.
    pub fn ledger_path_for(&self, source: &Path) -> PathBuf {
        let source = std::fs::canonicalize(source).unwrap_or_else(|_| source.to_path_buf());
        ledger_path_for(&self.config.ledger_dir, &source)
    }

    /// Upload `source` to `bucket/key` from scratch.
    pub async fn start_upload(
        &self,
        source: &Path,
        bucket: &str,
        key: &str,
        chunk_size: u64,
    ) -> Result<UploadSummary, UploadError> {
        if chunk_size == 0 {
            return Err(UploadError::InvalidInput("chunk size must be greater than zero".to_string()));
        }
        if bucket.is_empty() || key.is_empty() {
            return Err(UploadError::InvalidInput("bucket and key must not be empty".to_string()));
        }

        let source = tokio::fs::canonicalize(source)
            .await
            .map_err(|e| UploadError::source_unavailable(source, e))?;
        let file_size = source_size(&source).await?;
        if file_size == 0 {
            error!("Cannot upload empty file: {}", source.display());
            return Err(UploadError::EmptySource(source));
        }

        check_part_count(part_count(file_size, chunk_size)?)?;
        let chunks = plan_chunks(&source, file_size, chunk_size)?;
        if chunks.len() > 1 && chunk_size < MIN_S3_MULTIPART_PART_SIZE {
            warn!(
                chunk_size,
                "chunk size is below the 5 MiB S3 minimum for non-final parts; AWS will reject completion"
            );
        }

        let ledger_path = ledger_path_for(&self.config.ledger_dir, &source);
        match tokio::fs::try_exists(&ledger_path).await {
            Ok(true) => return Err(UploadError::LedgerExists(ledger_path)),
            Ok(false) => {}
            // Nothing can exist under a ledger dir that is not a directory; saving will warn.
            Err(e) if e.kind() == ErrorKind::NotADirectory => {}
            Err(e) => return Err(UploadError::ledger_unreadable(&ledger_path, e)),
        }

        info!(
            "Starting multipart upload for file: {} to s3://{}/{} ({} parts)",
            source.display(),
            bucket,
            key,
            chunks.len()
        );

        let store = self.store.as_ref();
        let upload_id = self
            .config
            .retry
            .run("CreateMultipartUpload", move || store.initiate_upload(bucket, key))
            .await
            .map_err(|e| {
                error!("Failed to initiate multipart upload for {}: {}", key, e);
                UploadError::InitiateFailed(Box::new(e))
            })?;
        info!(upload_id = %upload_id, "Initiated multipart upload");

        let ledger = UploadLedger::new(&source, bucket, key, upload_id, chunks.len(), chunk_size);
        let mut run = UploadRun::new(self, ledger, ledger_path, chunks);
        run.transition(UploadState::Initiated);
        // Saved before the first part so the session id survives a crash.
        run.persist_ledger();
        run.drive().await
    }

    /// Continue the upload recorded in the ledger at `ledger_path`.
    ///
    /// `chunk_size` defaults to the one recorded in the ledger, then to the
    /// configured one. The re-derived plan must have exactly the ledger's
    /// part count; otherwise the source changed and nothing is sent.
    pub async fn resume_upload(
        &self,
        ledger_path: &Path,
        chunk_size: Option<u64>,
    ) -> Result<UploadSummary, UploadError> {
        let ledger = UploadLedger::load(ledger_path)?;
        let chunk_size = chunk_size.or(ledger.chunk_size).unwrap_or(self.config.chunk_size);

        let file_size = source_size(&ledger.source_path).await?;
        let parts = part_count(file_size, chunk_size)?;
        if parts != ledger.total_parts {
            error!(
                expected = ledger.total_parts,
                actual = parts,
                "Refusing to resume: {} no longer matches the ledger",
                ledger.source_path.display()
            );
            return Err(UploadError::PlanMismatch {
                expected: ledger.total_parts,
                actual: parts,
            });
        }
        check_part_count(parts)?;
        let chunks = plan_chunks(&ledger.source_path, file_size, chunk_size)?;

        info!(
            upload_id = %ledger.upload_id,
            "Resuming upload of {} to s3://{}/{} ({}/{} parts already done)",
            ledger.source_path.display(),
            ledger.bucket,
            ledger.key,
            ledger.completed_count(),
            ledger.total_parts
        );

        let mut run = UploadRun::new(self, ledger, ledger_path.to_path_buf(), chunks);
        run.transition(UploadState::Initiated);
        run.drive().await
    }

    /// Abort the session named in a ledger and remove the ledger.
    pub async fn abort_from_ledger(&self, ledger_path: &Path) -> Result<UploadLedger, UploadError> {
        let ledger = UploadLedger::load(ledger_path)?;
        self.abort_upload(&ledger.bucket, &ledger.key, &ledger.upload_id).await?;
        if let Err(e) = ledger::remove(ledger_path) {
            warn!("Failed to remove ledger {}: {}", ledger_path.display(), e);
        }
        Ok(ledger)
    }

    pub async fn abort_upload(&self, bucket: &str, key: &str, upload_id: &str) -> Result<(), UploadError> {
        info!("Aborting multipart upload for key: {}, UploadID: {}", key, upload_id);
        self.store
            .abort_upload(bucket, key, upload_id)
            .await
            .with_context(|| format!("failed to abort multipart upload {upload_id}"))?;
        info!("Multipart upload aborted for key: {}, UploadID: {}", key, upload_id);
        Ok(())
    }

    pub async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), UploadError> {
        info!("Deleting s3://{}/{}", bucket, key);
        self.store
            .delete_object(bucket, key)
            .await
            .with_context(|| format!("failed to delete s3://{bucket}/{key}"))?;
        info!("Deleted s3://{}/{}", bucket, key);
        Ok(())
    }

    pub async fn list_open_uploads(&self, bucket: &str) -> Result<Vec<OpenUpload>, UploadError> {
        debug!("Listing open multipart uploads in bucket {}", bucket);
        let uploads = self
            .store
            .list_open_uploads(bucket)
            .await
            .with_context(|| format!("failed to list multipart uploads in {bucket}"))?;
        Ok(uploads)
    }
}

/// One pass of the state machine over one ledger.
struct UploadRun<'a> {
    uploader: &'a Uploader,
    ledger: UploadLedger,
    ledger_path: PathBuf,
    chunks: Vec<Chunk>,
    state: UploadState,
    started_at: SystemTime,
    parts_uploaded: usize,
    parts_skipped: usize,
}

impl<'a> UploadRun<'a> {
    fn new(uploader: &'a Uploader, ledger: UploadLedger, ledger_path: PathBuf, chunks: Vec<Chunk>) -> Self {
        Self {
            uploader,
            ledger,
            ledger_path,
            chunks,
            state: UploadState::Idle,
            started_at: SystemTime::now(),
            parts_uploaded: 0,
            parts_skipped: 0,
        }
    }

    fn transition(&mut self, next: UploadState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal upload state transition {:?} -> {:?}",
            self.state,
            next
        );
        debug!(upload_id = %self.ledger.upload_id, from = ?self.state, to = ?next, "upload state");
        self.state = next;
    }

    async fn drive(mut self) -> Result<UploadSummary, UploadError> {
        let t0 = Instant::now();
        let total_bytes: u64 = self.chunks.iter().map(|c| c.size).sum();
        let progress = Arc::clone(&self.uploader.progress);
        progress.begin(self.chunks.len() as u64, total_bytes);

        self.transition(UploadState::Uploading);
        if let Err(err) = self.upload_parts().await {
            error!("{}", report(&err));
            self.abort_session().await;
            self.transition(UploadState::Aborted);
            progress.abandon();
            return Err(err);
        }

        self.transition(UploadState::Completing);
        if let Err(err) = self.complete().await {
            error!("{}", report(&err));
            self.abort_session().await;
            self.transition(UploadState::Aborted);
            progress.abandon();
            return Err(err);
        }
        self.transition(UploadState::Completed);
        progress.finish("Upload", t0.elapsed());

        info!(
            "Multipart upload completed successfully for {}",
            self.ledger.source_path.display()
        );
        if let Err(e) = ledger::remove(&self.ledger_path) {
            warn!("Failed to remove ledger {}: {}", self.ledger_path.display(), e);
        }

        Ok(UploadSummary {
            bucket: self.ledger.bucket,
            key: self.ledger.key,
            upload_id: self.ledger.upload_id,
            parts: self.chunks.len(),
            parts_uploaded: self.parts_uploaded,
            parts_skipped: self.parts_skipped,
            total_bytes,
            ledger_path: self.ledger_path,
            started_at: self.started_at,
            completed_at: SystemTime::now(),
        })
    }

    async fn upload_parts(&mut self) -> Result<(), UploadError> {
        let progress = Arc::clone(&self.uploader.progress);
        let retry = self.uploader.config.retry;
        let store = self.uploader.store.as_ref();

        for chunk in &self.chunks {
            if self.ledger.is_part_completed(chunk.index) {
                debug!(part = chunk.index, "part already acknowledged, skipping");
                self.parts_skipped += 1;
                progress.part_skipped(chunk.size);
                continue;
            }

            info!(
                "Uploading part {} (offset {}, size {}) for file {}",
                chunk.index,
                chunk.offset,
                chunk.size,
                chunk.source.display()
            );

            let bucket = self.ledger.bucket.as_str();
            let key = self.ledger.key.as_str();
            let upload_id = self.ledger.upload_id.as_str();
            // Local read errors are not retried; only the network call is.
            let body = read_chunk(chunk).await.map_err(|e| UploadError::PartUploadFailed {
                part_number: chunk.index,
                source: Box::new(e),
            })?;
            let operation = format!("UploadPart {}", chunk.index);
            let e_tag = retry
                .run(&operation, move || {
                    let body = body.clone();
                    async move {
                        store
                            .upload_part(bucket, key, upload_id, chunk.index, body, chunk.size)
                            .await
                    }
                })
                .await
                .map_err(|e| UploadError::PartUploadFailed {
                    part_number: chunk.index,
                    source: Box::new(e),
                })?;

            self.ledger.record_part(chunk.index, e_tag.clone())?;
            self.persist_ledger();
            self.parts_uploaded += 1;
            progress.part_done(chunk.size);

            info!(
                "Successfully uploaded part {}. ETag: {} ({:.2}% done)",
                chunk.index,
                e_tag,
                progress.percent()
            );
        }
        Ok(())
    }

    async fn complete(&mut self) -> Result<(), UploadError> {
        if !self.ledger.is_complete() {
            return Err(UploadError::InvalidInput(format!(
                "only {} of {} parts acknowledged",
                self.ledger.completed_count(),
                self.ledger.total_parts
            )));
        }

        info!("Completing multipart upload for file: {}", self.ledger.source_path.display());
        let parts = self.ledger.completed_parts_ordered();
        let store = self.uploader.store.as_ref();
        let bucket = self.ledger.bucket.as_str();
        let key = self.ledger.key.as_str();
        let upload_id = self.ledger.upload_id.as_str();
        let parts_ref = parts.as_slice();

        self.uploader
            .config
            .retry
            .run("CompleteMultipartUpload", move || {
                store.complete_upload(bucket, key, upload_id, parts_ref)
            })
            .await
            .map_err(|e| UploadError::CompletionFailed {
                upload_id: upload_id.to_string(),
                source: Box::new(e),
            })
    }

    /// Best-effort save; the in-memory ledger stays authoritative for this run.
    fn persist_ledger(&self) {
        if let Err(e) = self.ledger.save(&self.ledger_path) {
            warn!("Failed to save ledger after part {}: {}", self.ledger.completed_count(), e);
        }
    }

    /// Best-effort remote abort. The ledger is left on disk.
    async fn abort_session(&self) {
        let l = &self.ledger;
        info!("Aborting multipart upload for key: {}, UploadID: {}", l.key, l.upload_id);
        match self
            .uploader
            .store
            .abort_upload(&l.bucket, &l.key, &l.upload_id)
            .await
        {
            Ok(()) => info!("Multipart upload aborted for key: {}, UploadID: {}", l.key, l.upload_id),
            Err(source) => {
                let err = UploadError::AbortFailed {
                    upload_id: l.upload_id.clone(),
                    source,
                };
                error!("{}", report(&err));
            }
        }
    }
}

/// Size of the source file, which must be a regular file.
async fn source_size(path: &Path) -> Result<u64, UploadError> {
    let meta = tokio::fs::metadata(path)
        .await
        .map_err(|e| UploadError::source_unavailable(path, e))?;
    if !meta.is_file() {
        return Err(UploadError::source_unavailable(path, "not a regular file"));
    }
    Ok(meta.len())
}

fn check_part_count(parts: usize) -> Result<(), UploadError> {
    if parts > MAX_MULTIPART_PARTS {
        return Err(UploadError::InvalidInput(format!(
            "{parts} parts exceeds the multipart limit of {MAX_MULTIPART_PARTS}, use a larger chunk size"
        )));
    }
    Ok(())
}

/// `error: cause: cause ...` on one line, for log output.
pub fn report(err: &(dyn std::error::Error + 'static)) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        out.push_str(": ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}
