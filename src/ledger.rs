// src/ledger.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
//! Persisted progress record of one in-flight multipart upload.
//!
//! The ledger is the only durable state: it names the upload session and
//! maps every acknowledged part number to its ETag. It is rewritten in full
//! after each part, through a temp file in the same directory that is then
//! renamed over the old one, so a crash mid-save leaves either the previous
//! or the new content on disk.

use crc32fast::Hasher;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::constants::LEDGER_FILE_SUFFIX;
use crate::error::UploadError;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct UploadLedger {
    pub source_path: PathBuf,
    pub bucket: String,
    pub key: String,
    pub upload_id: String,
    pub total_parts: usize,
    /// Part number -> ETag. Entries never change once written.
    pub completed_parts: BTreeMap<i32, String>,
    /// Chunk size the plan was computed with.
    #[serde(default)]
    pub chunk_size: Option<u64>,
    /// RFC3339 time the session was initiated.
    #[serde(default)]
    pub started_at: Option<String>,
}

impl UploadLedger {
    pub fn new(
        source_path: impl Into<PathBuf>,
        bucket: impl Into<String>,
        key: impl Into<String>,
        upload_id: impl Into<String>,
        total_parts: usize,
        chunk_size: u64,
    ) -> Self {
        Self {
            source_path: source_path.into(),
            bucket: bucket.into(),
            key: key.into(),
            upload_id: upload_id.into(),
            total_parts,
            completed_parts: BTreeMap::new(),
            chunk_size: Some(chunk_size),
            started_at: Some(chrono::Utc::now().to_rfc3339()),
        }
    }

    /// Record an acknowledged part. Returns `false` if the part was already
    /// recorded, in which case the existing ETag is kept.
    pub fn record_part(&mut self, part_number: i32, e_tag: impl Into<String>) -> Result<bool, UploadError> {
        if part_number < 1 || part_number as usize > self.total_parts {
            return Err(UploadError::InvalidInput(format!(
                "part {part_number} outside 1..={}",
                self.total_parts
            )));
        }
        match self.completed_parts.entry(part_number) {
            std::collections::btree_map::Entry::Occupied(_) => Ok(false),
            std::collections::btree_map::Entry::Vacant(slot) => {
                slot.insert(e_tag.into());
                Ok(true)
            }
        }
    }

    pub fn is_part_completed(&self, part_number: i32) -> bool {
        self.completed_parts.contains_key(&part_number)
    }

    pub fn completed_count(&self) -> usize {
        self.completed_parts.len()
    }

    pub fn is_complete(&self) -> bool {
        self.completed_parts.len() == self.total_parts
    }

    /// `(part number, ETag)` pairs in ascending part order, as CompleteMultipartUpload wants them.
    pub fn completed_parts_ordered(&self) -> Vec<(i32, String)> {
        self.completed_parts
            .iter()
            .map(|(pn, etag)| (*pn, etag.clone()))
            .collect()
    }

    fn validate(&self) -> Result<(), String> {
        if self.upload_id.is_empty() {
            return Err("empty upload_id".to_string());
        }
        if self.bucket.is_empty() || self.key.is_empty() {
            return Err("empty bucket or key".to_string());
        }
        if let Some(bad) = self
            .completed_parts
            .keys()
            .find(|pn| **pn < 1 || **pn as usize > self.total_parts)
        {
            return Err(format!("part {bad} outside 1..={}", self.total_parts));
        }
        Ok(())
    }

    /// Load a ledger written by [`UploadLedger::save`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self, UploadError> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|e| UploadError::ledger_unreadable(path, e))?;
        let ledger: UploadLedger =
            serde_json::from_slice(&bytes).map_err(|e| UploadError::ledger_unreadable(path, e))?;
        ledger
            .validate()
            .map_err(|reason| UploadError::ledger_unreadable(path, reason))?;
        Ok(ledger)
    }

    /// Atomically replace the ledger at `path` with the current content.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), UploadError> {
        let path = path.as_ref();
        let persist_err = |e: &dyn std::fmt::Display| UploadError::LedgerPersist {
            path: path.to_path_buf(),
            reason: e.to_string(),
        };

        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir).map_err(|e| persist_err(&e))?;

        let bytes = serde_json::to_vec_pretty(self).map_err(|e| persist_err(&e))?;
        let mut tmp = NamedTempFile::new_in(&dir).map_err(|e| persist_err(&e))?;
        tmp.write_all(&bytes).map_err(|e| persist_err(&e))?;
        tmp.as_file().sync_all().map_err(|e| persist_err(&e))?;
        tmp.persist(path).map_err(|e| persist_err(&e.error))?;

        debug!(ledger = %path.display(), parts = self.completed_count(), total = self.total_parts, "ledger saved");
        Ok(())
    }
}

/// Delete a persisted ledger. A missing file is not an error.
pub fn remove(path: impl AsRef<Path>) -> std::io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

/// `<dir>/<source file name>.<crc32 of the full path>.upload_status`
///
/// The checksum keeps same-named files from different directories apart;
/// callers pass the canonical path so every spelling of one file maps to one ledger.
pub fn ledger_path_for(dir: &Path, source: &Path) -> PathBuf {
    let name = source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload".to_string());
    let mut hasher = Hasher::new();
    hasher.update(source.as_os_str().as_encoded_bytes());
    dir.join(format!("{name}.{:08x}.{LEDGER_FILE_SUFFIX}", hasher.finalize()))
}
