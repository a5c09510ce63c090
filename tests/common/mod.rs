// tests/common/mod.rs
//
// Common test utilities: an in-memory multipart store that records every call
// and can be told to fail, plus scratch-file and config helpers.

#![allow(dead_code)]

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use s3resume::{MultipartStore, OpenUpload, UploaderConfig};

pub const MIB: u64 = 1024 * 1024;
pub const UPLOAD_ID: &str = "mock-upload-1";

/// One call made against the mock store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    Initiate { bucket: String, key: String },
    UploadPart { part_number: i32, len: u64 },
    Complete { parts: Vec<(i32, String)> },
    Abort { upload_id: String },
    Delete { bucket: String, key: String },
    List { bucket: String },
}

#[derive(Default)]
pub struct MockStore {
    calls: Mutex<Vec<Call>>,
    bodies: Mutex<BTreeMap<i32, Bytes>>,
    /// Remaining injected failures per part; `u32::MAX` never runs out.
    part_failures: Mutex<HashMap<i32, u32>>,
    initiate_failures: AtomicU32,
    complete_failures: AtomicU32,
    abort_fails: AtomicBool,
    open_uploads: Mutex<Vec<OpenUpload>>,
    /// After this part is acknowledged, shrink the file to the given length.
    truncate_after: Mutex<Option<(i32, PathBuf, u64)>>,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_part(&self, part_number: i32, times: u32) {
        self.part_failures.lock().unwrap().insert(part_number, times);
    }

    pub fn fail_part_always(&self, part_number: i32) {
        self.fail_part(part_number, u32::MAX);
    }

    pub fn fail_initiate(&self, times: u32) {
        self.initiate_failures.store(times, Ordering::SeqCst);
    }

    pub fn fail_complete(&self, times: u32) {
        self.complete_failures.store(times, Ordering::SeqCst);
    }

    pub fn fail_abort(&self) {
        self.abort_fails.store(true, Ordering::SeqCst);
    }

    /// Simulate the source file shrinking while the upload is running.
    pub fn truncate_source_after_part(&self, part_number: i32, source: &Path, len: u64) {
        *self.truncate_after.lock().unwrap() = Some((part_number, source.to_path_buf(), len));
    }

    pub fn add_open_upload(&self, key: &str, upload_id: &str) {
        self.open_uploads.lock().unwrap().push(OpenUpload {
            upload_id: upload_id.to_string(),
            key: key.to_string(),
            initiated_at: Some("2025-01-01T00:00:00Z".to_string()),
        });
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Part numbers of every UploadPart call, failed attempts included.
    pub fn part_attempts(&self) -> Vec<i32> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::UploadPart { part_number, .. } => Some(part_number),
                _ => None,
            })
            .collect()
    }

    pub fn complete_calls(&self) -> Vec<Vec<(i32, String)>> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Complete { parts } => Some(parts),
                _ => None,
            })
            .collect()
    }

    pub fn abort_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Abort { .. }))
            .count()
    }

    /// Body of the last accepted upload of `part_number`.
    pub fn body(&self, part_number: i32) -> Option<Bytes> {
        self.bodies.lock().unwrap().get(&part_number).cloned()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn take_failure(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

pub fn etag_for(part_number: i32) -> String {
    format!("\"etag-{part_number}\"")
}

#[async_trait]
impl MultipartStore for MockStore {
    async fn initiate_upload(&self, bucket: &str, key: &str) -> Result<String> {
        self.record(Call::Initiate {
            bucket: bucket.to_string(),
            key: key.to_string(),
        });
        if Self::take_failure(&self.initiate_failures) {
            bail!("injected initiate failure");
        }
        Ok(UPLOAD_ID.to_string())
    }

    async fn upload_part(
        &self,
        _bucket: &str,
        _key: &str,
        _upload_id: &str,
        part_number: i32,
        body: Bytes,
        content_length: u64,
    ) -> Result<String> {
        self.record(Call::UploadPart {
            part_number,
            len: content_length,
        });
        if body.len() as u64 != content_length {
            bail!("body is {} bytes, content length says {}", body.len(), content_length);
        }
        {
            let mut failures = self.part_failures.lock().unwrap();
            if let Some(left) = failures.get_mut(&part_number) {
                if *left > 0 {
                    if *left != u32::MAX {
                        *left -= 1;
                    }
                    return Err(anyhow!("injected failure for part {part_number}"));
                }
            }
        }
        self.bodies.lock().unwrap().insert(part_number, body);
        if let Some((after, path, len)) = self.truncate_after.lock().unwrap().clone() {
            if after == part_number {
                std::fs::OpenOptions::new().write(true).open(path)?.set_len(len)?;
            }
        }
        Ok(etag_for(part_number))
    }

    async fn complete_upload(
        &self,
        _bucket: &str,
        _key: &str,
        _upload_id: &str,
        parts: &[(i32, String)],
    ) -> Result<()> {
        self.record(Call::Complete {
            parts: parts.to_vec(),
        });
        if Self::take_failure(&self.complete_failures) {
            bail!("injected complete failure");
        }
        Ok(())
    }

    async fn abort_upload(&self, _bucket: &str, _key: &str, upload_id: &str) -> Result<()> {
        self.record(Call::Abort {
            upload_id: upload_id.to_string(),
        });
        if self.abort_fails.load(Ordering::SeqCst) {
            bail!("injected abort failure");
        }
        Ok(())
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()> {
        self.record(Call::Delete {
            bucket: bucket.to_string(),
            key: key.to_string(),
        });
        Ok(())
    }

    async fn list_open_uploads(&self, bucket: &str) -> Result<Vec<OpenUpload>> {
        self.record(Call::List {
            bucket: bucket.to_string(),
        });
        Ok(self.open_uploads.lock().unwrap().clone())
    }
}

/// Byte `i` of every scratch file; lets tests check which range a part carried.
pub fn pattern_byte(i: u64) -> u8 {
    (i % 251) as u8
}

pub fn write_file(dir: &Path, name: &str, len: u64) -> PathBuf {
    let data: Vec<u8> = (0..len).map(pattern_byte).collect();
    let path = dir.join(name);
    std::fs::write(&path, data).unwrap();
    path
}

/// Fast retries and ledgers under `ledger_dir`.
pub fn test_config(ledger_dir: &Path) -> UploaderConfig {
    UploaderConfig {
        bucket: Some("test-bucket".to_string()),
        chunk_size: 5 * MIB,
        ledger_dir: ledger_dir.to_path_buf(),
        ..UploaderConfig::default()
    }
    .with_retry(3, Duration::from_millis(1))
}
