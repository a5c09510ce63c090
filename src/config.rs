// src/config.rs
//
// Runtime parameters for the uploader, read from the environment (and a .env
// file, loaded by the CLI before this runs). CLI flags override what is read here.

use std::env;
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

use crate::constants::{DEFAULT_CHUNK_SIZE, DEFAULT_RETRY_ATTEMPTS, DEFAULT_RETRY_DELAY};
use crate::error::UploadError;
use crate::retry::RetryPolicy;

pub const ENV_REGION: &str = "AWS_REGION";
pub const ENV_ENDPOINT: &str = "AWS_ENDPOINT_URL";
pub const ENV_BUCKET: &str = "S3_BUCKET_NAME";
pub const ENV_CHUNK_SIZE: &str = "S3RESUME_CHUNK_SIZE";
pub const ENV_RETRY_ATTEMPTS: &str = "S3RESUME_RETRY_ATTEMPTS";
pub const ENV_RETRY_DELAY: &str = "S3RESUME_RETRY_DELAY";
pub const ENV_LEDGER_DIR: &str = "S3RESUME_LEDGER_DIR";

#[derive(Debug, Clone)]
pub struct UploaderConfig {
    /// Region for the S3 client; `None` defers to the AWS provider chain.
    pub region: Option<String>,
    /// Custom endpoint for S3-compatible services (MinIO, Ceph, ...).
    pub endpoint: Option<String>,
    pub bucket: Option<String>,
    /// Bytes per part. Always > 0.
    pub chunk_size: u64,
    pub retry: RetryPolicy,
    /// Where new ledgers are written.
    pub ledger_dir: PathBuf,
}

impl Default for UploaderConfig {
    fn default() -> Self {
        Self {
            region: None,
            endpoint: None,
            bucket: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
            retry: RetryPolicy::default(),
            ledger_dir: env::temp_dir(),
        }
    }
}

impl UploaderConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build from any variable source; `from_env` passes the process environment.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let chunk_size = non_empty(ENV_CHUNK_SIZE)
            .map(|raw| parse_chunk_size(&raw))
            .unwrap_or(DEFAULT_CHUNK_SIZE);

        let max_attempts = match non_empty(ENV_RETRY_ATTEMPTS) {
            Some(raw) => match raw.trim().parse::<u32>() {
                Ok(n) if n > 0 => n,
                _ => {
                    warn!("{ENV_RETRY_ATTEMPTS}={raw:?} is not a positive integer, using {DEFAULT_RETRY_ATTEMPTS}");
                    DEFAULT_RETRY_ATTEMPTS
                }
            },
            None => DEFAULT_RETRY_ATTEMPTS,
        };

        let delay = match non_empty(ENV_RETRY_DELAY) {
            Some(raw) => humantime::parse_duration(raw.trim()).unwrap_or_else(|e| {
                warn!("{ENV_RETRY_DELAY}={raw:?} is not a duration ({e}), using {DEFAULT_RETRY_DELAY:?}");
                DEFAULT_RETRY_DELAY
            }),
            None => DEFAULT_RETRY_DELAY,
        };

        Self {
            region: non_empty(ENV_REGION),
            endpoint: non_empty(ENV_ENDPOINT),
            bucket: non_empty(ENV_BUCKET),
            chunk_size,
            retry: RetryPolicy::new(max_attempts, delay),
            ledger_dir: non_empty(ENV_LEDGER_DIR)
                .map(PathBuf::from)
                .unwrap_or(defaults.ledger_dir),
        }
    }

    pub fn with_retry(mut self, max_attempts: u32, delay: Duration) -> Self {
        self.retry = RetryPolicy::new(max_attempts, delay);
        self
    }

    /// The configured bucket, or `InvalidInput` if there is none.
    pub fn require_bucket(&self) -> Result<&str, UploadError> {
        self.bucket
            .as_deref()
            .ok_or_else(|| UploadError::InvalidInput(format!("no bucket configured, set {ENV_BUCKET} or pass --bucket")))
    }
}

/// Split `s3://bucket/key` → (`bucket`, `key`).
pub fn parse_s3_uri(uri: &str) -> Result<(String, String), UploadError> {
    let invalid = |why: &str| UploadError::InvalidInput(format!("{uri:?}: {why}"));
    let trimmed = uri.strip_prefix("s3://").ok_or_else(|| invalid("URI must start with s3://"))?;
    let (bucket, key) = trimmed
        .split_once('/')
        .ok_or_else(|| invalid("URI must contain a '/' after bucket"))?;
    if bucket.is_empty() || key.is_empty() {
        return Err(invalid("URI needs both a bucket and a key"));
    }
    Ok((bucket.to_owned(), key.to_owned()))
}

/// Parse a byte count; anything unusable falls back to the default.
pub fn parse_chunk_size(raw: &str) -> u64 {
    match raw.trim().parse::<u64>() {
        Ok(n) if n > 0 => n,
        _ => {
            warn!("chunk size {raw:?} is not a positive integer, using {DEFAULT_CHUNK_SIZE} bytes");
            DEFAULT_CHUNK_SIZE
        }
    }
}
