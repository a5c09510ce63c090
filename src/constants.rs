// src/constants.rs
//
// Centralized constants for s3resume to avoid hardcoded values throughout the codebase

use std::time::Duration;

/// Default chunk (part) size when none is configured (5 MB)
pub const DEFAULT_CHUNK_SIZE: u64 = 5 * 1024 * 1024;

/// Minimum S3 multipart upload part size (5 MB - AWS requirement, last part excepted)
pub const MIN_S3_MULTIPART_PART_SIZE: u64 = 5 * 1024 * 1024;

/// Maximum number of parts in a multipart upload
pub const MAX_MULTIPART_PARTS: usize = 10000;

/// Default number of attempts for a single storage operation
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 5;

/// Fixed pause between attempts
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Region used when neither the environment nor the AWS profile names one
pub const DEFAULT_REGION: &str = "us-east-1";

/// Ledger files are named `<source file name>.<suffix>`
pub const LEDGER_FILE_SUFFIX: &str = "upload_status";

/// Per-operation timeout for S3 calls (seconds)
pub const DEFAULT_OPERATION_TIMEOUT_SECS: u64 = 300; // 5 minutes

/// Connect timeout for S3 calls (seconds)
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;
