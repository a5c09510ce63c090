// src/lib.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
// Crate root — public re-exports for the CLI and for embedding the upload engine.

pub mod constants;
pub mod config;
pub mod error;
pub mod progress;

// Upload engine
pub mod chunk;
pub mod retry;
pub mod ledger;
pub mod storage;
pub mod uploader;

// S3 backend
pub mod s3_client;

// ===== Re-exports expected by src/bin/cli.rs at the crate root =====
pub use crate::chunk::{plan_chunks, open_chunk, read_chunk, Chunk, ChunkReader};
pub use crate::config::UploaderConfig;
pub use crate::error::UploadError;
pub use crate::ledger::UploadLedger;
pub use crate::progress::UploadProgress;
pub use crate::retry::RetryPolicy;
pub use crate::s3_client::S3MultipartStore;
pub use crate::storage::{MultipartStore, OpenUpload};
pub use crate::uploader::{Uploader, UploadState, UploadSummary};
