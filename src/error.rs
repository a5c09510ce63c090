// src/error.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
//! Error taxonomy for the upload engine.
//!
//! Transport failures arrive as `anyhow::Error` from the [`MultipartStore`]
//! and are only ever surfaced wrapped in [`UploadError::RetriesExhausted`]
//! or [`UploadError::Storage`].
//!
//! [`MultipartStore`]: crate::storage::MultipartStore

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("cannot upload empty file: {}", .0.display())]
    EmptySource(PathBuf),

    #[error("source file {} unavailable: {reason}", .path.display())]
    SourceUnavailable { path: PathBuf, reason: String },

    #[error("ledger {} unreadable: {reason}", .path.display())]
    LedgerUnreadable { path: PathBuf, reason: String },

    /// A ledger for this source is already on disk; resume it or remove it.
    #[error("ledger {} already exists, resume the upload or remove the ledger first", .0.display())]
    LedgerExists(PathBuf),

    #[error("failed to persist ledger {}: {reason}", .path.display())]
    LedgerPersist { path: PathBuf, reason: String },

    #[error("source file changed since the upload began: ledger expects {expected} parts, plan has {actual}")]
    PlanMismatch { expected: usize, actual: usize },

    #[error("{operation} failed after {attempts} attempt(s)")]
    RetriesExhausted {
        operation: String,
        attempts: u32,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to initiate multipart upload")]
    InitiateFailed(#[source] Box<UploadError>),

    #[error("failed to upload part {part_number}")]
    PartUploadFailed {
        part_number: i32,
        #[source]
        source: Box<UploadError>,
    },

    #[error("failed to complete multipart upload {upload_id}")]
    CompletionFailed {
        upload_id: String,
        #[source]
        source: Box<UploadError>,
    },

    /// Only ever logged; a failed abort never replaces the error that caused it.
    #[error("failed to abort multipart upload {upload_id}")]
    AbortFailed {
        upload_id: String,
        #[source]
        source: anyhow::Error,
    },

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl UploadError {
    pub(crate) fn source_unavailable(path: impl Into<PathBuf>, err: impl std::fmt::Display) -> Self {
        UploadError::SourceUnavailable {
            path: path.into(),
            reason: err.to_string(),
        }
    }

    pub(crate) fn ledger_unreadable(path: impl Into<PathBuf>, err: impl std::fmt::Display) -> Self {
        UploadError::LedgerUnreadable {
            path: path.into(),
            reason: err.to_string(),
        }
    }
}
