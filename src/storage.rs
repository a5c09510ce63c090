// src/storage.rs
//
// The object-storage capabilities the upload engine needs.
// S3 is provided by s3_client.rs; tests plug in an in-memory store.

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;

/// An in-progress multipart upload as reported by the store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OpenUpload {
    pub upload_id: String,
    pub key: String,
    /// RFC3339, when the store reports it.
    pub initiated_at: Option<String>,
}

/// Multipart-upload operations against one object store.
///
/// Implementations are assumed correct transports; the engine adds retry,
/// ordering and bookkeeping on top.
#[async_trait]
pub trait MultipartStore: Send + Sync {
    /// Open a session for `bucket/key` and return its upload id.
    async fn initiate_upload(&self, bucket: &str, key: &str) -> Result<String>;

    /// Upload one part and return its ETag.
    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: i32,
        body: Bytes,
        content_length: u64,
    ) -> Result<String>;

    /// Finalize a session from `(part number, ETag)` pairs in ascending order.
    async fn complete_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[(i32, String)],
    ) -> Result<()>;

    async fn abort_upload(&self, bucket: &str, key: &str, upload_id: &str) -> Result<()>;

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()>;

    async fn list_open_uploads(&self, bucket: &str) -> Result<Vec<OpenUpload>>;
}
