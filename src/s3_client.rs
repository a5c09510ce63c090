// src/s3_client.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
//! S3 implementation of [`MultipartStore`] on top of the async AWS Rust SDK.
//!
//! The client is built once from [`UploaderConfig`]: region and endpoint come
//! from the config (falling back to the AWS provider chain, then
//! `us-east-1`), credentials from the usual AWS sources.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use aws_config::meta::region::RegionProviderChain;
use aws_config::timeout::TimeoutConfig;
use aws_sdk_s3::primitives::{ByteStream, DateTimeFormat};
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_sdk_s3::{config::Region, Client};
use bytes::Bytes;
use std::time::Duration;
use tracing::debug;

use crate::config::UploaderConfig;
use crate::constants::{DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_OPERATION_TIMEOUT_SECS, DEFAULT_REGION};
use crate::storage::{MultipartStore, OpenUpload};


// -----------------------------------------------------------------------------
// Client factory
// -----------------------------------------------------------------------------

/// Build an S3 client for the configured region / endpoint.
pub async fn aws_s3_client_async(cfg: &UploaderConfig) -> Result<Client> {
    // Region & optional endpoint
    let region = RegionProviderChain::first_try(cfg.region.clone().map(Region::new))
        .or_default_provider()
        .or_else(Region::new(DEFAULT_REGION));

    let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest()).region(region);
    if let Some(endpoint) = &cfg.endpoint {
        debug!("Using custom S3 endpoint {}", endpoint);
        loader = loader.endpoint_url(endpoint);
    }

    let timeout_config = TimeoutConfig::builder()
        .connect_timeout(Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS))
        .operation_timeout(Duration::from_secs(DEFAULT_OPERATION_TIMEOUT_SECS))
        .build();

    let sdk_config = loader.timeout_config(timeout_config).load().await;

    // S3-compatible services (MinIO, Ceph, ...) behind a custom endpoint need
    // path-style addressing; virtual-hosted style only works against AWS.
    let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
        .force_path_style(cfg.endpoint.is_some())
        .build();
    Ok(Client::from_conf(s3_config))
}


// -----------------------------------------------------------------------------
// MultipartStore over S3
// -----------------------------------------------------------------------------

#[derive(Clone, Debug)]
pub struct S3MultipartStore {
    client: Client,
}

impl S3MultipartStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub async fn from_config(cfg: &UploaderConfig) -> Result<Self> {
        Ok(Self::new(aws_s3_client_async(cfg).await?))
    }
}

#[async_trait]
impl MultipartStore for S3MultipartStore {
    async fn initiate_upload(&self, bucket: &str, key: &str) -> Result<String> {
        let resp = self
            .client
            .create_multipart_upload()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .context("CreateMultipartUpload failed")?;
        let upload_id = resp.upload_id().unwrap_or_default().to_string();
        if upload_id.is_empty() {
            bail!("CreateMultipartUpload returned empty upload_id");
        }
        Ok(upload_id)
    }

    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: i32,
        body: Bytes,
        content_length: u64,
    ) -> Result<String> {
        let content_length = i64::try_from(content_length).context("part too large")?;
        let resp = self
            .client
            .upload_part()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .part_number(part_number)
            .content_length(content_length)
            .body(ByteStream::from(body))
            .send()
            .await
            .with_context(|| format!("UploadPart {part_number} failed"))?;

        let etag = resp.e_tag().unwrap_or_default().to_string();
        if etag.is_empty() {
            bail!("UploadPart {part_number} returned empty ETag");
        }
        Ok(etag)
    }

    async fn complete_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[(i32, String)],
    ) -> Result<()> {
        let completed_parts: Vec<CompletedPart> = parts
            .iter()
            .map(|(pn, etag)| {
                CompletedPart::builder()
                    .e_tag(etag.clone())
                    .part_number(*pn)
                    .build()
            })
            .collect();

        let cmu = CompletedMultipartUpload::builder()
            .set_parts(Some(completed_parts))
            .build();

        self.client
            .complete_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(cmu)
            .send()
            .await
            .context("CompleteMultipartUpload failed")?;
        Ok(())
    }

    async fn abort_upload(&self, bucket: &str, key: &str, upload_id: &str) -> Result<()> {
        self.client
            .abort_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await
            .context("AbortMultipartUpload failed")?;
        Ok(())
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .context("DeleteObject failed")?;
        Ok(())
    }

    /// Every open upload in `bucket` (handles pagination).
    async fn list_open_uploads(&self, bucket: &str) -> Result<Vec<OpenUpload>> {
        let mut uploads = Vec::new();
        let mut key_marker: Option<String> = None;
        let mut upload_id_marker: Option<String> = None;
        loop {
            let resp = self
                .client
                .list_multipart_uploads()
                .bucket(bucket)
                .set_key_marker(key_marker.take())
                .set_upload_id_marker(upload_id_marker.take())
                .send()
                .await
                .context("ListMultipartUploads failed")?;

            for u in resp.uploads() {
                uploads.push(OpenUpload {
                    upload_id: u.upload_id().unwrap_or_default().to_string(),
                    key: u.key().unwrap_or_default().to_string(),
                    initiated_at: u
                        .initiated()
                        .and_then(|t| t.fmt(DateTimeFormat::DateTime).ok()),
                });
            }

            if resp.is_truncated() != Some(true) {
                break;
            }
            key_marker = resp.next_key_marker().map(str::to_string);
            upload_id_marker = resp.next_upload_id_marker().map(str::to_string);
            if key_marker.is_none() && upload_id_marker.is_none() {
                break;
            }
        }
        Ok(uploads)
    }
}
