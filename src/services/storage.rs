// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Object storage for profile images.
//!
//! Provides:
//! - Upload with a time-derived key, public-read ACL and a 7-day signed URL
//! - Delete by key
//! - Signed URL reissue for an existing key
//!
//! The S3 implementation talks to any S3-compatible endpoint (MinIO in
//! development) using path-style addressing.

use crate::config::StorageConfig;
use async_trait::async_trait;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::ObjectCannedAcl;
use aws_sdk_s3::Client;
use std::time::Duration;

/// Lifetime of signed URLs (1 week, the SigV4 maximum).
pub const SIGNED_URL_TTL_SECS: u64 = 604_800;

/// A file received from the browser.
#[derive(Debug, Clone)]
pub struct UploadFile {
    /// Original file name as sent by the client
    pub file_name: String,
    /// Browser-supplied MIME type
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Location of an uploaded object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    /// Signed GET URL
    pub url: String,
    /// Object key, the handle for later deletion
    pub key: String,
}

/// Storage errors
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Upload failed: {0}")]
    Upload(String),

    #[error("Delete failed: {0}")]
    Delete(String),

    #[error("Signing failed: {0}")]
    Sign(String),

    #[error("Bucket check failed: {0}")]
    Bucket(String),
}

/// Storage provider contract.
#[async_trait]
pub trait StorageProvider: Send + Sync {
    /// Store a file and return its signed URL and key.
    async fn upload(&self, file: UploadFile) -> Result<StoredObject, StorageError>;

    /// Remove an object by key.
    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// Issue a fresh signed URL for an existing key.
    async fn signed_url(&self, key: &str) -> Result<String, StorageError>;
}

/// Build an object key from the upload time and the client's file name.
///
/// Any directory part of the name is dropped so keys stay flat.
pub fn object_key(now_ms: i64, file_name: &str) -> String {
    let base = file_name
        .rsplit(['/', '\\'])
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or("upload");
    format!("{}-{}", now_ms, base)
}

/// S3-compatible storage provider.
#[derive(Clone)]
pub struct S3StorageProvider {
    client: Client,
    bucket: String,
}

impl S3StorageProvider {
    /// Create a client with static credentials and path-style addressing.
    pub fn new(config: &StorageConfig) -> Self {
        let credentials = Credentials::new(
            config.access_key.clone(),
            config.secret_key.clone(),
            None,
            None,
            "static",
        );

        let s3_config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .endpoint_url(config.endpoint.clone())
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        tracing::info!(
            endpoint = %config.endpoint,
            bucket = %config.bucket,
            "Object storage client initialized"
        );

        Self {
            client: Client::from_conf(s3_config),
            bucket: config.bucket.clone(),
        }
    }

    /// Create the bucket if it does not exist yet.
    pub async fn ensure_bucket(&self) -> Result<(), StorageError> {
        if self
            .client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .is_ok()
        {
            tracing::debug!(bucket = %self.bucket, "Bucket exists");
            return Ok(());
        }

        tracing::warn!(bucket = %self.bucket, "Bucket not found, creating it");
        self.client
            .create_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(|e| StorageError::Bucket(DisplayErrorContext(&e).to_string()))?;

        tracing::info!(bucket = %self.bucket, "Bucket created");
        Ok(())
    }

    async fn presign_get(&self, key: &str) -> Result<String, StorageError> {
        let presigning = PresigningConfig::expires_in(Duration::from_secs(SIGNED_URL_TTL_SECS))
            .map_err(|e| StorageError::Sign(e.to_string()))?;

        let request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presigning)
            .await
            .map_err(|e| StorageError::Sign(DisplayErrorContext(&e).to_string()))?;

        Ok(request.uri().to_string())
    }
}

#[async_trait]
impl StorageProvider for S3StorageProvider {
    async fn upload(&self, file: UploadFile) -> Result<StoredObject, StorageError> {
        let key = object_key(crate::time_utils::now_millis(), &file.file_name);
        let size = file.bytes.len();

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(file.bytes))
            .acl(ObjectCannedAcl::PublicRead)
            .content_type(&file.content_type)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(key = %key, error = %DisplayErrorContext(&e), "Upload failed");
                StorageError::Upload(e.to_string())
            })?;

        tracing::info!(key = %key, size, content_type = %file.content_type, "Object uploaded");

        let url = self.presign_get(&key).await?;
        Ok(StoredObject { url, key })
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(key, error = %DisplayErrorContext(&e), "Delete failed");
                StorageError::Delete(e.to_string())
            })?;

        tracing::info!(key, "Object deleted");
        Ok(())
    }

    async fn signed_url(&self, key: &str) -> Result<String, StorageError> {
        self.presign_get(key).await
    }
}
