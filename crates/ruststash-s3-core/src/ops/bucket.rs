//! Bucket operations.
//!
//! Implements `create_bucket`, `delete_bucket`, `head_bucket`,
//! `list_buckets`, `put_bucket_versioning` and `get_bucket_versioning`.

use tracing::{debug, info};

use crate::error::{S3ServiceError, S3ServiceResult};
use crate::provider::S3Store;
use crate::state::{BucketInfo, Owner, UploadState, VersioningStatus};
use crate::validation::validate_bucket_name;

/// Options for [`S3Store::create_bucket`].
#[derive(Debug, Clone, Default)]
pub struct CreateBucketInput {
    /// Location constraint; the configured default region when absent.
    pub region: Option<String>,
    /// Enable object lock, which also enables versioning.
    pub object_lock_enabled: bool,
    /// Requesting account; the default owner when absent.
    pub owner: Option<Owner>,
}

impl S3Store {
    /// Create a bucket. Object lock turns versioning on.
    ///
    /// # Errors
    ///
    /// - [`S3ServiceError::InvalidBucketName`] for a malformed name.
    /// - [`S3ServiceError::BucketAlreadyOwnedByYou`] or
    ///   [`S3ServiceError::BucketAlreadyExists`] if the name is taken.
    pub async fn create_bucket(
        &self,
        name: &str,
        input: CreateBucketInput,
    ) -> S3ServiceResult<BucketInfo> {
        validate_bucket_name(name)?;
        let region = input
            .region
            .unwrap_or_else(|| self.config.default_region.clone());
        let bucket = self.state.create_bucket(
            name,
            &region,
            input.owner.unwrap_or_default(),
            input.object_lock_enabled,
        )?;

        let info = bucket.info();
        if let Err(e) = self.storage.create_bucket(&info).await {
            self.state.remove_bucket(name);
            return Err(e);
        }
        Ok(info)
    }

    /// Delete an empty bucket, aborting its open uploads.
    ///
    /// # Errors
    ///
    /// - [`S3ServiceError::NoSuchBucket`] if the bucket does not exist.
    /// - [`S3ServiceError::BucketNotEmpty`] if any version or delete marker
    ///   remains.
    pub async fn delete_bucket(&self, name: &str) -> S3ServiceResult<()> {
        let bucket = self.state.get_bucket(name)?;
        let _gate = bucket.write_gate().await?;
        if !bucket.is_empty() {
            return Err(S3ServiceError::BucketNotEmpty {
                bucket: name.to_owned(),
            });
        }

        let uploads: Vec<_> = bucket
            .uploads
            .iter()
            .map(|entry| std::sync::Arc::clone(entry.value()))
            .collect();
        for upload in uploads {
            let mut upload = upload.lock().await;
            if !upload.state.is_terminal() {
                debug!(bucket = %name, upload_id = %upload.upload_id, "aborting upload of deleted bucket");
                upload.state = UploadState::Aborted;
            }
        }
        bucket.uploads.clear();
        bucket.terminal_uploads.clear();

        // The name stays taken until its directory is gone.
        self.storage.remove_bucket(name).await?;
        self.state.remove_bucket(name);
        Ok(())
    }

    /// Attributes of an existing bucket.
    ///
    /// # Errors
    ///
    /// Returns [`S3ServiceError::NoSuchBucket`] if the bucket does not exist.
    pub fn head_bucket(&self, name: &str) -> S3ServiceResult<BucketInfo> {
        Ok(self.state.get_bucket(name)?.info())
    }

    /// All buckets ordered by name.
    #[must_use]
    pub fn list_buckets(&self) -> Vec<BucketInfo> {
        self.state
            .list_buckets()
            .iter()
            .map(|bucket| bucket.info())
            .collect()
    }

    /// Enable or suspend versioning.
    ///
    /// # Errors
    ///
    /// - [`S3ServiceError::NoSuchBucket`] if the bucket does not exist.
    /// - [`S3ServiceError::MalformedXml`] for `Disabled`.
    /// - [`S3ServiceError::InvalidRequest`] when suspending a bucket with
    ///   object lock.
    pub async fn put_bucket_versioning(
        &self,
        name: &str,
        status: VersioningStatus,
    ) -> S3ServiceResult<()> {
        let bucket = self.state.get_bucket(name)?;
        let _gate = bucket.read_gate().await?;
        bucket.set_versioning(status)?;
        self.storage.write_bucket_info(&bucket.info()).await?;
        info!(bucket = %name, versioning = ?status, "bucket versioning updated");
        Ok(())
    }

    /// Current versioning status.
    ///
    /// # Errors
    ///
    /// Returns [`S3ServiceError::NoSuchBucket`] if the bucket does not exist.
    pub fn get_bucket_versioning(&self, name: &str) -> S3ServiceResult<VersioningStatus> {
        Ok(self.state.get_bucket(name)?.versioning())
    }
}
