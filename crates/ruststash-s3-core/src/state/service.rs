//! The bucket table.
//!
//! [`S3ServiceState`] maps bucket names to shared [`S3Bucket`] handles.
//! Callers clone the `Arc` out and never hold a map guard across an await.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::{debug, info};

use super::bucket::S3Bucket;
use super::object::Owner;
use crate::error::{S3ServiceError, S3ServiceResult};

/// All buckets known to a store.
#[derive(Default)]
pub struct S3ServiceState {
    buckets: DashMap<String, Arc<S3Bucket>>,
}

impl fmt::Debug for S3ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3ServiceState")
            .field("bucket_count", &self.buckets.len())
            .finish_non_exhaustive()
    }
}

impl S3ServiceState {
    /// An empty bucket table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new bucket.
    ///
    /// # Errors
    ///
    /// - [`S3ServiceError::BucketAlreadyOwnedByYou`] if `owner` already owns
    ///   a bucket with this name.
    /// - [`S3ServiceError::BucketAlreadyExists`] if another owner does.
    pub fn create_bucket(
        &self,
        name: &str,
        region: &str,
        owner: Owner,
        object_lock_enabled: bool,
    ) -> S3ServiceResult<Arc<S3Bucket>> {
        match self.buckets.entry(name.to_owned()) {
            Entry::Occupied(existing) => {
                if existing.get().owner.id == owner.id {
                    Err(S3ServiceError::BucketAlreadyOwnedByYou {
                        bucket: name.to_owned(),
                    })
                } else {
                    Err(S3ServiceError::BucketAlreadyExists {
                        bucket: name.to_owned(),
                    })
                }
            }
            Entry::Vacant(slot) => {
                let bucket = Arc::new(S3Bucket::new(
                    name.to_owned(),
                    region.to_owned(),
                    owner,
                    object_lock_enabled,
                ));
                slot.insert(Arc::clone(&bucket));
                info!(bucket = %name, object_lock_enabled, "bucket created");
                Ok(bucket)
            }
        }
    }

    /// Insert a restored bucket, replacing any with the same name.
    pub fn insert_bucket(&self, bucket: Arc<S3Bucket>) {
        debug!(bucket = %bucket.name, "bucket restored");
        self.buckets.insert(bucket.name.clone(), bucket);
    }

    /// Look up a bucket.
    ///
    /// # Errors
    ///
    /// Returns [`S3ServiceError::NoSuchBucket`] if the bucket does not exist.
    pub fn get_bucket(&self, name: &str) -> S3ServiceResult<Arc<S3Bucket>> {
        self.buckets
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| S3ServiceError::NoSuchBucket {
                bucket: name.to_owned(),
            })
    }

    /// Drop a bucket from the table and mark it removed.
    pub fn remove_bucket(&self, name: &str) -> Option<Arc<S3Bucket>> {
        let (_, bucket) = self.buckets.remove(name)?;
        bucket.mark_removed();
        info!(bucket = %name, "bucket deleted");
        Some(bucket)
    }

    /// All buckets, ordered by name.
    #[must_use]
    pub fn list_buckets(&self) -> Vec<Arc<S3Bucket>> {
        let mut buckets: Vec<Arc<S3Bucket>> = self
            .buckets
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        buckets.sort_by(|a, b| a.name.cmp(&b.name));
        buckets
    }

    /// Whether `name` is taken.
    #[must_use]
    pub fn bucket_exists(&self, name: &str) -> bool {
        self.buckets.contains_key(name)
    }

    /// Whether versioning is enabled. `false` for an unknown bucket.
    #[must_use]
    pub fn is_versioning_enabled(&self, name: &str) -> bool {
        self.buckets
            .get(name)
            .is_some_and(|b| b.is_versioning_enabled())
    }

    /// Whether object lock is enabled. `false` for an unknown bucket.
    #[must_use]
    pub fn is_object_lock_enabled(&self, name: &str) -> bool {
        self.buckets
            .get(name)
            .is_some_and(|b| b.is_object_lock_enabled())
    }
}
