//! Per-bucket state.
//!
//! An [`S3Bucket`] owns the key index, the open multipart uploads and the
//! versioning configuration. Its persisted form is [`BucketInfo`].
//!
//! Concurrency:
//!
//! - `parking_lot::RwLock` guards the key index and versioning status. These
//!   locks are never held across an await.
//! - `DashMap` holds open uploads, each behind its own async mutex, and the
//!   terminal-upload cache.
//! - An async read/write gate serializes bucket deletion against writers.
//!   Writers hold the read side, deletion holds the write side.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

use super::keystore::VersionedKeyStore;
use super::multipart::{MultipartUpload, TerminalUpload};
use super::object::Owner;
use crate::error::{S3ServiceError, S3ServiceResult};

/// Bucket versioning status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum VersioningStatus {
    /// Versioning has never been enabled.
    #[default]
    Disabled,
    /// New writes get fresh version ids.
    Enabled,
    /// Previously enabled, now suspended.
    Suspended,
}

impl VersioningStatus {
    /// Wire value. `Disabled` has none.
    #[must_use]
    pub fn as_str(&self) -> Option<&'static str> {
        match self {
            Self::Disabled => None,
            Self::Enabled => Some("Enabled"),
            Self::Suspended => Some("Suspended"),
        }
    }
}

impl FromStr for VersioningStatus {
    type Err = S3ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Enabled" => Ok(Self::Enabled),
            "Suspended" => Ok(Self::Suspended),
            _ => Err(S3ServiceError::MalformedXml),
        }
    }
}

/// Persisted bucket attributes (`bucket.json`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketInfo {
    /// Bucket name.
    pub name: String,
    /// Region the bucket was created in.
    pub region: String,
    /// Creation time.
    pub creation_date: DateTime<Utc>,
    /// Bucket owner.
    pub owner: Owner,
    /// Versioning status at the last change.
    #[serde(default)]
    pub versioning: VersioningStatus,
    /// Whether object lock was enabled at creation.
    #[serde(default)]
    pub object_lock_enabled: bool,
}

/// A bucket and everything it holds.
pub struct S3Bucket {
    /// Bucket name.
    pub name: String,
    /// Region the bucket was created in.
    pub region: String,
    /// Creation time.
    pub creation_date: DateTime<Utc>,
    /// Bucket owner.
    pub owner: Owner,
    object_lock_enabled: bool,
    versioning: RwLock<VersioningStatus>,
    /// Key index over every version in the bucket.
    pub objects: RwLock<VersionedKeyStore>,
    /// Open uploads keyed by upload id.
    pub uploads: DashMap<String, Arc<Mutex<MultipartUpload>>>,
    /// Completed and aborted uploads keyed by upload id.
    pub terminal_uploads: DashMap<String, TerminalUpload>,
    gate: tokio::sync::RwLock<()>,
    removed: AtomicBool,
}

impl fmt::Debug for S3Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3Bucket")
            .field("name", &self.name)
            .field("region", &self.region)
            .field("versioning", &*self.versioning.read())
            .field("object_lock_enabled", &self.object_lock_enabled)
            .field("uploads", &self.uploads.len())
            .finish_non_exhaustive()
    }
}

impl S3Bucket {
    /// Create an empty bucket. Object lock implies versioning.
    #[must_use]
    pub fn new(name: String, region: String, owner: Owner, object_lock_enabled: bool) -> Self {
        let versioning = if object_lock_enabled {
            VersioningStatus::Enabled
        } else {
            VersioningStatus::Disabled
        };
        Self::from_info(BucketInfo {
            name,
            region,
            creation_date: Utc::now(),
            owner,
            versioning,
            object_lock_enabled,
        })
    }

    /// Rebuild a bucket from its persisted attributes, with an empty index.
    #[must_use]
    pub fn from_info(info: BucketInfo) -> Self {
        Self {
            name: info.name,
            region: info.region,
            creation_date: info.creation_date,
            owner: info.owner,
            object_lock_enabled: info.object_lock_enabled,
            versioning: RwLock::new(info.versioning),
            objects: RwLock::new(VersionedKeyStore::default()),
            uploads: DashMap::new(),
            terminal_uploads: DashMap::new(),
            gate: tokio::sync::RwLock::new(()),
            removed: AtomicBool::new(false),
        }
    }

    /// Current persisted attributes.
    #[must_use]
    pub fn info(&self) -> BucketInfo {
        BucketInfo {
            name: self.name.clone(),
            region: self.region.clone(),
            creation_date: self.creation_date,
            owner: self.owner.clone(),
            versioning: self.versioning(),
            object_lock_enabled: self.object_lock_enabled,
        }
    }

    /// Current versioning status.
    #[must_use]
    pub fn versioning(&self) -> VersioningStatus {
        *self.versioning.read()
    }

    /// Change the versioning status.
    ///
    /// # Errors
    ///
    /// - [`S3ServiceError::MalformedXml`] when asked to return to `Disabled`.
    /// - [`S3ServiceError::InvalidRequest`] when suspending a bucket with
    ///   object lock.
    pub fn set_versioning(&self, status: VersioningStatus) -> S3ServiceResult<()> {
        match status {
            VersioningStatus::Disabled => return Err(S3ServiceError::MalformedXml),
            VersioningStatus::Suspended if self.object_lock_enabled => {
                return Err(S3ServiceError::InvalidRequest {
                    message: "An Object Lock configuration is present on this bucket, so the versioning state cannot be changed.".to_owned(),
                });
            }
            _ => {}
        }
        let mut current = self.versioning.write();
        if *current != status {
            debug!(bucket = %self.name, from = ?*current, to = ?status, "changing versioning status");
            *current = status;
        }
        Ok(())
    }

    /// Whether new writes get fresh version ids.
    #[must_use]
    pub fn is_versioning_enabled(&self) -> bool {
        self.versioning() == VersioningStatus::Enabled
    }

    /// Whether object lock was enabled at creation.
    #[must_use]
    pub fn is_object_lock_enabled(&self) -> bool {
        self.object_lock_enabled
    }

    /// No versions, delete markers included. Open uploads do not count.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }

    /// Acquire the shared side of the deletion gate, held by object writers.
    ///
    /// # Errors
    ///
    /// Returns [`S3ServiceError::NoSuchBucket`] if the bucket was removed
    /// while waiting.
    pub async fn read_gate(&self) -> S3ServiceResult<RwLockReadGuard<'_, ()>> {
        let guard = self.gate.read().await;
        self.ensure_live()?;
        Ok(guard)
    }

    /// Acquire the exclusive side of the deletion gate.
    ///
    /// # Errors
    ///
    /// Returns [`S3ServiceError::NoSuchBucket`] if the bucket was removed
    /// while waiting.
    pub async fn write_gate(&self) -> S3ServiceResult<RwLockWriteGuard<'_, ()>> {
        let guard = self.gate.write().await;
        self.ensure_live()?;
        Ok(guard)
    }

    /// Mark the bucket as gone. Holders of a stale handle see `NoSuchBucket`.
    pub fn mark_removed(&self) {
        self.removed.store(true, Ordering::Release);
    }

    fn ensure_live(&self) -> S3ServiceResult<()> {
        if self.removed.load(Ordering::Acquire) {
            return Err(S3ServiceError::NoSuchBucket {
                bucket: self.name.clone(),
            });
        }
        Ok(())
    }
}
