//! In-memory state for the store.
//!
//! - [`S3ServiceState`]: the bucket table
//! - [`S3Bucket`]: per-bucket index, uploads and versioning
//! - [`VersionedKeyStore`]: every version of every key in a bucket
//! - [`S3Object`] / [`S3DeleteMarker`] / [`ObjectVersion`]: version records
//! - [`MultipartUpload`] / [`UploadPart`]: multipart upload tracking
//!
//! All types are `Send + Sync`. Synchronous locks are `parking_lot`; the
//! per-upload and per-bucket gates are `tokio::sync`.

pub(crate) mod bucket;
pub(crate) mod keystore;
pub(crate) mod multipart;
pub(crate) mod object;
pub(crate) mod service;

pub use bucket::{BucketInfo, S3Bucket, VersioningStatus};
pub use keystore::{ListResult, VersionListEntry, VersionListResult, VersionLookup, VersionedKeyStore};
pub use multipart::{CompleteMultipartOutput, MultipartUpload, TerminalUpload, UploadPart, UploadState};
pub use object::{
    ChecksumData, ObjectMetadata, ObjectVersion, Owner, Retention, RetentionMode, S3DeleteMarker,
    S3Object, STANDARD_STORAGE_CLASS,
};
pub use service::S3ServiceState;
