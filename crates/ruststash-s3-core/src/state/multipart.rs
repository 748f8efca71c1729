//! Multipart upload state.
//!
//! A [`MultipartUpload`] captures the attributes given at initiation and
//! accumulates [`UploadPart`] entries until it is completed or aborted. Once
//! terminal, the upload id keeps a [`TerminalUpload`] entry so repeated
//! completes return the cached result and repeated aborts succeed.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::object::{ChecksumData, ObjectMetadata, Owner, STANDARD_STORAGE_CLASS};
use crate::checksums::{ChecksumAlgorithm, ChecksumType};

/// The result of a successful complete, replayed on re-complete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompleteMultipartOutput {
    /// Bucket of the assembled object.
    pub bucket: String,
    /// Key of the assembled object.
    pub key: String,
    /// Version id of the assembled object.
    pub version_id: String,
    /// Quoted `"<hex>-<n>"` ETag.
    pub etag: String,
    /// Total size in bytes.
    pub size: u64,
    /// Composite or full-object checksum, if the upload declared one.
    pub checksum: Option<ChecksumData>,
    /// Number of parts assembled.
    pub parts_count: u32,
}

/// Lifecycle of an upload.
#[derive(Debug, Clone, Default)]
pub enum UploadState {
    /// Accepting parts.
    #[default]
    Open,
    /// Completed; carries the first result.
    Completed(Arc<CompleteMultipartOutput>),
    /// Aborted; all parts discarded.
    Aborted,
}

impl UploadState {
    /// Whether the upload has been completed or aborted.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Open)
    }
}

/// Record kept for an upload id after it leaves the open table.
#[derive(Debug, Clone)]
pub struct TerminalUpload {
    /// Key the upload targeted.
    pub key: String,
    /// Completed or aborted.
    pub state: UploadState,
}

/// An upload between initiate and complete/abort.
#[derive(Debug, Clone)]
pub struct MultipartUpload {
    /// Upload id.
    pub upload_id: String,
    /// Key the object is published under.
    pub key: String,
    /// When the upload was created.
    pub initiated: DateTime<Utc>,
    /// Initiator.
    pub owner: Owner,
    /// Storage class of the final object.
    pub storage_class: String,
    /// Attributes applied to the final object.
    pub metadata: ObjectMetadata,
    /// Algorithm declared at initiation; every part records it.
    pub checksum_algorithm: Option<ChecksumAlgorithm>,
    /// How the object checksum is derived from the parts.
    pub checksum_type: ChecksumType,
    /// Parts keyed by part number.
    pub parts: BTreeMap<u32, UploadPart>,
    /// Lifecycle state.
    pub state: UploadState,
}

impl MultipartUpload {
    /// Create an open upload with no parts.
    #[must_use]
    pub fn new(upload_id: String, key: String, owner: Owner, metadata: ObjectMetadata) -> Self {
        Self {
            upload_id,
            key,
            initiated: Utc::now(),
            owner,
            storage_class: STANDARD_STORAGE_CLASS.to_owned(),
            metadata,
            checksum_algorithm: None,
            checksum_type: ChecksumType::default(),
            parts: BTreeMap::new(),
            state: UploadState::Open,
        }
    }

    /// Set the declared checksum algorithm and type.
    #[must_use]
    pub fn with_checksum(
        mut self,
        algorithm: Option<ChecksumAlgorithm>,
        checksum_type: ChecksumType,
    ) -> Self {
        self.checksum_algorithm = algorithm;
        self.checksum_type = checksum_type;
        self
    }

    /// Insert or replace a part. Returns the part it replaced.
    pub fn put_part(&mut self, part: UploadPart) -> Option<UploadPart> {
        self.parts.insert(part.part_number, part)
    }

    /// The part recorded under `part_number`.
    #[must_use]
    pub fn get_part(&self, part_number: u32) -> Option<&UploadPart> {
        self.parts.get(&part_number)
    }

    /// Parts with a number greater than `marker`, in ascending order.
    pub fn parts_after(&self, marker: u32) -> impl Iterator<Item = &UploadPart> {
        self.parts
            .range(marker.saturating_add(1)..)
            .map(|(_, part)| part)
    }

    /// Total bytes across all recorded parts.
    #[must_use]
    pub fn total_size(&self) -> u64 {
        self.parts.values().map(|p| p.size).sum()
    }

    /// Snapshot for the terminal cache.
    #[must_use]
    pub fn terminal(&self) -> TerminalUpload {
        TerminalUpload {
            key: self.key.clone(),
            state: self.state.clone(),
        }
    }
}

/// One uploaded part.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadPart {
    /// Part number, 1 to 10000.
    pub part_number: u32,
    /// Quoted hex MD5 of the part bytes.
    pub etag: String,
    /// Size in bytes.
    pub size: u64,
    /// When the part was written.
    pub last_modified: DateTime<Utc>,
    /// Checksum under the upload's algorithm.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checksum: Option<ChecksumData>,
}
