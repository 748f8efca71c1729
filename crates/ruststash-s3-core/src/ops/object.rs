//! Object operations.
//!
//! Implements `put_object`, `get_object`, `head_object`, `delete_object`,
//! `delete_objects`, `copy_object` and the in-place edits of tags, legal
//! hold and retention.
//!
//! Lock order is bucket gate, then upload mutex, then the key index. The key
//! index lock is synchronous and never held across an await.

use std::fs::File;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use tracing::{debug, trace};

use crate::body::Body;
use crate::checksums::{ChecksumAlgorithm, ChecksumType, ChecksumValue, verify_content_md5};
use crate::conditional::{ReadConditions, WriteConditions};
use crate::error::{S3ServiceError, S3ServiceResult};
use crate::provider::S3Store;
use crate::state::{
    ChecksumData, ObjectMetadata, ObjectVersion, Owner, Retention, RetentionMode, S3Bucket,
    S3DeleteMarker, S3Object, STANDARD_STORAGE_CLASS, VersionLookup, VersionedKeyStore,
    VersioningStatus,
};
use crate::storage::{FileSlice, StagedBody};
use crate::utils::{
    ByteRange, CopySource, NULL_VERSION_ID, generate_object_id, generate_version_id,
    parse_range_header,
};
use crate::validation::{validate_metadata, validate_object_key, validate_tags};

/// Most keys accepted by one `delete_objects` call.
pub const MAX_DELETE_OBJECTS: usize = 1000;

// ---------------------------------------------------------------------------
// Inputs and outputs
// ---------------------------------------------------------------------------

/// Options for [`S3Store::put_object`].
#[derive(Debug, Clone, Default)]
pub struct PutObjectInput {
    /// Attributes stored with the object.
    pub metadata: ObjectMetadata,
    /// Defaults to `STANDARD`.
    pub storage_class: Option<String>,
    /// Base64 `Content-MD5`.
    pub content_md5: Option<String>,
    /// A checksum supplied in an `x-amz-checksum-*` header.
    pub checksum: Option<ChecksumValue>,
    /// `x-amz-sdk-checksum-algorithm`: compute and store this checksum.
    pub checksum_algorithm: Option<ChecksumAlgorithm>,
    /// `If-Match` / `If-None-Match` against the current object.
    pub conditions: WriteConditions,
    /// Owner recorded on the object; the default owner when absent.
    pub owner: Option<Owner>,
}

/// Result of [`S3Store::put_object`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutObjectOutput {
    /// Quoted MD5 of the body.
    pub etag: String,
    /// New version id, `"null"` unless versioning is enabled.
    pub version_id: String,
    /// Stored size in bytes.
    pub size: u64,
    /// Checksum stored with the object, if any.
    pub checksum: Option<ChecksumData>,
}

/// Options for [`S3Store::get_object`] and [`S3Store::head_object`].
#[derive(Debug, Clone, Default)]
pub struct GetObjectInput {
    /// Read this version instead of the latest.
    pub version_id: Option<String>,
    /// Raw `Range` header.
    pub range: Option<String>,
    /// `If-*` preconditions.
    pub conditions: ReadConditions,
}

/// Object content and attributes.
#[derive(Debug, Clone)]
pub struct GetObjectOutput {
    /// Attributes of the version read.
    pub object: S3Object,
    /// Satisfied byte range, if one was requested.
    pub range: Option<ByteRange>,
    /// The whole object, or the requested range of it.
    pub body: Bytes,
}

/// Object attributes without content.
#[derive(Debug, Clone)]
pub struct HeadObjectOutput {
    /// Attributes of the version addressed.
    pub object: S3Object,
    /// Satisfied byte range, if one was requested.
    pub range: Option<ByteRange>,
}

impl GetObjectOutput {
    /// `Content-Range` value for ranged reads.
    #[must_use]
    pub fn content_range(&self) -> Option<String> {
        self.range.map(|r| r.content_range(self.object.size))
    }
}

/// A read that landed on a delete marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteMarkerHit {
    /// Key the marker sits on.
    pub key: String,
    /// Version id of the marker.
    pub version_id: String,
    /// When the marker was created.
    pub last_modified: DateTime<Utc>,
    /// Whether the marker was addressed by version id.
    pub requested_version: bool,
}

impl DeleteMarkerHit {
    /// The error a read returns: `MethodNotAllowed` when the marker was
    /// addressed directly, `NoSuchKey` when it is merely the latest version.
    #[must_use]
    pub fn into_error(self) -> S3ServiceError {
        if self.requested_version {
            S3ServiceError::MethodNotAllowed
        } else {
            S3ServiceError::NoSuchKey { key: self.key }
        }
    }
}

/// Result of a read: the object, or a delete marker in its place.
#[derive(Debug, Clone)]
pub enum GetObjectOutcome<T = GetObjectOutput> {
    /// The addressed version is an object.
    Found(T),
    /// The addressed version is a delete marker.
    DeleteMarker(DeleteMarkerHit),
}

impl<T> GetObjectOutcome<T> {
    /// The found value, or the error a delete marker maps to.
    ///
    /// # Errors
    ///
    /// See [`DeleteMarkerHit::into_error`].
    pub fn into_found(self) -> S3ServiceResult<T> {
        match self {
            Self::Found(value) => Ok(value),
            Self::DeleteMarker(hit) => Err(hit.into_error()),
        }
    }

    /// Whether the read landed on a delete marker.
    #[must_use]
    pub fn is_delete_marker(&self) -> bool {
        matches!(self, Self::DeleteMarker(_))
    }
}

/// Options for [`S3Store::delete_object`].
#[derive(Debug, Clone, Default)]
pub struct DeleteObjectInput {
    /// Remove exactly this version.
    pub version_id: Option<String>,
    /// `x-amz-bypass-governance-retention`.
    pub bypass_governance: bool,
}

/// Result of [`S3Store::delete_object`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeleteObjectOutput {
    /// Version removed, or the id of the marker created.
    pub version_id: Option<String>,
    /// Whether the affected version is a delete marker.
    pub delete_marker: bool,
}

/// One entry of a batch delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectIdentifier {
    /// Key to delete.
    pub key: String,
    /// Version to remove; a plain delete when absent.
    pub version_id: Option<String>,
}

/// A batch entry that was deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletedObject {
    /// Key of the entry.
    pub key: String,
    /// Version id the entry named.
    pub version_id: Option<String>,
    /// Whether a delete marker was created or removed.
    pub delete_marker: bool,
    /// Version id of that delete marker.
    pub delete_marker_version_id: Option<String>,
}

/// A batch entry that failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteError {
    /// Key of the entry.
    pub key: String,
    /// Version id the entry named.
    pub version_id: Option<String>,
    /// S3 error code.
    pub code: &'static str,
    /// Human readable reason.
    pub message: String,
}

/// Per-entry results of [`S3Store::delete_objects`].
#[derive(Debug, Clone, Default)]
pub struct DeleteObjectsOutput {
    /// Entries that succeeded.
    pub deleted: Vec<DeletedObject>,
    /// Entries that failed.
    pub errors: Vec<DeleteError>,
}

/// `x-amz-metadata-directive`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MetadataDirective {
    /// Keep the source object's attributes.
    #[default]
    Copy,
    /// Use the attributes supplied with the copy.
    Replace,
}

/// Options for [`S3Store::copy_object`].
#[derive(Debug, Clone, Default)]
pub struct CopyObjectInput {
    /// Whether attributes are copied or replaced.
    pub metadata_directive: MetadataDirective,
    /// Attributes of the new object under [`MetadataDirective::Replace`].
    pub metadata: ObjectMetadata,
    /// Storage class of the new object.
    pub storage_class: Option<String>,
    /// Compute and store this checksum on the new object.
    pub checksum_algorithm: Option<ChecksumAlgorithm>,
    /// `x-amz-copy-source-if-*`.
    pub source_conditions: ReadConditions,
    /// Preconditions on the destination key.
    pub conditions: WriteConditions,
}

/// Result of [`S3Store::copy_object`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyObjectOutput {
    /// Quoted MD5 of the copy.
    pub etag: String,
    /// When the copy was written.
    pub last_modified: DateTime<Utc>,
    /// Version id of the copy.
    pub version_id: String,
    /// Version the bytes were read from.
    pub source_version_id: String,
    /// Checksum stored with the copy, if any.
    pub checksum: Option<ChecksumData>,
}

/// A new object version about to be committed.
#[derive(Debug)]
pub(crate) struct ObjectDraft {
    pub key: String,
    pub etag: String,
    pub size: u64,
    pub metadata: ObjectMetadata,
    pub storage_class: String,
    pub owner: Owner,
    pub checksum: Option<ChecksumData>,
    pub parts_count: Option<u32>,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

pub(crate) fn not_found(key: &str, version_id: Option<&str>) -> S3ServiceError {
    match version_id {
        Some(version_id) => S3ServiceError::NoSuchVersion {
            key: key.to_owned(),
            version_id: version_id.to_owned(),
        },
        None => S3ServiceError::NoSuchKey {
            key: key.to_owned(),
        },
    }
}

/// Resolve a version that must be an object.
pub(crate) fn resolve_object(
    bucket: &S3Bucket,
    key: &str,
    version_id: Option<&str>,
) -> S3ServiceResult<GetObjectOutcome<S3Object>> {
    lookup_outcome(bucket.objects.read().lookup(key, version_id), key, version_id)
}

fn lookup_outcome(
    lookup: VersionLookup,
    key: &str,
    version_id: Option<&str>,
) -> S3ServiceResult<GetObjectOutcome<S3Object>> {
    match lookup {
        VersionLookup::Found(object) => Ok(GetObjectOutcome::Found(*object)),
        VersionLookup::FoundDeleteMarker(marker) => {
            Ok(GetObjectOutcome::DeleteMarker(DeleteMarkerHit {
                key: marker.key,
                version_id: marker.version_id,
                last_modified: marker.last_modified,
                requested_version: version_id.is_some(),
            }))
        }
        VersionLookup::NotFound => Err(not_found(key, version_id)),
    }
}

pub(crate) fn current_etag<'a>(objects: &'a VersionedKeyStore, key: &str) -> Option<&'a str> {
    objects
        .versions(key)
        .first()
        .and_then(ObjectVersion::as_object)
        .map(|o| o.etag.as_str())
}

fn require_object_lock(bucket: &S3Bucket) -> S3ServiceResult<()> {
    if bucket.is_object_lock_enabled() {
        Ok(())
    } else {
        Err(S3ServiceError::InvalidRequest {
            message: "Bucket is missing Object Lock Configuration".to_owned(),
        })
    }
}

pub(crate) fn check_lock_attributes(bucket: &S3Bucket, metadata: &ObjectMetadata) -> S3ServiceResult<()> {
    if metadata.legal_hold || metadata.retention.is_some() {
        require_object_lock(bucket)?;
    }
    Ok(())
}

/// Pick the checksum to record for a single-part write.
fn recorded_checksum(
    staged: &StagedBody,
    supplied: Option<&ChecksumValue>,
    declared: Option<ChecksumAlgorithm>,
) -> Option<ChecksumData> {
    let algorithm = supplied
        .map(|c| c.algorithm)
        .or_else(|| staged.trailer.as_ref().map(|t| t.algorithm))
        .or(declared)?;
    staged.checksum(algorithm).map(|value| ChecksumData {
        algorithm,
        value: value.to_owned(),
        checksum_type: ChecksumType::FullObject,
    })
}

impl S3Store {
    /// Publish a staged body as a new version of `draft.key`.
    ///
    /// The caller holds the bucket's read gate. Write conditions are checked
    /// against the current object under the index lock, together with the
    /// insert. Displaced versions (an overwritten `"null"`) are removed.
    pub(crate) async fn commit_object(
        &self,
        bucket: &S3Bucket,
        staged: StagedBody,
        draft: ObjectDraft,
        conditions: &WriteConditions,
    ) -> S3ServiceResult<S3Object> {
        let sequence = self.next_sequence();
        let version_id = if bucket.is_versioning_enabled() {
            generate_version_id(sequence)
        } else {
            NULL_VERSION_ID.to_owned()
        };
        let object = S3Object {
            id: generate_object_id(),
            sequence,
            key: draft.key,
            version_id,
            etag: draft.etag,
            size: draft.size,
            last_modified: Utc::now(),
            storage_class: draft.storage_class,
            metadata: draft.metadata,
            owner: draft.owner,
            checksum: draft.checksum,
            parts_count: draft.parts_count,
        };
        let version = ObjectVersion::Object(Box::new(object.clone()));

        self.storage
            .publish(staged, self.storage.object_path(&bucket.name, &object.id))
            .await?;
        if let Err(e) = self.storage.write_sidecar(&bucket.name, &version).await {
            self.storage.remove_version(&bucket.name, &version).await;
            return Err(e);
        }

        let inserted = {
            let mut objects = bucket.objects.write();
            conditions
                .evaluate(&object.key, current_etag(&objects, &object.key))
                .map(|()| objects.insert(version.clone()))
        };
        match inserted {
            Ok(displaced) => {
                for old in &displaced {
                    self.storage.remove_version(&bucket.name, old).await;
                }
                debug!(
                    bucket = %bucket.name,
                    key = %object.key,
                    version_id = %object.version_id,
                    size = object.size,
                    "object committed"
                );
                Ok(object)
            }
            Err(e) => {
                self.storage.remove_version(&bucket.name, &version).await;
                Err(e)
            }
        }
    }

    /// Add a delete marker on top of `key`. The caller holds the read gate.
    ///
    /// The marker gets a fresh version id when `versioned`, else `"null"`.
    async fn commit_delete_marker(
        &self,
        bucket: &S3Bucket,
        key: &str,
        versioned: bool,
    ) -> S3ServiceResult<S3DeleteMarker> {
        let sequence = self.next_sequence();
        let version_id = if versioned {
            generate_version_id(sequence)
        } else {
            NULL_VERSION_ID.to_owned()
        };
        let marker = S3DeleteMarker {
            id: generate_object_id(),
            sequence,
            key: key.to_owned(),
            version_id,
            last_modified: Utc::now(),
            owner: Owner::default(),
        };
        let version = ObjectVersion::DeleteMarker(marker.clone());
        self.storage.write_sidecar(&bucket.name, &version).await?;
        let displaced = bucket.objects.write().insert(version);
        for old in &displaced {
            self.storage.remove_version(&bucket.name, old).await;
        }
        debug!(bucket = %bucket.name, key = %key, version_id = %marker.version_id, "delete marker created");
        Ok(marker)
    }

    /// Rewrite the sidecar of an edited version.
    async fn persist_edit(&self, bucket: &S3Bucket, object: &S3Object) -> S3ServiceResult<()> {
        self.storage
            .write_sidecar(&bucket.name, &ObjectVersion::Object(Box::new(object.clone())))
            .await
    }

    /// Apply `edit` to an existing object version in place and persist it.
    async fn edit_object<T>(
        &self,
        bucket_name: &str,
        key: &str,
        version_id: Option<&str>,
        edit: impl FnOnce(&mut S3Object) -> S3ServiceResult<T>,
    ) -> S3ServiceResult<(S3Object, T)> {
        let bucket = self.state.get_bucket(bucket_name)?;
        let _gate = bucket.read_gate().await?;
        let (object, value) = {
            let mut objects = bucket.objects.write();
            if let VersionLookup::FoundDeleteMarker(_) = objects.lookup(key, version_id) {
                return Err(if version_id.is_some() {
                    S3ServiceError::MethodNotAllowed
                } else {
                    not_found(key, None)
                });
            }
            let object = objects
                .object_mut(key, version_id)
                .ok_or_else(|| not_found(key, version_id))?;
            let value = edit(object)?;
            (object.clone(), value)
        };
        self.persist_edit(&bucket, &object).await?;
        Ok((object, value))
    }

    /// Resolve a version and open its data file under the index lock.
    ///
    /// Displaced data files are unlinked only after the index lets go of
    /// them, so the returned handle reads the resolved content even if the
    /// version is replaced right afterwards.
    pub(crate) fn open_object(
        &self,
        bucket: &S3Bucket,
        key: &str,
        version_id: Option<&str>,
    ) -> S3ServiceResult<GetObjectOutcome<(S3Object, File)>> {
        let objects = bucket.objects.read();
        match lookup_outcome(objects.lookup(key, version_id), key, version_id)? {
            GetObjectOutcome::Found(object) => {
                let file = self.storage.open_object(&bucket.name, &object.id)?;
                Ok(GetObjectOutcome::Found((object, file)))
            }
            GetObjectOutcome::DeleteMarker(hit) => Ok(GetObjectOutcome::DeleteMarker(hit)),
        }
    }

    /// Resolve the object a copy reads from, check its preconditions and
    /// open its data.
    pub(crate) fn resolve_copy_source(
        &self,
        source: &CopySource,
        conditions: &ReadConditions,
    ) -> S3ServiceResult<(S3Object, File)> {
        let bucket = self.state.get_bucket(&source.bucket)?;
        let (object, file) = match self.open_object(&bucket, &source.key, source.version_id.as_deref())? {
            GetObjectOutcome::Found(found) => found,
            GetObjectOutcome::DeleteMarker(hit) if hit.requested_version => {
                return Err(S3ServiceError::InvalidRequest {
                    message: "The source of a copy request may not specifically refer to a delete marker by version id.".to_owned(),
                });
            }
            GetObjectOutcome::DeleteMarker(hit) => return Err(hit.into_error()),
        };
        conditions.evaluate_copy_source(&object.etag, object.last_modified)?;
        Ok((object, file))
    }

    /// Read-side lookup shared by get, head and the tag/lock getters.
    fn read_object_version(
        &self,
        bucket_name: &str,
        key: &str,
        version_id: Option<&str>,
    ) -> S3ServiceResult<GetObjectOutcome<S3Object>> {
        let bucket = self.state.get_bucket(bucket_name)?;
        resolve_object(&bucket, key, version_id)
    }

    // -----------------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------------

    /// Store a new object version.
    ///
    /// The version id is fresh when versioning is enabled and `"null"`
    /// otherwise; a `"null"` write replaces the previous `"null"` version.
    ///
    /// # Errors
    ///
    /// - [`S3ServiceError::NoSuchBucket`] if the bucket does not exist.
    /// - [`S3ServiceError::InvalidDigest`] / [`S3ServiceError::BadDigest`]
    ///   when a supplied digest or checksum does not match the body.
    /// - [`S3ServiceError::PreconditionFailed`] / [`S3ServiceError::NoSuchKey`]
    ///   from the write conditions.
    /// - Chunk decoding errors for `aws-chunked` bodies.
    pub async fn put_object(
        &self,
        bucket_name: &str,
        key: &str,
        body: Body,
        input: PutObjectInput,
    ) -> S3ServiceResult<PutObjectOutput> {
        validate_object_key(key)?;
        validate_metadata(&input.metadata.user_metadata)?;
        validate_tags(&input.metadata.tagging)?;
        let bucket = self.state.get_bucket(bucket_name)?;
        check_lock_attributes(&bucket, &input.metadata)?;
        if !input.conditions.is_empty() {
            input
                .conditions
                .evaluate(key, current_etag(&bucket.objects.read(), key))?;
        }

        let mut algorithms: Vec<ChecksumAlgorithm> = input.checksum_algorithm.into_iter().collect();
        if let Some(supplied) = &input.checksum {
            algorithms.push(supplied.algorithm);
        }
        let staged = self.storage.stage_body(body, algorithms).await?;
        if let Some(md5) = &input.content_md5 {
            verify_content_md5(md5, &staged.digests.md5_hex)?;
        }
        if let Some(supplied) = &input.checksum {
            supplied.verify(staged.checksum(supplied.algorithm).unwrap_or_default())?;
        }
        let checksum = recorded_checksum(&staged, input.checksum.as_ref(), input.checksum_algorithm);

        let draft = ObjectDraft {
            key: key.to_owned(),
            etag: staged.etag(),
            size: staged.size,
            metadata: input.metadata,
            storage_class: input
                .storage_class
                .unwrap_or_else(|| STANDARD_STORAGE_CLASS.to_owned()),
            owner: input.owner.unwrap_or_default(),
            checksum,
            parts_count: None,
        };
        let _gate = bucket.read_gate().await?;
        let object = self
            .commit_object(&bucket, staged, draft, &input.conditions)
            .await?;
        Ok(PutObjectOutput {
            etag: object.etag,
            version_id: object.version_id,
            size: object.size,
            checksum: object.checksum,
        })
    }

    /// Delete an object or one of its versions.
    ///
    /// Without a version id: removes the `"null"` version of an unversioned
    /// bucket, or adds a delete marker (a `"null"` one while suspended).
    /// With a version id: removes exactly that version; an unknown id is a
    /// no-op.
    ///
    /// # Errors
    ///
    /// - [`S3ServiceError::NoSuchBucket`] if the bucket does not exist.
    /// - [`S3ServiceError::AccessDenied`] if object lock protects the version.
    pub async fn delete_object(
        &self,
        bucket_name: &str,
        key: &str,
        input: DeleteObjectInput,
    ) -> S3ServiceResult<DeleteObjectOutput> {
        let bucket = self.state.get_bucket(bucket_name)?;
        let _gate = bucket.read_gate().await?;

        if let Some(version_id) = input.version_id {
            let removed = {
                let mut objects = bucket.objects.write();
                let locked = bucket.is_object_lock_enabled()
                    && objects
                        .versions(key)
                        .iter()
                        .find(|v| v.version_id() == version_id)
                        .and_then(ObjectVersion::as_object)
                        .is_some_and(|o| o.is_locked(Utc::now(), input.bypass_governance));
                if locked {
                    return Err(S3ServiceError::AccessDenied);
                }
                objects.remove_version(key, &version_id)
            };
            let Some(removed) = removed else {
                trace!(bucket = %bucket_name, key = %key, version_id = %version_id, "no such version to delete");
                return Ok(DeleteObjectOutput {
                    version_id: Some(version_id),
                    delete_marker: false,
                });
            };
            self.storage.remove_version(&bucket.name, &removed).await;
            debug!(bucket = %bucket_name, key = %key, version_id = %version_id, "version deleted");
            return Ok(DeleteObjectOutput {
                version_id: Some(version_id),
                delete_marker: removed.is_delete_marker(),
            });
        }

        match bucket.versioning() {
            VersioningStatus::Disabled => {
                let removed = bucket.objects.write().remove_version(key, NULL_VERSION_ID);
                if let Some(removed) = removed {
                    self.storage.remove_version(&bucket.name, &removed).await;
                    debug!(bucket = %bucket_name, key = %key, "object deleted");
                }
                Ok(DeleteObjectOutput::default())
            }
            VersioningStatus::Enabled => {
                let marker = self
                    .commit_delete_marker(&bucket, key, true)
                    .await?;
                Ok(DeleteObjectOutput {
                    version_id: Some(marker.version_id),
                    delete_marker: true,
                })
            }
            VersioningStatus::Suspended => {
                let marker = self
                    .commit_delete_marker(&bucket, key, false)
                    .await?;
                Ok(DeleteObjectOutput {
                    version_id: Some(marker.version_id),
                    delete_marker: true,
                })
            }
        }
    }

    /// Delete many keys; failures are reported per entry.
    ///
    /// # Errors
    ///
    /// - [`S3ServiceError::MalformedXml`] for an empty or oversized batch.
    /// - [`S3ServiceError::NoSuchBucket`] if the bucket does not exist.
    pub async fn delete_objects(
        &self,
        bucket_name: &str,
        objects: Vec<ObjectIdentifier>,
        bypass_governance: bool,
    ) -> S3ServiceResult<DeleteObjectsOutput> {
        if objects.is_empty() || objects.len() > MAX_DELETE_OBJECTS {
            return Err(S3ServiceError::MalformedXml);
        }
        self.state.get_bucket(bucket_name)?;

        let mut output = DeleteObjectsOutput::default();
        for ObjectIdentifier { key, version_id } in objects {
            let input = DeleteObjectInput {
                version_id: version_id.clone(),
                bypass_governance,
            };
            match self.delete_object(bucket_name, &key, input).await {
                Ok(result) => {
                    let created_marker = result.delete_marker && version_id.is_none();
                    output.deleted.push(DeletedObject {
                        key,
                        version_id,
                        delete_marker: result.delete_marker,
                        delete_marker_version_id: created_marker
                            .then_some(result.version_id)
                            .flatten(),
                    });
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => output.errors.push(DeleteError {
                    key,
                    version_id,
                    code: e.code(),
                    message: e.to_string(),
                }),
            }
        }
        Ok(output)
    }

    /// Copy an object version into a new version of the destination.
    ///
    /// # Errors
    ///
    /// - [`S3ServiceError::NoSuchBucket`] for either bucket.
    /// - [`S3ServiceError::NoSuchKey`] / [`S3ServiceError::NoSuchVersion`]
    ///   for a missing source.
    /// - [`S3ServiceError::InvalidRequest`] for a copy onto itself that
    ///   changes nothing, or a source version that is a delete marker.
    /// - [`S3ServiceError::CopySourcePreconditionFailed`] from the source
    ///   conditions.
    pub async fn copy_object(
        &self,
        bucket_name: &str,
        key: &str,
        source: &CopySource,
        input: CopyObjectInput,
    ) -> S3ServiceResult<CopyObjectOutput> {
        validate_object_key(key)?;
        let is_self_copy = source.bucket == bucket_name && source.key == key;
        if is_self_copy
            && input.metadata_directive == MetadataDirective::Copy
            && input.storage_class.is_none()
            && input.checksum_algorithm.is_none()
        {
            return Err(S3ServiceError::InvalidRequest {
                message: "This copy request is illegal because it is trying to copy an object to itself without changing the object's metadata, storage class, website redirect location or encryption attributes.".to_owned(),
            });
        }

        let (source_object, source_file) =
            self.resolve_copy_source(source, &input.source_conditions)?;
        let bucket = self.state.get_bucket(bucket_name)?;

        let metadata = match input.metadata_directive {
            MetadataDirective::Copy => ObjectMetadata {
                legal_hold: false,
                retention: None,
                ..source_object.metadata.clone()
            },
            MetadataDirective::Replace => input.metadata,
        };
        validate_metadata(&metadata.user_metadata)?;
        validate_tags(&metadata.tagging)?;
        check_lock_attributes(&bucket, &metadata)?;

        let algorithm = input
            .checksum_algorithm
            .or_else(|| source_object.checksum.as_ref().map(|c| c.algorithm));
        let staged = self
            .storage
            .stage_files(
                vec![FileSlice::whole(source_file)],
                algorithm.into_iter().collect(),
            )
            .await?;
        let checksum = algorithm.and_then(|algorithm| {
            staged.checksum(algorithm).map(|value| ChecksumData {
                algorithm,
                value: value.to_owned(),
                checksum_type: ChecksumType::FullObject,
            })
        });

        let draft = ObjectDraft {
            key: key.to_owned(),
            etag: staged.etag(),
            size: staged.size,
            metadata,
            storage_class: input
                .storage_class
                .unwrap_or_else(|| source_object.storage_class.clone()),
            owner: source_object.owner.clone(),
            checksum,
            parts_count: None,
        };
        let _gate = bucket.read_gate().await?;
        let object = self
            .commit_object(&bucket, staged, draft, &input.conditions)
            .await?;
        debug!(
            source_bucket = %source.bucket,
            source_key = %source.key,
            bucket = %bucket_name,
            key = %key,
            "object copied"
        );
        Ok(CopyObjectOutput {
            etag: object.etag,
            last_modified: object.last_modified,
            version_id: object.version_id,
            source_version_id: source_object.version_id,
            checksum: object.checksum,
        })
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Evaluate read conditions and resolve the requested range.
    fn check_read(object: &S3Object, input: &GetObjectInput) -> S3ServiceResult<Option<ByteRange>> {
        input.conditions.evaluate(&object.etag, object.last_modified)?;
        input
            .range
            .as_deref()
            .map(|r| parse_range_header(r, object.size))
            .transpose()
    }

    /// Read an object, optionally a version of it and a byte range.
    ///
    /// # Errors
    ///
    /// - [`S3ServiceError::NoSuchBucket`], [`S3ServiceError::NoSuchKey`] or
    ///   [`S3ServiceError::NoSuchVersion`] when nothing is found.
    /// - [`S3ServiceError::PreconditionFailed`] / [`S3ServiceError::NotModified`]
    ///   from the read conditions.
    /// - [`S3ServiceError::InvalidRange`] for an unsatisfiable range.
    pub async fn get_object(
        &self,
        bucket_name: &str,
        key: &str,
        input: GetObjectInput,
    ) -> S3ServiceResult<GetObjectOutcome> {
        let bucket = self.state.get_bucket(bucket_name)?;
        let (object, file) = match self.open_object(&bucket, key, input.version_id.as_deref())? {
            GetObjectOutcome::Found(found) => found,
            GetObjectOutcome::DeleteMarker(hit) => return Ok(GetObjectOutcome::DeleteMarker(hit)),
        };
        let range = Self::check_read(&object, &input)?;
        let body = if object.size == 0 {
            Bytes::new()
        } else {
            self.storage.read_object(file, range).await?
        };
        trace!(bucket = %bucket_name, key = %key, bytes = body.len(), "object read");
        Ok(GetObjectOutcome::Found(GetObjectOutput {
            object,
            range,
            body,
        }))
    }

    /// [`S3Store::get_object`] without reading content.
    ///
    /// # Errors
    ///
    /// Same as [`S3Store::get_object`].
    pub fn head_object(
        &self,
        bucket_name: &str,
        key: &str,
        input: &GetObjectInput,
    ) -> S3ServiceResult<GetObjectOutcome<HeadObjectOutput>> {
        Ok(match self.read_object_version(bucket_name, key, input.version_id.as_deref())? {
            GetObjectOutcome::Found(object) => {
                let range = Self::check_read(&object, input)?;
                GetObjectOutcome::Found(HeadObjectOutput { object, range })
            }
            GetObjectOutcome::DeleteMarker(hit) => GetObjectOutcome::DeleteMarker(hit),
        })
    }

    // -----------------------------------------------------------------------
    // In-place edits
    // -----------------------------------------------------------------------

    /// Replace a version's tag set. Returns the edited version id.
    ///
    /// # Errors
    ///
    /// - [`S3ServiceError::InvalidTag`] for an invalid tag set.
    /// - Lookup errors as for [`S3Store::get_object`];
    ///   [`S3ServiceError::MethodNotAllowed`] for a delete marker.
    pub async fn put_object_tagging(
        &self,
        bucket_name: &str,
        key: &str,
        version_id: Option<&str>,
        tags: Vec<(String, String)>,
    ) -> S3ServiceResult<String> {
        validate_tags(&tags)?;
        let (object, ()) = self
            .edit_object(bucket_name, key, version_id, |object| {
                object.metadata.tagging = tags;
                Ok(())
            })
            .await?;
        Ok(object.version_id)
    }

    /// A version's tag set and version id.
    ///
    /// # Errors
    ///
    /// Lookup errors as for [`S3Store::get_object`].
    pub fn get_object_tagging(
        &self,
        bucket_name: &str,
        key: &str,
        version_id: Option<&str>,
    ) -> S3ServiceResult<(String, Vec<(String, String)>)> {
        let object = self
            .read_object_version(bucket_name, key, version_id)?
            .into_found()?;
        Ok((object.version_id, object.metadata.tagging))
    }

    /// Remove all tags from a version.
    ///
    /// # Errors
    ///
    /// Same as [`S3Store::put_object_tagging`].
    pub async fn delete_object_tagging(
        &self,
        bucket_name: &str,
        key: &str,
        version_id: Option<&str>,
    ) -> S3ServiceResult<String> {
        self.put_object_tagging(bucket_name, key, version_id, Vec::new())
            .await
    }

    /// Turn a version's legal hold on or off.
    ///
    /// # Errors
    ///
    /// - [`S3ServiceError::InvalidRequest`] if the bucket has no object lock.
    /// - Lookup errors as for [`S3Store::put_object_tagging`].
    pub async fn put_object_legal_hold(
        &self,
        bucket_name: &str,
        key: &str,
        version_id: Option<&str>,
        on: bool,
    ) -> S3ServiceResult<()> {
        require_object_lock(&*self.state.get_bucket(bucket_name)?)?;
        self.edit_object(bucket_name, key, version_id, |object| {
            object.metadata.legal_hold = on;
            Ok(())
        })
        .await?;
        Ok(())
    }

    /// Whether a version is under legal hold.
    ///
    /// # Errors
    ///
    /// - [`S3ServiceError::InvalidRequest`] if the bucket has no object lock.
    /// - Lookup errors as for [`S3Store::get_object`].
    pub fn get_object_legal_hold(
        &self,
        bucket_name: &str,
        key: &str,
        version_id: Option<&str>,
    ) -> S3ServiceResult<bool> {
        require_object_lock(&*self.state.get_bucket(bucket_name)?)?;
        let object = self
            .read_object_version(bucket_name, key, version_id)?
            .into_found()?;
        Ok(object.metadata.legal_hold)
    }

    /// Set or clear a version's retention.
    ///
    /// An unexpired COMPLIANCE retention can only be extended. An unexpired
    /// GOVERNANCE retention can be shortened, removed or changed only with
    /// `bypass_governance`.
    ///
    /// # Errors
    ///
    /// - [`S3ServiceError::InvalidRequest`] if the bucket has no object lock.
    /// - [`S3ServiceError::AccessDenied`] when the current retention forbids
    ///   the change.
    /// - Lookup errors as for [`S3Store::put_object_tagging`].
    pub async fn put_object_retention(
        &self,
        bucket_name: &str,
        key: &str,
        version_id: Option<&str>,
        retention: Option<Retention>,
        bypass_governance: bool,
    ) -> S3ServiceResult<()> {
        require_object_lock(&*self.state.get_bucket(bucket_name)?)?;
        self.edit_object(bucket_name, key, version_id, |object| {
            if let Some(current) = &object.metadata.retention {
                let extends = retention.as_ref().is_some_and(|new| {
                    new.mode == current.mode && new.retain_until >= current.retain_until
                });
                let active = current.retain_until > Utc::now();
                let forbidden = match current.mode {
                    RetentionMode::Compliance => active && !extends,
                    RetentionMode::Governance => active && !extends && !bypass_governance,
                };
                if forbidden {
                    return Err(S3ServiceError::AccessDenied);
                }
            }
            object.metadata.retention = retention;
            Ok(())
        })
        .await?;
        Ok(())
    }

    /// A version's retention, if any.
    ///
    /// # Errors
    ///
    /// - [`S3ServiceError::InvalidRequest`] if the bucket has no object lock.
    /// - Lookup errors as for [`S3Store::get_object`].
    pub fn get_object_retention(
        &self,
        bucket_name: &str,
        key: &str,
        version_id: Option<&str>,
    ) -> S3ServiceResult<Option<Retention>> {
        require_object_lock(&*self.state.get_bucket(bucket_name)?)?;
        let object = self
            .read_object_version(bucket_name, key, version_id)?
            .into_found()?;
        Ok(object.metadata.retention)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use tempfile::TempDir;

    use super::*;
    use crate::checksums::compute_checksum;
    use crate::config::S3Config;
    use crate::ops::bucket::CreateBucketInput;

    async fn open_store() -> (TempDir, S3Store) {
        let dir = TempDir::new().expect("tempdir");
        let store = S3Store::open(S3Config::builder().data_dir(dir.path().into()).build())
            .await
            .expect("open");
        (dir, store)
    }

    async fn create_bucket(store: &S3Store, name: &str, versioned: bool, lock: bool) {
        store
            .create_bucket(
                name,
                CreateBucketInput {
                    object_lock_enabled: lock,
                    ..Default::default()
                },
            )
            .await
            .expect("create bucket");
        if versioned && !lock {
            store
                .put_bucket_versioning(name, VersioningStatus::Enabled)
                .await
                .expect("enable versioning");
        }
    }

    async fn put(store: &S3Store, bucket: &str, key: &str, data: &'static str) -> PutObjectOutput {
        store
            .put_object(bucket, key, Body::from(data), PutObjectInput::default())
            .await
            .expect("put")
    }

    async fn get_body(store: &S3Store, bucket: &str, key: &str, version_id: Option<&str>) -> Bytes {
        store
            .get_object(
                bucket,
                key,
                GetObjectInput {
                    version_id: version_id.map(str::to_owned),
                    ..Default::default()
                },
            )
            .await
            .expect("get")
            .into_found()
            .expect("found")
            .body
    }

    #[tokio::test]
    async fn test_should_put_and_get_object() {
        let (_dir, store) = open_store().await;
        create_bucket(&store, "b", false, false).await;
        let out = put(&store, "b", "hello.txt", "hello world").await;
        assert_eq!(out.etag, "\"5eb63bbbe01eeed093cb22bb8f5acdc3\"");
        assert_eq!(out.version_id, "null");
        assert_eq!(&get_body(&store, "b", "hello.txt", None).await[..], b"hello world");
    }

    #[tokio::test]
    async fn test_should_overwrite_null_version_when_unversioned() {
        let (_dir, store) = open_store().await;
        create_bucket(&store, "b", false, false).await;
        put(&store, "b", "k", "one").await;
        put(&store, "b", "k", "two").await;
        let bucket = store.state.get_bucket("b").expect("bucket");
        assert_eq!(bucket.objects.read().version_count(), 1);
        assert_eq!(&get_body(&store, "b", "k", None).await[..], b"two");
    }

    #[tokio::test]
    async fn test_should_keep_history_when_versioned() {
        let (_dir, store) = open_store().await;
        create_bucket(&store, "b", true, false).await;
        let v1 = put(&store, "b", "k", "hello").await;
        let v2 = put(&store, "b", "k", "world").await;
        assert_ne!(v1.version_id, v2.version_id);
        assert_eq!(&get_body(&store, "b", "k", None).await[..], b"world");
        assert_eq!(&get_body(&store, "b", "k", Some(&v1.version_id)).await[..], b"hello");

        let deleted = store
            .delete_object("b", "k", DeleteObjectInput::default())
            .await
            .expect("delete");
        assert!(deleted.delete_marker);
        let outcome = store
            .get_object("b", "k", GetObjectInput::default())
            .await
            .expect("get");
        assert!(outcome.is_delete_marker());
        assert!(matches!(
            outcome.into_found(),
            Err(S3ServiceError::NoSuchKey { .. })
        ));

        let marker_read = store
            .get_object(
                "b",
                "k",
                GetObjectInput {
                    version_id: deleted.version_id.clone(),
                    ..Default::default()
                },
            )
            .await
            .expect("get marker");
        assert!(matches!(
            marker_read.into_found(),
            Err(S3ServiceError::MethodNotAllowed)
        ));
    }

    #[tokio::test]
    async fn test_should_undelete_by_removing_marker() {
        let (_dir, store) = open_store().await;
        create_bucket(&store, "b", true, false).await;
        put(&store, "b", "k", "data").await;
        let marker = store
            .delete_object("b", "k", DeleteObjectInput::default())
            .await
            .expect("delete");
        let removed = store
            .delete_object(
                "b",
                "k",
                DeleteObjectInput {
                    version_id: marker.version_id,
                    ..Default::default()
                },
            )
            .await
            .expect("remove marker");
        assert!(removed.delete_marker);
        assert_eq!(&get_body(&store, "b", "k", None).await[..], b"data");
    }

    #[tokio::test]
    async fn test_should_ignore_unknown_version_on_delete() {
        let (_dir, store) = open_store().await;
        create_bucket(&store, "b", true, false).await;
        put(&store, "b", "k", "data").await;
        let out = store
            .delete_object(
                "b",
                "k",
                DeleteObjectInput {
                    version_id: Some("missing".to_owned()),
                    ..Default::default()
                },
            )
            .await
            .expect("delete");
        assert!(!out.delete_marker);
        assert_eq!(&get_body(&store, "b", "k", None).await[..], b"data");
    }

    #[tokio::test]
    async fn test_should_replace_null_marker_when_suspended() {
        let (_dir, store) = open_store().await;
        create_bucket(&store, "b", true, false).await;
        let v1 = put(&store, "b", "k", "kept").await;
        store
            .put_bucket_versioning("b", VersioningStatus::Suspended)
            .await
            .expect("suspend");
        put(&store, "b", "k", "null one").await;
        let first = store
            .delete_object("b", "k", DeleteObjectInput::default())
            .await
            .expect("delete");
        assert_eq!(first.version_id.as_deref(), Some("null"));
        store
            .delete_object("b", "k", DeleteObjectInput::default())
            .await
            .expect("delete again");

        let bucket = store.state.get_bucket("b").expect("bucket");
        let objects = bucket.objects.read();
        let versions = objects.versions("k");
        assert_eq!(versions.len(), 2);
        assert!(versions[0].is_delete_marker());
        assert_eq!(versions[1].version_id(), v1.version_id);
    }

    #[tokio::test]
    async fn test_should_enforce_write_conditions() {
        let (_dir, store) = open_store().await;
        create_bucket(&store, "b", false, false).await;
        let create_only = PutObjectInput {
            conditions: WriteConditions {
                if_none_match: Some("*".to_owned()),
                ..Default::default()
            },
            ..Default::default()
        };
        store
            .put_object("b", "k", Body::from("a"), create_only.clone())
            .await
            .expect("first write");
        assert!(matches!(
            store.put_object("b", "k", Body::from("b"), create_only).await,
            Err(S3ServiceError::PreconditionFailed { .. })
        ));

        let replace_only = PutObjectInput {
            conditions: WriteConditions {
                if_match: Some("\"nope\"".to_owned()),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(matches!(
            store.put_object("b", "missing", Body::from("c"), replace_only).await,
            Err(S3ServiceError::NoSuchKey { .. })
        ));
    }

    #[tokio::test]
    async fn test_should_verify_supplied_checksum_and_md5() {
        let (_dir, store) = open_store().await;
        create_bucket(&store, "b", false, false).await;
        let good = PutObjectInput {
            checksum: Some(ChecksumValue {
                algorithm: ChecksumAlgorithm::Sha256,
                value: compute_checksum(ChecksumAlgorithm::Sha256, b"payload"),
            }),
            ..Default::default()
        };
        let out = store
            .put_object("b", "k", Body::from("payload"), good)
            .await
            .expect("put");
        assert_eq!(
            out.checksum.map(|c| c.algorithm),
            Some(ChecksumAlgorithm::Sha256)
        );

        let bad = PutObjectInput {
            checksum: Some(ChecksumValue {
                algorithm: ChecksumAlgorithm::Crc32,
                value: compute_checksum(ChecksumAlgorithm::Crc32, b"other"),
            }),
            ..Default::default()
        };
        assert!(matches!(
            store.put_object("b", "k2", Body::from("payload"), bad).await,
            Err(S3ServiceError::BadDigest { .. })
        ));
        assert!(matches!(
            store.head_object("b", "k2", &GetObjectInput::default()),
            Err(S3ServiceError::NoSuchKey { .. })
        ));

        let bad_md5 = PutObjectInput {
            content_md5: Some("not base64!".to_owned()),
            ..Default::default()
        };
        assert!(matches!(
            store.put_object("b", "k3", Body::from("payload"), bad_md5).await,
            Err(S3ServiceError::InvalidDigest)
        ));
    }

    #[tokio::test]
    async fn test_should_read_ranges_and_evaluate_conditions() {
        let (_dir, store) = open_store().await;
        create_bucket(&store, "b", false, false).await;
        let out = put(&store, "b", "k", "0123456789").await;

        let ranged = store
            .get_object(
                "b",
                "k",
                GetObjectInput {
                    range: Some("bytes=2-4".to_owned()),
                    ..Default::default()
                },
            )
            .await
            .expect("get")
            .into_found()
            .expect("found");
        assert_eq!(&ranged.body[..], b"234");
        assert_eq!(ranged.content_range().as_deref(), Some("bytes 2-4/10"));

        assert!(matches!(
            store
                .get_object(
                    "b",
                    "k",
                    GetObjectInput {
                        range: Some("bytes=20-30".to_owned()),
                        ..Default::default()
                    },
                )
                .await,
            Err(S3ServiceError::InvalidRange)
        ));

        let not_modified = GetObjectInput {
            conditions: ReadConditions {
                if_none_match: Some(out.etag),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(matches!(
            store.head_object("b", "k", &not_modified),
            Err(S3ServiceError::NotModified)
        ));
    }

    #[tokio::test]
    async fn test_should_copy_object() {
        let (_dir, store) = open_store().await;
        create_bucket(&store, "src", false, false).await;
        create_bucket(&store, "dst", false, false).await;
        let source_put = store
            .put_object(
                "src",
                "a",
                Body::from("copy me"),
                PutObjectInput {
                    metadata: ObjectMetadata {
                        content_type: Some("text/plain".to_owned()),
                        ..Default::default()
                    },
                    ..Default::default()
                },
            )
            .await
            .expect("put");

        let out = store
            .copy_object("dst", "b", &CopySource::new("src", "a"), CopyObjectInput::default())
            .await
            .expect("copy");
        assert_eq!(out.etag, source_put.etag);
        let copied = store
            .head_object("dst", "b", &GetObjectInput::default())
            .expect("head")
            .into_found()
            .expect("found");
        assert_eq!(copied.object.metadata.content_type.as_deref(), Some("text/plain"));
        assert_eq!(&get_body(&store, "dst", "b", None).await[..], b"copy me");
    }

    #[tokio::test]
    async fn test_should_reject_noop_self_copy() {
        let (_dir, store) = open_store().await;
        create_bucket(&store, "b", false, false).await;
        put(&store, "b", "k", "x").await;
        assert!(matches!(
            store
                .copy_object("b", "k", &CopySource::new("b", "k"), CopyObjectInput::default())
                .await,
            Err(S3ServiceError::InvalidRequest { .. })
        ));
        store
            .copy_object(
                "b",
                "k",
                &CopySource::new("b", "k"),
                CopyObjectInput {
                    metadata_directive: MetadataDirective::Replace,
                    ..Default::default()
                },
            )
            .await
            .expect("replace metadata in place");
    }

    #[tokio::test]
    async fn test_should_fail_copy_source_condition() {
        let (_dir, store) = open_store().await;
        create_bucket(&store, "b", false, false).await;
        put(&store, "b", "k", "x").await;
        let input = CopyObjectInput {
            source_conditions: ReadConditions {
                if_match: Some("\"other\"".to_owned()),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(matches!(
            store.copy_object("b", "k2", &CopySource::new("b", "k"), input).await,
            Err(S3ServiceError::CopySourcePreconditionFailed { .. })
        ));
        assert!(matches!(
            store
                .copy_object("b", "k2", &CopySource::new("b", "nope"), CopyObjectInput::default())
                .await,
            Err(S3ServiceError::NoSuchKey { .. })
        ));
    }

    #[tokio::test]
    async fn test_should_delete_objects_in_batch() {
        let (_dir, store) = open_store().await;
        create_bucket(&store, "b", false, false).await;
        put(&store, "b", "a", "1").await;
        put(&store, "b", "b", "2").await;
        let out = store
            .delete_objects(
                "b",
                vec![
                    ObjectIdentifier {
                        key: "a".to_owned(),
                        version_id: None,
                    },
                    ObjectIdentifier {
                        key: "b".to_owned(),
                        version_id: None,
                    },
                ],
                false,
            )
            .await
            .expect("delete objects");
        assert_eq!(out.deleted.len(), 2);
        assert!(out.errors.is_empty());
        assert!(store.state.get_bucket("b").expect("bucket").is_empty());
        assert!(matches!(
            store.delete_objects("b", Vec::new(), false).await,
            Err(S3ServiceError::MalformedXml)
        ));
    }

    #[tokio::test]
    async fn test_should_edit_tags_in_place() {
        let (_dir, store) = open_store().await;
        create_bucket(&store, "b", true, false).await;
        put(&store, "b", "k", "x").await;
        let tags = vec![("env".to_owned(), "prod".to_owned())];
        store
            .put_object_tagging("b", "k", None, tags.clone())
            .await
            .expect("tag");
        assert_eq!(store.get_object_tagging("b", "k", None).expect("get").1, tags);
        let bucket = store.state.get_bucket("b").expect("bucket");
        assert_eq!(bucket.objects.read().version_count(), 1);

        store.delete_object_tagging("b", "k", None).await.expect("untag");
        assert!(store.get_object_tagging("b", "k", None).expect("get").1.is_empty());
    }

    #[tokio::test]
    async fn test_should_protect_locked_versions() {
        let (_dir, store) = open_store().await;
        create_bucket(&store, "locked", true, true).await;
        let out = put(&store, "locked", "k", "x").await;
        let version = Some(out.version_id.as_str());

        store
            .put_object_legal_hold("locked", "k", version, true)
            .await
            .expect("legal hold");
        assert!(store.get_object_legal_hold("locked", "k", version).expect("get"));
        let explicit = DeleteObjectInput {
            version_id: Some(out.version_id.clone()),
            bypass_governance: true,
        };
        assert!(matches!(
            store.delete_object("locked", "k", explicit.clone()).await,
            Err(S3ServiceError::AccessDenied)
        ));
        store
            .put_object_legal_hold("locked", "k", version, false)
            .await
            .expect("release");

        let governance = Retention {
            mode: RetentionMode::Governance,
            retain_until: Utc::now() + Duration::days(1),
        };
        store
            .put_object_retention("locked", "k", version, Some(governance), false)
            .await
            .expect("retention");
        assert!(matches!(
            store
                .delete_object(
                    "locked",
                    "k",
                    DeleteObjectInput {
                        bypass_governance: false,
                        ..explicit.clone()
                    }
                )
                .await,
            Err(S3ServiceError::AccessDenied)
        ));
        assert!(matches!(
            store
                .put_object_retention("locked", "k", version, None, false)
                .await,
            Err(S3ServiceError::AccessDenied)
        ));

        // An unversioned delete still adds a marker.
        let marker = store
            .delete_object("locked", "k", DeleteObjectInput::default())
            .await
            .expect("marker");
        assert!(marker.delete_marker);

        store
            .delete_object("locked", "k", explicit)
            .await
            .expect("governance bypass");
    }

    #[tokio::test]
    async fn test_should_require_object_lock_for_retention() {
        let (_dir, store) = open_store().await;
        create_bucket(&store, "b", false, false).await;
        put(&store, "b", "k", "x").await;
        assert!(matches!(
            store.put_object_legal_hold("b", "k", None, true).await,
            Err(S3ServiceError::InvalidRequest { .. })
        ));
        let with_hold = PutObjectInput {
            metadata: ObjectMetadata {
                legal_hold: true,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(matches!(
            store.put_object("b", "k", Body::from("x"), with_hold).await,
            Err(S3ServiceError::InvalidRequest { .. })
        ));
    }

    #[tokio::test]
    async fn test_should_reject_missing_bucket_and_bad_key() {
        let (_dir, store) = open_store().await;
        assert!(matches!(
            store
                .put_object("nope", "k", Body::from("x"), PutObjectInput::default())
                .await,
            Err(S3ServiceError::NoSuchBucket { .. })
        ));
        create_bucket(&store, "b", false, false).await;
        assert!(matches!(
            store
                .put_object("b", "", Body::empty(), PutObjectInput::default())
                .await,
            Err(S3ServiceError::InvalidArgument { .. })
        ));
    }
}
