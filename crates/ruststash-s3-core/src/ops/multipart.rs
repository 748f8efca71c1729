//! Multipart upload operations.
//!
//! Implements `create_multipart_upload`, `upload_part`, `upload_part_copy`,
//! `list_parts`, `list_multipart_uploads`, `verify_parts`,
//! `complete_multipart_upload` and `abort_multipart_upload`.
//!
//! Every upload sits behind its own async mutex. Completion and abort take
//! the bucket gate first and the upload mutex second, then re-check the
//! upload state, so a racing second call sees the terminal state and either
//! replays the cached result or fails fast.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::body::Body;
use crate::checksums::{
    ChecksumAlgorithm, ChecksumType, ChecksumValue, compute_composite_checksum,
    compute_multipart_etag, verify_content_md5,
};
use crate::conditional::{ReadConditions, WriteConditions};
use crate::error::{S3ServiceError, S3ServiceResult};
use crate::ops::object::{ObjectDraft, check_lock_attributes, current_etag};
use crate::provider::S3Store;
use crate::state::{
    ChecksumData, CompleteMultipartOutput, MultipartUpload, ObjectMetadata, Owner, S3Bucket,
    UploadPart, UploadState,
};
use crate::storage::{FileSlice, StagedBody};
use crate::utils::{CopySource, generate_upload_id, normalize_etag, parse_copy_source_range};
use crate::validation::{
    clamp_page_size, validate_metadata, validate_object_key, validate_part_number, validate_tags,
};

/// Page size cap for part and upload listings.
pub const MAX_LIST_PARTS: usize = 1000;

/// Options for [`S3Store::create_multipart_upload`].
#[derive(Debug, Clone, Default)]
pub struct CreateMultipartUploadInput {
    /// Attributes applied to the completed object.
    pub metadata: ObjectMetadata,
    /// Defaults to `STANDARD`.
    pub storage_class: Option<String>,
    /// Algorithm every part must be checksummed with.
    pub checksum_algorithm: Option<ChecksumAlgorithm>,
    /// Defaults to [`ChecksumType::Composite`].
    pub checksum_type: Option<ChecksumType>,
    /// Initiator; the default owner when absent.
    pub owner: Option<Owner>,
}

/// Result of [`S3Store::create_multipart_upload`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateMultipartUploadOutput {
    /// Id addressing the new upload.
    pub upload_id: String,
    /// Echo of the requested algorithm.
    pub checksum_algorithm: Option<ChecksumAlgorithm>,
    /// Set when an algorithm was requested.
    pub checksum_type: Option<ChecksumType>,
}

/// Options for [`S3Store::upload_part`].
#[derive(Debug, Clone, Default)]
pub struct UploadPartInput {
    /// `Content-MD5` of the part, base64.
    pub content_md5: Option<String>,
    /// A checksum supplied in an `x-amz-checksum-*` header.
    pub checksum: Option<ChecksumValue>,
}

/// Result of [`S3Store::upload_part`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadPartOutput {
    /// Quoted MD5 of the part.
    pub etag: String,
    /// Part checksum under the upload's algorithm.
    pub checksum: Option<ChecksumData>,
}

/// Options for [`S3Store::upload_part_copy`].
#[derive(Debug, Clone, Default)]
pub struct UploadPartCopyInput {
    /// `x-amz-copy-source-range`.
    pub source_range: Option<String>,
    /// `x-amz-copy-source-if-*` conditions.
    pub source_conditions: ReadConditions,
}

/// Result of [`S3Store::upload_part_copy`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadPartCopyOutput {
    /// Quoted MD5 of the copied bytes.
    pub etag: String,
    /// When the part was written.
    pub last_modified: DateTime<Utc>,
    /// Version the bytes were read from.
    pub source_version_id: String,
    /// Part checksum under the upload's algorithm.
    pub checksum: Option<ChecksumData>,
}

/// Options for [`S3Store::list_parts`].
#[derive(Debug, Clone, Default)]
pub struct ListPartsInput {
    /// Page size, clamped to 1000.
    pub max_parts: Option<usize>,
    /// List parts numbered above this.
    pub part_number_marker: Option<u32>,
}

/// One page of [`S3Store::list_parts`] plus the upload's attributes.
#[derive(Debug, Clone)]
pub struct ListPartsOutput {
    /// Parts in ascending number order.
    pub parts: Vec<UploadPart>,
    /// Whether more parts follow.
    pub is_truncated: bool,
    /// Marker for the next page, when truncated.
    pub next_part_number_marker: Option<u32>,
    /// The effective page size.
    pub max_parts: usize,
    /// When the upload was created.
    pub initiated: DateTime<Utc>,
    /// Initiator of the upload.
    pub owner: Owner,
    /// Storage class of the completed object.
    pub storage_class: String,
    /// Algorithm parts are checksummed with.
    pub checksum_algorithm: Option<ChecksumAlgorithm>,
    /// How the object checksum is derived.
    pub checksum_type: ChecksumType,
}

/// Options for [`S3Store::list_multipart_uploads`].
#[derive(Debug, Clone, Default)]
pub struct ListMultipartUploadsInput {
    /// Only uploads for keys with this prefix.
    pub prefix: Option<String>,
    /// Resume after this key.
    pub key_marker: Option<String>,
    /// Resume after this upload of `key_marker`.
    pub upload_id_marker: Option<String>,
    /// Page size, clamped to 1000.
    pub max_uploads: Option<usize>,
}

/// One open upload in a listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultipartUploadSummary {
    /// Object key the upload targets.
    pub key: String,
    /// Upload id.
    pub upload_id: String,
    /// When the upload was created.
    pub initiated: DateTime<Utc>,
    /// Initiator.
    pub owner: Owner,
    /// Storage class of the completed object.
    pub storage_class: String,
    /// Algorithm parts are checksummed with.
    pub checksum_algorithm: Option<ChecksumAlgorithm>,
}

/// One page of [`S3Store::list_multipart_uploads`].
#[derive(Debug, Clone, Default)]
pub struct ListMultipartUploadsOutput {
    /// Open uploads ordered by key, then initiation time.
    pub uploads: Vec<MultipartUploadSummary>,
    /// Whether more uploads follow.
    pub is_truncated: bool,
    /// Key marker for the next page, when truncated.
    pub next_key_marker: Option<String>,
    /// Upload id marker for the next page, when truncated.
    pub next_upload_id_marker: Option<String>,
    /// The effective page size.
    pub max_uploads: usize,
}

/// A part as claimed in a completion request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedPart {
    /// Number the part was uploaded under.
    pub part_number: u32,
    /// ETag returned by the upload, quoted or not.
    pub etag: Option<String>,
    /// Checksum the client recorded for the part.
    pub checksum: Option<ChecksumValue>,
}

impl CompletedPart {
    /// A part claimed by number and ETag.
    #[must_use]
    pub fn new(part_number: u32, etag: impl Into<String>) -> Self {
        Self {
            part_number,
            etag: Some(etag.into()),
            checksum: None,
        }
    }
}

/// Options for [`S3Store::complete_multipart_upload`].
#[derive(Debug, Clone, Default)]
pub struct CompleteMultipartUploadInput {
    /// Claimed parts in ascending number order.
    pub parts: Vec<CompletedPart>,
    /// `If-Match` / `If-None-Match` against the current object.
    pub conditions: WriteConditions,
}

/// Check a claimed part list against the recorded parts.
///
/// Returns the recorded parts in claim order.
fn check_parts<'a>(
    upload: &'a MultipartUpload,
    claimed: &[CompletedPart],
    min_part_size: u64,
) -> S3ServiceResult<Vec<&'a UploadPart>> {
    if claimed.is_empty() {
        return Err(S3ServiceError::MalformedXml);
    }
    if claimed
        .windows(2)
        .any(|pair| pair[0].part_number >= pair[1].part_number)
    {
        return Err(S3ServiceError::InvalidPartOrder);
    }

    let mut parts = Vec::with_capacity(claimed.len());
    for claim in claimed {
        let invalid = || S3ServiceError::InvalidPart {
            message: format!("part {} was not uploaded or does not match", claim.part_number),
        };
        let part = upload.get_part(claim.part_number).ok_or_else(invalid)?;
        if claim
            .etag
            .as_deref()
            .is_some_and(|etag| normalize_etag(etag) != normalize_etag(&part.etag))
        {
            return Err(invalid());
        }
        if let Some(expected) = &claim.checksum {
            let matches = part
                .checksum
                .as_ref()
                .is_some_and(|c| c.algorithm == expected.algorithm && c.value == expected.value);
            if !matches {
                return Err(invalid());
            }
        }
        parts.push(part);
    }

    if let Some((_, leading)) = parts.split_last() {
        if leading.iter().any(|p| p.size < min_part_size) {
            return Err(S3ServiceError::EntityTooSmall);
        }
    }
    Ok(parts)
}

/// Checksum of the assembled object, derived per the upload's declared type.
fn assembled_checksum(
    upload: &MultipartUpload,
    parts: &[&UploadPart],
    staged: &StagedBody,
) -> S3ServiceResult<Option<ChecksumData>> {
    let Some(algorithm) = upload.checksum_algorithm else {
        return Ok(None);
    };
    let value = match upload.checksum_type {
        ChecksumType::Composite => {
            let part_values: Vec<&str> = parts
                .iter()
                .filter_map(|p| p.checksum.as_ref().map(|c| c.value.as_str()))
                .collect();
            compute_composite_checksum(algorithm, &part_values)?
        }
        ChecksumType::FullObject => match staged.checksum(algorithm) {
            Some(value) => value.to_owned(),
            None => return Ok(None),
        },
    };
    Ok(Some(ChecksumData {
        algorithm,
        value,
        checksum_type: upload.checksum_type,
    }))
}

fn no_such_upload(upload_id: &str) -> S3ServiceError {
    S3ServiceError::NoSuchUpload {
        upload_id: upload_id.to_owned(),
    }
}

fn open_upload(bucket: &S3Bucket, upload_id: &str) -> S3ServiceResult<Arc<Mutex<MultipartUpload>>> {
    bucket
        .uploads
        .get(upload_id)
        .map(|entry| Arc::clone(entry.value()))
        .ok_or_else(|| no_such_upload(upload_id))
}

/// Replay a terminal upload: the cached result if it completed for `key`.
fn replay_terminal(
    bucket: &S3Bucket,
    key: &str,
    upload_id: &str,
) -> S3ServiceResult<CompleteMultipartOutput> {
    match bucket.terminal_uploads.get(upload_id) {
        Some(entry) if entry.key == key => match &entry.state {
            UploadState::Completed(output) => Ok((**output).clone()),
            UploadState::Open | UploadState::Aborted => Err(no_such_upload(upload_id)),
        },
        _ => Err(no_such_upload(upload_id)),
    }
}

impl S3Store {
    /// Start a multipart upload.
    ///
    /// # Errors
    ///
    /// - [`S3ServiceError::NoSuchBucket`] if the bucket does not exist.
    /// - [`S3ServiceError::InvalidRequest`] for a full-object checksum with
    ///   an algorithm that cannot be combined, or a checksum type without an
    ///   algorithm.
    pub async fn create_multipart_upload(
        &self,
        bucket_name: &str,
        key: &str,
        input: CreateMultipartUploadInput,
    ) -> S3ServiceResult<CreateMultipartUploadOutput> {
        validate_object_key(key)?;
        validate_metadata(&input.metadata.user_metadata)?;
        validate_tags(&input.metadata.tagging)?;
        let checksum_type = match (input.checksum_algorithm, input.checksum_type) {
            (None, Some(_)) => {
                return Err(S3ServiceError::InvalidRequest {
                    message: "The x-amz-checksum-type header can only be used with the x-amz-checksum-algorithm header.".to_owned(),
                });
            }
            (Some(algorithm), Some(ChecksumType::FullObject)) if !algorithm.supports_full_object() => {
                return Err(S3ServiceError::InvalidRequest {
                    message: format!(
                        "The FULL_OBJECT checksum type cannot be used with the {} checksum algorithm.",
                        algorithm.as_str()
                    ),
                });
            }
            (_, checksum_type) => checksum_type.unwrap_or_default(),
        };

        let bucket = self.state.get_bucket(bucket_name)?;
        check_lock_attributes(&bucket, &input.metadata)?;
        let upload_id = generate_upload_id();
        let mut upload = MultipartUpload::new(
            upload_id.clone(),
            key.to_owned(),
            input.owner.unwrap_or_default(),
            input.metadata,
        )
        .with_checksum(input.checksum_algorithm, checksum_type);
        if let Some(storage_class) = input.storage_class {
            upload.storage_class = storage_class;
        }

        let _gate = bucket.read_gate().await?;
        bucket
            .uploads
            .insert(upload_id.clone(), Arc::new(Mutex::new(upload)));
        debug!(bucket = %bucket_name, key = %key, upload_id = %upload_id, "multipart upload created");
        Ok(CreateMultipartUploadOutput {
            upload_id,
            checksum_algorithm: input.checksum_algorithm,
            checksum_type: input.checksum_algorithm.map(|_| checksum_type),
        })
    }

    /// Publish a staged part into an open upload. Last writer wins.
    async fn record_part(
        &self,
        bucket: &S3Bucket,
        key: &str,
        upload_id: &str,
        part_number: u32,
        staged: StagedBody,
    ) -> S3ServiceResult<UploadPart> {
        let _gate = bucket.read_gate().await?;
        let upload = open_upload(bucket, upload_id)?;
        let mut upload = upload.lock().await;
        if upload.state.is_terminal() || upload.key != key {
            return Err(no_such_upload(upload_id));
        }

        let checksum = upload.checksum_algorithm.and_then(|algorithm| {
            staged.checksum(algorithm).map(|value| ChecksumData {
                algorithm,
                value: value.to_owned(),
                checksum_type: upload.checksum_type,
            })
        });
        let part = UploadPart {
            part_number,
            etag: staged.etag(),
            size: staged.size,
            last_modified: Utc::now(),
            checksum,
        };
        self.storage
            .publish(staged, self.storage.part_path(&bucket.name, upload_id, part_number))
            .await?;
        if upload.put_part(part.clone()).is_some() {
            debug!(upload_id = %upload_id, part_number, "part replaced");
        }
        Ok(part)
    }

    /// Upload one part.
    ///
    /// # Errors
    ///
    /// - [`S3ServiceError::NoSuchUpload`] if the upload is unknown, terminal
    ///   or belongs to another key.
    /// - [`S3ServiceError::InvalidArgument`] for a part number outside
    ///   `1..=10000`.
    /// - [`S3ServiceError::BadDigest`] / [`S3ServiceError::InvalidDigest`]
    ///   when a supplied digest or checksum does not match.
    pub async fn upload_part(
        &self,
        bucket_name: &str,
        key: &str,
        upload_id: &str,
        part_number: u32,
        body: Body,
        input: UploadPartInput,
    ) -> S3ServiceResult<UploadPartOutput> {
        validate_part_number(part_number)?;
        let bucket = self.state.get_bucket(bucket_name)?;
        let declared = {
            let upload = open_upload(&bucket, upload_id)?;
            let upload = upload.lock().await;
            if upload.state.is_terminal() || upload.key != key {
                return Err(no_such_upload(upload_id));
            }
            upload.checksum_algorithm
        };

        let mut algorithms: Vec<ChecksumAlgorithm> = declared.into_iter().collect();
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

        let part = self
            .record_part(&bucket, key, upload_id, part_number, staged)
            .await?;
        Ok(UploadPartOutput {
            etag: part.etag,
            checksum: part.checksum,
        })
    }

    /// Upload a part whose bytes come from an existing object.
    ///
    /// # Errors
    ///
    /// - Upload errors as for [`S3Store::upload_part`].
    /// - Source errors as for [`S3Store::copy_object`].
    /// - [`S3ServiceError::InvalidRange`] for a range outside the source.
    pub async fn upload_part_copy(
        &self,
        bucket_name: &str,
        key: &str,
        upload_id: &str,
        part_number: u32,
        source: &CopySource,
        input: UploadPartCopyInput,
    ) -> S3ServiceResult<UploadPartCopyOutput> {
        validate_part_number(part_number)?;
        let bucket = self.state.get_bucket(bucket_name)?;
        let declared = {
            let upload = open_upload(&bucket, upload_id)?;
            let upload = upload.lock().await;
            if upload.state.is_terminal() || upload.key != key {
                return Err(no_such_upload(upload_id));
            }
            upload.checksum_algorithm
        };

        let (source_object, source_file) =
            self.resolve_copy_source(source, &input.source_conditions)?;
        let range = input
            .source_range
            .as_deref()
            .map(|r| parse_copy_source_range(r, source_object.size))
            .transpose()?;
        let staged = self
            .storage
            .stage_files(
                vec![FileSlice {
                    file: source_file,
                    range,
                }],
                declared.into_iter().collect(),
            )
            .await?;

        let part = self
            .record_part(&bucket, key, upload_id, part_number, staged)
            .await?;
        Ok(UploadPartCopyOutput {
            etag: part.etag,
            last_modified: part.last_modified,
            source_version_id: source_object.version_id,
            checksum: part.checksum,
        })
    }

    /// Recorded parts of an open upload, ascending by part number.
    ///
    /// # Errors
    ///
    /// Returns [`S3ServiceError::NoSuchUpload`] if the upload is unknown,
    /// terminal or belongs to another key.
    pub async fn list_parts(
        &self,
        bucket_name: &str,
        key: &str,
        upload_id: &str,
        input: ListPartsInput,
    ) -> S3ServiceResult<ListPartsOutput> {
        let bucket = self.state.get_bucket(bucket_name)?;
        let upload = open_upload(&bucket, upload_id)?;
        let upload = upload.lock().await;
        if upload.state.is_terminal() || upload.key != key {
            return Err(no_such_upload(upload_id));
        }

        let max_parts = clamp_page_size(input.max_parts, MAX_LIST_PARTS);
        let mut parts: Vec<UploadPart> = upload
            .parts_after(input.part_number_marker.unwrap_or(0))
            .take(max_parts.saturating_add(1))
            .cloned()
            .collect();
        let is_truncated = parts.len() > max_parts;
        parts.truncate(max_parts);
        Ok(ListPartsOutput {
            next_part_number_marker: is_truncated
                .then(|| parts.last().map(|p| p.part_number))
                .flatten(),
            parts,
            is_truncated,
            max_parts,
            initiated: upload.initiated,
            owner: upload.owner.clone(),
            storage_class: upload.storage_class.clone(),
            checksum_algorithm: upload.checksum_algorithm,
            checksum_type: upload.checksum_type,
        })
    }

    /// Open uploads, ordered by key and then initiation time.
    ///
    /// # Errors
    ///
    /// Returns [`S3ServiceError::NoSuchBucket`] if the bucket does not exist.
    pub async fn list_multipart_uploads(
        &self,
        bucket_name: &str,
        input: ListMultipartUploadsInput,
    ) -> S3ServiceResult<ListMultipartUploadsOutput> {
        let bucket = self.state.get_bucket(bucket_name)?;
        let prefix = input.prefix.as_deref().unwrap_or_default();
        let handles: Vec<_> = bucket
            .uploads
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        let mut uploads = Vec::with_capacity(handles.len());
        for handle in handles {
            let upload = handle.lock().await;
            if upload.state.is_terminal() || !upload.key.starts_with(prefix) {
                continue;
            }
            uploads.push(MultipartUploadSummary {
                key: upload.key.clone(),
                upload_id: upload.upload_id.clone(),
                initiated: upload.initiated,
                owner: upload.owner.clone(),
                storage_class: upload.storage_class.clone(),
                checksum_algorithm: upload.checksum_algorithm,
            });
        }
        uploads.sort_by(|a, b| {
            (&a.key, a.initiated, &a.upload_id).cmp(&(&b.key, b.initiated, &b.upload_id))
        });

        if let Some(key_marker) = input.key_marker.as_deref() {
            let resume = input.upload_id_marker.as_deref().and_then(|id| {
                uploads
                    .iter()
                    .position(|u| u.key == key_marker && u.upload_id == id)
            });
            let start = match resume {
                Some(idx) => idx + 1,
                None => uploads.partition_point(|u| u.key.as_str() <= key_marker),
            };
            uploads.drain(..start);
        }

        let max_uploads = clamp_page_size(input.max_uploads, MAX_LIST_PARTS);
        let is_truncated = uploads.len() > max_uploads;
        uploads.truncate(max_uploads);
        let last = uploads.last().filter(|_| is_truncated);
        Ok(ListMultipartUploadsOutput {
            next_key_marker: last.map(|u| u.key.clone()),
            next_upload_id_marker: last.map(|u| u.upload_id.clone()),
            uploads,
            is_truncated,
            max_uploads,
        })
    }

    /// Validate a claimed part list without completing the upload.
    ///
    /// # Errors
    ///
    /// - [`S3ServiceError::NoSuchUpload`] for an unknown or terminal upload.
    /// - [`S3ServiceError::MalformedXml`] for an empty list.
    /// - [`S3ServiceError::InvalidPartOrder`] unless part numbers strictly
    ///   increase.
    /// - [`S3ServiceError::InvalidPart`] for a missing part or a mismatched
    ///   ETag or checksum.
    /// - [`S3ServiceError::EntityTooSmall`] for a non-last part under the
    ///   configured minimum size.
    pub async fn verify_parts(
        &self,
        bucket_name: &str,
        key: &str,
        upload_id: &str,
        claimed: &[CompletedPart],
    ) -> S3ServiceResult<()> {
        let bucket = self.state.get_bucket(bucket_name)?;
        let upload = open_upload(&bucket, upload_id)?;
        let upload = upload.lock().await;
        if upload.state.is_terminal() || upload.key != key {
            return Err(no_such_upload(upload_id));
        }
        check_parts(&upload, claimed, self.config.min_part_size)?;
        Ok(())
    }

    /// Assemble the claimed parts into a new object version.
    ///
    /// Completing an already completed upload returns the first result
    /// without creating another version.
    ///
    /// # Errors
    ///
    /// - [`S3ServiceError::NoSuchUpload`] for an unknown or aborted upload.
    /// - Part validation errors as for [`S3Store::verify_parts`].
    /// - [`S3ServiceError::PreconditionFailed`] / [`S3ServiceError::NoSuchKey`]
    ///   from the write conditions.
    pub async fn complete_multipart_upload(
        &self,
        bucket_name: &str,
        key: &str,
        upload_id: &str,
        input: CompleteMultipartUploadInput,
    ) -> S3ServiceResult<CompleteMultipartOutput> {
        let bucket = self.state.get_bucket(bucket_name)?;
        let _gate = bucket.read_gate().await?;
        let Ok(handle) = open_upload(&bucket, upload_id) else {
            return replay_terminal(&bucket, key, upload_id);
        };
        let mut upload = handle.lock().await;
        if upload.key != key {
            return Err(no_such_upload(upload_id));
        }
        match &upload.state {
            UploadState::Completed(output) => return Ok((**output).clone()),
            UploadState::Aborted => return Err(no_such_upload(upload_id)),
            UploadState::Open => {}
        }

        let parts = check_parts(&upload, &input.parts, self.config.min_part_size)?;
        if !input.conditions.is_empty() {
            input
                .conditions
                .evaluate(key, current_etag(&bucket.objects.read(), key))?;
        }

        let slices = parts
            .iter()
            .map(|p| FileSlice::open(&self.storage.part_path(bucket_name, upload_id, p.part_number), None))
            .collect::<S3ServiceResult<Vec<_>>>()?;
        let staged = self
            .storage
            .stage_files(slices, upload.checksum_algorithm.into_iter().collect())
            .await?;
        let part_md5s: Vec<&str> = parts.iter().map(|p| normalize_etag(&p.etag)).collect();
        let etag = compute_multipart_etag(&part_md5s)?;
        let checksum = assembled_checksum(&upload, &parts, &staged)?;
        let parts_count = u32::try_from(parts.len()).unwrap_or(u32::MAX);

        let draft = ObjectDraft {
            key: key.to_owned(),
            etag,
            size: staged.size,
            metadata: upload.metadata.clone(),
            storage_class: upload.storage_class.clone(),
            owner: upload.owner.clone(),
            checksum,
            parts_count: Some(parts_count),
        };
        let object = self
            .commit_object(&bucket, staged, draft, &input.conditions)
            .await?;

        let output = Arc::new(CompleteMultipartOutput {
            bucket: bucket_name.to_owned(),
            key: object.key,
            version_id: object.version_id,
            etag: object.etag,
            size: object.size,
            checksum: object.checksum,
            parts_count,
        });
        upload.state = UploadState::Completed(Arc::clone(&output));
        bucket
            .terminal_uploads
            .insert(upload_id.to_owned(), upload.terminal());
        bucket.uploads.remove(upload_id);
        drop(upload);
        self.storage.remove_upload(bucket_name, upload_id).await;
        info!(
            bucket = %bucket_name,
            key = %key,
            upload_id = %upload_id,
            parts = parts_count,
            size = output.size,
            "multipart upload completed"
        );
        Ok((*output).clone())
    }

    /// Discard an upload and its parts.
    ///
    /// Aborting an upload that is already completed or aborted succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`S3ServiceError::NoSuchUpload`] for an unknown upload id or
    /// one that belongs to another key.
    pub async fn abort_multipart_upload(
        &self,
        bucket_name: &str,
        key: &str,
        upload_id: &str,
    ) -> S3ServiceResult<()> {
        let bucket = self.state.get_bucket(bucket_name)?;
        let _gate = bucket.read_gate().await?;
        let Ok(handle) = open_upload(&bucket, upload_id) else {
            return match bucket.terminal_uploads.get(upload_id) {
                Some(entry) if entry.key == key => Ok(()),
                _ => Err(no_such_upload(upload_id)),
            };
        };
        let mut upload = handle.lock().await;
        if upload.key != key {
            return Err(no_such_upload(upload_id));
        }
        if upload.state.is_terminal() {
            return Ok(());
        }

        upload.state = UploadState::Aborted;
        bucket
            .terminal_uploads
            .insert(upload_id.to_owned(), upload.terminal());
        bucket.uploads.remove(upload_id);
        drop(upload);
        self.storage.remove_upload(bucket_name, upload_id).await;
        debug!(bucket = %bucket_name, key = %key, upload_id = %upload_id, "multipart upload aborted");
        Ok(())
    }
}
