//! Listing operations.
//!
//! Implements `list_objects` (v1, marker based), `list_objects_v2`
//! (continuation token and start-after) and `list_object_versions`. Page
//! sizes are clamped to the configured `max_keys`.

use tracing::trace;

use crate::error::S3ServiceResult;
use crate::provider::S3Store;
use crate::state::{S3Object, VersionListResult};
use crate::utils::{decode_continuation_token, encode_continuation_token};
use crate::validation::clamp_page_size;

/// Options for [`S3Store::list_objects`].
#[derive(Debug, Clone, Default)]
pub struct ListObjectsInput {
    /// Only keys starting with this prefix.
    pub prefix: Option<String>,
    /// Roll keys up into common prefixes at this delimiter.
    pub delimiter: Option<String>,
    /// Start strictly after this key.
    pub marker: Option<String>,
    /// Page size, clamped to 1000.
    pub max_keys: Option<usize>,
}

/// One page of [`S3Store::list_objects`].
#[derive(Debug, Clone, Default)]
pub struct ListObjectsOutput {
    /// Current objects, in key order.
    pub objects: Vec<S3Object>,
    /// Prefixes keys were rolled up into.
    pub common_prefixes: Vec<String>,
    /// Whether more entries follow.
    pub is_truncated: bool,
    /// Resume point for the next page, when truncated.
    pub next_marker: Option<String>,
    /// The effective page size.
    pub max_keys: usize,
}

/// Options for [`S3Store::list_objects_v2`].
#[derive(Debug, Clone, Default)]
pub struct ListObjectsV2Input {
    /// Only keys starting with this prefix.
    pub prefix: Option<String>,
    /// Roll keys up into common prefixes at this delimiter.
    pub delimiter: Option<String>,
    /// Opaque token from a previous page. Overrides `start_after`.
    pub continuation_token: Option<String>,
    /// Start strictly after this key.
    pub start_after: Option<String>,
    /// Page size, clamped to 1000.
    pub max_keys: Option<usize>,
}

/// One page of [`S3Store::list_objects_v2`].
#[derive(Debug, Clone, Default)]
pub struct ListObjectsV2Output {
    /// Current objects, in key order.
    pub objects: Vec<S3Object>,
    /// Prefixes keys were rolled up into.
    pub common_prefixes: Vec<String>,
    /// Whether more entries follow.
    pub is_truncated: bool,
    /// Objects plus common prefixes on this page.
    pub key_count: usize,
    /// Token for the next page, when truncated.
    pub next_continuation_token: Option<String>,
    /// The effective page size.
    pub max_keys: usize,
}

/// Options for [`S3Store::list_object_versions`].
#[derive(Debug, Clone, Default)]
pub struct ListObjectVersionsInput {
    /// Only keys starting with this prefix.
    pub prefix: Option<String>,
    /// Roll keys up into common prefixes at this delimiter.
    pub delimiter: Option<String>,
    /// Resume after this key, or within it with `version_id_marker`.
    pub key_marker: Option<String>,
    /// Resume after this version of `key_marker`.
    pub version_id_marker: Option<String>,
    /// Page size, clamped to 1000.
    pub max_keys: Option<usize>,
}

impl S3Store {
    /// List current objects, starting after `marker`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::S3ServiceError::NoSuchBucket`] if the bucket
    /// does not exist.
    pub fn list_objects(
        &self,
        bucket_name: &str,
        input: &ListObjectsInput,
    ) -> S3ServiceResult<ListObjectsOutput> {
        let bucket = self.state.get_bucket(bucket_name)?;
        let max_keys = clamp_page_size(input.max_keys, self.config.max_keys);
        let page = bucket.objects.read().list_objects(
            input.prefix.as_deref().unwrap_or_default(),
            input.delimiter.as_deref(),
            input.marker.as_deref(),
            max_keys,
        );
        trace!(bucket = %bucket_name, objects = page.objects.len(), truncated = page.is_truncated, "listed objects");
        Ok(ListObjectsOutput {
            objects: page.objects,
            common_prefixes: page.common_prefixes,
            is_truncated: page.is_truncated,
            next_marker: page.next_marker,
            max_keys,
        })
    }

    /// List current objects with continuation tokens.
    ///
    /// # Errors
    ///
    /// - [`crate::error::S3ServiceError::NoSuchBucket`] if the bucket does
    ///   not exist.
    /// - [`crate::error::S3ServiceError::InvalidArgument`] for a token this
    ///   store did not issue.
    pub fn list_objects_v2(
        &self,
        bucket_name: &str,
        input: &ListObjectsV2Input,
    ) -> S3ServiceResult<ListObjectsV2Output> {
        let bucket = self.state.get_bucket(bucket_name)?;
        let start = match &input.continuation_token {
            Some(token) => Some(decode_continuation_token(token)?),
            None => input.start_after.clone(),
        };
        let max_keys = clamp_page_size(input.max_keys, self.config.max_keys);
        let page = bucket.objects.read().list_objects(
            input.prefix.as_deref().unwrap_or_default(),
            input.delimiter.as_deref(),
            start.as_deref(),
            max_keys,
        );
        Ok(ListObjectsV2Output {
            key_count: page.objects.len() + page.common_prefixes.len(),
            next_continuation_token: page
                .next_marker
                .as_deref()
                .map(encode_continuation_token),
            objects: page.objects,
            common_prefixes: page.common_prefixes,
            is_truncated: page.is_truncated,
            max_keys,
        })
    }

    /// List every version and delete marker.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::S3ServiceError::NoSuchBucket`] if the bucket
    /// does not exist.
    pub fn list_object_versions(
        &self,
        bucket_name: &str,
        input: &ListObjectVersionsInput,
    ) -> S3ServiceResult<VersionListResult> {
        let bucket = self.state.get_bucket(bucket_name)?;
        let max_keys = clamp_page_size(input.max_keys, self.config.max_keys);
        let page = bucket.objects.read().list_object_versions(
            input.prefix.as_deref().unwrap_or_default(),
            input.delimiter.as_deref(),
            input.key_marker.as_deref(),
            input.version_id_marker.as_deref(),
            max_keys,
        );
        Ok(page)
    }
}
