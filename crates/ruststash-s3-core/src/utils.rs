//! Shared helpers: identifiers, byte ranges, continuation tokens and copy
//! source parsing.

use base64::Engine;
use base64::engine::general_purpose::{STANDARD as BASE64_STANDARD, URL_SAFE_NO_PAD};
use rand::RngExt;
use uuid::Uuid;

use crate::error::{S3ServiceError, S3ServiceResult};

/// Version id of objects written while versioning was not enabled.
pub const NULL_VERSION_ID: &str = "null";

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Generate a URL-safe version id for the version with store sequence
/// `sequence`.
///
/// The id is the sequence as 16 hex digits followed by 16 random characters,
/// so [`version_id_sequence`] can place it even after the version is gone.
///
/// # Examples
///
/// ```
/// use ruststash_s3_core::utils::{generate_version_id, version_id_sequence};
///
/// let id = generate_version_id(42);
/// assert_eq!(id.len(), 32);
/// assert!(id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
/// assert_eq!(version_id_sequence(&id), Some(42));
/// ```
#[must_use]
pub fn generate_version_id(sequence: u64) -> String {
    let mut buf = [0u8; 12];
    rand::rng().fill(&mut buf);
    format!("{sequence:016x}{}", URL_SAFE_NO_PAD.encode(buf))
}

/// The store sequence embedded in a version id, if it has one.
#[must_use]
pub fn version_id_sequence(version_id: &str) -> Option<u64> {
    let hex = version_id.get(..16)?;
    if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    u64::from_str_radix(hex, 16).ok()
}

/// Generate a random multipart upload id (64 hex characters).
#[must_use]
pub fn generate_upload_id() -> String {
    let mut buf = [0u8; 32];
    rand::rng().fill(&mut buf);
    hex::encode(buf)
}

/// Generate the name of a new data file under a bucket's `objects/` tree.
#[must_use]
pub fn generate_object_id() -> String {
    Uuid::new_v4().simple().to_string()
}

// ---------------------------------------------------------------------------
// Byte ranges
// ---------------------------------------------------------------------------

/// An inclusive byte range within an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    /// First byte offset.
    pub start: u64,
    /// Last byte offset (inclusive).
    pub end: u64,
}

impl ByteRange {
    /// Number of bytes covered.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Always false; a range covers at least one byte.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        false
    }

    /// `Content-Range` value for an object of `total` bytes.
    #[must_use]
    pub fn content_range(&self, total: u64) -> String {
        format!("bytes {}-{}/{total}", self.start, self.end)
    }
}

/// Parse a `Range` header value against an object of `content_length` bytes.
///
/// Accepts `bytes=a-b`, `bytes=a-` and `bytes=-n`. The end of `a-b` is
/// clamped to the last byte.
///
/// # Errors
///
/// Returns [`S3ServiceError::InvalidRange`] if the value is malformed or not
/// satisfiable.
///
/// # Examples
///
/// ```
/// use ruststash_s3_core::utils::parse_range_header;
///
/// let range = parse_range_header("bytes=0-499", 1000).unwrap();
/// assert_eq!((range.start, range.end), (0, 499));
/// ```
pub fn parse_range_header(range: &str, content_length: u64) -> S3ServiceResult<ByteRange> {
    let spec = range
        .trim()
        .strip_prefix("bytes=")
        .ok_or(S3ServiceError::InvalidRange)?;
    if content_length == 0 {
        return Err(S3ServiceError::InvalidRange);
    }
    let last = content_length - 1;
    let number = |s: &str| s.trim().parse::<u64>().map_err(|_| S3ServiceError::InvalidRange);

    let (first, second) = spec.split_once('-').ok_or(S3ServiceError::InvalidRange)?;
    match (first.is_empty(), second.is_empty()) {
        (true, true) => Err(S3ServiceError::InvalidRange),
        (true, false) => {
            let n = number(second)?;
            if n == 0 {
                return Err(S3ServiceError::InvalidRange);
            }
            Ok(ByteRange {
                start: content_length.saturating_sub(n),
                end: last,
            })
        }
        (false, true) => {
            let start = number(first)?;
            if start > last {
                return Err(S3ServiceError::InvalidRange);
            }
            Ok(ByteRange { start, end: last })
        }
        (false, false) => {
            let start = number(first)?;
            let end = number(second)?;
            if start > end || start > last {
                return Err(S3ServiceError::InvalidRange);
            }
            Ok(ByteRange {
                start,
                end: end.min(last),
            })
        }
    }
}

/// Parse `x-amz-copy-source-range`, which must be `bytes=first-last` and lie
/// entirely inside the source object.
///
/// # Errors
///
/// Returns [`S3ServiceError::InvalidArgument`] for a malformed value and
/// [`S3ServiceError::InvalidRange`] for a range outside the source.
pub fn parse_copy_source_range(range: &str, source_length: u64) -> S3ServiceResult<ByteRange> {
    let malformed = || S3ServiceError::InvalidArgument {
        message: "The x-amz-copy-source-range value must be of the form bytes=first-last \
                  where first and last are the zero-based offsets of the first and last \
                  bytes to copy"
            .to_owned(),
    };
    let (first, last) = range
        .trim()
        .strip_prefix("bytes=")
        .and_then(|s| s.split_once('-'))
        .ok_or_else(malformed)?;
    let start: u64 = first.parse().map_err(|_| malformed())?;
    let end: u64 = last.parse().map_err(|_| malformed())?;
    if start > end {
        return Err(malformed());
    }
    if end >= source_length {
        return Err(S3ServiceError::InvalidRange);
    }
    Ok(ByteRange { start, end })
}

// ---------------------------------------------------------------------------
// ETags
// ---------------------------------------------------------------------------

/// Strip surrounding double quotes (and a weak `W/` prefix) from an ETag.
#[must_use]
pub fn normalize_etag(etag: &str) -> &str {
    let etag = etag.trim();
    let etag = etag.strip_prefix("W/").unwrap_or(etag);
    etag.strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(etag)
}

// ---------------------------------------------------------------------------
// Continuation tokens
// ---------------------------------------------------------------------------

/// Encode an object key as an opaque `ListObjectsV2` continuation token.
///
/// # Examples
///
/// ```
/// use ruststash_s3_core::utils::{decode_continuation_token, encode_continuation_token};
///
/// let token = encode_continuation_token("photos/2024/img.jpg");
/// assert_eq!(decode_continuation_token(&token).unwrap(), "photos/2024/img.jpg");
/// ```
#[must_use]
pub fn encode_continuation_token(key: &str) -> String {
    BASE64_STANDARD.encode(key.as_bytes())
}

/// Decode a continuation token produced by [`encode_continuation_token`].
///
/// # Errors
///
/// Returns [`S3ServiceError::InvalidArgument`] if the token is not base64 or
/// not UTF-8.
pub fn decode_continuation_token(token: &str) -> S3ServiceResult<String> {
    let invalid = || S3ServiceError::InvalidArgument {
        message: "The continuation token provided is incorrect".to_owned(),
    };
    let bytes = BASE64_STANDARD.decode(token).map_err(|_| invalid())?;
    String::from_utf8(bytes).map_err(|_| invalid())
}

// ---------------------------------------------------------------------------
// Copy source
// ---------------------------------------------------------------------------

/// A parsed `x-amz-copy-source` value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopySource {
    /// Source bucket.
    pub bucket: String,
    /// Source key, percent-decoded.
    pub key: String,
    /// Source version, if addressed explicitly.
    pub version_id: Option<String>,
}

impl CopySource {
    /// Build a copy source from already separated parts.
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            version_id: None,
        }
    }

    /// Address a specific source version.
    #[must_use]
    pub fn with_version(mut self, version_id: impl Into<String>) -> Self {
        self.version_id = Some(version_id.into());
        self
    }
}

/// Parse `x-amz-copy-source` (`[/]bucket/key[?versionId=v]`).
///
/// # Errors
///
/// Returns [`S3ServiceError::InvalidArgument`] if the value is malformed.
///
/// # Examples
///
/// ```
/// use ruststash_s3_core::utils::parse_copy_source;
///
/// let source = parse_copy_source("/photos/2024/a%20b.jpg?versionId=v1").unwrap();
/// assert_eq!(source.bucket, "photos");
/// assert_eq!(source.key, "2024/a b.jpg");
/// assert_eq!(source.version_id.as_deref(), Some("v1"));
/// ```
pub fn parse_copy_source(source: &str) -> S3ServiceResult<CopySource> {
    let invalid = |message: &str| S3ServiceError::InvalidArgument {
        message: format!("Invalid copy source: {message}"),
    };
    let source = source.strip_prefix('/').unwrap_or(source);
    let (path, version_id) = match source.split_once('?') {
        Some((path, query)) => (
            path,
            query
                .split('&')
                .find_map(|param| param.strip_prefix("versionId="))
                .map(str::to_owned),
        ),
        None => (source, None),
    };
    let (bucket, key) = path
        .split_once('/')
        .ok_or_else(|| invalid("must be in the format bucket/key"))?;
    if bucket.is_empty() || key.is_empty() {
        return Err(invalid("bucket and key must not be empty"));
    }
    let key = percent_encoding::percent_decode_str(key)
        .decode_utf8()
        .map_err(|_| invalid("key contains invalid UTF-8"))?
        .into_owned();

    Ok(CopySource {
        bucket: bucket.to_owned(),
        key,
        version_id,
    })
}
