//! Request validation: bucket names, keys, part numbers, tags and metadata.

use std::collections::{HashMap, HashSet};
use std::net::Ipv4Addr;

use crate::error::{S3ServiceError, S3ServiceResult};

/// Largest part number a multipart upload accepts.
pub const MAX_PART_NUMBER: u32 = 10_000;

const MAX_KEY_BYTES: usize = 1024;
const MAX_TAGS: usize = 10;
const MAX_TAG_KEY_LEN: usize = 128;
const MAX_TAG_VALUE_LEN: usize = 256;
const MAX_METADATA_SIZE: usize = 2048;

/// Validate a bucket name against the S3 naming rules.
///
/// Names are 3-63 characters of lowercase letters, digits, `-` and `.`,
/// start and end with a letter or digit, contain no `..`, are not IPv4
/// addresses and avoid the reserved `xn--`, `sthree-` prefixes and the
/// `-s3alias` suffix.
///
/// # Errors
///
/// Returns [`S3ServiceError::InvalidBucketName`] naming the violated rule.
///
/// # Examples
///
/// ```
/// use ruststash_s3_core::validation::validate_bucket_name;
///
/// assert!(validate_bucket_name("my-valid-bucket").is_ok());
/// assert!(validate_bucket_name("AB").is_err());
/// ```
pub fn validate_bucket_name(name: &str) -> S3ServiceResult<()> {
    let reject = |reason: &str| {
        Err(S3ServiceError::InvalidBucketName {
            name: name.to_owned(),
            reason: reason.to_owned(),
        })
    };
    let bytes = name.as_bytes();
    let alnum = |b: u8| b.is_ascii_lowercase() || b.is_ascii_digit();

    if !(3..=63).contains(&bytes.len()) {
        return reject("Bucket name must be between 3 and 63 characters long");
    }
    if !bytes.iter().all(|&b| alnum(b) || b == b'-' || b == b'.') {
        return reject("Bucket name must only contain lowercase letters, numbers, hyphens, and dots");
    }
    if !alnum(bytes[0]) || !alnum(bytes[bytes.len() - 1]) {
        return reject("Bucket name must start and end with a letter or number");
    }
    if name.contains("..") {
        return reject("Bucket name must not contain consecutive dots");
    }
    if name.parse::<Ipv4Addr>().is_ok() {
        return reject("Bucket name must not be formatted as an IP address");
    }
    if name.starts_with("xn--") || name.starts_with("sthree-") || name.ends_with("-s3alias") {
        return reject("Bucket name uses a reserved prefix or suffix");
    }
    Ok(())
}

/// Validate an object key: non-empty, at most 1024 bytes.
///
/// # Errors
///
/// Returns [`S3ServiceError::InvalidArgument`] for an empty key and
/// [`S3ServiceError::KeyTooLong`] for an oversized one.
pub fn validate_object_key(key: &str) -> S3ServiceResult<()> {
    if key.is_empty() {
        return Err(S3ServiceError::InvalidArgument {
            message: "Object key must not be empty".to_owned(),
        });
    }
    if key.len() > MAX_KEY_BYTES {
        return Err(S3ServiceError::KeyTooLong);
    }
    Ok(())
}

/// Validate a part number (1..=10000).
///
/// # Errors
///
/// Returns [`S3ServiceError::InvalidArgument`] when out of range.
pub fn validate_part_number(part_number: u32) -> S3ServiceResult<()> {
    if (1..=MAX_PART_NUMBER).contains(&part_number) {
        Ok(())
    } else {
        Err(S3ServiceError::InvalidArgument {
            message: format!(
                "Part number must be an integer between 1 and {MAX_PART_NUMBER}, inclusive"
            ),
        })
    }
}

/// Validate an object tag set.
///
/// At most 10 tags, unique keys of 1-128 characters and values of up to 256
/// characters.
///
/// # Errors
///
/// Returns [`S3ServiceError::InvalidTag`] if any rule is violated.
///
/// # Examples
///
/// ```
/// use ruststash_s3_core::validation::validate_tags;
///
/// let tags = vec![("env".to_owned(), "prod".to_owned())];
/// assert!(validate_tags(&tags).is_ok());
/// ```
pub fn validate_tags(tags: &[(String, String)]) -> S3ServiceResult<()> {
    let invalid = |message: String| Err(S3ServiceError::InvalidTag { message });
    if tags.len() > MAX_TAGS {
        return invalid(format!("Object tags cannot be greater than {MAX_TAGS}"));
    }
    let mut seen = HashSet::with_capacity(tags.len());
    for (key, value) in tags {
        let key_len = key.chars().count();
        if key_len == 0 || key_len > MAX_TAG_KEY_LEN {
            return invalid(format!("The TagKey you have provided is invalid: '{key}'"));
        }
        if value.chars().count() > MAX_TAG_VALUE_LEN {
            return invalid(format!("The TagValue you have provided is invalid: '{value}'"));
        }
        if !seen.insert(key.as_str()) {
            return invalid("Cannot provide multiple Tags with the same key".to_owned());
        }
    }
    Ok(())
}

/// Validate that user metadata keys and values fit in 2 KiB.
///
/// # Errors
///
/// Returns [`S3ServiceError::InvalidArgument`] if the metadata is too large.
pub fn validate_metadata(metadata: &HashMap<String, String>) -> S3ServiceResult<()> {
    let size: usize = metadata.iter().map(|(k, v)| k.len() + v.len()).sum();
    if size > MAX_METADATA_SIZE {
        return Err(S3ServiceError::InvalidArgument {
            message: format!(
                "Your metadata headers exceed the maximum allowed metadata size of {MAX_METADATA_SIZE} bytes"
            ),
        });
    }
    Ok(())
}

/// Clamp a caller-supplied page size to `1..=cap`, defaulting to `cap`.
#[must_use]
pub fn clamp_page_size(requested: Option<usize>, cap: usize) -> usize {
    requested.map_or(cap, |n| n.min(cap))
}
