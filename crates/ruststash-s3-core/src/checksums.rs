//! Checksum computation for S3 objects.
//!
//! Provides MD5 for ETags and the five additional checksum algorithms of the
//! `x-amz-checksum-*` headers: CRC32, CRC32C, CRC64NVME, SHA-1 and SHA-256.
//!
//! The algorithm is a value of [`ChecksumAlgorithm`], parsed once at the edge
//! and passed around from there. [`Checksummer`] is the matching incremental
//! hasher; CRC values are packed big-endian before base64 encoding, digests
//! are base64-encoded as-is.
//!
//! # Multipart
//!
//! - The classic multipart ETag is `md5(concat(part md5 digests))-<count>`,
//!   see [`compute_multipart_etag`].
//! - A composite checksum hashes the concatenated decoded part checksums with
//!   the same algorithm and appends `-<count>`, see
//!   [`compute_composite_checksum`].
//!
//! # Streaming Hashing
//!
//! For large objects use [`StreamingHasher`] to feed data incrementally and
//! obtain the final results via [`HasherResult`].

use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::str::FromStr;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use digest::Digest;
use serde::{Deserialize, Serialize};

use crate::error::{S3ServiceError, S3ServiceResult};

/// Read buffer used when hashing files.
const FILE_BUFFER_SIZE: usize = 64 * 1024;

// ---------------------------------------------------------------------------
// ChecksumAlgorithm
// ---------------------------------------------------------------------------

/// S3-supported checksum algorithms (excluding MD5 which is always computed
/// for the ETag).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChecksumAlgorithm {
    /// CRC-32 (IEEE 802.3).
    Crc32,
    /// CRC-32C (Castagnoli).
    Crc32c,
    /// CRC-64/NVME.
    Crc64Nvme,
    /// SHA-1.
    Sha1,
    /// SHA-256.
    Sha256,
}

impl ChecksumAlgorithm {
    /// Every supported algorithm, in header order.
    pub const ALL: [Self; 5] = [
        Self::Crc32,
        Self::Crc32c,
        Self::Crc64Nvme,
        Self::Sha1,
        Self::Sha256,
    ];

    /// Return the canonical string representation used in S3 headers.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Crc32 => "CRC32",
            Self::Crc32c => "CRC32C",
            Self::Crc64Nvme => "CRC64NVME",
            Self::Sha1 => "SHA1",
            Self::Sha256 => "SHA256",
        }
    }

    /// The header carrying a value of this algorithm, e.g. `x-amz-checksum-crc32c`.
    #[must_use]
    pub fn header_name(&self) -> &'static str {
        match self {
            Self::Crc32 => "x-amz-checksum-crc32",
            Self::Crc32c => "x-amz-checksum-crc32c",
            Self::Crc64Nvme => "x-amz-checksum-crc64nvme",
            Self::Sha1 => "x-amz-checksum-sha1",
            Self::Sha256 => "x-amz-checksum-sha256",
        }
    }

    /// Look up the algorithm for an `x-amz-checksum-*` header name
    /// (case-insensitive).
    #[must_use]
    pub fn from_header_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|alg| alg.header_name().eq_ignore_ascii_case(name.trim()))
    }

    /// Length in bytes of the raw (decoded) checksum value.
    #[must_use]
    pub fn digest_len(&self) -> usize {
        match self {
            Self::Crc32 | Self::Crc32c => 4,
            Self::Crc64Nvme => 8,
            Self::Sha1 => 20,
            Self::Sha256 => 32,
        }
    }

    /// Whether a multipart upload may use [`ChecksumType::FullObject`] with
    /// this algorithm. Only the CRC family can be combined over a whole
    /// object.
    #[must_use]
    pub fn supports_full_object(&self) -> bool {
        matches!(self, Self::Crc32 | Self::Crc32c | Self::Crc64Nvme)
    }

    /// Create an incremental hasher for this algorithm.
    #[must_use]
    pub fn checksummer(&self) -> Checksummer {
        Checksummer::new(*self)
    }
}

impl fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing a [`ChecksumAlgorithm`] from a string fails.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown checksum algorithm: {0}")]
pub struct ParseChecksumAlgorithmError(String);

impl FromStr for ChecksumAlgorithm {
    type Err = ParseChecksumAlgorithmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "CRC32" => Ok(Self::Crc32),
            "CRC32C" => Ok(Self::Crc32c),
            "CRC64NVME" => Ok(Self::Crc64Nvme),
            "SHA1" => Ok(Self::Sha1),
            "SHA256" => Ok(Self::Sha256),
            _ => Err(ParseChecksumAlgorithmError(s.to_owned())),
        }
    }
}

impl From<ParseChecksumAlgorithmError> for S3ServiceError {
    fn from(err: ParseChecksumAlgorithmError) -> Self {
        Self::InvalidArgument {
            message: err.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// ChecksumType
// ---------------------------------------------------------------------------

/// How the checksum of a multipart object was derived.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChecksumType {
    /// Checksum of the concatenated part checksums, suffixed with `-<count>`.
    #[default]
    Composite,
    /// Checksum of the whole object's bytes.
    FullObject,
}

impl ChecksumType {
    /// Return the canonical string representation used in S3 headers.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Composite => "COMPOSITE",
            Self::FullObject => "FULL_OBJECT",
        }
    }
}

impl fmt::Display for ChecksumType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChecksumType {
    type Err = S3ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "COMPOSITE" => Ok(Self::Composite),
            "FULL_OBJECT" => Ok(Self::FullObject),
            _ => Err(S3ServiceError::InvalidArgument {
                message: format!("unknown checksum type: {s}"),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// ChecksumValue
// ---------------------------------------------------------------------------

/// A base64-encoded checksum value paired with its algorithm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecksumValue {
    /// The algorithm used to compute this checksum.
    pub algorithm: ChecksumAlgorithm,
    /// The base64-encoded checksum.
    pub value: String,
}

impl ChecksumValue {
    /// Validate a client-supplied value: it must be base64 of exactly
    /// [`ChecksumAlgorithm::digest_len`] bytes.
    ///
    /// # Errors
    ///
    /// Returns [`S3ServiceError::InvalidRequest`] naming the header when the
    /// value is malformed.
    pub fn parse(algorithm: ChecksumAlgorithm, value: &str) -> S3ServiceResult<Self> {
        let value = value.trim();
        match BASE64_STANDARD.decode(value) {
            Ok(raw) if raw.len() == algorithm.digest_len() => Ok(Self {
                algorithm,
                value: value.to_owned(),
            }),
            _ => Err(S3ServiceError::InvalidRequest {
                message: format!("Value for {} header is invalid.", algorithm.header_name()),
            }),
        }
    }

    /// Check this expected value against a computed one.
    ///
    /// # Errors
    ///
    /// Returns [`S3ServiceError::BadDigest`] on mismatch.
    pub fn verify(&self, computed: &str) -> S3ServiceResult<()> {
        if self.value == computed {
            Ok(())
        } else {
            Err(S3ServiceError::BadDigest {
                message: format!(
                    "The {} you specified did not match the calculated checksum.",
                    self.algorithm.header_name()
                ),
            })
        }
    }
}

// ---------------------------------------------------------------------------
// Checksummer
// ---------------------------------------------------------------------------

/// Incremental hasher for one [`ChecksumAlgorithm`].
pub enum Checksummer {
    /// CRC-32 state.
    Crc32(crc32fast::Hasher),
    /// CRC-32C running value.
    Crc32c(u32),
    /// CRC-64/NVME state.
    Crc64Nvme(crc64fast_nvme::Digest),
    /// SHA-1 state.
    Sha1(sha1::Sha1),
    /// SHA-256 state.
    Sha256(sha2::Sha256),
}

impl fmt::Debug for Checksummer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Checksummer")
            .field(&self.algorithm())
            .finish()
    }
}

impl Checksummer {
    /// Create a fresh hasher.
    #[must_use]
    pub fn new(algorithm: ChecksumAlgorithm) -> Self {
        match algorithm {
            ChecksumAlgorithm::Crc32 => Self::Crc32(crc32fast::Hasher::new()),
            ChecksumAlgorithm::Crc32c => Self::Crc32c(0),
            ChecksumAlgorithm::Crc64Nvme => Self::Crc64Nvme(crc64fast_nvme::Digest::new()),
            ChecksumAlgorithm::Sha1 => Self::Sha1(<sha1::Sha1 as Digest>::new()),
            ChecksumAlgorithm::Sha256 => Self::Sha256(<sha2::Sha256 as Digest>::new()),
        }
    }

    /// The algorithm this hasher computes.
    #[must_use]
    pub fn algorithm(&self) -> ChecksumAlgorithm {
        match self {
            Self::Crc32(_) => ChecksumAlgorithm::Crc32,
            Self::Crc32c(_) => ChecksumAlgorithm::Crc32c,
            Self::Crc64Nvme(_) => ChecksumAlgorithm::Crc64Nvme,
            Self::Sha1(_) => ChecksumAlgorithm::Sha1,
            Self::Sha256(_) => ChecksumAlgorithm::Sha256,
        }
    }

    /// Feed more data into the hasher.
    pub fn update(&mut self, data: &[u8]) {
        match self {
            Self::Crc32(h) => h.update(data),
            Self::Crc32c(v) => *v = crc32c::crc32c_append(*v, data),
            Self::Crc64Nvme(h) => h.write(data),
            Self::Sha1(h) => Digest::update(h, data),
            Self::Sha256(h) => Digest::update(h, data),
        }
    }

    /// Finalize and return the raw checksum bytes.
    #[must_use]
    pub fn finalize_bytes(self) -> Vec<u8> {
        match self {
            Self::Crc32(h) => h.finalize().to_be_bytes().to_vec(),
            Self::Crc32c(v) => v.to_be_bytes().to_vec(),
            Self::Crc64Nvme(h) => h.sum64().to_be_bytes().to_vec(),
            Self::Sha1(h) => Digest::finalize(h).to_vec(),
            Self::Sha256(h) => Digest::finalize(h).to_vec(),
        }
    }

    /// Finalize and return the base64-encoded checksum.
    #[must_use]
    pub fn finalize(self) -> String {
        BASE64_STANDARD.encode(self.finalize_bytes())
    }
}

// ---------------------------------------------------------------------------
// Standalone checksum functions
// ---------------------------------------------------------------------------

/// Compute the hex-encoded MD5 digest of `data`.
///
/// This is the raw hex digest used internally. For an S3-formatted ETag (quoted),
/// use [`compute_etag`].
///
/// # Examples
///
/// ```
/// use ruststash_s3_core::checksums::compute_md5;
///
/// let digest = compute_md5(b"hello");
/// assert_eq!(digest, "5d41402abc4b2a76b9719d911017c592");
/// ```
#[must_use]
pub fn compute_md5(data: &[u8]) -> String {
    hex::encode(md5::Md5::digest(data))
}

/// Compute the quoted hex-encoded MD5 digest of `data`, suitable for use as
/// an S3 ETag.
///
/// # Examples
///
/// ```
/// use ruststash_s3_core::checksums::compute_etag;
///
/// let etag = compute_etag(b"");
/// assert_eq!(etag, "\"d41d8cd98f00b204e9800998ecf8427e\"");
/// ```
#[must_use]
pub fn compute_etag(data: &[u8]) -> String {
    format!("\"{}\"", compute_md5(data))
}

/// Compute the classic ETag of a multipart object.
///
/// The result is the MD5 of the concatenated binary MD5 digests of each part,
/// formatted as `"<hex>-<part_count>"`. Entries may be quoted or unquoted hex.
///
/// # Errors
///
/// Returns [`S3ServiceError::InvalidPart`] if an entry is not hex.
///
/// # Examples
///
/// ```
/// use ruststash_s3_core::checksums::compute_multipart_etag;
///
/// let etag = compute_multipart_etag(&["5d41402abc4b2a76b9719d911017c592"]).unwrap();
/// assert!(etag.ends_with("-1\""));
/// ```
pub fn compute_multipart_etag(part_md5_hexes: &[impl AsRef<str>]) -> S3ServiceResult<String> {
    let mut combined = Vec::with_capacity(part_md5_hexes.len() * 16);
    for (index, hex_str) in part_md5_hexes.iter().enumerate() {
        let hex_str = hex_str.as_ref().trim_matches('"');
        let bytes = hex::decode(hex_str).map_err(|_| S3ServiceError::InvalidPart {
            message: format!("part {} has a malformed ETag '{hex_str}'", index + 1),
        })?;
        combined.extend_from_slice(&bytes);
    }
    let final_md5 = hex::encode(md5::Md5::digest(&combined));
    Ok(format!("\"{final_md5}-{}\"", part_md5_hexes.len()))
}

/// Compute a base64-encoded checksum for the given algorithm.
///
/// # Examples
///
/// ```
/// use ruststash_s3_core::checksums::{ChecksumAlgorithm, compute_checksum};
///
/// assert_eq!(compute_checksum(ChecksumAlgorithm::Crc32, b"hello"), "NhCmhg==");
/// ```
#[must_use]
pub fn compute_checksum(algorithm: ChecksumAlgorithm, data: &[u8]) -> String {
    let mut hasher = algorithm.checksummer();
    hasher.update(data);
    hasher.finalize()
}

/// Compute a composite checksum for a multipart upload.
///
/// The raw (decoded) checksums of each part are concatenated in part order
/// and hashed with the same algorithm. The result is base64-encoded with a
/// `-<part_count>` suffix.
///
/// # Errors
///
/// Returns [`S3ServiceError::InvalidPart`] if a part checksum is not base64.
///
/// # Examples
///
/// ```
/// use ruststash_s3_core::checksums::{ChecksumAlgorithm, compute_checksum, compute_composite_checksum};
///
/// let part1 = compute_checksum(ChecksumAlgorithm::Crc32, b"hello");
/// let composite = compute_composite_checksum(ChecksumAlgorithm::Crc32, &[part1]).unwrap();
/// assert!(composite.ends_with("-1"));
/// ```
pub fn compute_composite_checksum(
    algorithm: ChecksumAlgorithm,
    part_checksums_b64: &[impl AsRef<str>],
) -> S3ServiceResult<String> {
    let mut hasher = algorithm.checksummer();
    for (index, b64) in part_checksums_b64.iter().enumerate() {
        let bytes = BASE64_STANDARD
            .decode(b64.as_ref())
            .map_err(|_| S3ServiceError::InvalidPart {
                message: format!(
                    "part {} has a malformed {algorithm} checksum '{}'",
                    index + 1,
                    b64.as_ref()
                ),
            })?;
        hasher.update(&bytes);
    }
    Ok(format!("{}-{}", hasher.finalize(), part_checksums_b64.len()))
}

/// Compute the base64 checksum of a file's contents.
pub fn compute_file_checksum(algorithm: ChecksumAlgorithm, path: &Path) -> io::Result<String> {
    let mut hasher = algorithm.checksummer();
    for_each_block(path, |block| hasher.update(block))?;
    Ok(hasher.finalize())
}

/// Compute the hex MD5 of a file's contents.
pub fn compute_file_md5(path: &Path) -> io::Result<String> {
    let mut hasher = <md5::Md5 as Digest>::new();
    for_each_block(path, |block| Digest::update(&mut hasher, block))?;
    Ok(hex::encode(Digest::finalize(hasher)))
}

fn for_each_block(path: &Path, mut f: impl FnMut(&[u8])) -> io::Result<()> {
    let mut file = File::open(path)?;
    let mut buf = vec![0u8; FILE_BUFFER_SIZE];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            return Ok(());
        }
        f(&buf[..n]);
    }
}

/// Check a `Content-MD5` header (base64 of the raw digest) against the hex
/// MD5 of the received bytes.
///
/// # Errors
///
/// Returns [`S3ServiceError::InvalidDigest`] if the header is not base64 of
/// 16 bytes, or [`S3ServiceError::BadDigest`] if it does not match.
pub fn verify_content_md5(content_md5: &str, md5_hex: &str) -> S3ServiceResult<()> {
    let raw = BASE64_STANDARD
        .decode(content_md5.trim())
        .map_err(|_| S3ServiceError::InvalidDigest)?;
    if raw.len() != 16 {
        return Err(S3ServiceError::InvalidDigest);
    }
    if hex::encode(raw) == md5_hex {
        Ok(())
    } else {
        Err(S3ServiceError::BadDigest {
            message: "The Content-MD5 you specified did not match what we received.".to_owned(),
        })
    }
}

// ---------------------------------------------------------------------------
// StreamingHasher
// ---------------------------------------------------------------------------

/// Result produced by [`StreamingHasher::finish`].
#[derive(Debug, Clone)]
pub struct HasherResult {
    /// Hex-encoded MD5 digest.
    pub md5_hex: String,
    /// Per-algorithm base64-encoded checksums, one per requested algorithm.
    pub checksums: Vec<ChecksumValue>,
}

impl HasherResult {
    /// The computed value for `algorithm`, if it was requested.
    #[must_use]
    pub fn checksum(&self, algorithm: ChecksumAlgorithm) -> Option<&str> {
        self.checksums
            .iter()
            .find(|c| c.algorithm == algorithm)
            .map(|c| c.value.as_str())
    }
}

/// Incremental hasher that computes MD5 and optionally additional checksums
/// over a stream of data chunks.
///
/// # Examples
///
/// ```
/// use ruststash_s3_core::checksums::{ChecksumAlgorithm, StreamingHasher};
///
/// let mut hasher = StreamingHasher::new(&[ChecksumAlgorithm::Sha256]);
/// hasher.update(b"hello ");
/// hasher.update(b"world");
/// let result = hasher.finish();
/// assert_eq!(result.md5_hex, "5eb63bbbe01eeed093cb22bb8f5acdc3");
/// assert_eq!(result.checksums.len(), 1);
/// ```
#[derive(Debug)]
pub struct StreamingHasher {
    md5: md5::Md5,
    checksummers: Vec<Checksummer>,
}

impl StreamingHasher {
    /// Create a new streaming hasher. Duplicate algorithms are hashed once.
    #[must_use]
    pub fn new(algorithms: &[ChecksumAlgorithm]) -> Self {
        let mut checksummers: Vec<Checksummer> = Vec::with_capacity(algorithms.len());
        for &alg in algorithms {
            if checksummers.iter().all(|c| c.algorithm() != alg) {
                checksummers.push(alg.checksummer());
            }
        }
        Self {
            md5: <md5::Md5 as Digest>::new(),
            checksummers,
        }
    }

    /// Feed more data into the hasher.
    pub fn update(&mut self, data: &[u8]) {
        Digest::update(&mut self.md5, data);
        for hasher in &mut self.checksummers {
            hasher.update(data);
        }
    }

    /// Finalize the hasher and return the results.
    #[must_use]
    pub fn finish(self) -> HasherResult {
        let md5_hex = hex::encode(Digest::finalize(self.md5));
        let checksums = self
            .checksummers
            .into_iter()
            .map(|hasher| ChecksumValue {
                algorithm: hasher.algorithm(),
                value: hasher.finalize(),
            })
            .collect();
        HasherResult { md5_hex, checksums }
    }
}
