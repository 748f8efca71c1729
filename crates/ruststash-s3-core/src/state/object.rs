//! Object versions, delete markers and their metadata.
//!
//! Every version carries the id of its data file and sidecar under the
//! bucket's `objects/` directory, plus a store-wide sequence number that
//! orders versions of the same key when state is restored from disk.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::checksums::{ChecksumAlgorithm, ChecksumType};
use crate::error::S3ServiceError;

/// Default storage class of new objects.
pub const STANDARD_STORAGE_CLASS: &str = "STANDARD";

/// The owner of an object, upload or bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Owner {
    /// Canonical user id.
    pub id: String,
    /// Display name.
    pub display_name: String,
}

impl Default for Owner {
    fn default() -> Self {
        Self {
            id: "79a59df900b949e55d96a1e698fbacedfd6e09d98eacf8f8d5218e7cd47ef2be".to_owned(),
            display_name: "ruststash".to_owned(),
        }
    }
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.display_name, self.id)
    }
}

/// A stored checksum together with how it was derived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChecksumData {
    /// Algorithm.
    pub algorithm: ChecksumAlgorithm,
    /// Base64 value; composite values carry a `-<parts>` suffix.
    pub value: String,
    /// Whole-object or composite.
    #[serde(default)]
    pub checksum_type: ChecksumType,
}

/// Object lock retention mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RetentionMode {
    /// Removable by callers allowed to bypass governance retention.
    Governance,
    /// Not removable until the retain-until date passes.
    Compliance,
}

impl RetentionMode {
    /// Wire representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Governance => "GOVERNANCE",
            Self::Compliance => "COMPLIANCE",
        }
    }
}

impl fmt::Display for RetentionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RetentionMode {
    type Err = S3ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GOVERNANCE" => Ok(Self::Governance),
            "COMPLIANCE" => Ok(Self::Compliance),
            _ => Err(S3ServiceError::MalformedXml),
        }
    }
}

/// Object lock retention of one version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Retention {
    /// Retention mode.
    pub mode: RetentionMode,
    /// The version is protected until this instant.
    pub retain_until: DateTime<Utc>,
}

/// Descriptive metadata stored with a version.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMetadata {
    /// MIME type.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    /// `Content-Encoding`, without the `aws-chunked` transfer coding.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_encoding: Option<String>,
    /// `Content-Disposition`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_disposition: Option<String>,
    /// `Content-Language`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_language: Option<String>,
    /// `Cache-Control`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_control: Option<String>,
    /// `Expires`, as sent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires: Option<String>,
    /// `x-amz-meta-*` headers, without the prefix.
    #[serde(default)]
    pub user_metadata: HashMap<String, String>,
    /// Server-side encryption algorithm (`AES256`, `aws:kms`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sse_algorithm: Option<String>,
    /// KMS key id for `aws:kms`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sse_kms_key_id: Option<String>,
    /// Object tags in insertion order.
    #[serde(default)]
    pub tagging: Vec<(String, String)>,
    /// Legal hold.
    #[serde(default)]
    pub legal_hold: bool,
    /// Object lock retention.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retention: Option<Retention>,
}

/// One stored revision of an object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct S3Object {
    /// Name of the data file and sidecar.
    pub id: String,
    /// Store-wide write order.
    pub sequence: u64,
    /// Object key.
    pub key: String,
    /// `"null"` when written while versioning was not enabled.
    pub version_id: String,
    /// Quoted ETag.
    pub etag: String,
    /// Size in bytes.
    pub size: u64,
    /// When this version was written.
    pub last_modified: DateTime<Utc>,
    /// Storage class, `STANDARD` by default.
    pub storage_class: String,
    /// Attributes stored with the object.
    pub metadata: ObjectMetadata,
    /// Owner of this version.
    pub owner: Owner,
    /// Additional checksum, if one was stored.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checksum: Option<ChecksumData>,
    /// Number of parts for objects assembled by a multipart upload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parts_count: Option<u32>,
}

impl S3Object {
    /// Whether object lock forbids removing this version at `now`.
    ///
    /// A legal hold always blocks; governance retention blocks unless
    /// `bypass_governance` is set; compliance retention always blocks until
    /// it expires.
    #[must_use]
    pub fn is_locked(&self, now: DateTime<Utc>, bypass_governance: bool) -> bool {
        if self.metadata.legal_hold {
            return true;
        }
        match &self.metadata.retention {
            Some(r) if r.retain_until > now => {
                !(r.mode == RetentionMode::Governance && bypass_governance)
            }
            _ => false,
        }
    }
}

/// A delete marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct S3DeleteMarker {
    /// Name of the sidecar.
    pub id: String,
    /// Store-wide write order.
    pub sequence: u64,
    /// Key the marker hides.
    pub key: String,
    /// Version id of the marker.
    pub version_id: String,
    /// When the marker was created.
    pub last_modified: DateTime<Utc>,
    /// Owner of the marker.
    pub owner: Owner,
}

/// A version entry: an object or a delete marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum ObjectVersion {
    /// A real object version.
    Object(Box<S3Object>),
    /// A delete marker.
    DeleteMarker(S3DeleteMarker),
}

impl ObjectVersion {
    /// Name of the sidecar (and data file, for objects).
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Object(obj) => &obj.id,
            Self::DeleteMarker(dm) => &dm.id,
        }
    }

    /// Object key.
    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Self::Object(obj) => &obj.key,
            Self::DeleteMarker(dm) => &dm.key,
        }
    }

    /// Version id.
    #[must_use]
    pub fn version_id(&self) -> &str {
        match self {
            Self::Object(obj) => &obj.version_id,
            Self::DeleteMarker(dm) => &dm.version_id,
        }
    }

    /// Store-wide write order.
    #[must_use]
    pub fn sequence(&self) -> u64 {
        match self {
            Self::Object(obj) => obj.sequence,
            Self::DeleteMarker(dm) => dm.sequence,
        }
    }

    /// Write time.
    #[must_use]
    pub fn last_modified(&self) -> DateTime<Utc> {
        match self {
            Self::Object(obj) => obj.last_modified,
            Self::DeleteMarker(dm) => dm.last_modified,
        }
    }

    /// Whether this is a delete marker.
    #[must_use]
    pub fn is_delete_marker(&self) -> bool {
        matches!(self, Self::DeleteMarker(_))
    }

    /// The object, unless this is a delete marker.
    #[must_use]
    pub fn as_object(&self) -> Option<&S3Object> {
        match self {
            Self::Object(obj) => Some(obj),
            Self::DeleteMarker(_) => None,
        }
    }

    /// Mutable access to the object, unless this is a delete marker.
    pub fn as_object_mut(&mut self) -> Option<&mut S3Object> {
        match self {
            Self::Object(obj) => Some(obj),
            Self::DeleteMarker(_) => None,
        }
    }

    /// The delete marker, if this is one.
    #[must_use]
    pub fn as_delete_marker(&self) -> Option<&S3DeleteMarker> {
        match self {
            Self::Object(_) => None,
            Self::DeleteMarker(dm) => Some(dm),
        }
    }
}
