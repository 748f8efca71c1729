//! Conditional request evaluation.
//!
//! Reads (`GetObject`, `HeadObject`) and copy sources are guarded by
//! [`ReadConditions`]. Writes (`PutObject`, `CompleteMultipartUpload`) are
//! guarded by [`WriteConditions`].
//!
//! Precedence follows RFC 7232 as S3 applies it: `If-Match` overrides
//! `If-Unmodified-Since`, and `If-None-Match` overrides `If-Modified-Since`.
//! HTTP dates have one-second resolution, so timestamps are compared at
//! whole seconds.

use chrono::{DateTime, Utc};

use crate::error::{S3ServiceError, S3ServiceResult};
use crate::utils::normalize_etag;

/// Whether an `If-Match` style header matches `etag`.
///
/// The header may be `*` or a comma-separated list of (weak or strong)
/// entity tags.
///
/// # Examples
///
/// ```
/// use ruststash_s3_core::conditional::etag_matches;
///
/// assert!(etag_matches("\"abc\"", "*"));
/// assert!(etag_matches("\"abc\"", "\"xyz\", \"abc\""));
/// assert!(!etag_matches("\"abc\"", "\"xyz\""));
/// ```
#[must_use]
pub fn etag_matches(etag: &str, header: &str) -> bool {
    let etag = normalize_etag(etag);
    header
        .split(',')
        .map(str::trim)
        .any(|candidate| candidate == "*" || normalize_etag(candidate) == etag)
}

fn modified_after(last_modified: DateTime<Utc>, since: DateTime<Utc>) -> bool {
    last_modified.timestamp() > since.timestamp()
}

/// Predicates guarding a read.
#[derive(Debug, Clone, Default)]
pub struct ReadConditions {
    /// `If-Match`: ETags, or `*`.
    pub if_match: Option<String>,
    /// `If-None-Match`: ETags, or `*`.
    pub if_none_match: Option<String>,
    /// `If-Modified-Since`.
    pub if_modified_since: Option<DateTime<Utc>>,
    /// `If-Unmodified-Since`.
    pub if_unmodified_since: Option<DateTime<Utc>>,
}

impl ReadConditions {
    /// No predicates at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.if_match.is_none()
            && self.if_none_match.is_none()
            && self.if_modified_since.is_none()
            && self.if_unmodified_since.is_none()
    }

    /// Evaluate against the current object.
    ///
    /// # Errors
    ///
    /// - [`S3ServiceError::PreconditionFailed`] when `If-Match` fails, or
    ///   `If-Unmodified-Since` fails without an `If-Match`.
    /// - [`S3ServiceError::NotModified`] when `If-None-Match` matches, or
    ///   `If-Modified-Since` holds without an `If-None-Match`.
    pub fn evaluate(&self, etag: &str, last_modified: DateTime<Utc>) -> S3ServiceResult<()> {
        match &self.if_match {
            Some(if_match) if !etag_matches(etag, if_match) => {
                return Err(S3ServiceError::PreconditionFailed {
                    condition: "If-Match".to_owned(),
                });
            }
            Some(_) => {}
            None => {
                if let Some(since) = self.if_unmodified_since {
                    if modified_after(last_modified, since) {
                        return Err(S3ServiceError::PreconditionFailed {
                            condition: "If-Unmodified-Since".to_owned(),
                        });
                    }
                }
            }
        }

        match &self.if_none_match {
            Some(if_none_match) if etag_matches(etag, if_none_match) => {
                Err(S3ServiceError::NotModified)
            }
            Some(_) => Ok(()),
            None => match self.if_modified_since {
                Some(since) if !modified_after(last_modified, since) => {
                    Err(S3ServiceError::NotModified)
                }
                _ => Ok(()),
            },
        }
    }

    /// Evaluate as `x-amz-copy-source-if-*` predicates.
    ///
    /// Same precedence as [`ReadConditions::evaluate`], but every failure is
    /// [`S3ServiceError::CopySourcePreconditionFailed`].
    ///
    /// # Errors
    ///
    /// Returns [`S3ServiceError::CopySourcePreconditionFailed`] naming the
    /// failed header.
    pub fn evaluate_copy_source(
        &self,
        etag: &str,
        last_modified: DateTime<Utc>,
    ) -> S3ServiceResult<()> {
        let failed = |header: &str| {
            Err(S3ServiceError::CopySourcePreconditionFailed {
                condition: format!("x-amz-copy-source-{header}"),
            })
        };
        if let Some(if_match) = &self.if_match {
            if !etag_matches(etag, if_match) {
                return failed("If-Match");
            }
        } else if let Some(since) = self.if_unmodified_since {
            if modified_after(last_modified, since) {
                return failed("If-Unmodified-Since");
            }
        }

        if let Some(if_none_match) = &self.if_none_match {
            if etag_matches(etag, if_none_match) {
                return failed("If-None-Match");
            }
        } else if let Some(since) = self.if_modified_since {
            if !modified_after(last_modified, since) {
                return failed("If-Modified-Since");
            }
        }
        Ok(())
    }
}

/// Predicates guarding a write against the key's current object.
#[derive(Debug, Clone, Default)]
pub struct WriteConditions {
    /// `If-Match`: the current object must carry this ETag.
    pub if_match: Option<String>,
    /// Only `*` is meaningful for writes.
    pub if_none_match: Option<String>,
}

impl WriteConditions {
    /// Whether no condition was given.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.if_match.is_none() && self.if_none_match.is_none()
    }

    /// Evaluate against the current object's ETag, `None` when the key has
    /// no current object (absent or a delete marker).
    ///
    /// # Errors
    ///
    /// - [`S3ServiceError::PreconditionFailed`] when `If-None-Match` matches
    ///   an existing object or `If-Match` does not.
    /// - [`S3ServiceError::NoSuchKey`] when `If-Match` is given and there is
    ///   no current object.
    pub fn evaluate(&self, key: &str, current_etag: Option<&str>) -> S3ServiceResult<()> {
        match current_etag {
            Some(etag) => {
                if self
                    .if_none_match
                    .as_deref()
                    .is_some_and(|header| etag_matches(etag, header))
                {
                    return Err(S3ServiceError::PreconditionFailed {
                        condition: "If-None-Match".to_owned(),
                    });
                }
                if self
                    .if_match
                    .as_deref()
                    .is_some_and(|header| !etag_matches(etag, header))
                {
                    return Err(S3ServiceError::PreconditionFailed {
                        condition: "If-Match".to_owned(),
                    });
                }
                Ok(())
            }
            None if self.if_match.is_some() => Err(S3ServiceError::NoSuchKey {
                key: key.to_owned(),
            }),
            None => Ok(()),
        }
    }
}
