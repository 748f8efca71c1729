//! S3-specific error types.
//!
//! Defines [`S3ServiceError`], the typed error taxonomy returned by every
//! store operation. Each variant knows its S3 wire code ([`S3ServiceError::code`])
//! and HTTP status ([`S3ServiceError::status_code`]) so that the HTTP layer
//! can render the error document without inspecting messages.
//!
//! Only [`S3ServiceError::Internal`] is fatal: it wraps filesystem failures and
//! broken invariants and is never retried.
//!
//! # Usage
//!
//! ```
//! use ruststash_s3_core::error::S3ServiceError;
//!
//! let err = S3ServiceError::NoSuchBucket {
//!     bucket: "my-bucket".to_owned(),
//! };
//! assert_eq!(err.code(), "NoSuchBucket");
//! assert_eq!(err.status_code(), http::StatusCode::NOT_FOUND);
//! ```

use http::StatusCode;
use ruststash_s3_auth::AuthError;

/// S3 service error type.
#[derive(Debug, thiserror::Error)]
pub enum S3ServiceError {
    // -----------------------------------------------------------------------
    // Bucket errors
    // -----------------------------------------------------------------------
    /// The specified bucket does not exist.
    #[error("The specified bucket does not exist: {bucket}")]
    NoSuchBucket {
        /// The bucket name that was not found.
        bucket: String,
    },

    /// The requested bucket name is not available (owned by another account).
    #[error("The requested bucket name is not available: {bucket}")]
    BucketAlreadyExists {
        /// The bucket name that already exists.
        bucket: String,
    },

    /// The bucket already exists and is owned by you.
    #[error(
        "Your previous request to create the named bucket succeeded and you already own it: {bucket}"
    )]
    BucketAlreadyOwnedByYou {
        /// The bucket name that already exists.
        bucket: String,
    },

    /// The bucket is not empty and cannot be deleted.
    #[error("The bucket you tried to delete is not empty: {bucket}")]
    BucketNotEmpty {
        /// The bucket name that is not empty.
        bucket: String,
    },

    // -----------------------------------------------------------------------
    // Object / key errors
    // -----------------------------------------------------------------------
    /// The specified key does not exist.
    #[error("The specified key does not exist: {key}")]
    NoSuchKey {
        /// The key that was not found.
        key: String,
    },

    /// The specified version does not exist.
    #[error("The specified version does not exist: key={key}, version_id={version_id}")]
    NoSuchVersion {
        /// The key for the version.
        key: String,
        /// The version ID that was not found.
        version_id: String,
    },

    // -----------------------------------------------------------------------
    // Multipart upload errors
    // -----------------------------------------------------------------------
    /// The specified multipart upload does not exist.
    #[error("The specified upload does not exist: {upload_id}")]
    NoSuchUpload {
        /// The upload ID that was not found.
        upload_id: String,
    },

    /// The list of parts was not in ascending order.
    #[error("The list of parts was not in ascending order")]
    InvalidPartOrder,

    /// One or more of the specified parts could not be found, or the
    /// specified entity tag or checksum did not match the part.
    #[error("One or more of the specified parts could not be found: {message}")]
    InvalidPart {
        /// Which part failed and why.
        message: String,
    },

    /// A proposed upload part is smaller than the minimum allowed size.
    #[error("Your proposed upload is smaller than the minimum allowed object size")]
    EntityTooSmall,

    // -----------------------------------------------------------------------
    // Validation errors
    // -----------------------------------------------------------------------
    /// The specified bucket name is not valid.
    #[error("Invalid bucket name: {name}: {reason}")]
    InvalidBucketName {
        /// The invalid bucket name.
        name: String,
        /// The reason for the error.
        reason: String,
    },

    /// An argument provided is invalid.
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Description of the invalid argument.
        message: String,
    },

    /// The request is not valid in its current combination of parameters.
    #[error("Invalid request: {message}")]
    InvalidRequest {
        /// Description of the problem.
        message: String,
    },

    /// The requested range is not satisfiable.
    #[error("The requested range is not satisfiable")]
    InvalidRange,

    /// A tag key or value is invalid.
    #[error("Invalid tag: {message}")]
    InvalidTag {
        /// Description of the tag error.
        message: String,
    },

    /// The XML body is malformed, or a required list in it is empty.
    #[error("The XML you provided was not well-formed or did not validate against our published schema")]
    MalformedXml,

    /// The key is too long.
    #[error("Your key is too long")]
    KeyTooLong,

    /// The body ended before the framing said it would.
    #[error("You did not provide the number of bytes specified: {message}")]
    IncompleteBody {
        /// Description of the framing problem.
        message: String,
    },

    // -----------------------------------------------------------------------
    // Authorization / access errors
    // -----------------------------------------------------------------------
    /// Access denied.
    #[error("Access Denied")]
    AccessDenied,

    /// The HTTP method is not allowed against this resource.
    #[error("The specified method is not allowed against this resource")]
    MethodNotAllowed,

    /// A chunk signature did not match the rolling signature chain.
    #[error("The request signature we calculated does not match the signature you provided")]
    SignatureDoesNotMatch,

    // -----------------------------------------------------------------------
    // Conditional request errors
    // -----------------------------------------------------------------------
    /// A precondition specified in the request was not met.
    #[error("At least one of the pre-conditions you specified did not hold: {condition}")]
    PreconditionFailed {
        /// The header whose predicate failed.
        condition: String,
    },

    /// The object was not modified (If-None-Match / If-Modified-Since).
    #[error("Not Modified")]
    NotModified,

    /// A copy-source precondition was not met.
    #[error("At least one of the copy-source pre-conditions you specified did not hold: {condition}")]
    CopySourcePreconditionFailed {
        /// The `x-amz-copy-source-if-*` header whose predicate failed.
        condition: String,
    },

    // -----------------------------------------------------------------------
    // Digest / content errors
    // -----------------------------------------------------------------------
    /// The Content-MD5 you specified is invalid.
    #[error("The Content-MD5 you specified is not valid")]
    InvalidDigest,

    /// A supplied digest or checksum did not match the received bytes.
    #[error("{message}")]
    BadDigest {
        /// Which digest did not match.
        message: String,
    },

    // -----------------------------------------------------------------------
    // Internal / catch-all
    // -----------------------------------------------------------------------
    /// Internal error with context.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl S3ServiceError {
    /// The S3 error code rendered in the `<Code>` element.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::NoSuchBucket { .. } => "NoSuchBucket",
            Self::BucketAlreadyExists { .. } => "BucketAlreadyExists",
            Self::BucketAlreadyOwnedByYou { .. } => "BucketAlreadyOwnedByYou",
            Self::BucketNotEmpty { .. } => "BucketNotEmpty",
            Self::NoSuchKey { .. } => "NoSuchKey",
            Self::NoSuchVersion { .. } => "NoSuchVersion",
            Self::NoSuchUpload { .. } => "NoSuchUpload",
            Self::InvalidPartOrder => "InvalidPartOrder",
            Self::InvalidPart { .. } => "InvalidPart",
            Self::EntityTooSmall => "EntityTooSmall",
            Self::InvalidBucketName { .. } => "InvalidBucketName",
            Self::InvalidArgument { .. } => "InvalidArgument",
            Self::InvalidRequest { .. } => "InvalidRequest",
            Self::InvalidRange => "InvalidRange",
            Self::InvalidTag { .. } => "InvalidTag",
            Self::MalformedXml => "MalformedXML",
            Self::KeyTooLong => "KeyTooLongError",
            Self::IncompleteBody { .. } => "IncompleteBody",
            Self::AccessDenied => "AccessDenied",
            Self::MethodNotAllowed => "MethodNotAllowed",
            Self::SignatureDoesNotMatch => "SignatureDoesNotMatch",
            Self::PreconditionFailed { .. } | Self::CopySourcePreconditionFailed { .. } => {
                "PreconditionFailed"
            }
            Self::NotModified => "NotModified",
            Self::InvalidDigest => "InvalidDigest",
            Self::BadDigest { .. } => "BadDigest",
            Self::Internal(_) => "InternalError",
        }
    }

    /// The HTTP status code the error is returned with.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NoSuchBucket { .. }
            | Self::NoSuchKey { .. }
            | Self::NoSuchVersion { .. }
            | Self::NoSuchUpload { .. } => StatusCode::NOT_FOUND,
            Self::BucketAlreadyExists { .. }
            | Self::BucketAlreadyOwnedByYou { .. }
            | Self::BucketNotEmpty { .. } => StatusCode::CONFLICT,
            Self::InvalidPartOrder
            | Self::InvalidPart { .. }
            | Self::EntityTooSmall
            | Self::InvalidBucketName { .. }
            | Self::InvalidArgument { .. }
            | Self::InvalidRequest { .. }
            | Self::InvalidTag { .. }
            | Self::MalformedXml
            | Self::KeyTooLong
            | Self::IncompleteBody { .. }
            | Self::InvalidDigest
            | Self::BadDigest { .. } => StatusCode::BAD_REQUEST,
            Self::InvalidRange => StatusCode::RANGE_NOT_SATISFIABLE,
            Self::AccessDenied | Self::SignatureDoesNotMatch => StatusCode::FORBIDDEN,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::PreconditionFailed { .. } | Self::CopySourcePreconditionFailed { .. } => {
                StatusCode::PRECONDITION_FAILED
            }
            Self::NotModified => StatusCode::NOT_MODIFIED,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether this is the fatal class (I/O failure or broken invariant).
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Internal(_))
    }
}

impl From<AuthError> for S3ServiceError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::UnknownAccessKey(_) => Self::AccessDenied,
            AuthError::ChunkSignatureMismatch => Self::SignatureDoesNotMatch,
            AuthError::MalformedAuthorization(_)
            | AuthError::InvalidCredentialScope(_)
            | AuthError::UnsupportedAlgorithm(_) => Self::InvalidArgument {
                message: err.to_string(),
            },
        }
    }
}

/// Convenience result type for S3 service operations.
pub type S3ServiceResult<T> = Result<T, S3ServiceError>;
