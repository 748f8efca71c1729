//! Request bodies handed to the store.
//!
//! A [`Body`] is any blocking reader plus a [`BodyEncoding`] that says how
//! the bytes are framed. The HTTP layer can derive the encoding from request
//! headers with [`BodyEncoding::from_headers`].

use std::fmt;
use std::io::Read;

use bytes::{Buf, Bytes};
use http::HeaderMap;
use ruststash_s3_auth::{ChunkSigner, CredentialProvider, parse_authorization_header};
use tracing::debug;

use crate::checksums::ChecksumAlgorithm;
use crate::chunked::{ChunkSigningContext, ChunkedEncoding, SignatureMode};
use crate::error::{S3ServiceError, S3ServiceResult};

/// `x-amz-content-sha256` value of signed aws-chunked bodies.
pub const STREAMING_SIGNED_PAYLOAD: &str = "STREAMING-AWS4-HMAC-SHA256-PAYLOAD";
/// Signed aws-chunked bodies followed by a checksum trailer.
pub const STREAMING_SIGNED_PAYLOAD_TRAILER: &str = "STREAMING-AWS4-HMAC-SHA256-PAYLOAD-TRAILER";
/// Unsigned aws-chunked bodies followed by a checksum trailer.
pub const STREAMING_UNSIGNED_PAYLOAD_TRAILER: &str = "STREAMING-UNSIGNED-PAYLOAD-TRAILER";

/// How a request body is framed.
#[derive(Debug, Clone, Default)]
pub enum BodyEncoding {
    /// Raw payload bytes.
    #[default]
    Plain,
    /// `aws-chunked` framing, optionally signed, optionally with a trailer.
    AwsChunked(ChunkedEncoding),
}

impl BodyEncoding {
    /// Derive the framing from request headers.
    ///
    /// Reads `x-amz-content-sha256`, `Content-Encoding`,
    /// `x-amz-decoded-content-length` and `x-amz-trailer`. Signed streaming
    /// bodies also need `Authorization` and `x-amz-date` to seed the chunk
    /// signature chain. With `skip_signature_validation` the signatures are
    /// stripped and no credential lookup happens.
    ///
    /// # Errors
    ///
    /// - [`S3ServiceError::InvalidArgument`] for a malformed decoded length.
    /// - [`S3ServiceError::InvalidRequest`] for an unknown trailer.
    /// - Authentication errors when the signature chain cannot be seeded.
    pub fn from_headers(
        headers: &HeaderMap,
        credentials: &dyn CredentialProvider,
        skip_signature_validation: bool,
    ) -> S3ServiceResult<Self> {
        let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());

        let content_sha256 = header("x-amz-content-sha256").unwrap_or_default();
        let chunked_encoding = header("content-encoding").is_some_and(|v| {
            v.split(',')
                .any(|coding| coding.trim().eq_ignore_ascii_case("aws-chunked"))
        });
        let signed = matches!(
            content_sha256,
            STREAMING_SIGNED_PAYLOAD | STREAMING_SIGNED_PAYLOAD_TRAILER
        );
        if !signed && content_sha256 != STREAMING_UNSIGNED_PAYLOAD_TRAILER && !chunked_encoding {
            return Ok(Self::Plain);
        }

        let decoded_length = header("x-amz-decoded-content-length")
            .map(|v| {
                v.trim()
                    .parse::<u64>()
                    .map_err(|_| S3ServiceError::InvalidArgument {
                        message: format!("Invalid x-amz-decoded-content-length: {v}"),
                    })
            })
            .transpose()?;

        let trailer = header("x-amz-trailer")
            .map(|name| {
                ChecksumAlgorithm::from_header_name(name.trim()).ok_or_else(|| {
                    S3ServiceError::InvalidRequest {
                        message: format!("The value specified in the x-amz-trailer header is not supported: {name}"),
                    }
                })
            })
            .transpose()?;

        let signing = if signed {
            Some(signing_context(
                header("authorization"),
                header("x-amz-date"),
                credentials,
                skip_signature_validation,
            )?)
        } else {
            None
        };

        debug!(
            ?decoded_length,
            ?trailer,
            signed,
            "request body uses aws-chunked framing"
        );
        Ok(Self::AwsChunked(ChunkedEncoding {
            decoded_length,
            trailer,
            signing,
        }))
    }

    /// Whether the body uses `aws-chunked` framing.
    #[must_use]
    pub fn is_chunked(&self) -> bool {
        matches!(self, Self::AwsChunked(_))
    }
}

fn signing_context(
    authorization: Option<&str>,
    date: Option<&str>,
    credentials: &dyn CredentialProvider,
    skip_signature_validation: bool,
) -> S3ServiceResult<ChunkSigningContext> {
    let auth = parse_authorization_header(authorization.unwrap_or_default())?;
    let timestamp = date.ok_or(S3ServiceError::AccessDenied)?;
    if skip_signature_validation {
        return Ok(ChunkSigningContext {
            signer: ChunkSigner::new(
                Vec::new(),
                timestamp,
                auth.credential_scope(),
                auth.signature.clone(),
            ),
            mode: SignatureMode::StripOnly,
        });
    }
    Ok(ChunkSigningContext {
        signer: ChunkSigner::from_credentials(credentials, &auth, timestamp)?,
        mode: SignatureMode::Verify,
    })
}

/// A request body: a blocking reader and its framing.
pub struct Body {
    reader: Box<dyn Read + Send>,
    encoding: BodyEncoding,
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Body")
            .field("encoding", &self.encoding)
            .finish_non_exhaustive()
    }
}

impl Body {
    /// A body of raw payload bytes.
    pub fn new(reader: impl Read + Send + 'static) -> Self {
        Self::with_encoding(reader, BodyEncoding::Plain)
    }

    /// A body framed as described by `encoding`.
    pub fn with_encoding(reader: impl Read + Send + 'static, encoding: BodyEncoding) -> Self {
        Self {
            reader: Box::new(reader),
            encoding,
        }
    }

    /// An `aws-chunked` body.
    pub fn aws_chunked(reader: impl Read + Send + 'static, encoding: ChunkedEncoding) -> Self {
        Self::with_encoding(reader, BodyEncoding::AwsChunked(encoding))
    }

    /// An empty body.
    #[must_use]
    pub fn empty() -> Self {
        Self::from(Bytes::new())
    }

    /// How the bytes are framed.
    #[must_use]
    pub fn encoding(&self) -> &BodyEncoding {
        &self.encoding
    }

    /// Split into the reader and the framing.
    #[must_use]
    pub fn into_parts(self) -> (Box<dyn Read + Send>, BodyEncoding) {
        (self.reader, self.encoding)
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        Self::new(bytes.reader())
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Self::from(Bytes::from(bytes))
    }
}

impl From<&'static [u8]> for Body {
    fn from(bytes: &'static [u8]) -> Self {
        Self::from(Bytes::from_static(bytes))
    }
}

impl From<&'static str> for Body {
    fn from(s: &'static str) -> Self {
        Self::from(s.as_bytes())
    }
}
