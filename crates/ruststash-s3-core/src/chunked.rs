//! Streaming decoder for `aws-chunked` request bodies.
//!
//! When clients send a body with `Content-Encoding: aws-chunked`, the payload
//! is framed as:
//!
//! ```text
//! <hex-size>[;chunk-signature=<sig>]\r\n
//! <data>\r\n
//! ...
//! 0[;chunk-signature=<sig>]\r\n
//! [x-amz-checksum-<alg>:<base64>\r\n]
//! [x-amz-trailer-signature:<sig>\r\n]
//! \r\n
//! ```
//!
//! [`ChunkDecoder`] wraps any [`Read`] and yields only the payload bytes. It
//! holds at most one chunk in memory, so multi-gigabyte bodies stream through.
//! Signed chunks are checked against the rolling signature chain of
//! [`ChunkSigner`] unless the decoder runs in [`SignatureMode::StripOnly`].
//!
//! Once the reader returns `Ok(0)`, [`ChunkDecoder::result`] reports the
//! decoded length and the trailing checksum, if one was negotiated. A decoded
//! length that differs from the declared `x-amz-decoded-content-length` is a
//! fatal error.

use std::fmt;
use std::io::{self, BufRead, BufReader, Read};

use ruststash_s3_auth::{AuthError, ChunkSigner};
use tracing::{debug, trace};

use crate::checksums::{ChecksumAlgorithm, ChecksumValue};
use crate::error::S3ServiceError;

/// Upper bound for a chunk header or trailer line.
const MAX_LINE_LEN: u64 = 8 * 1024;

/// Trailer carrying the signature of the other trailers in a signed body.
const TRAILER_SIGNATURE_HEADER: &str = "x-amz-trailer-signature";

/// Initial buffer reservation per chunk; the buffer grows as data arrives.
const INITIAL_CHUNK_CAPACITY: usize = 64 * 1024;

/// Errors raised while decoding an `aws-chunked` body.
#[derive(Debug, thiserror::Error)]
pub enum ChunkDecodeError {
    /// A size line or trailer line could not be parsed.
    #[error("malformed aws-chunked body: {0}")]
    Malformed(String),

    /// The body ended inside a chunk or before the terminating chunk.
    #[error("aws-chunked body ended unexpectedly: {0}")]
    UnexpectedEof(&'static str),

    /// A signed body carried a chunk without a signature.
    #[error("chunk signature missing")]
    MissingSignature,

    /// A chunk signature did not match the rolling chain.
    #[error("chunk signature does not match")]
    SignatureMismatch,

    /// The negotiated checksum trailer never arrived.
    #[error("expected trailer {header} was not sent")]
    MissingTrailer {
        /// The trailer header name.
        header: &'static str,
    },

    /// A trailer carried an invalid checksum value.
    #[error("invalid value for trailer {header}")]
    InvalidTrailer {
        /// The trailer header name.
        header: &'static str,
    },

    /// The decoded byte count disagrees with the declared decoded length.
    #[error("decoded {actual} bytes but {declared} were declared")]
    LengthMismatch {
        /// `x-amz-decoded-content-length`.
        declared: u64,
        /// Bytes actually produced.
        actual: u64,
    },

    /// Reading the underlying body failed.
    #[error("failed to read request body: {0}")]
    Io(#[from] io::Error),
}

impl ChunkDecodeError {
    /// Recover a decode error that travelled through an [`io::Error`]
    /// returned by [`ChunkDecoder`]'s `Read` impl.
    #[must_use]
    pub fn from_io(err: io::Error) -> Self {
        if err.get_ref().is_some_and(|inner| inner.is::<Self>()) {
            if let Some(inner) = err.into_inner() {
                if let Ok(decode) = inner.downcast::<Self>() {
                    return *decode;
                }
            }
            return Self::Malformed("unrecognized decode failure".to_owned());
        }
        Self::Io(err)
    }
}

impl From<ChunkDecodeError> for S3ServiceError {
    fn from(err: ChunkDecodeError) -> Self {
        match err {
            ChunkDecodeError::Malformed(message) => Self::InvalidRequest { message },
            ChunkDecodeError::UnexpectedEof(what) => Self::IncompleteBody {
                message: what.to_owned(),
            },
            ChunkDecodeError::MissingSignature | ChunkDecodeError::SignatureMismatch => {
                Self::SignatureDoesNotMatch
            }
            ChunkDecodeError::MissingTrailer { .. } | ChunkDecodeError::InvalidTrailer { .. } => {
                Self::InvalidRequest {
                    message: err.to_string(),
                }
            }
            ChunkDecodeError::LengthMismatch { .. } => Self::Internal(anyhow::Error::new(err)),
            ChunkDecodeError::Io(e) => {
                Self::Internal(anyhow::Error::new(e).context("failed to read request body"))
            }
        }
    }
}

/// What to do with chunk signatures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignatureMode {
    /// Verify every chunk against the rolling chain.
    #[default]
    Verify,
    /// Parse and discard signatures.
    StripOnly,
}

/// Signature chain of a signed body.
#[derive(Debug, Clone)]
pub struct ChunkSigningContext {
    /// Chain state, seeded with the request signature.
    pub signer: ChunkSigner,
    /// Verify or strip.
    pub mode: SignatureMode,
}

/// Out-of-band description of an `aws-chunked` body.
#[derive(Debug, Clone, Default)]
pub struct ChunkedEncoding {
    /// `x-amz-decoded-content-length`, when the client declared it.
    pub decoded_length: Option<u64>,
    /// Algorithm announced in `x-amz-trailer`.
    pub trailer: Option<ChecksumAlgorithm>,
    /// Present for `STREAMING-AWS4-HMAC-SHA256-PAYLOAD*` bodies.
    pub signing: Option<ChunkSigningContext>,
}

/// Outcome of a fully decoded body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkDecodeResult {
    /// Number of payload bytes produced.
    pub decoded_length: u64,
    /// The trailing checksum, when an algorithm was negotiated.
    pub checksum: Option<ChecksumValue>,
    /// Whether every chunk signature was verified.
    pub signature_verified: bool,
}

/// A [`Read`] adapter that strips `aws-chunked` framing.
pub struct ChunkDecoder<R> {
    inner: BufReader<R>,
    encoding: ChunkedEncoding,
    chunk: Vec<u8>,
    pos: usize,
    decoded: u64,
    checksum: Option<ChecksumValue>,
    finished: bool,
}

impl<R> fmt::Debug for ChunkDecoder<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChunkDecoder")
            .field("encoding", &self.encoding)
            .field("decoded", &self.decoded)
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

impl<R: Read> ChunkDecoder<R> {
    /// Wrap `inner`, decoding according to `encoding`.
    pub fn new(inner: R, encoding: ChunkedEncoding) -> Self {
        Self {
            inner: BufReader::new(inner),
            encoding,
            chunk: Vec::new(),
            pos: 0,
            decoded: 0,
            checksum: None,
            finished: false,
        }
    }

    /// The decode outcome, available once the body has been read to the end.
    #[must_use]
    pub fn result(&self) -> Option<ChunkDecodeResult> {
        self.finished.then(|| ChunkDecodeResult {
            decoded_length: self.decoded,
            checksum: self.checksum.clone(),
            signature_verified: self
                .encoding
                .signing
                .as_ref()
                .is_some_and(|s| s.mode == SignatureMode::Verify),
        })
    }

    /// Read the whole body and return the payload with the decode outcome.
    pub fn decode_to_end(mut self) -> Result<(Vec<u8>, ChunkDecodeResult), ChunkDecodeError> {
        let mut payload = Vec::new();
        self.read_to_end(&mut payload)
            .map_err(ChunkDecodeError::from_io)?;
        let result = self
            .result()
            .ok_or(ChunkDecodeError::UnexpectedEof("decoder did not finish"))?;
        Ok((payload, result))
    }

    fn advance(&mut self) -> Result<(), ChunkDecodeError> {
        let line = self
            .read_line()?
            .ok_or(ChunkDecodeError::UnexpectedEof("missing terminating chunk"))?;
        let (size, signature) = parse_size_line(&line)?;

        self.chunk.clear();
        self.pos = 0;

        if size == 0 {
            self.check_signature(&[], signature.as_deref())?;
            return self.finish_stream();
        }

        let size_usize = usize::try_from(size)
            .map_err(|_| ChunkDecodeError::Malformed(format!("chunk size {size} too large")))?;
        self.chunk.reserve(size_usize.min(INITIAL_CHUNK_CAPACITY));
        let read = (&mut self.inner)
            .take(size)
            .read_to_end(&mut self.chunk)?;
        if read != size_usize {
            return Err(ChunkDecodeError::UnexpectedEof("chunk data truncated"));
        }
        self.expect_crlf()?;

        let chunk = std::mem::take(&mut self.chunk);
        let verified = self.check_signature(&chunk, signature.as_deref());
        self.chunk = chunk;
        verified?;

        self.decoded += size;
        if let Some(declared) = self.encoding.decoded_length {
            if self.decoded > declared {
                return Err(ChunkDecodeError::LengthMismatch {
                    declared,
                    actual: self.decoded,
                });
            }
        }
        trace!(size, decoded = self.decoded, "decoded chunk");
        Ok(())
    }

    /// Handle everything after a zero-size chunk: a blank line (possibly
    /// followed by more chunks), or trailers.
    fn finish_stream(&mut self) -> Result<(), ChunkDecodeError> {
        match self.read_line()? {
            None => {}
            Some(line) if line.is_empty() => {
                if !self.inner.fill_buf()?.is_empty() {
                    trace!("zero-length chunk before end of body");
                    return Ok(());
                }
            }
            Some(line) => self.read_trailers(line)?,
        }

        if let Some(alg) = self.encoding.trailer {
            if self.checksum.is_none() {
                return Err(ChunkDecodeError::MissingTrailer {
                    header: alg.header_name(),
                });
            }
        }
        if let Some(declared) = self.encoding.decoded_length {
            if declared != self.decoded {
                return Err(ChunkDecodeError::LengthMismatch {
                    declared,
                    actual: self.decoded,
                });
            }
        }

        self.finished = true;
        debug!(
            decoded = self.decoded,
            checksum = ?self.checksum.as_ref().map(|c| c.algorithm),
            "aws-chunked body decoded"
        );
        Ok(())
    }

    fn read_trailers(&mut self, first: String) -> Result<(), ChunkDecodeError> {
        let mut signed_block = Vec::new();
        let mut trailer_signature = None;
        let mut line = Some(first);
        while let Some(current) = line.take() {
            if current.is_empty() {
                break;
            }
            let (name, value) = current.split_once(':').ok_or_else(|| {
                ChunkDecodeError::Malformed(format!("invalid trailer line '{current}'"))
            })?;
            let name = name.trim();
            if name.eq_ignore_ascii_case(TRAILER_SIGNATURE_HEADER) {
                trailer_signature = Some(value.trim().to_owned());
                line = self.read_line()?;
                continue;
            }
            signed_block.extend_from_slice(format!("{name}:{}\n", value.trim()).as_bytes());
            if let Some(expected) = self.encoding.trailer {
                if name.eq_ignore_ascii_case(expected.header_name()) {
                    let value = ChecksumValue::parse(expected, value).map_err(|_| {
                        ChunkDecodeError::InvalidTrailer {
                            header: expected.header_name(),
                        }
                    })?;
                    self.checksum = Some(value);
                }
            }
            line = self.read_line()?;
        }
        self.check_trailer_signature(&signed_block, trailer_signature.as_deref())
    }

    fn check_trailer_signature(
        &mut self,
        block: &[u8],
        provided: Option<&str>,
    ) -> Result<(), ChunkDecodeError> {
        let Some(signing) = self.encoding.signing.as_mut() else {
            return Ok(());
        };
        if signing.mode == SignatureMode::StripOnly || block.is_empty() {
            return Ok(());
        }
        let provided = provided.ok_or(ChunkDecodeError::MissingSignature)?;
        signing
            .signer
            .verify_trailer(block, provided)
            .map_err(|e| match e {
                AuthError::ChunkSignatureMismatch => ChunkDecodeError::SignatureMismatch,
                other => ChunkDecodeError::Malformed(other.to_string()),
            })
    }

    fn check_signature(
        &mut self,
        chunk: &[u8],
        provided: Option<&str>,
    ) -> Result<(), ChunkDecodeError> {
        let Some(signing) = self.encoding.signing.as_mut() else {
            return Ok(());
        };
        if signing.mode == SignatureMode::StripOnly {
            return Ok(());
        }
        let provided = provided.ok_or(ChunkDecodeError::MissingSignature)?;
        signing
            .signer
            .verify_chunk(chunk, provided)
            .map_err(|e| match e {
                AuthError::ChunkSignatureMismatch => ChunkDecodeError::SignatureMismatch,
                other => ChunkDecodeError::Malformed(other.to_string()),
            })
    }

    /// Read one line without its line terminator. `None` at end of input.
    fn read_line(&mut self) -> Result<Option<String>, ChunkDecodeError> {
        let mut raw = Vec::new();
        let n = (&mut self.inner)
            .take(MAX_LINE_LEN)
            .read_until(b'\n', &mut raw)?;
        if n == 0 {
            return Ok(None);
        }
        if raw.last() != Some(&b'\n') {
            return Err(if n as u64 >= MAX_LINE_LEN {
                ChunkDecodeError::Malformed("header line too long".to_owned())
            } else {
                ChunkDecodeError::UnexpectedEof("unterminated line")
            });
        }
        raw.pop();
        if raw.last() == Some(&b'\r') {
            raw.pop();
        }
        String::from_utf8(raw)
            .map(Some)
            .map_err(|_| ChunkDecodeError::Malformed("line is not valid UTF-8".to_owned()))
    }

    fn expect_crlf(&mut self) -> Result<(), ChunkDecodeError> {
        let mut first = [0u8; 1];
        self.inner
            .read_exact(&mut first)
            .map_err(|_| ChunkDecodeError::UnexpectedEof("missing CRLF after chunk data"))?;
        if first[0] == b'\n' {
            return Ok(());
        }
        let mut second = [0u8; 1];
        self.inner
            .read_exact(&mut second)
            .map_err(|_| ChunkDecodeError::UnexpectedEof("missing CRLF after chunk data"))?;
        if first[0] == b'\r' && second[0] == b'\n' {
            Ok(())
        } else {
            Err(ChunkDecodeError::Malformed(
                "missing CRLF after chunk data".to_owned(),
            ))
        }
    }
}

impl<R: Read> Read for ChunkDecoder<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            if self.pos < self.chunk.len() {
                let n = buf.len().min(self.chunk.len() - self.pos);
                buf[..n].copy_from_slice(&self.chunk[self.pos..self.pos + n]);
                self.pos += n;
                return Ok(n);
            }
            if self.finished {
                return Ok(0);
            }
            self.advance().map_err(|e| match e {
                ChunkDecodeError::Io(io) => io,
                other => io::Error::other(other),
            })?;
        }
    }
}

/// Parse `<hex-size>[;chunk-signature=<sig>][;ext...]`.
fn parse_size_line(line: &str) -> Result<(u64, Option<String>), ChunkDecodeError> {
    let mut fields = line.split(';');
    let hex = fields.next().unwrap_or_default().trim();
    let size = u64::from_str_radix(hex, 16)
        .map_err(|_| ChunkDecodeError::Malformed(format!("invalid chunk size '{hex}'")))?;
    let signature = fields.find_map(|ext| {
        ext.trim()
            .strip_prefix("chunk-signature=")
            .map(|s| s.trim().to_owned())
    });
    Ok((size, signature))
}

/// Encode `payload` as an `aws-chunked` body.
///
/// This is the client side of the framing, used to build bodies in tests and
/// tooling. Chunks are `chunk_size` bytes except the last; a signer adds
/// `chunk-signature` extensions and a trailer algorithm appends its checksum
/// after the zero-size chunk. With both, the trailer is signed as well.
#[must_use]
pub fn encode_aws_chunked(
    payload: &[u8],
    chunk_size: usize,
    trailer: Option<ChecksumAlgorithm>,
    mut signer: Option<&mut ChunkSigner>,
) -> Vec<u8> {
    let chunk_size = chunk_size.max(1);
    let mut out = Vec::with_capacity(payload.len() + 128);
    let mut write_chunk = |out: &mut Vec<u8>, data: &[u8]| {
        out.extend_from_slice(format!("{:x}", data.len()).as_bytes());
        if let Some(signer) = signer.as_deref_mut() {
            out.extend_from_slice(b";chunk-signature=");
            out.extend_from_slice(signer.sign_chunk(data).as_bytes());
        }
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(data);
        if !data.is_empty() {
            out.extend_from_slice(b"\r\n");
        }
    };

    for data in payload.chunks(chunk_size) {
        write_chunk(&mut out, data);
    }
    write_chunk(&mut out, &[]);

    if let Some(alg) = trailer {
        let value = crate::checksums::compute_checksum(alg, payload);
        out.extend_from_slice(format!("{}:{value}\r\n", alg.header_name()).as_bytes());
        if let Some(signer) = signer {
            let block = format!("{}:{value}\n", alg.header_name());
            let signature = signer.sign_trailer(block.as_bytes());
            out.extend_from_slice(
                format!("{TRAILER_SIGNATURE_HEADER}:{signature}\r\n").as_bytes(),
            );
        }
    }
    out.extend_from_slice(b"\r\n");
    out
}
