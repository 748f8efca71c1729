//! Rolling signatures for `STREAMING-AWS4-HMAC-SHA256-PAYLOAD` bodies.
//!
//! Each chunk of a signed `aws-chunked` body carries a signature computed
//! over a string to sign that embeds the signature of the previous chunk.
//! The chain is seeded with the signature from the request's
//! `Authorization` header:
//!
//! ```text
//! AWS4-HMAC-SHA256-PAYLOAD
//! <timestamp>
//! <credential scope>
//! <previous signature>
//! <hex(sha256(""))>
//! <hex(sha256(chunk data))>
//! ```
//!
//! [`ChunkSigner`] holds the chain state. The decoder calls
//! [`ChunkSigner::verify_chunk`] once per chunk, including the final
//! zero-length chunk.
//!
//! Bodies with trailing headers close the chain with one more signature,
//! sent as `x-amz-trailer-signature`, over the trailer block:
//!
//! ```text
//! AWS4-HMAC-SHA256-TRAILER
//! <timestamp>
//! <credential scope>
//! <signature of the final chunk>
//! <hex(sha256(trailer lines))>
//! ```
//!
//! Each trailer line is `name:value\n`, in the order the client sent them.

use std::fmt;

use tracing::debug;

use crate::credentials::CredentialProvider;
use crate::error::AuthError;
use crate::sigv4::{
    ParsedAuth, compute_signature, derive_signing_key, hash_payload, signatures_match,
};

/// Algorithm tag of the per-chunk string to sign.
pub const STREAMING_PAYLOAD_ALGORITHM: &str = "AWS4-HMAC-SHA256-PAYLOAD";

/// Algorithm tag of the trailer string to sign.
pub const STREAMING_TRAILER_ALGORITHM: &str = "AWS4-HMAC-SHA256-TRAILER";

/// `hex(sha256(""))`, the fixed fifth line of every chunk string to sign.
const EMPTY_SHA256: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

/// State of a rolling chunk-signature chain.
#[derive(Clone)]
pub struct ChunkSigner {
    signing_key: Vec<u8>,
    timestamp: String,
    scope: String,
    previous_signature: String,
}

impl fmt::Debug for ChunkSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChunkSigner")
            .field("timestamp", &self.timestamp)
            .field("scope", &self.scope)
            .field("previous_signature", &self.previous_signature)
            .finish_non_exhaustive()
    }
}

impl ChunkSigner {
    /// Create a signer from an already derived signing key.
    pub fn new(
        signing_key: Vec<u8>,
        timestamp: impl Into<String>,
        scope: impl Into<String>,
        seed_signature: impl Into<String>,
    ) -> Self {
        Self {
            signing_key,
            timestamp: timestamp.into(),
            scope: scope.into(),
            previous_signature: seed_signature.into().to_ascii_lowercase(),
        }
    }

    /// Create a signer for a request whose `Authorization` header was parsed
    /// into `auth` and whose `x-amz-date` is `timestamp`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::UnknownAccessKey`] if the provider does not know
    /// the access key.
    pub fn from_credentials(
        provider: &dyn CredentialProvider,
        auth: &ParsedAuth,
        timestamp: &str,
    ) -> Result<Self, AuthError> {
        let secret = provider.get_secret_key(&auth.access_key_id)?;
        let key = derive_signing_key(&secret, &auth.date, &auth.region, &auth.service);
        debug!(access_key_id = %auth.access_key_id, "seeded chunk signature chain");
        Ok(Self::new(
            key,
            timestamp,
            auth.credential_scope(),
            auth.signature.clone(),
        ))
    }

    /// The signature the next chunk is chained to.
    #[must_use]
    pub fn previous_signature(&self) -> &str {
        &self.previous_signature
    }

    /// Build the string to sign for a chunk whose SHA-256 is `chunk_hash`.
    #[must_use]
    pub fn string_to_sign(&self, chunk_hash: &str) -> String {
        format!(
            "{STREAMING_PAYLOAD_ALGORITHM}\n{}\n{}\n{}\n{EMPTY_SHA256}\n{chunk_hash}",
            self.timestamp, self.scope, self.previous_signature
        )
    }

    /// Compute the signature of `chunk` and advance the chain.
    ///
    /// This is the client side of the protocol.
    pub fn sign_chunk(&mut self, chunk: &[u8]) -> String {
        let signature = self.expected_signature(chunk);
        self.previous_signature.clone_from(&signature);
        signature
    }

    /// Verify the signature supplied for `chunk` and advance the chain.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::ChunkSignatureMismatch`] if `provided` differs
    /// from the expected signature. The chain does not advance in that case.
    pub fn verify_chunk(&mut self, chunk: &[u8], provided: &str) -> Result<(), AuthError> {
        let expected = self.expected_signature(chunk);
        if !signatures_match(provided, &expected) {
            debug!(
                chunk_len = chunk.len(),
                "chunk signature verification failed"
            );
            return Err(AuthError::ChunkSignatureMismatch);
        }
        self.previous_signature = expected;
        Ok(())
    }

    /// Compute the signature of a trailer block and advance the chain.
    pub fn sign_trailer(&mut self, trailer: &[u8]) -> String {
        let signature = self.expected_trailer_signature(trailer);
        self.previous_signature.clone_from(&signature);
        signature
    }

    /// Verify the `x-amz-trailer-signature` supplied for `trailer`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::ChunkSignatureMismatch`] if `provided` differs
    /// from the expected signature.
    pub fn verify_trailer(&mut self, trailer: &[u8], provided: &str) -> Result<(), AuthError> {
        let expected = self.expected_trailer_signature(trailer);
        if !signatures_match(provided, &expected) {
            debug!(
                trailer_len = trailer.len(),
                "trailer signature verification failed"
            );
            return Err(AuthError::ChunkSignatureMismatch);
        }
        self.previous_signature = expected;
        Ok(())
    }

    fn expected_signature(&self, chunk: &[u8]) -> String {
        compute_signature(&self.signing_key, &self.string_to_sign(&hash_payload(chunk)))
    }

    fn expected_trailer_signature(&self, trailer: &[u8]) -> String {
        let string_to_sign = format!(
            "{STREAMING_TRAILER_ALGORITHM}\n{}\n{}\n{}\n{}",
            self.timestamp,
            self.scope,
            self.previous_signature,
            hash_payload(trailer)
        );
        compute_signature(&self.signing_key, &string_to_sign)
    }
}
