//! AWS Signature Version 4 support for RustStash S3.
//!
//! Signed streaming uploads (`STREAMING-AWS4-HMAC-SHA256-PAYLOAD`) carry a
//! signature on every chunk, chained to the previous one and seeded by the
//! request signature. This crate provides what the chunk decoder needs to
//! check that chain:
//!
//! - [`sigv4`] - `Authorization` header parsing, signing-key derivation, HMAC helpers
//! - [`chunk`] - the rolling [`ChunkSigner`]
//! - [`credentials`] - secret-key lookup by access key ID
//! - [`error`] - authentication error types
//!
//! # Usage
//!
//! ```rust
//! use ruststash_s3_auth::{ChunkSigner, StaticCredentialProvider};
//! use ruststash_s3_auth::sigv4::parse_authorization_header;
//!
//! let provider = StaticCredentialProvider::new(vec![
//!     ("test".to_owned(), "test".to_owned()),
//! ]);
//! let auth = parse_authorization_header(
//!     "AWS4-HMAC-SHA256 Credential=test/20240101/us-east-1/s3/aws4_request,\
//!      SignedHeaders=host,Signature=00",
//! )
//! .unwrap();
//!
//! let mut signer = ChunkSigner::from_credentials(&provider, &auth, "20240101T000000Z").unwrap();
//! let chunk_sig = signer.sign_chunk(b"payload");
//! assert_eq!(chunk_sig.len(), 64);
//! ```

pub mod chunk;
pub mod credentials;
pub mod error;
pub mod sigv4;

pub use chunk::ChunkSigner;
pub use credentials::{CredentialProvider, StaticCredentialProvider};
pub use error::AuthError;
pub use sigv4::{derive_signing_key, hash_payload, parse_authorization_header};
