//! Filesystem-backed S3 storage engine for RustStash.
//!
//! The crate holds everything below the HTTP and XML layers of a local S3
//! stand-in: `aws-chunked` body decoding, checksum computation, versioned
//! object storage, multipart uploads and the bucket table.
//!
//! # Architecture
//!
//! ```text
//! transport (routing, XML, SigV4 header auth)
//!        |
//!        v
//!   S3Store (ops: bucket, object, list, multipart)
//!        |
//!        +--> S3ServiceState (buckets, key index, uploads)
//!        |
//!        v
//!   FileStore (tmp/ staging, objects/, uploads/, JSON sidecars)
//! ```
//!
//! Request bodies enter as a [`body::Body`]: a blocking reader plus its
//! framing. Bodies are decoded and hashed on the blocking pool while being
//! staged to a temp file, then published with an atomic rename.

pub mod body;
pub mod checksums;
pub mod chunked;
pub mod conditional;
pub mod config;
pub mod error;
pub mod ops;
pub mod provider;
pub mod state;
pub mod storage;
pub mod utils;
pub mod validation;

pub use config::S3Config;
pub use provider::S3Store;
