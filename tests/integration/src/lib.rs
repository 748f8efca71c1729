//! End-to-end tests for the RustStash S3 storage engine.
//!
//! Each test opens a fresh [`S3Store`] over its own temp directory, so tests
//! are isolated and run in parallel. Set `RUST_LOG` to see engine logs:
//!
//! ```text
//! RUST_LOG=ruststash_s3_core=debug cargo test -p ruststash-integration
//! ```

use std::sync::Once;

use rand::RngExt;
use ruststash_s3_core::ops::CreateBucketInput;
use ruststash_s3_core::state::VersioningStatus;
use ruststash_s3_core::{S3Config, S3Store};
use tempfile::TempDir;

static INIT: Once = Once::new();

/// Initialize tracing (once).
fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .init();
    });
}

/// Minimum part size used by tests, small enough to keep payloads tiny.
pub const TEST_MIN_PART_SIZE: u64 = 1024;

/// Open a store over a fresh temp directory.
///
/// The directory is removed when the returned guard drops.
pub async fn open_store() -> (TempDir, S3Store) {
    init_tracing();
    let dir = TempDir::new().expect("create temp dir");
    let store = reopen_store(&dir, false).await;
    (dir, store)
}

/// Open a store over an existing directory.
pub async fn reopen_store(dir: &TempDir, persistence: bool) -> S3Store {
    init_tracing();
    let config = S3Config::builder()
        .data_dir(dir.path().to_path_buf())
        .persistence(persistence)
        .min_part_size(TEST_MIN_PART_SIZE)
        .build();
    S3Store::open(config).await.expect("open store")
}

/// Generate a unique bucket name with the given prefix.
#[must_use]
pub fn test_bucket_name(prefix: &str) -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("{prefix}-{}", &id[..12])
}

/// Create a bucket with a unique name and return the name.
pub async fn create_test_bucket(store: &S3Store, prefix: &str, versioned: bool) -> String {
    let bucket = test_bucket_name(prefix);
    store
        .create_bucket(&bucket, CreateBucketInput::default())
        .await
        .expect("create bucket");
    if versioned {
        store
            .put_bucket_versioning(&bucket, VersioningStatus::Enabled)
            .await
            .expect("enable versioning");
    }
    bucket
}

/// Random payload of `len` bytes.
#[must_use]
pub fn random_payload(len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    rand::rng().fill(&mut buf[..]);
    buf
}

mod test_chunked;
mod test_concurrency;
mod test_multipart;
mod test_persistence;
mod test_versioning;
