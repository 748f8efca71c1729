//! The store handle.
//!
//! [`S3Store`] owns the bucket table, the filesystem layout and the
//! configuration. Operations are implemented in the [`crate::ops`]
//! submodules as methods on it. Every field is `Arc`-wrapped, so clones are
//! cheap and share state; separate `open` calls over separate data
//! directories are fully isolated.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use http::HeaderMap;
use ruststash_s3_auth::{CredentialProvider, StaticCredentialProvider};
use tracing::{info, warn};

use crate::body::BodyEncoding;
use crate::config::S3Config;
use crate::error::S3ServiceResult;
use crate::state::{S3Bucket, S3ServiceState};
use crate::storage::FileStore;

/// Access key accepted when no credential provider is configured.
pub const DEFAULT_ACCESS_KEY_ID: &str = "test";
/// Secret key paired with [`DEFAULT_ACCESS_KEY_ID`].
pub const DEFAULT_SECRET_ACCESS_KEY: &str = "test";

/// A filesystem-backed S3 store.
///
/// # Examples
///
/// ```no_run
/// use ruststash_s3_core::S3Store;
/// use ruststash_s3_core::config::S3Config;
///
/// # async fn run() -> ruststash_s3_core::error::S3ServiceResult<()> {
/// let store = S3Store::open(S3Config::builder().data_dir("/tmp/stash".into()).build()).await?;
/// store.create_bucket("my-bucket", Default::default()).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct S3Store {
    pub(crate) state: Arc<S3ServiceState>,
    pub(crate) storage: Arc<FileStore>,
    pub(crate) config: Arc<S3Config>,
    credentials: Arc<dyn CredentialProvider>,
    sequence: Arc<AtomicU64>,
}

impl fmt::Debug for S3Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3Store")
            .field("state", &self.state)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl S3Store {
    /// Open a store over `config.data_dir`.
    ///
    /// With persistence enabled, buckets and versions recorded on disk are
    /// restored and leftover uploads are discarded. Otherwise the data
    /// directory is wiped.
    ///
    /// # Examples
    ///
    /// ```
    /// # tokio_test::block_on(async {
    /// use ruststash_s3_core::{S3Config, S3Store};
    ///
    /// let dir = tempfile::TempDir::new().unwrap();
    /// let config = S3Config::builder().data_dir(dir.path().to_path_buf()).build();
    /// let store = S3Store::open(config).await.unwrap();
    /// assert!(store.list_buckets().is_empty());
    /// # });
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::S3ServiceError::Internal`] if the data
    /// directory cannot be prepared or read.
    pub async fn open(config: S3Config) -> S3ServiceResult<Self> {
        let storage = FileStore::open(&config.data_dir, config.persistence).await?;
        let state = S3ServiceState::new();
        let mut next_sequence = 0u64;

        if config.persistence {
            for restored in storage.restore().await? {
                let bucket = Arc::new(S3Bucket::from_info(restored.info));
                let mut versions = restored.versions;
                versions.sort_by_key(crate::state::ObjectVersion::sequence);
                {
                    let mut objects = bucket.objects.write();
                    for version in versions {
                        next_sequence = next_sequence.max(version.sequence() + 1);
                        for displaced in objects.insert(version) {
                            warn!(
                                bucket = %bucket.name,
                                key = %displaced.key(),
                                version_id = %displaced.version_id(),
                                "discarding shadowed version found on disk"
                            );
                        }
                    }
                }
                state.insert_bucket(bucket);
            }
        }

        info!(
            data_dir = %config.data_dir.display(),
            persistence = config.persistence,
            buckets = state.list_buckets().len(),
            "store opened"
        );
        let credentials = StaticCredentialProvider::new([(
            DEFAULT_ACCESS_KEY_ID.to_owned(),
            DEFAULT_SECRET_ACCESS_KEY.to_owned(),
        )]);
        Ok(Self {
            state: Arc::new(state),
            storage: Arc::new(storage),
            config: Arc::new(config),
            credentials: Arc::new(credentials),
            sequence: Arc::new(AtomicU64::new(next_sequence)),
        })
    }

    /// Replace the credential provider used to verify signed bodies.
    #[must_use]
    pub fn with_credentials(mut self, credentials: impl CredentialProvider + 'static) -> Self {
        self.credentials = Arc::new(credentials);
        self
    }

    /// The configuration the store was opened with.
    #[must_use]
    pub fn config(&self) -> &S3Config {
        &self.config
    }

    /// The bucket table, for existence and flag lookups.
    #[must_use]
    pub fn state(&self) -> &S3ServiceState {
        &self.state
    }

    /// Derive body framing from request headers using this store's
    /// credentials and signature-validation setting.
    ///
    /// # Errors
    ///
    /// See [`BodyEncoding::from_headers`].
    pub fn body_encoding(&self, headers: &HeaderMap) -> S3ServiceResult<BodyEncoding> {
        BodyEncoding::from_headers(
            headers,
            self.credentials.as_ref(),
            self.config.skip_signature_validation,
        )
    }

    /// Store-wide monotonic ordering for new versions.
    pub(crate) fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[tokio::test]
    async fn test_should_open_empty_store() {
        let dir = TempDir::new().expect("tempdir");
        let store = S3Store::open(S3Config::builder().data_dir(dir.path().into()).build())
            .await
            .expect("open");
        assert!(store.state().list_buckets().is_empty());
        assert_eq!(store.config().data_dir, dir.path());
        assert_eq!(store.next_sequence(), 0);
        assert_eq!(store.next_sequence(), 1);
    }

    #[tokio::test]
    async fn test_should_share_state_between_clones() {
        let dir = TempDir::new().expect("tempdir");
        let store = S3Store::open(S3Config::builder().data_dir(dir.path().into()).build())
            .await
            .expect("open");
        let clone = store.clone();
        store.next_sequence();
        assert_eq!(clone.next_sequence(), 1);
        assert!(format!("{store:?}").contains("S3Store"));
    }

    #[tokio::test]
    async fn test_should_derive_plain_body_encoding() {
        let dir = TempDir::new().expect("tempdir");
        let store = S3Store::open(S3Config::builder().data_dir(dir.path().into()).build())
            .await
            .expect("open");
        let encoding = store.body_encoding(&HeaderMap::new()).expect("encoding");
        assert!(!encoding.is_chunked());
    }
}
