//! Filesystem storage for object data, staged parts and metadata sidecars.
//!
//! Layout under the data directory:
//!
//! ```text
//! tmp/                                     staging area
//! buckets/<bucket>/bucket.json             bucket metadata
//! buckets/<bucket>/objects/<id>            version data
//! buckets/<bucket>/objects/<id>.json       version sidecar
//! buckets/<bucket>/uploads/<upload>/<n>    staged part
//! ```
//!
//! Every file is first written under `tmp/` and then renamed into place, so a
//! reader never sees a partial data file or sidecar. Bodies are hashed while
//! they are staged; hashing and decoding run on the blocking pool.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use bytes::Bytes;
use serde::Serialize;
use tempfile::NamedTempFile;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::{debug, error, info, trace, warn};

use crate::body::{Body, BodyEncoding};
use crate::checksums::{ChecksumAlgorithm, ChecksumValue, HasherResult, StreamingHasher};
use crate::chunked::{ChunkDecodeError, ChunkDecoder};
use crate::error::{S3ServiceError, S3ServiceResult};
use crate::state::{BucketInfo, ObjectVersion};
use crate::utils::{ByteRange, generate_object_id};

const COPY_BUFFER_SIZE: usize = 64 * 1024;
const BUCKET_METADATA_FILE: &str = "bucket.json";
const SIDECAR_EXTENSION: &str = "json";

/// Wrap an I/O failure as the fatal error class.
pub(crate) fn internal_io(err: io::Error, context: impl Into<String>) -> S3ServiceError {
    let context = context.into();
    error!(error = %err, "{context}");
    S3ServiceError::Internal(anyhow::Error::new(err).context(context))
}

/// A body written to a temp file, with its digests.
#[derive(Debug)]
pub struct StagedBody {
    file: NamedTempFile,
    /// Bytes written.
    pub size: u64,
    /// Hex MD5 and any requested checksums.
    pub digests: HasherResult,
    /// Checksum recovered from an `aws-chunked` trailer, already verified.
    pub trailer: Option<ChecksumValue>,
}

impl StagedBody {
    /// The quoted single-part ETag.
    #[must_use]
    pub fn etag(&self) -> String {
        format!("\"{}\"", self.digests.md5_hex)
    }

    /// The computed checksum for `algorithm`, if it was requested.
    #[must_use]
    pub fn checksum(&self, algorithm: ChecksumAlgorithm) -> Option<&str> {
        self.digests.checksum(algorithm)
    }
}

/// One restored bucket: its metadata and every version found on disk.
#[derive(Debug)]
pub struct RestoredBucket {
    /// Contents of `bucket.json`.
    pub info: BucketInfo,
    /// Versions whose sidecar and data file were both found.
    pub versions: Vec<ObjectVersion>,
}

/// An opened file, or a byte range of it, used as input to staging.
///
/// Sources are opened before staging starts, so a data file unlinked by a
/// concurrent overwrite stays readable through the handle.
#[derive(Debug)]
pub struct FileSlice {
    /// Open handle positioned anywhere; staging seeks as needed.
    pub file: File,
    /// Bytes to copy, or the whole file.
    pub range: Option<ByteRange>,
}

impl FileSlice {
    /// The whole file.
    #[must_use]
    pub fn whole(file: File) -> Self {
        Self { file, range: None }
    }

    /// Open `path` for staging.
    pub fn open(path: &Path, range: Option<ByteRange>) -> S3ServiceResult<Self> {
        let file = File::open(path)
            .map_err(|e| internal_io(e, format!("failed to open {}", path.display())))?;
        Ok(Self { file, range })
    }
}

/// Filesystem layout rooted at the data directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    tmp: PathBuf,
    buckets: PathBuf,
}

impl FileStore {
    /// Prepare the data directory.
    ///
    /// `tmp/` is always emptied. Without persistence, `buckets/` is wiped as
    /// well so every run starts from a clean slate.
    pub async fn open(data_dir: &Path, persistence: bool) -> S3ServiceResult<Self> {
        let store = Self {
            tmp: data_dir.join("tmp"),
            buckets: data_dir.join("buckets"),
        };
        remove_dir_if_exists(&store.tmp).await?;
        if !persistence {
            remove_dir_if_exists(&store.buckets).await?;
        }
        for dir in [&store.tmp, &store.buckets] {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| internal_io(e, format!("failed to create {}", dir.display())))?;
        }
        info!(data_dir = %data_dir.display(), persistence, "opened data directory");
        Ok(store)
    }

    fn bucket_dir(&self, bucket: &str) -> PathBuf {
        self.buckets.join(bucket)
    }

    /// Path of a version's data file.
    #[must_use]
    pub fn object_path(&self, bucket: &str, id: &str) -> PathBuf {
        self.bucket_dir(bucket).join("objects").join(id)
    }

    fn sidecar_path(&self, bucket: &str, id: &str) -> PathBuf {
        self.bucket_dir(bucket)
            .join("objects")
            .join(format!("{id}.{SIDECAR_EXTENSION}"))
    }

    fn upload_dir(&self, bucket: &str, upload_id: &str) -> PathBuf {
        self.bucket_dir(bucket).join("uploads").join(upload_id)
    }

    /// Path of a staged part.
    #[must_use]
    pub fn part_path(&self, bucket: &str, upload_id: &str, part_number: u32) -> PathBuf {
        self.upload_dir(bucket, upload_id)
            .join(part_number.to_string())
    }

    // -----------------------------------------------------------------------
    // Buckets
    // -----------------------------------------------------------------------

    /// Create the bucket's directories and write its metadata.
    pub async fn create_bucket(&self, info: &BucketInfo) -> S3ServiceResult<()> {
        let dir = self.bucket_dir(&info.name);
        for sub in ["objects", "uploads"] {
            let path = dir.join(sub);
            tokio::fs::create_dir_all(&path)
                .await
                .map_err(|e| internal_io(e, format!("failed to create {}", path.display())))?;
        }
        self.write_bucket_info(info).await
    }

    /// Atomically rewrite `bucket.json`.
    pub async fn write_bucket_info(&self, info: &BucketInfo) -> S3ServiceResult<()> {
        let path = self.bucket_dir(&info.name).join(BUCKET_METADATA_FILE);
        self.write_json(&path, info).await
    }

    /// Remove everything stored for a bucket.
    ///
    /// The directory is renamed into `tmp/` first, so once this returns the
    /// bucket's path is free for a new bucket of the same name. Failing to
    /// clear the renamed tree is only logged; `tmp/` is emptied on open.
    pub async fn remove_bucket(&self, bucket: &str) -> S3ServiceResult<()> {
        let dir = self.bucket_dir(bucket);
        let retired = self.tmp.join(format!("bucket-{}", generate_object_id()));
        match tokio::fs::rename(&dir, &retired).await {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(internal_io(e, format!("failed to remove {}", dir.display()))),
        }
        if let Err(e) = tokio::fs::remove_dir_all(&retired).await {
            warn!(path = %retired.display(), error = %e, "failed to clear deleted bucket");
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Staging
    // -----------------------------------------------------------------------

    /// Decode and hash a request body into a temp file.
    ///
    /// MD5 and every algorithm in `algorithms` are computed over the decoded
    /// bytes. A checksum trailer is verified against the computed value
    /// before this returns.
    pub async fn stage_body(
        &self,
        body: Body,
        algorithms: Vec<ChecksumAlgorithm>,
    ) -> S3ServiceResult<StagedBody> {
        let tmp = self.tmp.clone();
        let staged = tokio::task::spawn_blocking(move || stage_body_blocking(&tmp, body, algorithms))
            .await
            .map_err(|e| S3ServiceError::Internal(anyhow::Error::new(e).context("staging task failed")))??;
        trace!(size = staged.size, "staged request body");
        Ok(staged)
    }

    /// Concatenate file slices into a temp file, hashing as they are copied.
    ///
    /// Used by copy operations and by multipart assembly.
    pub async fn stage_files(
        &self,
        sources: Vec<FileSlice>,
        algorithms: Vec<ChecksumAlgorithm>,
    ) -> S3ServiceResult<StagedBody> {
        let tmp = self.tmp.clone();
        tokio::task::spawn_blocking(move || stage_files_blocking(&tmp, sources, &algorithms))
            .await
            .map_err(|e| S3ServiceError::Internal(anyhow::Error::new(e).context("staging task failed")))?
    }

    /// Move a staged body to `dest`, replacing whatever is there.
    pub async fn publish(&self, staged: StagedBody, dest: PathBuf) -> S3ServiceResult<()> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| internal_io(e, format!("failed to create {}", parent.display())))?;
        }
        staged
            .file
            .persist(&dest)
            .map_err(|e| internal_io(e.error, format!("failed to publish {}", dest.display())))?;
        trace!(path = %dest.display(), "published file");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Object versions
    // -----------------------------------------------------------------------

    /// Atomically write a version's sidecar.
    pub async fn write_sidecar(&self, bucket: &str, version: &ObjectVersion) -> S3ServiceResult<()> {
        self.write_json(&self.sidecar_path(bucket, version.id()), version)
            .await
    }

    /// Open a version's data file.
    ///
    /// Callers open while the key index still names the version; the handle
    /// then survives the file being unlinked.
    pub fn open_object(&self, bucket: &str, id: &str) -> S3ServiceResult<File> {
        let path = self.object_path(bucket, id);
        File::open(&path).map_err(|e| internal_io(e, format!("failed to open {}", path.display())))
    }

    /// Read bytes of an opened data file.
    pub async fn read_object(&self, file: File, range: Option<ByteRange>) -> S3ServiceResult<Bytes> {
        let mut file = tokio::fs::File::from_std(file);
        let mut buf = Vec::new();
        match range {
            Some(range) => {
                file.seek(SeekFrom::Start(range.start))
                    .await
                    .map_err(|e| internal_io(e, "failed to seek object data"))?;
                buf.reserve(usize::try_from(range.len()).unwrap_or_default());
                file.take(range.len())
                    .read_to_end(&mut buf)
                    .await
                    .map_err(|e| internal_io(e, "failed to read object data"))?;
            }
            None => {
                file.read_to_end(&mut buf)
                    .await
                    .map_err(|e| internal_io(e, "failed to read object data"))?;
            }
        }
        Ok(Bytes::from(buf))
    }

    /// Remove a version's data file and sidecar. Failures are logged only.
    pub async fn remove_version(&self, bucket: &str, version: &ObjectVersion) {
        if version.as_object().is_some() {
            remove_file_best_effort(&self.object_path(bucket, version.id())).await;
        }
        remove_file_best_effort(&self.sidecar_path(bucket, version.id())).await;
    }

    // -----------------------------------------------------------------------
    // Multipart uploads
    // -----------------------------------------------------------------------

    /// Remove an upload's staged parts. Failures are logged only.
    pub async fn remove_upload(&self, bucket: &str, upload_id: &str) {
        let dir = self.upload_dir(bucket, upload_id);
        if let Err(e) = tokio::fs::remove_dir_all(&dir).await {
            if e.kind() != io::ErrorKind::NotFound {
                warn!(path = %dir.display(), error = %e, "failed to remove upload directory");
            }
        }
    }

    // -----------------------------------------------------------------------
    // Restore
    // -----------------------------------------------------------------------

    /// Load every bucket and version recorded on disk.
    ///
    /// Staged parts of unfinished uploads are discarded. Sidecars that fail
    /// to parse, or whose data file is missing, are skipped with a warning.
    pub async fn restore(&self) -> S3ServiceResult<Vec<RestoredBucket>> {
        let buckets_dir = self.buckets.clone();
        let restored = tokio::task::spawn_blocking(move || restore_blocking(&buckets_dir))
            .await
            .map_err(|e| S3ServiceError::Internal(anyhow::Error::new(e).context("restore task failed")))??;
        for bucket in &restored {
            let uploads = self.bucket_dir(&bucket.info.name).join("uploads");
            remove_dir_if_exists(&uploads).await?;
            tokio::fs::create_dir_all(&uploads)
                .await
                .map_err(|e| internal_io(e, format!("failed to create {}", uploads.display())))?;
        }
        Ok(restored)
    }

    async fn write_json(&self, dest: &Path, value: &impl Serialize) -> S3ServiceResult<()> {
        let json = serde_json::to_vec_pretty(value)
            .map_err(|e| S3ServiceError::Internal(anyhow::Error::new(e).context("failed to encode metadata")))?;
        let tmp_path = self
            .tmp
            .join(format!("{}.{SIDECAR_EXTENSION}", generate_object_id()));
        tokio::fs::write(&tmp_path, json)
            .await
            .map_err(|e| internal_io(e, format!("failed to write {}", tmp_path.display())))?;
        if let Err(e) = tokio::fs::rename(&tmp_path, dest).await {
            remove_file_best_effort(&tmp_path).await;
            return Err(internal_io(e, format!("failed to publish {}", dest.display())));
        }
        Ok(())
    }
}

fn stage_body_blocking(
    tmp: &Path,
    body: Body,
    mut algorithms: Vec<ChecksumAlgorithm>,
) -> S3ServiceResult<StagedBody> {
    let (reader, encoding) = body.into_parts();
    let mut file = NamedTempFile::new_in(tmp)
        .map_err(|e| internal_io(e, "failed to create staging file"))?;

    let (size, digests, trailer) = match encoding {
        BodyEncoding::Plain => {
            let mut hasher = StreamingHasher::new(&algorithms);
            let size = copy_hashing(reader, file.as_file_mut(), &mut hasher)
                .map_err(|e| internal_io(e, "failed to read request body"))?;
            (size, hasher.finish(), None)
        }
        BodyEncoding::AwsChunked(chunked) => {
            if let Some(trailer) = chunked.trailer {
                algorithms.push(trailer);
            }
            let mut hasher = StreamingHasher::new(&algorithms);
            let mut decoder = ChunkDecoder::new(reader, chunked);
            let size = copy_hashing(&mut decoder, file.as_file_mut(), &mut hasher)
                .map_err(|e| S3ServiceError::from(ChunkDecodeError::from_io(e)))?;
            let result = decoder.result().ok_or_else(|| {
                S3ServiceError::from(ChunkDecodeError::UnexpectedEof("decoder did not finish"))
            })?;
            let digests = hasher.finish();
            if let Some(expected) = &result.checksum {
                expected.verify(digests.checksum(expected.algorithm).unwrap_or_default())?;
            }
            (size, digests, result.checksum)
        }
    };

    file.as_file_mut()
        .flush()
        .map_err(|e| internal_io(e, "failed to flush staging file"))?;
    Ok(StagedBody {
        file,
        size,
        digests,
        trailer,
    })
}

fn stage_files_blocking(
    tmp: &Path,
    sources: Vec<FileSlice>,
    algorithms: &[ChecksumAlgorithm],
) -> S3ServiceResult<StagedBody> {
    let mut file = NamedTempFile::new_in(tmp)
        .map_err(|e| internal_io(e, "failed to create staging file"))?;
    let mut hasher = StreamingHasher::new(algorithms);
    let mut size = 0u64;
    let count = sources.len();

    for FileSlice { file: mut input, range } in sources {
        let start = range.map_or(0, |r| r.start);
        input
            .seek(SeekFrom::Start(start))
            .map_err(|e| internal_io(e, "failed to seek staging source"))?;
        let copied = match range {
            Some(range) => copy_hashing(input.take(range.len()), file.as_file_mut(), &mut hasher),
            None => copy_hashing(input, file.as_file_mut(), &mut hasher),
        }
        .map_err(|e| internal_io(e, "failed to copy staging source"))?;
        size += copied;
    }
    file.as_file_mut()
        .flush()
        .map_err(|e| internal_io(e, "failed to flush staging file"))?;
    debug!(sources = count, size, "staged file copy");

    Ok(StagedBody {
        file,
        size,
        digests: hasher.finish(),
        trailer: None,
    })
}

fn copy_hashing(
    mut reader: impl Read,
    writer: &mut File,
    hasher: &mut StreamingHasher,
) -> io::Result<u64> {
    let mut buf = vec![0u8; COPY_BUFFER_SIZE];
    let mut total = 0u64;
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => return Ok(total),
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buf[..n]);
        writer.write_all(&buf[..n])?;
        total += n as u64;
    }
}

fn restore_blocking(buckets_dir: &Path) -> S3ServiceResult<Vec<RestoredBucket>> {
    let mut restored = Vec::new();
    let entries = std::fs::read_dir(buckets_dir)
        .map_err(|e| internal_io(e, format!("failed to read {}", buckets_dir.display())))?;

    for entry in entries {
        let dir = entry
            .map_err(|e| internal_io(e, format!("failed to read {}", buckets_dir.display())))?
            .path();
        let Some(info) = read_json::<BucketInfo>(&dir.join(BUCKET_METADATA_FILE)) else {
            warn!(path = %dir.display(), "skipping directory without bucket metadata");
            continue;
        };

        let objects_dir = dir.join("objects");
        let mut versions = Vec::new();
        if let Ok(files) = std::fs::read_dir(&objects_dir) {
            for file in files.flatten() {
                let path = file.path();
                if path.extension().and_then(|e| e.to_str()) != Some(SIDECAR_EXTENSION) {
                    continue;
                }
                let Some(version) = read_json::<ObjectVersion>(&path) else {
                    continue;
                };
                if version.as_object().is_some() && !objects_dir.join(version.id()).is_file() {
                    warn!(path = %path.display(), "skipping version whose data file is missing");
                    continue;
                }
                versions.push(version);
            }
        }
        debug!(bucket = %info.name, versions = versions.len(), "restored bucket");
        restored.push(RestoredBucket { info, versions });
    }
    Ok(restored)
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Option<T> {
    let raw = std::fs::read(path).ok()?;
    match serde_json::from_slice(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "skipping unreadable metadata");
            None
        }
    }
}

async fn remove_dir_if_exists(dir: &Path) -> S3ServiceResult<()> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(internal_io(e, format!("failed to remove {}", dir.display()))),
    }
}

async fn remove_file_best_effort(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => trace!(path = %path.display(), "removed file"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "failed to remove file"),
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use tempfile::TempDir;

    use super::*;
    use crate::checksums::compute_checksum;
    use crate::chunked::{ChunkedEncoding, encode_aws_chunked};
    use crate::state::{ObjectMetadata, Owner, S3Object, VersioningStatus};

    async fn open_store() -> (TempDir, FileStore) {
        let dir = TempDir::new().expect("tempdir");
        let store = FileStore::open(dir.path(), false).await.expect("open");
        (dir, store)
    }

    fn bucket_info(name: &str) -> BucketInfo {
        BucketInfo {
            name: name.to_owned(),
            region: "us-east-1".to_owned(),
            creation_date: Utc::now(),
            owner: Owner::default(),
            versioning: VersioningStatus::Disabled,
            object_lock_enabled: false,
        }
    }

    fn version(id: &str, key: &str, size: u64) -> ObjectVersion {
        ObjectVersion::Object(Box::new(S3Object {
            id: id.to_owned(),
            sequence: 1,
            key: key.to_owned(),
            version_id: "null".to_owned(),
            etag: "\"x\"".to_owned(),
            size,
            last_modified: Utc::now(),
            storage_class: "STANDARD".to_owned(),
            metadata: ObjectMetadata::default(),
            owner: Owner::default(),
            checksum: None,
            parts_count: None,
        }))
    }

    #[tokio::test]
    async fn test_should_stage_publish_and_read_object() {
        let (_dir, store) = open_store().await;
        store.create_bucket(&bucket_info("b")).await.expect("bucket");

        let staged = store
            .stage_body(Body::from("hello world"), vec![ChecksumAlgorithm::Sha256])
            .await
            .expect("stage");
        assert_eq!(staged.size, 11);
        assert_eq!(staged.etag(), "\"5eb63bbbe01eeed093cb22bb8f5acdc3\"");
        assert_eq!(
            staged.checksum(ChecksumAlgorithm::Sha256),
            Some(compute_checksum(ChecksumAlgorithm::Sha256, b"hello world").as_str())
        );

        store
            .publish(staged, store.object_path("b", "obj1"))
            .await
            .expect("publish");
        let open = || store.open_object("b", "obj1").expect("open");
        let all = store.read_object(open(), None).await.expect("read");
        assert_eq!(&all[..], b"hello world");
        let part = store
            .read_object(open(), Some(ByteRange { start: 6, end: 10 }))
            .await
            .expect("range");
        assert_eq!(&part[..], b"world");
    }

    #[tokio::test]
    async fn test_should_decode_and_verify_chunked_body() {
        let (_dir, store) = open_store().await;
        let payload = b"streamed payload".to_vec();
        let encoded = encode_aws_chunked(&payload, 4, Some(ChecksumAlgorithm::Crc32), None);
        let body = Body::aws_chunked(
            io::Cursor::new(encoded),
            ChunkedEncoding {
                decoded_length: Some(payload.len() as u64),
                trailer: Some(ChecksumAlgorithm::Crc32),
                signing: None,
            },
        );
        let staged = store.stage_body(body, Vec::new()).await.expect("stage");
        assert_eq!(staged.size, payload.len() as u64);
        assert_eq!(
            staged.trailer.as_ref().map(|t| t.value.clone()),
            Some(compute_checksum(ChecksumAlgorithm::Crc32, &payload))
        );
    }

    #[tokio::test]
    async fn test_should_reject_trailer_that_does_not_match_payload() {
        let (_dir, store) = open_store().await;
        let body = b"3\r\nabc\r\n0\r\nx-amz-checksum-crc32:AAAAAA==\r\n\r\n".to_vec();
        let body = Body::aws_chunked(
            io::Cursor::new(body),
            ChunkedEncoding {
                decoded_length: Some(3),
                trailer: Some(ChecksumAlgorithm::Crc32),
                signing: None,
            },
        );
        let err = store.stage_body(body, Vec::new()).await.expect_err("bad digest");
        assert!(matches!(err, S3ServiceError::BadDigest { .. }));
    }

    #[tokio::test]
    async fn test_should_concatenate_file_slices() {
        let (dir, store) = open_store().await;
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        std::fs::write(&a, b"0123456789").expect("write a");
        std::fs::write(&b, b"abcdef").expect("write b");

        let staged = store
            .stage_files(
                vec![
                    FileSlice::open(&a, Some(ByteRange { start: 2, end: 4 })).expect("open a"),
                    FileSlice::open(&b, None).expect("open b"),
                ],
                Vec::new(),
            )
            .await
            .expect("stage");
        assert_eq!(staged.size, 9);
        let dest = store.object_path("b", "joined");
        store.publish(staged, dest.clone()).await.expect("publish");
        assert_eq!(std::fs::read(dest).expect("read"), b"234abcdef");
    }

    #[tokio::test]
    async fn test_should_read_unlinked_file_through_open_handle() {
        let (_dir, store) = open_store().await;
        let staged = store
            .stage_body(Body::from("still here"), Vec::new())
            .await
            .expect("stage");
        let path = store.object_path("b", "gone");
        store.publish(staged, path.clone()).await.expect("publish");

        let file = store.open_object("b", "gone").expect("open");
        std::fs::remove_file(&path).expect("unlink");
        let body = store.read_object(file, None).await.expect("read");
        assert_eq!(&body[..], b"still here");
    }

    #[tokio::test]
    async fn test_should_drop_staged_parts_with_upload() {
        let (_dir, store) = open_store().await;
        for number in [1, 2] {
            let staged = store
                .stage_body(Body::from(format!("part {number}").into_bytes()), Vec::new())
                .await
                .expect("stage");
            store
                .publish(staged, store.part_path("b", "up", number))
                .await
                .expect("publish part");
        }
        let part = store.part_path("b", "up", 2);
        assert!(part.exists());

        store.remove_upload("b", "up").await;
        assert!(!part.exists());
        assert!(part.parent().is_some_and(|dir| !dir.exists()));
        store.remove_upload("b", "up").await;
    }

    #[tokio::test]
    async fn test_should_restore_persisted_versions() {
        let dir = TempDir::new().expect("tempdir");
        {
            let store = FileStore::open(dir.path(), true).await.expect("open");
            store.create_bucket(&bucket_info("b")).await.expect("bucket");
            let staged = store.stage_body(Body::from("data"), Vec::new()).await.expect("stage");
            store
                .publish(staged, store.object_path("b", "id1"))
                .await
                .expect("publish");
            store
                .write_sidecar("b", &version("id1", "k", 4))
                .await
                .expect("sidecar");
            // Sidecar without data is ignored.
            store
                .write_sidecar("b", &version("id2", "orphan", 1))
                .await
                .expect("sidecar");
        }

        let store = FileStore::open(dir.path(), true).await.expect("reopen");
        let restored = store.restore().await.expect("restore");
        assert_eq!(restored.len(), 1);
        assert_eq!(restored[0].info.name, "b");
        assert_eq!(restored[0].versions.len(), 1);
        assert_eq!(restored[0].versions[0].key(), "k");
    }

    #[tokio::test]
    async fn test_should_wipe_state_without_persistence() {
        let dir = TempDir::new().expect("tempdir");
        {
            let store = FileStore::open(dir.path(), false).await.expect("open");
            store.create_bucket(&bucket_info("b")).await.expect("bucket");
        }
        let store = FileStore::open(dir.path(), false).await.expect("reopen");
        assert!(store.restore().await.expect("restore").is_empty());
    }

    #[tokio::test]
    async fn test_should_remove_version_files() {
        let (_dir, store) = open_store().await;
        store.create_bucket(&bucket_info("b")).await.expect("bucket");
        let staged = store.stage_body(Body::from("x"), Vec::new()).await.expect("stage");
        store
            .publish(staged, store.object_path("b", "id"))
            .await
            .expect("publish");
        let v = version("id", "k", 1);
        store.write_sidecar("b", &v).await.expect("sidecar");

        store.remove_version("b", &v).await;
        assert!(!store.object_path("b", "id").exists());
        assert!(store.restore().await.expect("restore")[0].versions.is_empty());
    }
}
