//! Races between writers, readers and bucket or upload teardown.

#[cfg(test)]
mod tests {
    use ruststash_s3_core::body::Body;
    use ruststash_s3_core::error::S3ServiceError;
    use ruststash_s3_core::ops::{
        CompleteMultipartUploadInput, CompletedPart, CreateBucketInput,
        CreateMultipartUploadInput, GetObjectInput, PutObjectInput, UploadPartInput,
    };

    use crate::{
        TEST_MIN_PART_SIZE, create_test_bucket, open_store, random_payload, reopen_store,
        test_bucket_name,
    };

    const OVERWRITES: usize = 300;
    const READERS: usize = 4;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_should_read_whole_versions_during_overwrites() {
        let (_dir, store) = open_store().await;
        let bucket = create_test_bucket(&store, "overwrite", false).await;
        store
            .put_object(&bucket, "k", Body::from("rev-0"), PutObjectInput::default())
            .await
            .expect("seed");

        let writer = {
            let store = store.clone();
            let bucket = bucket.clone();
            tokio::spawn(async move {
                for i in 1..=OVERWRITES {
                    store
                        .put_object(
                            &bucket,
                            "k",
                            Body::from(format!("rev-{i}").into_bytes()),
                            PutObjectInput::default(),
                        )
                        .await
                        .expect("overwrite");
                }
            })
        };
        let mut readers = Vec::new();
        for _ in 0..READERS {
            let store = store.clone();
            let bucket = bucket.clone();
            readers.push(tokio::spawn(async move {
                for _ in 0..OVERWRITES {
                    let read = store
                        .get_object(&bucket, "k", GetObjectInput::default())
                        .await
                        .expect("read during overwrite")
                        .into_found()
                        .expect("object present");
                    assert!(read.body.starts_with(b"rev-"), "{:?}", read.body);
                    assert_eq!(read.body.len() as u64, read.object.size);
                }
            }));
        }

        writer.await.expect("join writer");
        for reader in readers {
            reader.await.expect("join reader");
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_should_keep_bucket_recreated_during_delete() {
        let (dir, store) = open_store().await;
        let rounds = 40;
        let mut names = Vec::new();

        for _ in 0..rounds {
            let name = test_bucket_name("reuse");
            store
                .create_bucket(&name, CreateBucketInput::default())
                .await
                .expect("create");

            let deleter = {
                let store = store.clone();
                let name = name.clone();
                tokio::spawn(async move { store.delete_bucket(&name).await })
            };
            let creator = {
                let store = store.clone();
                let name = name.clone();
                tokio::spawn(async move {
                    for _ in 0..100_000 {
                        match store.create_bucket(&name, CreateBucketInput::default()).await {
                            Ok(_) => return true,
                            Err(S3ServiceError::BucketAlreadyOwnedByYou { .. }) => {
                                tokio::task::yield_now().await;
                            }
                            Err(e) => panic!("unexpected create error: {e:?}"),
                        }
                    }
                    false
                })
            };

            deleter.await.expect("join").expect("delete");
            assert!(creator.await.expect("join"), "bucket was never recreated");
            assert!(
                dir.path()
                    .join("buckets")
                    .join(&name)
                    .join("bucket.json")
                    .exists()
            );
            names.push(name);
        }
        drop(store);

        let store = reopen_store(&dir, true).await;
        for name in &names {
            store.head_bucket(name).expect("recreated bucket survives restart");
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_should_settle_complete_racing_abort() {
        let (_dir, store) = open_store().await;
        let bucket = create_test_bucket(&store, "settle", false).await;
        let size = usize::try_from(TEST_MIN_PART_SIZE).expect("size");

        for round in 0..20 {
            let key = format!("k-{round}");
            let upload_id = store
                .create_multipart_upload(&bucket, &key, CreateMultipartUploadInput::default())
                .await
                .expect("create upload")
                .upload_id;
            let mut parts = Vec::new();
            for (number, data) in [(1, random_payload(size)), (2, random_payload(5))] {
                let out = store
                    .upload_part(
                        &bucket,
                        &key,
                        &upload_id,
                        number,
                        Body::from(data),
                        UploadPartInput::default(),
                    )
                    .await
                    .expect("upload part");
                parts.push(CompletedPart::new(number, out.etag));
            }
            let input = CompleteMultipartUploadInput {
                parts,
                ..Default::default()
            };

            let completer = {
                let (store, bucket, key, upload_id, input) = (
                    store.clone(),
                    bucket.clone(),
                    key.clone(),
                    upload_id.clone(),
                    input.clone(),
                );
                tokio::spawn(async move {
                    store
                        .complete_multipart_upload(&bucket, &key, &upload_id, input)
                        .await
                })
            };
            let aborter = {
                let (store, bucket, key, upload_id) =
                    (store.clone(), bucket.clone(), key.clone(), upload_id.clone());
                tokio::spawn(async move {
                    store.abort_multipart_upload(&bucket, &key, &upload_id).await
                })
            };
            let completed = completer.await.expect("join");
            aborter.await.expect("join").expect("abort is idempotent");

            let stored = store
                .get_object(&bucket, &key, GetObjectInput::default())
                .await;
            let replay = store
                .complete_multipart_upload(&bucket, &key, &upload_id, input)
                .await;
            match completed {
                Ok(output) => {
                    let read = stored.expect("get").into_found().expect("found");
                    assert_eq!(read.object.size, output.size);
                    assert_eq!(replay.expect("replay"), output);
                }
                Err(S3ServiceError::NoSuchUpload { .. }) => {
                    assert!(matches!(stored, Err(S3ServiceError::NoSuchKey { .. })));
                    assert!(matches!(replay, Err(S3ServiceError::NoSuchUpload { .. })));
                }
                Err(e) => panic!("unexpected complete error: {e:?}"),
            }
            assert!(matches!(
                store
                    .upload_part(
                        &bucket,
                        &key,
                        &upload_id,
                        3,
                        Body::from("late"),
                        UploadPartInput::default(),
                    )
                    .await,
                Err(S3ServiceError::NoSuchUpload { .. })
            ));
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_should_not_resurrect_deleted_bucket_on_put() {
        let (dir, store) = open_store().await;

        for _ in 0..40 {
            let bucket = create_test_bucket(&store, "vanish", false).await;
            let putter = {
                let (store, bucket) = (store.clone(), bucket.clone());
                tokio::spawn(async move {
                    store
                        .put_object(&bucket, "k", Body::from("racing"), PutObjectInput::default())
                        .await
                })
            };
            let deleter = {
                let (store, bucket) = (store.clone(), bucket.clone());
                tokio::spawn(async move { store.delete_bucket(&bucket).await })
            };
            let put = putter.await.expect("join");
            let deleted = deleter.await.expect("join");

            match (put, deleted) {
                (Ok(_), Err(S3ServiceError::BucketNotEmpty { .. })) => {
                    let read = store
                        .get_object(&bucket, "k", GetObjectInput::default())
                        .await
                        .expect("get")
                        .into_found()
                        .expect("found");
                    assert_eq!(&read.body[..], b"racing");
                }
                (Err(S3ServiceError::NoSuchBucket { .. }), Ok(())) => {
                    assert!(store.head_bucket(&bucket).is_err());
                    assert!(!dir.path().join("buckets").join(&bucket).exists());
                }
                (put, deleted) => panic!("inconsistent outcome: put={put:?} delete={deleted:?}"),
            }
        }
    }
}
