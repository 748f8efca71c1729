//! Multipart upload integration tests.

#[cfg(test)]
mod tests {
    use ruststash_s3_core::body::Body;
    use ruststash_s3_core::checksums::{
        ChecksumAlgorithm, ChecksumType, compute_checksum, compute_composite_checksum,
    };
    use ruststash_s3_core::error::S3ServiceError;
    use ruststash_s3_core::ops::{
        CompleteMultipartUploadInput, CompletedPart, CreateMultipartUploadInput, GetObjectInput,
        ListObjectVersionsInput, UploadPartInput,
    };
    use ruststash_s3_core::S3Store;

    use crate::{TEST_MIN_PART_SIZE, create_test_bucket, open_store, random_payload};

    async fn upload_parts(
        store: &S3Store,
        bucket: &str,
        key: &str,
        algorithm: Option<ChecksumAlgorithm>,
        parts: &[Vec<u8>],
    ) -> (String, Vec<CompletedPart>) {
        let upload_id = store
            .create_multipart_upload(
                bucket,
                key,
                CreateMultipartUploadInput {
                    checksum_algorithm: algorithm,
                    ..Default::default()
                },
            )
            .await
            .expect("create upload")
            .upload_id;
        let mut completed = Vec::new();
        for (i, data) in parts.iter().enumerate() {
            let part_number = u32::try_from(i + 1).expect("part number");
            let out = store
                .upload_part(
                    bucket,
                    key,
                    &upload_id,
                    part_number,
                    Body::from(data.clone()),
                    UploadPartInput::default(),
                )
                .await
                .expect("upload part");
            completed.push(CompletedPart::new(part_number, out.etag));
        }
        (upload_id, completed)
    }

    #[tokio::test]
    async fn test_should_satisfy_composite_law_for_every_algorithm() {
        let (_dir, store) = open_store().await;
        let bucket = create_test_bucket(&store, "composite", false).await;
        let size = usize::try_from(TEST_MIN_PART_SIZE).expect("size");
        let parts = vec![random_payload(size), random_payload(size), random_payload(17)];

        for algorithm in ChecksumAlgorithm::ALL {
            let key = format!("obj-{}", algorithm.as_str());
            let (upload_id, completed) =
                upload_parts(&store, &bucket, &key, Some(algorithm), &parts).await;
            let out = store
                .complete_multipart_upload(
                    &bucket,
                    &key,
                    &upload_id,
                    CompleteMultipartUploadInput {
                        parts: completed,
                        ..Default::default()
                    },
                )
                .await
                .expect("complete");

            let part_checksums: Vec<String> = parts
                .iter()
                .map(|p| compute_checksum(algorithm, p))
                .collect();
            let checksum = out.checksum.expect("checksum recorded");
            assert_eq!(
                checksum.value,
                compute_composite_checksum(algorithm, &part_checksums).expect("composite"),
                "{algorithm:?}"
            );
            assert_eq!(checksum.checksum_type, ChecksumType::Composite);
            assert!(checksum.value.ends_with("-3"));
        }
    }

    #[tokio::test]
    async fn test_should_complete_once_under_concurrent_calls() {
        let (_dir, store) = open_store().await;
        let bucket = create_test_bucket(&store, "idempotent", true).await;
        let parts = vec![random_payload(2048), random_payload(10)];
        let (upload_id, completed) = upload_parts(&store, &bucket, "k", None, &parts).await;
        let input = CompleteMultipartUploadInput {
            parts: completed,
            ..Default::default()
        };

        let mut handles = Vec::new();
        for _ in 0..4 {
            let store = store.clone();
            let bucket = bucket.clone();
            let upload_id = upload_id.clone();
            let input = input.clone();
            handles.push(tokio::spawn(async move {
                store
                    .complete_multipart_upload(&bucket, "k", &upload_id, input)
                    .await
                    .expect("complete")
            }));
        }
        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.await.expect("join"));
        }
        assert!(results.windows(2).all(|pair| pair[0] == pair[1]));

        let listed = store
            .list_object_versions(&bucket, &ListObjectVersionsInput::default())
            .expect("list");
        assert_eq!(listed.versions.len(), 1);

        let read = store
            .get_object(&bucket, "k", GetObjectInput::default())
            .await
            .expect("get")
            .into_found()
            .expect("found");
        assert_eq!(read.body.len(), 2058);
        assert_eq!(&read.body[..2048], &parts[0][..]);
    }

    #[tokio::test]
    async fn test_should_enforce_order_and_minimum_size() {
        let (_dir, store) = open_store().await;
        let bucket = create_test_bucket(&store, "rules", false).await;
        let parts = vec![random_payload(2048), random_payload(100), random_payload(0)];
        let (upload_id, completed) = upload_parts(&store, &bucket, "k", None, &parts).await;

        let reversed = vec![completed[1].clone(), completed[0].clone()];
        assert!(matches!(
            store.verify_parts(&bucket, "k", &upload_id, &reversed).await,
            Err(S3ServiceError::InvalidPartOrder)
        ));
        let absent = vec![completed[0].clone(), CompletedPart::new(9, "\"x\"")];
        assert!(matches!(
            store.verify_parts(&bucket, "k", &upload_id, &absent).await,
            Err(S3ServiceError::InvalidPart { .. })
        ));
        assert!(matches!(
            store.verify_parts(&bucket, "k", &upload_id, &completed).await,
            Err(S3ServiceError::EntityTooSmall)
        ));

        let valid = vec![completed[0].clone(), completed[2].clone()];
        let out = store
            .complete_multipart_upload(
                &bucket,
                "k",
                &upload_id,
                CompleteMultipartUploadInput {
                    parts: valid,
                    ..Default::default()
                },
            )
            .await
            .expect("empty final part is accepted");
        assert_eq!(out.size, 2048);
        assert_eq!(out.parts_count, 2);
    }

    #[tokio::test]
    async fn test_should_abort_uploads_when_bucket_is_deleted() {
        let (_dir, store) = open_store().await;
        let bucket = create_test_bucket(&store, "abandon", false).await;
        let (upload_id, _) =
            upload_parts(&store, &bucket, "k", None, &[random_payload(64)]).await;

        store.delete_bucket(&bucket).await.expect("delete bucket");
        assert!(matches!(
            store
                .upload_part(&bucket, "k", &upload_id, 2, Body::from("x"), UploadPartInput::default())
                .await,
            Err(S3ServiceError::NoSuchBucket { .. })
        ));
    }
}
