//! Restart and restore integration tests.

#[cfg(test)]
mod tests {
    use ruststash_s3_core::body::Body;
    use ruststash_s3_core::error::S3ServiceError;
    use ruststash_s3_core::ops::{
        CreateMultipartUploadInput, DeleteObjectInput, GetObjectInput, ListMultipartUploadsInput,
        ListObjectVersionsInput, PutObjectInput,
    };
    use ruststash_s3_core::state::{ObjectMetadata, VersioningStatus};

    use crate::{create_test_bucket, open_store, reopen_store};

    #[tokio::test]
    async fn test_should_restore_versions_after_restart() {
        let (dir, store) = open_store().await;
        let bucket = create_test_bucket(&store, "restart", true).await;
        let v1 = store
            .put_object(
                &bucket,
                "k",
                Body::from("first"),
                PutObjectInput {
                    metadata: ObjectMetadata {
                        content_type: Some("text/plain".to_owned()),
                        tagging: vec![("team".to_owned(), "storage".to_owned())],
                        ..Default::default()
                    },
                    ..Default::default()
                },
            )
            .await
            .expect("put v1");
        store
            .put_object(&bucket, "k", Body::from("second"), PutObjectInput::default())
            .await
            .expect("put v2");
        store
            .delete_object(&bucket, "k", DeleteObjectInput::default())
            .await
            .expect("delete");
        store
            .create_multipart_upload(&bucket, "pending", CreateMultipartUploadInput::default())
            .await
            .expect("create upload");
        drop(store);

        let store = reopen_store(&dir, true).await;
        assert_eq!(
            store.get_bucket_versioning(&bucket).expect("versioning"),
            VersioningStatus::Enabled
        );
        let versions = store
            .list_object_versions(&bucket, &ListObjectVersionsInput::default())
            .expect("list");
        assert_eq!(versions.versions.len(), 3);
        assert!(versions.versions[0].version.is_delete_marker());

        let restored = store
            .get_object(
                &bucket,
                "k",
                GetObjectInput {
                    version_id: Some(v1.version_id),
                    ..Default::default()
                },
            )
            .await
            .expect("get v1")
            .into_found()
            .expect("found");
        assert_eq!(&restored.body[..], b"first");
        assert_eq!(restored.object.metadata.content_type.as_deref(), Some("text/plain"));
        assert_eq!(restored.object.metadata.tagging.len(), 1);

        let uploads = store
            .list_multipart_uploads(&bucket, ListMultipartUploadsInput::default())
            .await
            .expect("list uploads");
        assert!(uploads.uploads.is_empty());

        let v3 = store
            .put_object(&bucket, "k", Body::from("third"), PutObjectInput::default())
            .await
            .expect("put after restart");
        let latest = store
            .list_object_versions(&bucket, &ListObjectVersionsInput::default())
            .expect("list");
        assert_eq!(latest.versions[0].version.version_id(), v3.version_id);
    }

    #[tokio::test]
    async fn test_should_start_empty_without_persistence() {
        let (dir, store) = open_store().await;
        let bucket = create_test_bucket(&store, "ephemeral", false).await;
        store
            .put_object(&bucket, "k", Body::from("gone"), PutObjectInput::default())
            .await
            .expect("put");
        drop(store);

        let store = reopen_store(&dir, false).await;
        assert!(store.list_buckets().is_empty());
        assert!(matches!(
            store.head_bucket(&bucket),
            Err(S3ServiceError::NoSuchBucket { .. })
        ));
    }
}
