//! Versioning integration tests.

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use ruststash_s3_core::body::Body;
    use ruststash_s3_core::error::S3ServiceError;
    use ruststash_s3_core::ops::{
        DeleteObjectInput, GetObjectInput, GetObjectOutcome, ListObjectVersionsInput,
        PutObjectInput,
    };

    use crate::{create_test_bucket, open_store};

    #[tokio::test]
    async fn test_should_walk_versioned_key_lifecycle() {
        let (_dir, store) = open_store().await;
        let bucket = create_test_bucket(&store, "lifecycle", true).await;

        let v1 = store
            .put_object(&bucket, "k", Body::from("hello"), PutObjectInput::default())
            .await
            .expect("put hello");
        store
            .put_object(&bucket, "k", Body::from("world"), PutObjectInput::default())
            .await
            .expect("put world");

        let latest = store
            .get_object(&bucket, "k", GetObjectInput::default())
            .await
            .expect("get latest")
            .into_found()
            .expect("latest is an object");
        assert_eq!(&latest.body[..], b"world");

        let first = store
            .get_object(
                &bucket,
                "k",
                GetObjectInput {
                    version_id: Some(v1.version_id.clone()),
                    ..Default::default()
                },
            )
            .await
            .expect("get v1")
            .into_found()
            .expect("v1 is an object");
        assert_eq!(&first.body[..], b"hello");

        store
            .delete_object(&bucket, "k", DeleteObjectInput::default())
            .await
            .expect("delete");
        let after_delete = store
            .get_object(&bucket, "k", GetObjectInput::default())
            .await
            .expect("get after delete");
        assert!(matches!(after_delete, GetObjectOutcome::DeleteMarker(ref hit) if !hit.requested_version));

        let versions = store
            .list_object_versions(
                &bucket,
                &ListObjectVersionsInput {
                    prefix: Some("k".to_owned()),
                    ..Default::default()
                },
            )
            .expect("list versions");
        assert_eq!(versions.versions.len(), 3);
        assert!(versions.versions[0].version.is_delete_marker());
        assert!(versions.versions[0].is_latest);
        let etags: Vec<Option<&str>> = versions
            .versions
            .iter()
            .map(|entry| entry.version.as_object().map(|o| o.etag.as_str()))
            .collect();
        assert_eq!(etags[1], Some(latest.object.etag.as_str()));
        assert_eq!(etags[2], Some(first.object.etag.as_str()));
    }

    #[tokio::test]
    async fn test_should_keep_every_version_of_successive_puts() {
        let (_dir, store) = open_store().await;
        let bucket = create_test_bucket(&store, "history", true).await;
        let n = 5;

        let mut ids = Vec::new();
        for i in 0..n {
            let out = store
                .put_object(
                    &bucket,
                    "doc",
                    Body::from(format!("revision {i}").into_bytes()),
                    PutObjectInput::default(),
                )
                .await
                .expect("put");
            ids.push(out.version_id);
        }
        let unique: HashSet<&String> = ids.iter().collect();
        assert_eq!(unique.len(), n);

        let listed = store
            .list_object_versions(&bucket, &ListObjectVersionsInput::default())
            .expect("list");
        assert_eq!(listed.versions.len(), n);
        assert_eq!(listed.versions.iter().filter(|v| v.is_latest).count(), 1);

        let marker = store
            .delete_object(&bucket, "doc", DeleteObjectInput::default())
            .await
            .expect("delete");
        assert!(marker.delete_marker);
        let listed = store
            .list_object_versions(&bucket, &ListObjectVersionsInput::default())
            .expect("list");
        assert_eq!(listed.versions.len(), n + 1);
        assert_eq!(
            listed.versions[1].version.version_id(),
            ids[n - 1].as_str()
        );

        let target = ids[2].clone();
        store
            .delete_object(
                &bucket,
                "doc",
                DeleteObjectInput {
                    version_id: Some(target.clone()),
                    ..Default::default()
                },
            )
            .await
            .expect("delete version");
        let listed = store
            .list_object_versions(&bucket, &ListObjectVersionsInput::default())
            .expect("list");
        assert_eq!(listed.versions.len(), n);
        assert!(listed
            .versions
            .iter()
            .all(|v| v.version.version_id() != target));
        assert!(matches!(
            store
                .get_object(
                    &bucket,
                    "doc",
                    GetObjectInput {
                        version_id: Some(target),
                        ..Default::default()
                    },
                )
                .await,
            Err(S3ServiceError::NoSuchVersion { .. })
        ));
    }

    #[tokio::test]
    async fn test_should_refuse_to_delete_bucket_with_versions() {
        let (_dir, store) = open_store().await;
        let bucket = create_test_bucket(&store, "nonempty", true).await;
        let put = store
            .put_object(&bucket, "k", Body::from("x"), PutObjectInput::default())
            .await
            .expect("put");
        let marker = store
            .delete_object(&bucket, "k", DeleteObjectInput::default())
            .await
            .expect("delete");
        assert!(matches!(
            store.delete_bucket(&bucket).await,
            Err(S3ServiceError::BucketNotEmpty { .. })
        ));

        for version_id in [marker.version_id, Some(put.version_id)] {
            store
                .delete_object(
                    &bucket,
                    "k",
                    DeleteObjectInput {
                        version_id,
                        ..Default::default()
                    },
                )
                .await
                .expect("remove version");
        }
        store.delete_bucket(&bucket).await.expect("delete bucket");
        assert!(!store.state().bucket_exists(&bucket));
    }

    #[tokio::test]
    async fn test_should_serialize_concurrent_writers() {
        let (_dir, store) = open_store().await;
        let bucket = create_test_bucket(&store, "concurrent", true).await;

        let mut handles = Vec::new();
        for i in 0..8u8 {
            let store = store.clone();
            let bucket = bucket.clone();
            handles.push(tokio::spawn(async move {
                store
                    .put_object(&bucket, "hot", Body::from(vec![i; 64]), PutObjectInput::default())
                    .await
                    .expect("put")
            }));
        }
        for handle in handles {
            handle.await.expect("join");
        }
        let listed = store
            .list_object_versions(&bucket, &ListObjectVersionsInput::default())
            .expect("list");
        assert_eq!(listed.versions.len(), 8);
        assert_eq!(listed.versions.iter().filter(|v| v.is_latest).count(), 1);
    }
}
