//! `aws-chunked` upload integration tests.

#[cfg(test)]
mod tests {
    use http::{HeaderMap, HeaderValue};
    use ruststash_s3_auth::{ChunkSigner, derive_signing_key};
    use ruststash_s3_core::body::{
        Body, STREAMING_SIGNED_PAYLOAD_TRAILER, STREAMING_UNSIGNED_PAYLOAD_TRAILER,
    };
    use ruststash_s3_core::checksums::{ChecksumAlgorithm, compute_checksum};
    use ruststash_s3_core::chunked::{ChunkedEncoding, encode_aws_chunked};
    use ruststash_s3_core::error::S3ServiceError;
    use ruststash_s3_core::ops::{GetObjectInput, PutObjectInput};
    use ruststash_s3_core::provider::{DEFAULT_ACCESS_KEY_ID, DEFAULT_SECRET_ACCESS_KEY};

    use crate::{create_test_bucket, open_store, random_payload};

    const DATE: &str = "20240101";
    const TIMESTAMP: &str = "20240101T000000Z";
    const SEED: &str = "4f232c4386841ef735655705268965c44a0e4690baa4adea153f7db9fa80a0a9";

    fn headers(pairs: &[(&'static str, String)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_str(value).expect("header value"));
        }
        map
    }

    fn authorization() -> String {
        format!(
            "AWS4-HMAC-SHA256 Credential={DEFAULT_ACCESS_KEY_ID}/{DATE}/us-east-1/s3/aws4_request, \
             SignedHeaders=host;x-amz-content-sha256;x-amz-date, Signature={SEED}"
        )
    }

    fn client_signer() -> ChunkSigner {
        ChunkSigner::new(
            derive_signing_key(DEFAULT_SECRET_ACCESS_KEY, DATE, "us-east-1", "s3"),
            TIMESTAMP,
            format!("{DATE}/us-east-1/s3/aws4_request"),
            SEED,
        )
    }

    #[tokio::test]
    async fn test_should_agree_with_sha256_trailer() {
        let (_dir, store) = open_store().await;
        let bucket = create_test_bucket(&store, "trailer", false).await;
        let payload = random_payload(70_000);

        for chunk_size in [1usize, 8192, 65_536, 100_000] {
            let framed = encode_aws_chunked(&payload, chunk_size, Some(ChecksumAlgorithm::Sha256), None);
            let request_headers = headers(&[
                ("x-amz-content-sha256", STREAMING_UNSIGNED_PAYLOAD_TRAILER.to_owned()),
                ("content-encoding", "aws-chunked".to_owned()),
                ("x-amz-decoded-content-length", payload.len().to_string()),
                ("x-amz-trailer", "x-amz-checksum-sha256".to_owned()),
            ]);
            let encoding = store.body_encoding(&request_headers).expect("encoding");
            let key = format!("chunked-{chunk_size}");
            let out = store
                .put_object(
                    &bucket,
                    &key,
                    Body::with_encoding(std::io::Cursor::new(framed), encoding),
                    PutObjectInput::default(),
                )
                .await
                .expect("put chunked");

            let checksum = out.checksum.expect("trailer checksum recorded");
            assert_eq!(checksum.algorithm, ChecksumAlgorithm::Sha256);
            assert_eq!(
                checksum.value,
                compute_checksum(ChecksumAlgorithm::Sha256, &payload)
            );
            assert_eq!(out.size, payload.len() as u64);

            let read = store
                .get_object(&bucket, &key, GetObjectInput::default())
                .await
                .expect("get")
                .into_found()
                .expect("found");
            assert_eq!(&read.body[..], &payload[..]);
        }
    }

    #[tokio::test]
    async fn test_should_verify_signed_chunks_end_to_end() {
        let (_dir, store) = open_store().await;
        let bucket = create_test_bucket(&store, "signed", false).await;
        let payload = random_payload(20_000);
        let request_headers = headers(&[
            ("x-amz-content-sha256", STREAMING_SIGNED_PAYLOAD_TRAILER.to_owned()),
            ("x-amz-decoded-content-length", payload.len().to_string()),
            ("x-amz-trailer", "x-amz-checksum-crc32c".to_owned()),
            ("authorization", authorization()),
            ("x-amz-date", TIMESTAMP.to_owned()),
        ]);

        let mut signer = client_signer();
        let framed = encode_aws_chunked(
            &payload,
            8192,
            Some(ChecksumAlgorithm::Crc32c),
            Some(&mut signer),
        );
        let encoding = store.body_encoding(&request_headers).expect("encoding");
        let out = store
            .put_object(
                &bucket,
                "signed",
                Body::with_encoding(std::io::Cursor::new(framed.clone()), encoding),
                PutObjectInput::default(),
            )
            .await
            .expect("signed put");
        assert_eq!(
            out.checksum.map(|c| c.value),
            Some(compute_checksum(ChecksumAlgorithm::Crc32c, &payload))
        );

        let mut tampered = framed;
        let last_data = tampered.len() - 200;
        tampered[last_data] ^= 0x01;
        let encoding = store.body_encoding(&request_headers).expect("encoding");
        let err = store
            .put_object(
                &bucket,
                "tampered",
                Body::with_encoding(std::io::Cursor::new(tampered), encoding),
                PutObjectInput::default(),
            )
            .await
            .expect_err("tampered body must fail");
        assert!(
            matches!(
                err,
                S3ServiceError::SignatureDoesNotMatch | S3ServiceError::BadDigest { .. }
            ),
            "{err:?}"
        );
        assert!(matches!(
            store.head_object(&bucket, "tampered", &GetObjectInput::default()),
            Err(S3ServiceError::NoSuchKey { .. })
        ));
    }

    #[tokio::test]
    async fn test_should_reject_mismatched_trailer() {
        let (_dir, store) = open_store().await;
        let bucket = create_test_bucket(&store, "badtrailer", false).await;
        let payload = b"the quick brown fox".to_vec();
        let mut framed = encode_aws_chunked(&payload, 8, None, None);
        // Swap the terminating CRLF for a trailer computed over other bytes.
        framed.truncate(framed.len() - 2);
        let wrong = compute_checksum(ChecksumAlgorithm::Crc32, b"something else");
        framed.extend_from_slice(format!("x-amz-checksum-crc32:{wrong}\r\n\r\n").as_bytes());

        let body = Body::aws_chunked(
            std::io::Cursor::new(framed),
            ChunkedEncoding {
                decoded_length: Some(payload.len() as u64),
                trailer: Some(ChecksumAlgorithm::Crc32),
                signing: None,
            },
        );
        assert!(matches!(
            store
                .put_object(&bucket, "k", body, PutObjectInput::default())
                .await,
            Err(S3ServiceError::BadDigest { .. })
        ));
    }
}
