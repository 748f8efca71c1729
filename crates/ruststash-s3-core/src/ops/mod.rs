//! Store operations.
//!
//! Each submodule adds methods to [`crate::provider::S3Store`] together with
//! the input and output types they take and return. A transport layer maps
//! requests onto these calls and renders the results.

pub mod bucket;
pub mod list;
pub mod multipart;
pub mod object;

pub use bucket::CreateBucketInput;
pub use list::{
    ListObjectVersionsInput, ListObjectsInput, ListObjectsOutput, ListObjectsV2Input,
    ListObjectsV2Output,
};
pub use multipart::{
    CompleteMultipartUploadInput, CompletedPart, CreateMultipartUploadInput,
    CreateMultipartUploadOutput, ListMultipartUploadsInput, ListMultipartUploadsOutput,
    ListPartsInput, ListPartsOutput, MultipartUploadSummary, UploadPartCopyInput,
    UploadPartCopyOutput, UploadPartInput, UploadPartOutput,
};
pub use object::{
    CopyObjectInput, CopyObjectOutput, DeleteError, DeleteMarkerHit, DeleteObjectInput,
    DeleteObjectOutput, DeleteObjectsOutput, DeletedObject, GetObjectInput, GetObjectOutcome,
    GetObjectOutput, HeadObjectOutput, MetadataDirective, ObjectIdentifier, PutObjectInput,
    PutObjectOutput,
};
