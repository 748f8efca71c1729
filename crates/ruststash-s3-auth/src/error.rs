//! Errors raised while resolving signing material or checking chunk
//! signatures.

/// Failure to seed or advance a streaming signature chain.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The `Authorization` header lacks a component or is not `key=value`
    /// shaped.
    #[error("Malformed Authorization header: {0}")]
    MalformedAuthorization(&'static str),

    /// Anything but `AWS4-HMAC-SHA256`.
    #[error("Unsupported signing algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// `Credential` is not `AKID/date/region/service/aws4_request`.
    #[error("Invalid credential scope: {0}")]
    InvalidCredentialScope(String),

    /// The credential provider does not know the access key.
    #[error("Unknown access key: {0}")]
    UnknownAccessKey(String),

    /// A chunk's signature does not continue the chain.
    #[error("Chunk signature does not match")]
    ChunkSignatureMismatch,
}
