//! AWS Signature Version 4 primitives.
//!
//! Only the pieces needed by streaming uploads live here: parsing the
//! `Authorization` header that carries the seed signature, deriving the
//! signing key from the credential scope, and HMAC/SHA-256 helpers. Full
//! request canonicalization belongs to the HTTP layer.

use hmac::{Hmac, KeyInit, Mac};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::error::AuthError;

/// The only algorithm supported by this implementation.
pub const SUPPORTED_ALGORITHM: &str = "AWS4-HMAC-SHA256";

type HmacSha256 = Hmac<Sha256>;

/// Parsed components of an AWS SigV4 `Authorization` header.
///
/// Format:
/// ```text
/// AWS4-HMAC-SHA256 Credential=AKID/20130524/us-east-1/s3/aws4_request,
///   SignedHeaders=host;x-amz-content-sha256;x-amz-date,
///   Signature=<hex-signature>
/// ```
#[derive(Debug, Clone)]
pub struct ParsedAuth {
    /// The access key ID.
    pub access_key_id: String,
    /// The date component of the credential scope (YYYYMMDD).
    pub date: String,
    /// The AWS region from the credential scope.
    pub region: String,
    /// The AWS service from the credential scope.
    pub service: String,
    /// The list of signed header names (lowercase).
    pub signed_headers: Vec<String>,
    /// The hex-encoded signature. For streaming uploads this is the seed
    /// signature of the chunk chain.
    pub signature: String,
}

impl ParsedAuth {
    /// The credential scope string (`date/region/service/aws4_request`).
    #[must_use]
    pub fn credential_scope(&self) -> String {
        credential_scope(&self.date, &self.region, &self.service)
    }
}

/// Parse an AWS SigV4 `Authorization` header value into its components.
///
/// # Errors
///
/// Returns [`AuthError::UnsupportedAlgorithm`] for anything but
/// `AWS4-HMAC-SHA256`, [`AuthError::MalformedAuthorization`] when a component
/// is missing and [`AuthError::InvalidCredentialScope`] for a credential that
/// is not `AKID/date/region/service/aws4_request`.
pub fn parse_authorization_header(header: &str) -> Result<ParsedAuth, AuthError> {
    let (algorithm, components) = header
        .trim()
        .split_once(' ')
        .ok_or(AuthError::MalformedAuthorization("missing algorithm"))?;
    if algorithm != SUPPORTED_ALGORITHM {
        return Err(AuthError::UnsupportedAlgorithm(algorithm.to_owned()));
    }

    let (mut credential, mut signed_headers, mut signature) = (None, None, None);
    for component in components.split(',').map(str::trim).filter(|c| !c.is_empty()) {
        let (name, value) = component
            .split_once('=')
            .ok_or(AuthError::MalformedAuthorization("component without '='"))?;
        match name {
            "Credential" => credential = Some(value),
            "SignedHeaders" => signed_headers = Some(value),
            "Signature" => signature = Some(value),
            _ => {}
        }
    }
    let credential = credential.ok_or(AuthError::MalformedAuthorization("missing Credential"))?;
    let signed_headers =
        signed_headers.ok_or(AuthError::MalformedAuthorization("missing SignedHeaders"))?;
    let signature = signature.ok_or(AuthError::MalformedAuthorization("missing Signature"))?;

    let [access_key_id, date, region, service, "aws4_request"] =
        credential.splitn(5, '/').collect::<Vec<_>>()[..]
    else {
        return Err(AuthError::InvalidCredentialScope(credential.to_owned()));
    };

    Ok(ParsedAuth {
        access_key_id: access_key_id.to_owned(),
        date: date.to_owned(),
        region: region.to_owned(),
        service: service.to_owned(),
        signed_headers: signed_headers.split(';').map(str::to_owned).collect(),
        signature: signature.to_owned(),
    })
}

/// Build the credential scope string.
///
/// # Examples
///
/// ```
/// use ruststash_s3_auth::sigv4::credential_scope;
///
/// assert_eq!(
///     credential_scope("20130524", "us-east-1", "s3"),
///     "20130524/us-east-1/s3/aws4_request"
/// );
/// ```
#[must_use]
pub fn credential_scope(date: &str, region: &str, service: &str) -> String {
    format!("{date}/{region}/{service}/aws4_request")
}

/// Derive the SigV4 signing key through the HMAC chain
/// `AWS4<secret> -> date -> region -> service -> "aws4_request"`.
#[must_use]
pub fn derive_signing_key(secret_key: &str, date: &str, region: &str, service: &str) -> Vec<u8> {
    let date_key = hmac_sha256(format!("AWS4{secret_key}").as_bytes(), date.as_bytes());
    let date_region_key = hmac_sha256(&date_key, region.as_bytes());
    let date_region_service_key = hmac_sha256(&date_region_key, service.as_bytes());
    hmac_sha256(&date_region_service_key, b"aws4_request")
}

/// Compute the hex-encoded HMAC-SHA256 signature of `data` with `signing_key`.
#[must_use]
pub fn compute_signature(signing_key: &[u8], data: &str) -> String {
    hex::encode(hmac_sha256(signing_key, data.as_bytes()))
}

/// Compare two hex signatures in constant time.
#[must_use]
pub fn signatures_match(provided: &str, expected: &str) -> bool {
    let provided = provided.to_ascii_lowercase();
    provided.as_bytes().ct_eq(expected.as_bytes()).into()
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can accept keys of any length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// Hex-encoded SHA-256 of a payload.
///
/// # Examples
///
/// ```
/// use ruststash_s3_auth::sigv4::hash_payload;
///
/// assert_eq!(
///     hash_payload(b""),
///     "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
/// );
/// ```
#[must_use]
pub fn hash_payload(payload: &[u8]) -> String {
    hex::encode(Sha256::digest(payload))
}
