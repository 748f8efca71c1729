//! Credential lookup for signed uploads.
//!
//! Signed `aws-chunked` bodies can only be verified when the secret key of
//! the signing access key is known. [`CredentialProvider`] resolves it;
//! [`StaticCredentialProvider`] is the in-memory table used by local setups
//! and tests.

use std::collections::HashMap;

use crate::error::AuthError;

/// Trait for looking up secret access keys by access key ID.
pub trait CredentialProvider: Send + Sync {
    /// Retrieve the secret access key for the given access key ID.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::UnknownAccessKey`] if the access key ID is not recognized.
    fn get_secret_key(&self, access_key_id: &str) -> Result<String, AuthError>;
}

/// An in-memory credential provider backed by a `HashMap`.
///
/// # Examples
///
/// ```
/// use ruststash_s3_auth::credentials::{CredentialProvider, StaticCredentialProvider};
///
/// let provider = StaticCredentialProvider::new(vec![
///     ("test".to_owned(), "test".to_owned()),
/// ]);
///
/// assert_eq!(provider.get_secret_key("test").ok().as_deref(), Some("test"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct StaticCredentialProvider {
    credentials: HashMap<String, String>,
}

impl StaticCredentialProvider {
    /// Create a provider from (access_key_id, secret_key) pairs.
    pub fn new(credentials: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            credentials: credentials.into_iter().collect(),
        }
    }

    /// Register another access key. An existing entry is replaced.
    pub fn insert(&mut self, access_key_id: impl Into<String>, secret_key: impl Into<String>) {
        self.credentials
            .insert(access_key_id.into(), secret_key.into());
    }
}

impl CredentialProvider for StaticCredentialProvider {
    fn get_secret_key(&self, access_key_id: &str) -> Result<String, AuthError> {
        self.credentials
            .get(access_key_id)
            .cloned()
            .ok_or_else(|| AuthError::UnknownAccessKey(access_key_id.to_owned()))
    }
}
