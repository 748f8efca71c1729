//! S3 store configuration.
//!
//! Provides [`S3Config`] for configuring a RustStash store. Values are loaded
//! from environment variables, matching LocalStack conventions where one
//! exists.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

/// Minimum size of every part but the last, as enforced by S3.
pub const DEFAULT_MIN_PART_SIZE: u64 = 5 * 1024 * 1024;

/// Default and maximum page size of listing operations.
pub const DEFAULT_MAX_KEYS: usize = 1000;

/// S3 store configuration.
///
/// # Examples
///
/// ```
/// use ruststash_s3_core::config::S3Config;
///
/// let config = S3Config::builder().data_dir("/tmp/stash".into()).build();
/// assert_eq!(config.min_part_size, 5 * 1024 * 1024);
/// assert!(!config.persistence);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[serde(rename_all = "camelCase")]
pub struct S3Config {
    /// Root directory for object data, staged parts and metadata.
    #[builder(default = PathBuf::from("/var/lib/ruststash"))]
    pub data_dir: PathBuf,

    /// Whether state found under `data_dir` is restored when the store opens.
    /// When disabled, previous state is wiped.
    #[builder(default = false)]
    pub persistence: bool,

    /// Region recorded on buckets created without an explicit region.
    #[builder(default = String::from("us-east-1"))]
    pub default_region: String,

    /// Log level filter string (e.g. `"info"`, `"debug"`).
    #[builder(default = String::from("info"))]
    pub log_level: String,

    /// Whether chunk signatures are only stripped instead of verified.
    #[builder(default = false)]
    pub skip_signature_validation: bool,

    /// Minimum size of every part except the last at completion time.
    #[builder(default = DEFAULT_MIN_PART_SIZE)]
    pub min_part_size: u64,

    /// Page size cap for listings.
    #[builder(default = DEFAULT_MAX_KEYS)]
    pub max_keys: usize,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("/var/lib/ruststash"),
            persistence: false,
            default_region: String::from("us-east-1"),
            log_level: String::from("info"),
            skip_signature_validation: false,
            min_part_size: DEFAULT_MIN_PART_SIZE,
            max_keys: DEFAULT_MAX_KEYS,
        }
    }
}

impl S3Config {
    /// Load configuration from environment variables.
    ///
    /// Reads the following environment variables (falling back to defaults):
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `DATA_DIR` | `/var/lib/ruststash` |
    /// | `PERSISTENCE` | `false` |
    /// | `DEFAULT_REGION` | `us-east-1` |
    /// | `LOG_LEVEL` | `info` |
    /// | `S3_SKIP_SIGNATURE_VALIDATION` | `false` |
    /// | `S3_MIN_PART_SIZE` | `5242880` |
    /// | `S3_MAX_KEYS` | `1000` |
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(v) = std::env::var("DATA_DIR") {
            config.data_dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("PERSISTENCE") {
            config.persistence = parse_bool(&v);
        }
        if let Ok(v) = std::env::var("DEFAULT_REGION") {
            config.default_region = v;
        }
        if let Ok(v) = std::env::var("LOG_LEVEL") {
            config.log_level = v;
        }
        if let Ok(v) = std::env::var("S3_SKIP_SIGNATURE_VALIDATION") {
            config.skip_signature_validation = parse_bool(&v);
        }
        if let Ok(v) = std::env::var("S3_MIN_PART_SIZE") {
            if let Ok(n) = v.parse::<u64>() {
                config.min_part_size = n;
            }
        }
        if let Ok(v) = std::env::var("S3_MAX_KEYS") {
            if let Ok(n) = v.parse::<usize>() {
                config.max_keys = n.clamp(1, DEFAULT_MAX_KEYS);
            }
        }

        config
    }
}

/// Parse a string as a boolean, accepting `"1"` and `"true"` (case-insensitive).
fn parse_bool(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}
