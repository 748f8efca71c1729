//! In-memory index of object versions.
//!
//! [`VersionedKeyStore`] maps each key to its versions, newest first. A
//! bucket that never had versioning enabled simply holds a single `"null"`
//! version per key, so one structure serves every versioning state. Keys live
//! in a `BTreeMap`, which keeps listings sorted without extra work.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::ops::Bound;

use tracing::trace;

use super::object::{ObjectVersion, S3DeleteMarker, S3Object};
use crate::utils::{NULL_VERSION_ID, version_id_sequence};

/// Outcome of resolving a key, optionally at a specific version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionLookup {
    /// The addressed version is an object.
    Found(Box<S3Object>),
    /// The addressed version (or the latest one) is a delete marker.
    FoundDeleteMarker(S3DeleteMarker),
    /// No such key or version.
    NotFound,
}

impl From<&ObjectVersion> for VersionLookup {
    fn from(version: &ObjectVersion) -> Self {
        match version {
            ObjectVersion::Object(obj) => Self::Found(obj.clone()),
            ObjectVersion::DeleteMarker(dm) => Self::FoundDeleteMarker(dm.clone()),
        }
    }
}

/// A page of `ListObjects` / `ListObjectsV2`.
#[derive(Debug, Clone, Default)]
pub struct ListResult {
    /// Current objects, key-ascending.
    pub objects: Vec<S3Object>,
    /// Rolled-up prefixes when a delimiter was given.
    pub common_prefixes: Vec<String>,
    /// Whether more entries follow.
    pub is_truncated: bool,
    /// Last key or common prefix of this page, when truncated.
    pub next_marker: Option<String>,
}

/// A page of `ListObjectVersions`.
#[derive(Debug, Clone, Default)]
pub struct VersionListResult {
    /// Versions and delete markers: key-ascending, newest first per key.
    pub versions: Vec<VersionListEntry>,
    /// Rolled-up prefixes when a delimiter was given.
    pub common_prefixes: Vec<String>,
    /// Whether more entries follow.
    pub is_truncated: bool,
    /// Key of the last entry, when truncated.
    pub next_key_marker: Option<String>,
    /// Version id of the last entry, when truncated.
    pub next_version_id_marker: Option<String>,
}

/// One row of a version listing.
#[derive(Debug, Clone)]
pub struct VersionListEntry {
    /// The version or delete marker.
    pub version: ObjectVersion,
    /// Whether it is the newest version of its key.
    pub is_latest: bool,
}

/// Version index of one bucket.
#[derive(Debug, Default)]
pub struct VersionedKeyStore {
    objects: BTreeMap<String, Vec<ObjectVersion>>,
}

impl VersionedKeyStore {
    /// Insert a version, keeping each key's list ordered by sequence,
    /// newest first.
    ///
    /// A `"null"` version replaces any other `"null"` version of the key.
    /// Returns the versions that were displaced; their files are the
    /// caller's to remove. When the existing null version is newer than the
    /// incoming one (which only happens while restoring), the incoming
    /// version is the one returned.
    pub fn insert(&mut self, version: ObjectVersion) -> Vec<ObjectVersion> {
        let versions = self.objects.entry(version.key().to_owned()).or_default();
        let mut displaced = Vec::new();

        if version.version_id() == NULL_VERSION_ID {
            if let Some(idx) = versions
                .iter()
                .position(|v| v.version_id() == NULL_VERSION_ID)
            {
                if versions[idx].sequence() > version.sequence() {
                    return vec![version];
                }
                displaced.push(versions.remove(idx));
            }
        }

        let pos = versions
            .iter()
            .position(|v| v.sequence() < version.sequence())
            .unwrap_or(versions.len());
        trace!(
            key = %version.key(),
            version_id = %version.version_id(),
            position = pos,
            "indexed version"
        );
        versions.insert(pos, version);
        displaced
    }

    /// Resolve `key` at `version_id`, or its latest version when `None`.
    #[must_use]
    pub fn lookup(&self, key: &str, version_id: Option<&str>) -> VersionLookup {
        let Some(versions) = self.objects.get(key) else {
            return VersionLookup::NotFound;
        };
        let found = match version_id {
            None => versions.first(),
            Some(id) => versions.iter().find(|v| v.version_id() == id),
        };
        found.map_or(VersionLookup::NotFound, VersionLookup::from)
    }

    /// Mutable access to an object version for in-place edits (tags, legal
    /// hold, retention). `None` for unknown versions and delete markers.
    pub fn object_mut(&mut self, key: &str, version_id: Option<&str>) -> Option<&mut S3Object> {
        let versions = self.objects.get_mut(key)?;
        let version = match version_id {
            None => versions.first_mut(),
            Some(id) => versions.iter_mut().find(|v| v.version_id() == id),
        }?;
        version.as_object_mut()
    }

    /// Remove one version. Empty keys disappear from the index.
    pub fn remove_version(&mut self, key: &str, version_id: &str) -> Option<ObjectVersion> {
        let versions = self.objects.get_mut(key)?;
        let idx = versions.iter().position(|v| v.version_id() == version_id)?;
        let removed = versions.remove(idx);
        if versions.is_empty() {
            self.objects.remove(key);
        }
        Some(removed)
    }

    /// All versions of `key`, newest first.
    #[must_use]
    pub fn versions(&self, key: &str) -> &[ObjectVersion] {
        self.objects.get(key).map(Vec::as_slice).unwrap_or_default()
    }

    /// Number of versions, delete markers included.
    #[must_use]
    pub fn version_count(&self) -> usize {
        self.objects.values().map(Vec::len).sum()
    }

    /// Whether no version of any key remains.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// List current objects (keys whose latest version is not a delete
    /// marker).
    ///
    /// Keys and common prefixes both count toward `max_keys`. Results start
    /// strictly after `marker`; a common prefix at or before the marker was
    /// already returned and is skipped.
    #[must_use]
    pub fn list_objects(
        &self,
        prefix: &str,
        delimiter: Option<&str>,
        marker: Option<&str>,
        max_keys: usize,
    ) -> ListResult {
        let mut result = ListResult::default();
        if max_keys == 0 {
            return result;
        }
        let mut count = 0usize;
        let mut last: Option<String> = None;

        for (key, versions) in self.range_from(prefix, marker) {
            if !key.starts_with(prefix) {
                break;
            }
            let Some(obj) = versions.first().and_then(ObjectVersion::as_object) else {
                continue;
            };

            if let Some(cp) = common_prefix(key, prefix, delimiter) {
                if marker.is_some_and(|m| cp <= m) || last.as_deref() == Some(cp) {
                    continue;
                }
                if count >= max_keys {
                    result.is_truncated = true;
                    break;
                }
                result.common_prefixes.push(cp.to_owned());
                last = Some(cp.to_owned());
                count += 1;
                continue;
            }

            if count >= max_keys {
                result.is_truncated = true;
                break;
            }
            result.objects.push(obj.clone());
            last = Some(key.clone());
            count += 1;
        }

        if result.is_truncated {
            result.next_marker = last;
        }
        result
    }

    /// List every version and delete marker.
    ///
    /// Without a `version_id_marker` the listing resumes after all versions
    /// of `key_marker`; with one it resumes after that version of
    /// `key_marker`.
    #[must_use]
    pub fn list_object_versions(
        &self,
        prefix: &str,
        delimiter: Option<&str>,
        key_marker: Option<&str>,
        version_id_marker: Option<&str>,
        max_keys: usize,
    ) -> VersionListResult {
        let mut result = VersionListResult::default();
        if max_keys == 0 {
            return result;
        }
        let mut count = 0usize;
        let mut last_key: Option<String> = None;
        let mut last_version: Option<String> = None;

        let start = key_marker.filter(|_| version_id_marker.is_none());
        'keys: for (key, versions) in self.range_from(prefix, start) {
            if !key.starts_with(prefix) {
                break;
            }
            if let Some(cp) = common_prefix(key, prefix, delimiter) {
                if key_marker.is_some_and(|m| cp <= m) || last_key.as_deref() == Some(cp) {
                    continue;
                }
                if count >= max_keys {
                    result.is_truncated = true;
                    break;
                }
                result.common_prefixes.push(cp.to_owned());
                last_key = Some(cp.to_owned());
                last_version = None;
                count += 1;
                continue;
            }

            let mut skip = 0;
            if let (Some(km), Some(vm)) = (key_marker, version_id_marker) {
                match key.as_str().cmp(km) {
                    Ordering::Less => continue,
                    Ordering::Equal => skip = resume_index(versions, vm),
                    Ordering::Greater => {}
                }
            }
            for (idx, version) in versions.iter().enumerate().skip(skip) {
                if count >= max_keys {
                    result.is_truncated = true;
                    break 'keys;
                }
                result.versions.push(VersionListEntry {
                    version: version.clone(),
                    is_latest: idx == 0,
                });
                last_key = Some(key.clone());
                last_version = Some(version.version_id().to_owned());
                count += 1;
            }
        }

        if result.is_truncated {
            result.next_key_marker = last_key;
            result.next_version_id_marker = last_version;
        }
        result
    }

    /// Iterate keys from `max(prefix, marker)`; the marker is exclusive.
    fn range_from<'a>(
        &'a self,
        prefix: &'a str,
        marker: Option<&'a str>,
    ) -> impl Iterator<Item = (&'a String, &'a Vec<ObjectVersion>)> + 'a {
        let lower = match marker {
            Some(m) if m >= prefix => Bound::Excluded(m),
            _ => Bound::Included(prefix),
        };
        self.objects.range::<str, _>((lower, Bound::Unbounded))
    }
}

/// Index of the first version listed after `version_id_marker`.
///
/// When the marker's version is gone, listing resumes at the first version
/// older than the sequence carried in the marker id.
fn resume_index(versions: &[ObjectVersion], version_id_marker: &str) -> usize {
    if let Some(pos) = versions
        .iter()
        .position(|v| v.version_id() == version_id_marker)
    {
        return pos + 1;
    }
    version_id_sequence(version_id_marker)
        .and_then(|seq| versions.iter().position(|v| v.sequence() < seq))
        .unwrap_or(versions.len())
}

/// The common prefix `key` rolls up into, if any.
fn common_prefix<'k>(key: &'k str, prefix: &str, delimiter: Option<&str>) -> Option<&'k str> {
    let delimiter = delimiter.filter(|d| !d.is_empty())?;
    let rest = &key[prefix.len()..];
    rest.find(delimiter)
        .map(|pos| &key[..prefix.len() + pos + delimiter.len()])
}
