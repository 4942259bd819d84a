//! Read-only projections of stored objects and virtual directories.
//!
//! Records are built per call and never cached: the store is the only source
//! of truth and may be changed by other processes at any time.

use crate::path;
use blobfs_storage::ObjectMeta;
use time::OffsetDateTime;

/// A file as seen through the virtual hierarchy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    /// Last path segment, e.g. `foo.txt`.
    pub name: String,
    /// Canonical path (and object key), e.g. `/cux/bux/foo.txt`.
    pub virtual_path: String,
    /// Object stores only keep a last-modified time, so this is always the
    /// same as `updated`.
    pub created: OffsetDateTime,
    pub updated: OffsetDateTime,
    /// Content length in bytes.
    pub length: u64,
}
impl FileRecord {
    pub(crate) fn from_meta(meta: &ObjectMeta) -> Self {
        Self {
            name: path::name(&meta.key).to_string(),
            virtual_path: meta.key.clone(),
            created: meta.last_modified,
            updated: meta.last_modified,
            length: meta.size,
        }
    }

    /// Placeholder for a key with no object behind it: zero length, stamped
    /// with the current time.
    pub(crate) fn missing(key: &str) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            name: path::name(key).to_string(),
            virtual_path: key.to_string(),
            created: now,
            updated: now,
            length: 0,
        }
    }
}

/// A directory as seen through the virtual hierarchy.
///
/// Directories are key prefixes, which carry no metadata of their own; both
/// timestamps are the time the record was built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryRecord {
    /// Last path segment, e.g. `bux`. Empty for the root.
    pub name: String,
    /// Canonical path, always ending in `/`, e.g. `/cux/bux/`.
    pub virtual_path: String,
    pub created: OffsetDateTime,
    pub updated: OffsetDateTime,
}
impl DirectoryRecord {
    pub(crate) fn new(key: &str) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            name: path::name(key).to_string(),
            virtual_path: key.to_string(),
            created: now,
            updated: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_record_from_meta() {
        let modified = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        let record = FileRecord::from_meta(&ObjectMeta::new("/cux/bux/foo.txt", 5, modified));
        assert_eq!(record.name, "foo.txt");
        assert_eq!(record.virtual_path, "/cux/bux/foo.txt");
        assert_eq!(record.created, modified);
        assert_eq!(record.updated, modified);
        assert_eq!(record.length, 5);
    }

    #[test]
    fn test_missing_file_record_defaults() {
        let before = OffsetDateTime::now_utc();
        let record = FileRecord::missing("/nope.txt");
        assert_eq!(record.name, "nope.txt");
        assert_eq!(record.length, 0);
        assert!(record.updated >= before);
    }

    #[test]
    fn test_directory_record() {
        let record = DirectoryRecord::new("/cux/bux/");
        assert_eq!(record.name, "bux");
        assert_eq!(record.virtual_path, "/cux/bux/");
        assert_eq!(record.created, record.updated);
    }
}
