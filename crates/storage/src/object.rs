//! Object store models.
//!
//! These types describe what a store knows about its objects: metadata
//! returned by listings and lookups, and the lease tokens used to hold an
//! object exclusively (or shared) for the duration of an operation.

use derive_more::Display;
use time::OffsetDateTime;

/// Object metadata returned by object stores.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMeta {
    /// Full object key
    pub key: String,
    /// Content length in bytes
    pub size: u64,
    /// Last modified timestamp
    pub last_modified: OffsetDateTime,
    /// Content type recorded on upload, if the store keeps one
    pub content_type: Option<String>,
}
impl ObjectMeta {
    pub fn new(key: impl Into<String>, size: u64, last_modified: OffsetDateTime) -> Self {
        Self {
            key: key.into(),
            size,
            last_modified,
            content_type: None,
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

/// One item of a prefix listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    /// A real object stored at this key.
    Object(ObjectMeta),
    /// A common prefix one level below the listed prefix (always ends in the
    /// delimiter). Only produced by non-recursive listings.
    Prefix(String),
}
impl Entry {
    /// The object key or common prefix.
    pub fn key(&self) -> &str {
        match self {
            Self::Object(meta) => &meta.key,
            Self::Prefix(prefix) => prefix,
        }
    }

    pub fn into_object(self) -> Option<ObjectMeta> {
        match self {
            Self::Object(meta) => Some(meta),
            Self::Prefix(_) => None,
        }
    }
}

/// How a lease relates to other leases on the same object.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LeaseMode {
    /// Held by copies: conflicts with every other live lease.
    #[display("exclusive")]
    Exclusive,
    /// Held by reads: coexists with other shared leases, conflicts with an
    /// exclusive one.
    #[display("shared")]
    Shared,
}
impl LeaseMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "exclusive" => Some(Self::Exclusive),
            "shared" => Some(Self::Shared),
            _ => None,
        }
    }
}

/// Opaque token proving ownership of a lease.
///
/// Only the operation that acquired the lease holds its token; it is never
/// cloned into another operation.
#[derive(Debug, Display, PartialEq, Eq, Hash)]
#[display("{_0}")]
pub struct LeaseId(String);
impl LeaseId {
    /// Generate a fresh, random lease token.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lease_ids_are_unique() {
        assert_ne!(LeaseId::generate(), LeaseId::generate());
    }

    #[test]
    fn test_lease_mode_round_trips_through_display() {
        for mode in [LeaseMode::Exclusive, LeaseMode::Shared] {
            assert_eq!(LeaseMode::parse(&mode.to_string()), Some(mode));
        }
        assert_eq!(LeaseMode::parse("infinite"), None);
    }

    #[test]
    fn test_entry_key() {
        let object = Entry::Object(ObjectMeta::new("/a/b.txt", 3, OffsetDateTime::UNIX_EPOCH));
        assert_eq!(object.key(), "/a/b.txt");
        assert!(object.into_object().is_some());
        let prefix = Entry::Prefix("/a/c/".to_string());
        assert_eq!(prefix.key(), "/a/c/");
        assert!(prefix.into_object().is_none());
    }
}
