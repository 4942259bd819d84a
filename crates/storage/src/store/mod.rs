//! Object store trait and implementations.
//!
//! This module defines the `ObjectStore` trait, which provides a unified
//! interface over flat, key-addressed object storage (in-memory, S3-compatible
//! services, etc.). Stores have no notion of directories; hierarchy only
//! exists as `/`-delimited key prefixes.
//!

mod memory;
#[cfg(feature = "s3")]
mod s3;

pub use self::memory::MemoryStore;
#[cfg(feature = "s3")]
pub use self::s3::S3Store;
use crate::error::Result;
use crate::object::{Entry, LeaseId, LeaseMode, ObjectMeta};
use async_trait::async_trait;
use futures::{Stream, TryStreamExt};
use std::pin::Pin;
use std::time::Duration;

pub(crate) type EntryStream<'a> = Pin<Box<dyn Stream<Item = Result<Entry>> + Send + 'a>>;

/// Unified interface for object stores.
///
/// All operations are asynchronous: every call is (potentially) one network
/// round-trip to the store. Implementations must not buffer several
/// in-flight requests on behalf of one call.
///
/// # Keys
/// Keys are used verbatim; validate them with
/// [`validate_key`](crate::validate_key) before use. Implementations should
/// enforce this validation.
///
/// # Examples
///
/// ```
/// use blobfs_storage::{ObjectStore, error::Result};
///
/// async fn size_of_hardcoded_object(store: &dyn ObjectStore) -> Result<u64> {
///     let key = "/uploads/logo.png";
///     if store.exists(key).await? {
///         Ok(store.stat(key).await?.size)
///     } else {
///         Ok(0)
///     }
/// }
/// ```
///
/// # Leases
/// A lease is a time-bounded hold on one object. Copy operations take an
/// [`Exclusive`](LeaseMode::Exclusive) lease on their source, reads take a
/// [`Shared`](LeaseMode::Shared) one. Whoever acquires a lease owns its
/// [`LeaseId`] and is the only party allowed to release it:
///
/// ```
/// use std::time::Duration;
/// use blobfs_storage::{LeaseMode, ObjectStore, error::Result};
///
/// async fn duplicate(store: &dyn ObjectStore) -> Result<()> {
///     let lease = store.acquire_lease("/a.txt", LeaseMode::Exclusive, Duration::from_secs(60)).await?;
///     let copied = store.copy("/a.txt", "/b.txt", Some(&lease)).await;
///     store.release_lease("/a.txt", &lease).await?;
///     copied
/// }
/// ```
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Name of the configured store. Used for logging only.
    fn name(&self) -> &str;

    /// List entries under a prefix.
    ///
    /// Default implementation of this method is to collect all the results
    /// from [`list_stream()`](Self::list_stream) into a [`Vec`] before
    /// returning.
    async fn list(&self, prefix: &str, recursive: bool) -> Result<Vec<Entry>> {
        self.list_stream(prefix, recursive).try_collect().await
    }

    /// Stream entries under a prefix.
    ///
    /// - Non-recursive listings return the objects directly below `prefix`
    ///   plus one [`Entry::Prefix`] per distinct "sub-directory" (the key up
    ///   to and including the next [`DELIMITER`](crate::DELIMITER)).
    /// - Recursive listings return every object whose key starts with
    ///   `prefix`, at any depth, and never yield [`Entry::Prefix`].
    ///
    /// Entries are yielded in lexicographic key order. A prefix that matches
    /// nothing results in an empty stream, not an error.
    ///
    /// # Examples
    ///
    /// ```
    /// use futures::TryStreamExt;
    /// # use blobfs_storage::{Entry, ObjectStore, error::Result};
    /// # async fn example(store: &dyn ObjectStore) -> Result<()> {
    /// let mut stream = store.list_stream("/uploads/", true);
    /// while let Some(entry) = stream.try_next().await? {
    ///     if let Entry::Object(meta) = entry {
    ///         println!("{}: {} bytes", meta.key, meta.size);
    ///     }
    /// }
    /// # Ok(())
    /// # }
    /// ```
    fn list_stream<'a>(&'a self, prefix: &'a str, recursive: bool) -> EntryStream<'a>;

    /// Check if an object exists at exactly this key.
    async fn exists(&self, key: &str) -> Result<bool>;

    /// Get object metadata without reading contents.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the object
    /// does not exist.
    async fn stat(&self, key: &str) -> Result<ObjectMeta>;

    /// Read the full object contents.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the object
    /// does not exist.
    async fn get(&self, key: &str) -> Result<Vec<u8>>;

    /// Upload an object, fully replacing anything stored at `key`.
    ///
    /// A single put is atomic as far as the store guarantees it.
    async fn put(&self, key: &str, data: &[u8], content_type: Option<&str>) -> Result<()>;

    /// Delete an object.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the object
    /// does not exist.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Server-side copy, returning once the copy has completed.
    ///
    /// `lease` is the caller's lease on `from` (if any). Returns
    /// [`NotFound`](crate::error::ErrorKind::NotFound) if `from` does not
    /// exist, or [`LeaseConflict`](crate::error::ErrorKind::LeaseConflict) if
    /// either object is held under a lease other than `lease`.
    async fn copy(&self, from: &str, to: &str, lease: Option<&LeaseId>) -> Result<()>;

    /// Acquire a lease on an existing object.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the object
    /// does not exist, or [`LeaseConflict`](crate::error::ErrorKind::LeaseConflict)
    /// if a live lease is incompatible with `mode`. Never retries.
    async fn acquire_lease(&self, key: &str, mode: LeaseMode, duration: Duration) -> Result<LeaseId>;

    /// Release a lease before it expires.
    async fn release_lease(&self, key: &str, lease: &LeaseId) -> Result<()>;
}
