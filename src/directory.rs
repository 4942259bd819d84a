//! Directory emulation.
//!
//! A directory is a key prefix ending in `/`. It exists while anything is
//! stored under it, or while its marker (a zero-byte object stored at the
//! directory key itself) does. Listings are always answered by the store;
//! there is no in-memory tree.
//!
//! Recursive operations work object by object with no transaction around
//! them. The first failure stops the operation and, once at least one object
//! has been processed, is reported as [`ErrorKind::PartialFailure`]; the
//! caller has to re-list to see what is left.

use crate::error::{ErrorKind, Result, from_store, partial};
use crate::event::Event;
use crate::path::{self, ROOT};
use crate::record::{DirectoryRecord, FileRecord};
use crate::VirtualStore;
use blobfs_storage::error::ErrorKind as StoreErrorKind;
use blobfs_storage::{DELIMITER, Entry, ObjectMeta};
use futures::TryStreamExt;
use tracing::instrument;

/// Content type of directory marker objects.
pub const DIRECTORY_CONTENT_TYPE: &str = "application/x-directory";

impl VirtualStore {
    /// Files directly inside `path` (not in sub-directories).
    #[instrument(skip(self), fields(store = self.store.name()))]
    pub async fn get_files(&self, path: &str) -> Result<Vec<FileRecord>> {
        let prefix = self.directory_key(path);
        let entries = self.store.list(&prefix, false).await.map_err(from_store(&prefix))?;
        Ok(entries
            .into_iter()
            .filter_map(Entry::into_object)
            .filter(|meta| !meta.key.ends_with(DELIMITER))
            .map(|meta| FileRecord::from_meta(&meta))
            .collect())
    }

    /// Directories directly inside `path`.
    #[instrument(skip(self), fields(store = self.store.name()))]
    pub async fn get_directories(&self, path: &str) -> Result<Vec<DirectoryRecord>> {
        let prefix = self.directory_key(path);
        let entries = self.store.list(&prefix, false).await.map_err(from_store(&prefix))?;
        Ok(entries
            .into_iter()
            .filter_map(|entry| match entry {
                Entry::Prefix(prefix) => Some(DirectoryRecord::new(&prefix)),
                Entry::Object(_) => None,
            })
            .collect())
    }

    /// A record for `path`, whether or not the directory exists. The store
    /// is not consulted.
    pub fn get_directory(&self, path: &str) -> DirectoryRecord {
        DirectoryRecord::new(&self.directory_key(path))
    }

    /// Whether anything (a file, a sub-directory or the directory's own
    /// marker) is stored under `path`. The root always exists.
    #[instrument(skip(self), fields(store = self.store.name()))]
    pub async fn directory_exists(&self, path: &str) -> Result<bool> {
        let prefix = self.directory_key(path);
        if prefix == ROOT {
            return Ok(true);
        }
        let first = self.store.list_stream(&prefix, false).try_next().await.map_err(from_store(&prefix))?;
        Ok(first.is_some())
    }

    /// Store a marker for `path`, unless one is already there.
    #[instrument(skip(self), fields(store = self.store.name()))]
    pub async fn create_directory(&self, path: &str) -> Result<()> {
        let key = self.directory_key(path);
        if key == ROOT {
            return Ok(());
        }
        if self.store.exists(&key).await.map_err(from_store(&key))? {
            tracing::debug!(path = %key, "Directory marker already exists");
            return Ok(());
        }
        self.store.put(&key, &[], Some(DIRECTORY_CONTENT_TYPE)).await.map_err(from_store(&key))?;
        self.publish(Event::DirectoryCreated { path: key });
        Ok(())
    }

    /// Delete everything stored under `path`, at any depth, markers
    /// included.
    ///
    /// Objects that vanish while the delete is running are skipped.
    ///
    /// # Errors
    /// [`ErrorKind::PartialFailure`] if an object could not be deleted after
    /// others already were, and [`ErrorKind::Cancelled`] if the cancellation
    /// token fired between two objects.
    #[instrument(skip(self), fields(store = self.store.name()))]
    pub async fn delete_directory(&self, path: &str) -> Result<()> {
        let prefix = self.directory_key(path);
        let objects = self.list_recursive(&prefix).await?;
        let total = objects.len();
        for (completed, object) in objects.iter().enumerate() {
            self.ensure_not_cancelled()?;
            match self.store.delete(&object.key).await {
                Ok(()) => {},
                Err(err) if matches!(&*err, StoreErrorKind::NotFound(_)) => {
                    tracing::trace!(key = %object.key, "Already deleted");
                },
                Err(err) => return Err(partial(from_store(&object.key)(err), &prefix, completed, total)),
            }
        }
        tracing::info!(path = %prefix, objects = total, "Deleted directory");
        self.publish(Event::DirectoryDeleted { path: prefix });
        Ok(())
    }

    /// Move everything stored under `from` to the same relative position
    /// under `to`, one file at a time using the
    /// [`move_file()`](Self::move_file) protocol. Existing objects under `to`
    /// are overwritten.
    ///
    /// When `to` is an ancestor of `from`, a target can be a source that has
    /// not moved yet (`/x/y/y/z` lands on `/x/y/z`), so objects are moved
    /// shallowest first.
    ///
    /// # Errors
    /// - [`ErrorKind::InvalidMove`] if `to` is `from` or lies inside it;
    ///   nothing is touched.
    /// - [`ErrorKind::PartialFailure`] if a file could not be moved after
    ///   others already were.
    /// - [`ErrorKind::Cancelled`] if the cancellation token fired between two
    ///   files.
    #[instrument(skip(self), fields(store = self.store.name()))]
    pub async fn move_directory(&self, from: &str, to: &str) -> Result<()> {
        let (from, to) = (self.directory_key(from), self.directory_key(to));
        if path::is_within(&from, &to) {
            exn::bail!(ErrorKind::InvalidMove { from, to });
        }
        let mut objects = self.list_recursive(&from).await?;
        if path::is_within(&to, &from) {
            objects.sort_by_key(|object| path::depth(&object.key));
        }
        let total = objects.len();
        for (completed, object) in objects.iter().enumerate() {
            self.ensure_not_cancelled()?;
            let Some(target) = path::reanchor(&object.key, &from, &to) else {
                continue;
            };
            if let Err(err) = self.move_object(&object.key, &target).await {
                return Err(partial(err, &from, completed, total));
            }
        }
        tracing::info!(%from, %to, objects = total, "Moved directory");
        self.publish(Event::DirectoryMoved { from, to });
        Ok(())
    }

    async fn list_recursive(&self, prefix: &str) -> Result<Vec<ObjectMeta>> {
        self.store
            .list_stream(prefix, true)
            .try_filter_map(|entry| futures::future::ready(Ok(entry.into_object())))
            .try_collect()
            .await
            .map_err(from_store(prefix))
    }
}
