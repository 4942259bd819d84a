//! Single-file operations.

use crate::error::{ErrorKind, Result, from_store};
use crate::event::Event;
use crate::lease::LeaseGuard;
use crate::path;
use crate::record::FileRecord;
use crate::stream::{FileStream, OpenMode};
use crate::VirtualStore;
use blobfs_storage::LeaseMode;
use blobfs_storage::error::ErrorKind as StoreErrorKind;
use exn::ResultExt;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::instrument;

impl VirtualStore {
    /// Metadata for the file at `path`.
    ///
    /// A missing file is not an error: the record then has zero length and
    /// the current time as both timestamps. Use
    /// [`file_exists()`](Self::file_exists) when absence matters.
    #[instrument(skip(self), fields(store = self.store.name()))]
    pub async fn get_file(&self, path: &str) -> Result<FileRecord> {
        let key = self.file_key(path);
        match self.store.stat(&key).await {
            Ok(meta) => Ok(FileRecord::from_meta(&meta)),
            Err(err) if matches!(&*err, StoreErrorKind::NotFound(_)) => Ok(FileRecord::missing(&key)),
            Err(err) => Err(from_store(&key)(err)),
        }
    }

    /// Whether an object is stored at `path`. Always `false` for paths that
    /// can only name a directory (ending in `/`, or the root).
    #[instrument(skip(self), fields(store = self.store.name()))]
    pub async fn file_exists(&self, path: &str) -> Result<bool> {
        if path::is_directory_form(path, self.options.root_marker) {
            return Ok(false);
        }
        let key = self.file_key(path);
        self.store.exists(&key).await.map_err(from_store(&key))
    }

    /// Upload `data` as the full contents of `path`, replacing anything
    /// already there. The content type comes from the configured
    /// [`ContentTypeResolver`](crate::mime::ContentTypeResolver).
    ///
    /// Fails with [`ErrorKind::InvalidPath`] if `path` ends in `/` or is the
    /// root.
    #[instrument(skip(self, data), fields(store = self.store.name(), size = data.len()))]
    pub async fn write_file(&self, path: &str, data: &[u8]) -> Result<()> {
        let key = self.file_target(path)?;
        self.upload(&key, data).await?;
        self.publish(Event::FileWritten { path: key });
        Ok(())
    }

    /// Download the contents of `path` into `sink` under a shared lease,
    /// returning the number of bytes written.
    ///
    /// Concurrent reads of the same file are fine; a copy or move of the
    /// file in progress makes this fail with [`ErrorKind::LeaseConflict`].
    #[instrument(skip(self, sink), fields(store = self.store.name()))]
    pub async fn read_file_contents<W>(&self, path: &str, sink: &mut W) -> Result<u64>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let key = self.file_key(path);
        let lease = LeaseGuard::acquire(&self.store, &key, LeaseMode::Shared, self.options.lease_duration)
            .await
            .map_err(from_store(&key))?;
        let copied = self.download(&key, sink).await;
        lease.release().await;
        copied
    }

    /// Open `path` as an in-memory [`FileStream`].
    ///
    /// - [`OpenMode::Read`] downloads the whole file (as
    ///   [`read_file_contents()`](Self::read_file_contents) does) before
    ///   returning.
    /// - [`OpenMode::Write`] immediately replaces the file with zero bytes;
    ///   the buffered contents are uploaded by [`FileStream::close()`].
    #[instrument(skip(self), fields(store = self.store.name()))]
    pub async fn open_file(&self, path: &str, mode: OpenMode) -> Result<FileStream> {
        let key = self.file_target(path)?;
        let mut buffer = Vec::<u8>::new();
        match mode {
            OpenMode::Read => {
                self.read_file_contents(&key, &mut buffer).await?;
            },
            OpenMode::Write => self.upload(&key, &[]).await?,
        }
        Ok(FileStream::new(self.clone(), key, mode, buffer))
    }

    /// Delete the file at `path`. Fails with [`ErrorKind::NotFound`] if
    /// there is nothing to delete.
    #[instrument(skip(self), fields(store = self.store.name()))]
    pub async fn delete_file(&self, path: &str) -> Result<()> {
        let key = self.file_target(path)?;
        self.store.delete(&key).await.map_err(from_store(&key))?;
        self.publish(Event::FileDeleted { path: key });
        Ok(())
    }

    pub(crate) async fn upload(&self, key: &str, data: &[u8]) -> Result<()> {
        let content_type = self.content_types.content_type(key);
        self.store.put(key, data, Some(&content_type)).await.map_err(from_store(key))
    }

    async fn download<W>(&self, key: &str, sink: &mut W) -> Result<u64>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let data = self.store.get(key).await.map_err(from_store(key))?;
        sink.write_all(&data).await.or_raise(|| ErrorKind::Io(key.to_string()))?;
        sink.flush().await.or_raise(|| ErrorKind::Io(key.to_string()))?;
        Ok(data.len() as u64)
    }
}
