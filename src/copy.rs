//! Copy and move.
//!
//! Object stores have no rename, so a move is a server-side copy followed by
//! a delete of the source. The copy runs under an exclusive lease on the
//! source, which makes a concurrent copy, move or read of the same file
//! fail with [`ErrorKind::LeaseConflict`] instead of racing.
//!
//! If the copy succeeds but the delete fails, both objects are left in
//! place. Nothing is rolled back.

use crate::error::{ErrorKind, Result, copy_failed, from_store};
use crate::event::Event;
use crate::lease::LeaseGuard;
use crate::VirtualStore;
use blobfs_storage::error::ErrorKind as StoreErrorKind;
use blobfs_storage::{LeaseId, LeaseMode};
use exn::ResultExt;
use tracing::instrument;

impl VirtualStore {
    /// Copy the file at `from` to `to`, replacing anything at `to`.
    ///
    /// Copying a file onto itself is allowed (and still takes the lease).
    ///
    /// # Errors
    /// - [`ErrorKind::InvalidPath`] if either path can only name a directory.
    /// - [`ErrorKind::CopyFailed`] if `from` doesn't exist or the store
    ///   refused the copy (e.g. `to` is leased by someone else).
    /// - [`ErrorKind::LeaseConflict`] if `from` is being copied, moved or read.
    /// - [`ErrorKind::Timeout`] if the copy outlived
    ///   [`Options::copy_timeout`](crate::Options::copy_timeout).
    /// - [`ErrorKind::Cancelled`] if the cancellation token fired first.
    #[instrument(skip(self), fields(store = self.store.name()))]
    pub async fn copy_file(&self, from: &str, to: &str) -> Result<()> {
        let (from, to) = (self.file_target(from)?, self.file_target(to)?);
        self.copy_object(&from, &to).await?;
        self.publish(Event::FileCopied { from, to });
        Ok(())
    }

    /// Move the file at `from` to `to`. Moving a file onto itself does
    /// nothing.
    ///
    /// # Errors
    /// As [`copy_file()`](Self::copy_file), plus any failure deleting the
    /// source, in which case the copy at `to` is left in place.
    #[instrument(skip(self), fields(store = self.store.name()))]
    pub async fn move_file(&self, from: &str, to: &str) -> Result<()> {
        let (from, to) = (self.file_target(from)?, self.file_target(to)?);
        if from == to {
            tracing::debug!(path = %from, "Source and destination are the same; nothing to move");
            return Ok(());
        }
        self.move_object(&from, &to).await?;
        self.publish(Event::FileMoved { from, to });
        Ok(())
    }

    /// Copy then delete, without publishing. Keys must be canonical.
    pub(crate) async fn move_object(&self, from: &str, to: &str) -> Result<()> {
        self.copy_object(from, to).await?;
        self.store.delete(from).await.map_err(from_store(from))
    }

    /// Lease the source, copy, release. Keys must be canonical.
    pub(crate) async fn copy_object(&self, from: &str, to: &str) -> Result<()> {
        self.ensure_not_cancelled()?;
        let lease = match LeaseGuard::acquire(&self.store, from, LeaseMode::Exclusive, self.options.lease_duration).await
        {
            Ok(lease) => lease,
            Err(err) if matches!(&*err, StoreErrorKind::NotFound(_)) => return Err(copy_failed(from, to)(err)),
            Err(err) => return Err(from_store(from)(err)),
        };
        let copied = tokio::select! {
            copied = self.server_copy(from, to, lease.id()) => copied,
            () = self.cancellation_token().cancelled() => Err(exn::Exn::from(ErrorKind::Cancelled)),
        };
        lease.release().await;
        copied
    }

    async fn server_copy(&self, from: &str, to: &str, lease: Option<&LeaseId>) -> Result<()> {
        let copy = self.store.copy(from, to, lease);
        let copied = match self.options.copy_timeout {
            Some(limit) => tokio::time::timeout(limit, copy).await.or_raise(|| ErrorKind::Timeout(from.to_string()))?,
            None => copy.await,
        };
        copied.map_err(copy_failed(from, to))?;
        tracing::trace!(from, to, "Copied object");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::error::ErrorKind;
    use crate::event::Event;
    use crate::store::tests::{fixture, record_events};
    use crate::{Options, VirtualStore};
    use async_trait::async_trait;
    use blobfs_storage::error::{Error as StoreError, ErrorKind as StoreErrorKind, Result as StoreResult};
    use blobfs_storage::store::MemoryStore;
    use blobfs_storage::{Entry, LeaseId, LeaseMode, ObjectMeta, ObjectStore};
    use std::sync::Arc;
    use std::time::Duration;

    const MINUTE: Duration = Duration::from_secs(60);

    async fn contents(vfs: &VirtualStore, path: &str) -> Vec<u8> {
        let mut sink = Vec::new();
        vfs.read_file_contents(path, &mut sink).await.unwrap();
        sink
    }

    #[tokio::test]
    async fn test_copy_preserves_source() {
        let vfs = fixture([("/a.txt", "hello")]);
        let events = record_events(&vfs);
        vfs.copy_file("~/a.txt", "~/sub/b.txt").await.unwrap();

        assert!(vfs.file_exists("~/a.txt").await.unwrap());
        assert!(vfs.file_exists("~/sub/b.txt").await.unwrap());
        assert_eq!(contents(&vfs, "~/a.txt").await, b"hello");
        assert_eq!(contents(&vfs, "~/sub/b.txt").await, b"hello");
        assert_eq!(*events.lock().unwrap(), vec![Event::FileCopied {
            from: "/a.txt".into(),
            to: "/sub/b.txt".into()
        }]);
    }

    #[tokio::test]
    async fn test_copy_onto_itself() {
        let vfs = fixture([("/a.txt", "hello")]);
        vfs.copy_file("~/a.txt", "/a.txt").await.unwrap();
        assert_eq!(contents(&vfs, "~/a.txt").await, b"hello");
    }

    #[tokio::test]
    async fn test_move_relocates() {
        let vfs = fixture([("/a.txt", "hello"), ("/b.txt", "overwritten")]);
        let events = record_events(&vfs);
        vfs.move_file("~/a.txt", "~/b.txt").await.unwrap();

        assert!(!vfs.file_exists("~/a.txt").await.unwrap());
        assert!(vfs.file_exists("~/b.txt").await.unwrap());
        assert_eq!(contents(&vfs, "~/b.txt").await, b"hello");
        assert_eq!(*events.lock().unwrap(), vec![Event::FileMoved { from: "/a.txt".into(), to: "/b.txt".into() }]);
    }

    #[tokio::test]
    async fn test_move_onto_itself_is_a_no_op() {
        let vfs = fixture([("/a.txt", "hello")]);
        let events = record_events(&vfs);
        vfs.move_file("~/a.txt", "/./a.txt").await.unwrap();
        assert_eq!(contents(&vfs, "~/a.txt").await, b"hello");
        assert!(events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_copy_missing_source() {
        let vfs = fixture([]);
        let events = record_events(&vfs);
        let err = vfs.copy_file("~/missing.txt", "~/b.txt").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::CopyFailed { from, to } if from == "/missing.txt" && to == "/b.txt"));
        let err = vfs.move_file("~/missing.txt", "~/b.txt").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::CopyFailed { .. }));
        assert!(events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_directory_forms_cannot_be_copied() {
        let vfs = fixture([("/a.txt", "hello"), ("/dir/", "")]);
        let events = record_events(&vfs);
        let err = vfs.copy_file("~/a.txt", "~/dir/").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidPath(path) if path == "~/dir/"));
        let err = vfs.move_file("~/dir/", "~/b.txt").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidPath(_)));
        let err = vfs.move_file("~/a.txt", "~").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidPath(_)));

        assert!(!vfs.store().exists("/dir").await.unwrap());
        assert!(!vfs.store().exists("/").await.unwrap());
        assert!(vfs.file_exists("~/a.txt").await.unwrap());
        assert!(events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_leased_destination_fails_copy() {
        let vfs = fixture([("/a.txt", "hello"), ("/b.txt", "busy")]);
        let _reader = vfs.store().acquire_lease("/b.txt", LeaseMode::Shared, MINUTE).await.unwrap();
        let err = vfs.move_file("~/a.txt", "~/b.txt").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::CopyFailed { .. }));
        // The source lease was released, and nothing was deleted.
        assert!(vfs.file_exists("~/a.txt").await.unwrap());
        vfs.store().acquire_lease("/a.txt", LeaseMode::Exclusive, MINUTE).await.unwrap();
    }

    /// Delegates to a [`MemoryStore`], apart from the faults switched on.
    struct Faulty {
        inner: MemoryStore,
        /// Copies never finish.
        stall_copies: bool,
        /// Deletes fail as if the store were unreachable.
        fail_deletes: bool,
    }

    #[async_trait]
    impl ObjectStore for Faulty {
        fn name(&self) -> &str {
            "faulty"
        }
        fn list_stream<'a>(
            &'a self,
            prefix: &'a str,
            recursive: bool,
        ) -> std::pin::Pin<Box<dyn futures::Stream<Item = StoreResult<Entry>> + Send + 'a>> {
            self.inner.list_stream(prefix, recursive)
        }
        async fn exists(&self, key: &str) -> StoreResult<bool> {
            self.inner.exists(key).await
        }
        async fn stat(&self, key: &str) -> StoreResult<ObjectMeta> {
            self.inner.stat(key).await
        }
        async fn get(&self, key: &str) -> StoreResult<Vec<u8>> {
            self.inner.get(key).await
        }
        async fn put(&self, key: &str, data: &[u8], content_type: Option<&str>) -> StoreResult<()> {
            self.inner.put(key, data, content_type).await
        }
        async fn delete(&self, key: &str) -> StoreResult<()> {
            if self.fail_deletes {
                return Err(StoreError::from(StoreErrorKind::Network(key.to_string())));
            }
            self.inner.delete(key).await
        }
        async fn copy(&self, from: &str, to: &str, lease: Option<&LeaseId>) -> StoreResult<()> {
            if self.stall_copies {
                return futures::future::pending().await;
            }
            self.inner.copy(from, to, lease).await
        }
        async fn acquire_lease(&self, key: &str, mode: LeaseMode, duration: Duration) -> StoreResult<LeaseId> {
            self.inner.acquire_lease(key, mode, duration).await
        }
        async fn release_lease(&self, key: &str, lease: &LeaseId) -> StoreResult<()> {
            self.inner.release_lease(key, lease).await
        }
    }

    fn faulty(options: Options, stall_copies: bool, fail_deletes: bool) -> VirtualStore {
        let store = Faulty {
            inner: MemoryStore::with_objects([("/a.txt", b"hello")]).unwrap(),
            stall_copies,
            fail_deletes,
        };
        VirtualStore::with_options(Arc::new(store), options)
    }

    fn stuck(options: Options) -> VirtualStore {
        faulty(options, true, false)
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_copy_conflicts() {
        let vfs = stuck(Options {
            copy_timeout: Some(Duration::from_secs(5)),
            ..Options::default()
        });
        let first = tokio::spawn({
            let vfs = vfs.clone();
            async move { vfs.copy_file("~/a.txt", "~/b.txt").await }
        });
        tokio::task::yield_now().await;

        // The first copy holds the source lease while it is in flight.
        let err = vfs.copy_file("~/a.txt", "~/c.txt").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::LeaseConflict(path) if path == "/a.txt"));
        let err = vfs.move_file("~/a.txt", "~/c.txt").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::LeaseConflict(_)));

        let err = first.await.unwrap().unwrap_err();
        assert!(matches!(&*err, ErrorKind::Timeout(_)));
        // The first copy released its lease on the way out.
        vfs.store().acquire_lease("/a.txt", LeaseMode::Exclusive, MINUTE).await.unwrap();
        assert!(vfs.file_exists("~/a.txt").await.unwrap());
    }

    #[tokio::test]
    async fn test_move_keeps_both_when_source_delete_fails() {
        let vfs = faulty(Options::default(), false, true);
        let events = record_events(&vfs);
        let err = vfs.move_file("~/a.txt", "~/b.txt").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::StoreUnavailable(path) if path == "/a.txt"));

        // The copy stays; nothing is rolled back.
        assert_eq!(contents(&vfs, "~/a.txt").await, b"hello");
        assert_eq!(contents(&vfs, "~/b.txt").await, b"hello");
        assert!(events.lock().unwrap().is_empty());
        vfs.store().acquire_lease("/a.txt", LeaseMode::Exclusive, MINUTE).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_copy_timeout() {
        let vfs = stuck(Options {
            copy_timeout: Some(Duration::from_secs(5)),
            ..Options::default()
        });
        let err = vfs.copy_file("~/a.txt", "~/b.txt").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Timeout(path) if path == "/a.txt"));
        // The lease was released on the way out.
        vfs.store().acquire_lease("/a.txt", LeaseMode::Exclusive, MINUTE).await.unwrap();
    }

    #[tokio::test]
    async fn test_copy_cancelled() {
        let vfs = stuck(Options::default());
        let token = vfs.cancellation_token().clone();
        let copying = tokio::spawn({
            let vfs = vfs.clone();
            async move { vfs.copy_file("~/a.txt", "~/b.txt").await }
        });
        tokio::task::yield_now().await;
        token.cancel();
        let err = copying.await.unwrap().unwrap_err();
        assert!(matches!(&*err, ErrorKind::Cancelled));

        // Already cancelled: refused up front.
        let err = vfs.copy_file("~/a.txt", "~/c.txt").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Cancelled));
    }
}
