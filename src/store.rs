use crate::error::{ErrorKind, Result};
use crate::event::{Event, SubscriptionId, Subscribers};
use crate::mime::{ContentTypeResolver, MimeGuess};
use crate::path;
use blobfs_config::{Config, StoreConfig};
use blobfs_storage::StoreHandle;
use blobfs_storage::store::MemoryStore;
#[cfg(feature = "s3")]
use exn::ResultExt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Tunables for a [`VirtualStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    /// How long copy and read leases are held before the store expires them.
    pub lease_duration: Duration,
    /// Upper bound on a single server-side copy. `None` waits for the store.
    pub copy_timeout: Option<Duration>,
    /// Leading character meaning "relative to the store root".
    pub root_marker: char,
}
impl Default for Options {
    fn default() -> Self {
        let config = Config::default();
        Self::from(&config)
    }
}
impl From<&Config> for Options {
    fn from(config: &Config) -> Self {
        Self {
            lease_duration: config.lease.duration(),
            copy_timeout: config.copy_timeout(),
            root_marker: config.root_marker,
        }
    }
}

/// A hierarchical file system over a flat [`ObjectStore`](blobfs_storage::ObjectStore).
///
/// Files are objects keyed by their canonical path; directories are key
/// prefixes, optionally made visible while empty by a zero-byte marker
/// object stored at the directory key itself. Nothing is cached: every call
/// derives its answer from the store.
///
/// Clones are cheap and share the store, subscribers and cancellation token.
///
/// # Examples
///
/// ```
/// use blobfs::VirtualStore;
/// use blobfs_storage::store::MemoryStore;
/// use std::sync::Arc;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let vfs = VirtualStore::new(Arc::new(MemoryStore::default()));
/// vfs.create_directory("~/cux/bux").await?;
/// vfs.write_file("~/cux/bux/foo.txt", b"hello").await?;
///
/// let files = vfs.get_files("~/cux/bux").await?;
/// assert_eq!(files.len(), 1);
/// assert_eq!(files[0].name, "foo.txt");
/// assert_eq!(files[0].length, 5);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct VirtualStore {
    pub(crate) store: StoreHandle,
    pub(crate) options: Options,
    pub(crate) content_types: Arc<dyn ContentTypeResolver>,
    subscribers: Arc<Subscribers>,
    cancel: CancellationToken,
}

impl VirtualStore {
    pub fn new(store: StoreHandle) -> Self {
        Self::with_options(store, Options::default())
    }

    pub fn with_options(store: StoreHandle, options: Options) -> Self {
        Self {
            store,
            options,
            content_types: Arc::new(MimeGuess),
            subscribers: Arc::default(),
            cancel: CancellationToken::new(),
        }
    }

    /// Replace the [`MimeGuess`] default used by
    /// [`write_file()`](Self::write_file).
    pub fn with_content_types(mut self, resolver: impl ContentTypeResolver + 'static) -> Self {
        self.content_types = Arc::new(resolver);
        self
    }

    /// Build the store described by `config`.
    ///
    /// # Errors
    /// Returns [`ErrorKind::Config`] when the store cannot be constructed,
    /// including an `s3` store when the `s3` feature is disabled.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let store: StoreHandle = match &config.store {
            StoreConfig::Memory { name } => Arc::new(MemoryStore::default().with_name(name.clone())),
            #[cfg(feature = "s3")]
            StoreConfig::S3(s3) => Arc::new(
                blobfs_storage::store::S3Store::new(
                    s3.name.clone(),
                    s3.bucket.clone(),
                    s3.prefix.clone(),
                    s3.region.clone(),
                    s3.endpoint.clone(),
                    s3.key_id.clone(),
                    s3.key_secret.clone(),
                )
                .await
                .or_raise(|| ErrorKind::Config)?,
            ),
            #[cfg(not(feature = "s3"))]
            StoreConfig::S3(_) => {
                let err = exn::Exn::from(blobfs_config::error::ErrorKind::Invalid {
                    field: "store.type",
                    reason: "compiled without the s3 feature",
                });
                return Err(err.raise(ErrorKind::Config));
            },
        };
        tracing::info!(store = store.name(), "Configured virtual store");
        Ok(Self::with_options(store, Options::from(config)))
    }

    /// The underlying object store.
    pub fn store(&self) -> &StoreHandle {
        &self.store
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Register a callback for every [`Event`] published after a successful
    /// mutation. Callbacks run synchronously on the calling task.
    pub fn subscribe(&self, callback: impl Fn(&Event) + Send + Sync + 'static) -> SubscriptionId {
        self.subscribers.subscribe(callback)
    }

    /// Returns `false` if `id` was not subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.subscribers.unsubscribe(id)
    }

    /// Token shared by every clone of this store.
    ///
    /// Cancelling it aborts in-flight copies and stops recursive operations
    /// before their next object, both failing with
    /// [`ErrorKind::Cancelled`]. A cancelled token stays cancelled.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub(crate) fn publish(&self, event: Event) {
        self.subscribers.publish(event);
    }

    pub(crate) fn ensure_not_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            exn::bail!(ErrorKind::Cancelled);
        }
        Ok(())
    }

    /// Canonical key for a path that has to name a file.
    pub(crate) fn file_target(&self, path: &str) -> Result<String> {
        if path::is_directory_form(path, self.options.root_marker) {
            exn::bail!(ErrorKind::InvalidPath(path.to_string()));
        }
        Ok(self.file_key(path))
    }

    pub(crate) fn file_key(&self, path: &str) -> String {
        path::canonicalize_file(path, self.options.root_marker)
    }

    pub(crate) fn directory_key(&self, path: &str) -> String {
        path::canonicalize_directory(path, self.options.root_marker)
    }
}
