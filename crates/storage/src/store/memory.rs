//! In-memory object store.

use super::EntryStream;
use crate::error::{ErrorKind, Result};
use crate::key::{Folded, fold, validate as validate_key};
use crate::object::{Entry, LeaseId, LeaseMode, ObjectMeta};
use crate::ObjectStore;
use async_stream::stream;
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::Duration;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use tokio::time::Instant;

struct Stored {
    data: Vec<u8>,
    modified: OffsetDateTime,
    content_type: Option<String>,
}

enum Held {
    Exclusive { id: String, expires: Instant },
    Shared(HashMap<String, Instant>),
}
impl Held {
    /// Drop expired holders, returning `false` when nothing is left.
    fn retain_live(&mut self, now: Instant) -> bool {
        match self {
            Self::Exclusive { expires, .. } => *expires > now,
            Self::Shared(holders) => {
                holders.retain(|_, expires| *expires > now);
                !holders.is_empty()
            },
        }
    }

    fn is_held_by(&self, lease: &LeaseId) -> bool {
        match self {
            Self::Exclusive { id, .. } => id == lease.as_str(),
            Self::Shared(holders) => holders.contains_key(lease.as_str()),
        }
    }
}

#[derive(Default)]
struct State {
    objects: BTreeMap<String, Stored>,
    leases: HashMap<String, Held>,
}
impl State {
    /// The live lease on `key`, after purging expired holders.
    fn live_lease(&mut self, key: &str) -> Option<&Held> {
        let now = Instant::now();
        if let Some(held) = self.leases.get_mut(key)
            && !held.retain_live(now)
        {
            self.leases.remove(key);
        }
        self.leases.get(key)
    }

    /// Fail with [`LeaseConflict`](ErrorKind::LeaseConflict) unless `key` is
    /// unleased or leased by `lease`.
    fn ensure_writable(&mut self, key: &str, lease: Option<&LeaseId>) -> Result<()> {
        match (self.live_lease(key), lease) {
            (None, _) => Ok(()),
            (Some(held), Some(lease)) if held.is_held_by(lease) => Ok(()),
            (Some(_), _) => exn::bail!(ErrorKind::LeaseConflict(key.to_string())),
        }
    }
}

/// In-memory object store.
///
/// Objects are stored in a [`BTreeMap`] (so listings come out in key order)
/// behind a [`RwLock`], so all trait methods can operate on `&self` without
/// external synchronisation. Leases behave like a real store's: they expire,
/// exclusive leases conflict with everything, and leased objects refuse
/// writes and deletes from anyone else.
///
/// Used as the fixture for every behaviour test, and as the `memory` store
/// in configuration.
///
/// # Examples
///
/// ```
/// use blobfs_storage::{ObjectStore, store::MemoryStore};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let store = MemoryStore::with_objects([
///     ("/uploads/logo.png", b"\x89PNG"),
/// ])?;
/// assert!(store.exists("/uploads/logo.png").await?);
///
/// store.put("/uploads/readme.txt", b"hello", Some("text/plain")).await?;
/// assert_eq!(store.get("/uploads/readme.txt").await?, b"hello");
/// # Ok(())
/// # }
/// ```
pub struct MemoryStore {
    name: String,
    state: RwLock<State>,
}

impl MemoryStore {
    /// Create a memory store pre-populated with objects.
    ///
    /// # Errors
    /// [`ErrorKind::InvalidKey`] if any key fails validation; nothing is
    /// stored in that case.
    pub fn with_objects(objects: impl IntoIterator<Item = (impl Into<String>, impl Into<Vec<u8>>)>) -> Result<Self> {
        let now = OffsetDateTime::now_utc();
        let mut state = State::default();
        for (key, data) in objects {
            let key = key.into();
            validate_key(&key)?;
            state.objects.insert(
                key,
                Stored {
                    data: data.into(),
                    modified: now,
                    content_type: None,
                },
            );
        }
        Ok(Self {
            name: "memory".to_string(),
            state: RwLock::new(state),
        })
    }

    /// Change the name of the memory store.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    fn meta(key: &str, stored: &Stored) -> ObjectMeta {
        ObjectMeta {
            key: key.to_string(),
            size: stored.data.len() as u64,
            last_modified: stored.modified,
            content_type: stored.content_type.clone(),
        }
    }
}
impl Default for MemoryStore {
    fn default() -> Self {
        Self {
            name: "memory".to_string(),
            state: RwLock::new(State::default()),
        }
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn list_stream<'a>(&'a self, prefix: &'a str, recursive: bool) -> EntryStream<'a> {
        Box::pin(stream! {
            // Snapshot matching entries under the read lock, then drop it
            // before yielding to avoid holding the lock across yield points.
            let entries: Vec<Entry> = {
                let guard = self.state.read().await;
                let mut prefixes = BTreeSet::new();
                let mut entries = Vec::new();
                for (key, stored) in guard.objects.range(prefix.to_string()..) {
                    let Some(folded) = fold(prefix, key) else {
                        // Sorted keys: the first non-match ends the range.
                        break;
                    };
                    match folded {
                        Folded::Prefix(common) if !recursive => {
                            if prefixes.insert(common.clone()) {
                                entries.push(Entry::Prefix(common));
                            }
                        },
                        _ => entries.push(Entry::Object(Self::meta(key, stored))),
                    }
                }
                entries
            };
            for entry in entries {
                yield Ok(entry);
            }
        })
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let key = validate_key(key)?;
        Ok(self.state.read().await.objects.contains_key(key))
    }

    async fn stat(&self, key: &str) -> Result<ObjectMeta> {
        let key = validate_key(key)?;
        let guard = self.state.read().await;
        let stored = guard.objects.get(key).ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(key.to_string())))?;
        Ok(Self::meta(key, stored))
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let key = validate_key(key)?;
        let guard = self.state.read().await;
        let stored = guard.objects.get(key).ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(key.to_string())))?;
        Ok(stored.data.clone())
    }

    async fn put(&self, key: &str, data: &[u8], content_type: Option<&str>) -> Result<()> {
        let key = validate_key(key)?;
        let mut guard = self.state.write().await;
        guard.ensure_writable(key, None)?;
        guard.objects.insert(
            key.to_string(),
            Stored {
                data: data.to_vec(),
                modified: OffsetDateTime::now_utc(),
                content_type: content_type.map(str::to_string),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let key = validate_key(key)?;
        let mut guard = self.state.write().await;
        if !guard.objects.contains_key(key) {
            exn::bail!(ErrorKind::NotFound(key.to_string()));
        }
        guard.ensure_writable(key, None)?;
        guard.objects.remove(key);
        Ok(())
    }

    async fn copy(&self, from: &str, to: &str, lease: Option<&LeaseId>) -> Result<()> {
        let from = validate_key(from)?;
        let to = validate_key(to)?;
        let mut guard = self.state.write().await;
        let (data, content_type) = match guard.objects.get(from) {
            Some(stored) => (stored.data.clone(), stored.content_type.clone()),
            None => exn::bail!(ErrorKind::NotFound(from.to_string())),
        };
        // Reading the source is fine under a shared lease, but not while
        // someone else holds it exclusively.
        if let Some(Held::Exclusive { id, .. }) = guard.live_lease(from)
            && lease.is_none_or(|lease| lease.as_str() != id.as_str())
        {
            exn::bail!(ErrorKind::LeaseConflict(from.to_string()));
        }
        guard.ensure_writable(to, lease)?;
        guard.objects.insert(
            to.to_string(),
            Stored {
                data,
                modified: OffsetDateTime::now_utc(),
                content_type,
            },
        );
        Ok(())
    }

    async fn acquire_lease(&self, key: &str, mode: LeaseMode, duration: Duration) -> Result<LeaseId> {
        let key = validate_key(key)?;
        let mut guard = self.state.write().await;
        if !guard.objects.contains_key(key) {
            exn::bail!(ErrorKind::NotFound(key.to_string()));
        }
        let lease = LeaseId::generate();
        let expires = Instant::now() + duration;
        match (guard.live_lease(key).is_some(), mode) {
            (false, LeaseMode::Exclusive) => {
                let id = lease.as_str().to_string();
                guard.leases.insert(key.to_string(), Held::Exclusive { id, expires });
            },
            (false, LeaseMode::Shared) => {
                let holders = HashMap::from([(lease.as_str().to_string(), expires)]);
                guard.leases.insert(key.to_string(), Held::Shared(holders));
            },
            (true, LeaseMode::Shared) => match guard.leases.get_mut(key) {
                Some(Held::Shared(holders)) => {
                    holders.insert(lease.as_str().to_string(), expires);
                },
                _ => exn::bail!(ErrorKind::LeaseConflict(key.to_string())),
            },
            (true, LeaseMode::Exclusive) => exn::bail!(ErrorKind::LeaseConflict(key.to_string())),
        }
        Ok(lease)
    }

    async fn release_lease(&self, key: &str, lease: &LeaseId) -> Result<()> {
        let key = validate_key(key)?;
        let mut guard = self.state.write().await;
        let Some(held) = guard.live_lease(key) else {
            // Already expired; nothing to release.
            return Ok(());
        };
        if !held.is_held_by(lease) {
            exn::bail!(ErrorKind::LeaseConflict(key.to_string()));
        }
        let now_empty = match guard.leases.get_mut(key) {
            Some(Held::Shared(holders)) => {
                holders.remove(lease.as_str());
                holders.is_empty()
            },
            _ => true,
        };
        if now_empty {
            guard.leases.remove(key);
        }
        Ok(())
    }
}
