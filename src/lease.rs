//! Scoped leases.

use blobfs_storage::error::Result as StoreResult;
use blobfs_storage::{LeaseId, LeaseMode, StoreHandle};
use std::time::Duration;
use tokio::runtime::Handle;

/// A lease held for the lifetime of this guard.
///
/// Prefer [`release()`](Self::release), which waits for the store to confirm.
/// A guard dropped without being released (early return, cancelled future)
/// releases its lease on a background task, or leaves it to expire when no
/// runtime is available. Release failures are logged, never returned: they
/// must not mask the outcome of the guarded operation.
pub(crate) struct LeaseGuard {
    store: StoreHandle,
    key: String,
    lease: Option<LeaseId>,
}

impl LeaseGuard {
    pub(crate) async fn acquire(store: &StoreHandle, key: &str, mode: LeaseMode, duration: Duration) -> StoreResult<Self> {
        let lease = store.acquire_lease(key, mode, duration).await?;
        tracing::trace!(store = store.name(), key, %mode, "Lease acquired");
        Ok(Self {
            store: store.clone(),
            key: key.to_string(),
            lease: Some(lease),
        })
    }

    /// The lease token; `None` only once released.
    pub(crate) fn id(&self) -> Option<&LeaseId> {
        self.lease.as_ref()
    }

    pub(crate) async fn release(mut self) {
        if let Some(lease) = self.lease.take() {
            release(&self.store, &self.key, &lease).await;
        }
    }
}

impl Drop for LeaseGuard {
    fn drop(&mut self) {
        let Some(lease) = self.lease.take() else {
            return;
        };
        match Handle::try_current() {
            Ok(handle) => {
                let store = self.store.clone();
                let key = std::mem::take(&mut self.key);
                handle.spawn(async move { release(&store, &key, &lease).await });
            },
            Err(_) => tracing::debug!(key = %self.key, "No runtime to release lease; leaving it to expire"),
        }
    }
}

async fn release(store: &StoreHandle, key: &str, lease: &LeaseId) {
    match store.release_lease(key, lease).await {
        Ok(()) => tracing::trace!(store = store.name(), key, "Lease released"),
        Err(err) => tracing::warn!(store = store.name(), key, error = %*err, "Failed to release lease"),
    }
}
