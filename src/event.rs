//! Change notifications.
//!
//! Subscribers are plain callbacks invoked synchronously, in subscription
//! order, after a mutation has succeeded. Delivery is best-effort: a
//! panicking subscriber is logged and skipped, and never turns a successful
//! operation into a failed one.

use derive_more::Display;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

/// A completed change to the virtual hierarchy. Paths are canonical.
#[derive(Debug, Display, Clone, PartialEq, Eq)]
pub enum Event {
    #[display("file copied: {from} -> {to}")]
    FileCopied { from: String, to: String },
    #[display("file moved: {from} -> {to}")]
    FileMoved { from: String, to: String },
    #[display("file deleted: {path}")]
    FileDeleted { path: String },
    #[display("file written: {path}")]
    FileWritten { path: String },
    #[display("directory created: {path}")]
    DirectoryCreated { path: String },
    #[display("directory moved: {from} -> {to}")]
    DirectoryMoved { from: String, to: String },
    #[display("directory deleted: {path}")]
    DirectoryDeleted { path: String },
}

/// Handle returned by [`subscribe`](crate::VirtualStore::subscribe), used to
/// unsubscribe again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Callback = Arc<dyn Fn(&Event) + Send + Sync>;

#[derive(Default)]
pub(crate) struct Subscribers {
    next: AtomicU64,
    callbacks: RwLock<Vec<(SubscriptionId, Callback)>>,
}
impl Subscribers {
    pub(crate) fn subscribe(&self, callback: impl Fn(&Event) + Send + Sync + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next.fetch_add(1, Ordering::Relaxed));
        self.callbacks.write().unwrap_or_else(PoisonError::into_inner).push((id, Arc::new(callback)));
        id
    }

    /// Returns `false` if `id` was not subscribed.
    pub(crate) fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut callbacks = self.callbacks.write().unwrap_or_else(PoisonError::into_inner);
        let before = callbacks.len();
        callbacks.retain(|(existing, _)| *existing != id);
        callbacks.len() != before
    }

    pub(crate) fn publish(&self, event: Event) {
        // Snapshot so callbacks can (un)subscribe without deadlocking.
        let callbacks: Vec<Callback> = self
            .callbacks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect();
        tracing::trace!(%event, subscribers = callbacks.len(), "Publishing event");
        for callback in callbacks {
            if catch_unwind(AssertUnwindSafe(|| callback(&event))).is_err() {
                tracing::warn!(%event, "Event subscriber panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn recorder() -> (Arc<Mutex<Vec<Event>>>, impl Fn(&Event) + Send + Sync + 'static) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        (seen, move |event: &Event| sink.lock().unwrap().push(event.clone()))
    }

    #[test]
    fn test_publish_reaches_every_subscriber() {
        let subscribers = Subscribers::default();
        let (first, callback) = recorder();
        subscribers.subscribe(callback);
        let (second, callback) = recorder();
        subscribers.subscribe(callback);

        let event = Event::FileDeleted { path: "/a.txt".into() };
        subscribers.publish(event.clone());
        assert_eq!(*first.lock().unwrap(), vec![event.clone()]);
        assert_eq!(*second.lock().unwrap(), vec![event]);
    }

    #[test]
    fn test_unsubscribe() {
        let subscribers = Subscribers::default();
        let (seen, callback) = recorder();
        let id = subscribers.subscribe(callback);
        assert!(subscribers.unsubscribe(id));
        assert!(!subscribers.unsubscribe(id));
        subscribers.publish(Event::DirectoryCreated { path: "/d/".into() });
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_panicking_subscriber_does_not_stop_delivery() {
        let subscribers = Subscribers::default();
        subscribers.subscribe(|_| panic!("subscriber failure"));
        let (seen, callback) = recorder();
        subscribers.subscribe(callback);
        subscribers.publish(Event::FileWritten { path: "/a.txt".into() });
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_display() {
        let event = Event::FileMoved { from: "/a".into(), to: "/b".into() };
        assert_eq!(event.to_string(), "file moved: /a -> /b");
    }
}
