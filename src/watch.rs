//! The watcher registry (component L): lets callers register path-scoped callbacks that
//! fire on `change`/`rename` events, the way `fs.watch` works over an event-loop runtime.
//!
//! Grounded in the teacher crate's own [`Notifier`](https://docs.rs/fuser)-style design in
//! `notify.rs`: a cloneable handle that fans a notification out to whoever is listening,
//! plus an opaque handle type returned at registration time for later cancellation. That
//! design is generalized here from kernel poll-readiness/cache-invalidation notifications to
//! VFS change events, and from a single kernel channel to a registry of many independent
//! watchers, each scoped to the path prefix it registered under.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::path;

/// The kind of change a watcher is notified about.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum WatchEventKind {
    /// Contents or metadata of an existing entry changed.
    Change,
    /// An entry was created, removed, or renamed.
    Rename,
}

/// One delivered notification.
#[derive(Clone, Debug)]
pub struct WatchEvent {
    pub kind: WatchEventKind,
    /// The normalized, user-visible path the event concerns.
    pub path: String,
}

/// An opaque handle to a registered watcher, returned by [`WatchRegistry::register`] and
/// consumed by [`WatchRegistry::unregister`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct WatchHandle(u64);

type Callback = Box<dyn Fn(&WatchEvent) + Send + Sync>;

struct Watcher {
    handle: WatchHandle,
    scope: String,
    callback: Callback,
}

/// A process-wide registry of path-scoped watchers, consulted by the VFS facade after every
/// mutating operation.
#[derive(Default)]
pub struct WatchRegistry {
    watchers: Mutex<Vec<Watcher>>,
    next_handle: AtomicU64,
}

impl std::fmt::Debug for WatchRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchRegistry")
            .field("watchers", &self.watchers.lock().len())
            .finish()
    }
}

impl WatchRegistry {
    pub fn new() -> Self {
        WatchRegistry::default()
    }

    /// Register `callback` to fire for every event at or under `scope`. `scope` is
    /// normalized the same way path arguments to VFS operations are.
    pub fn register(
        &self,
        scope: impl AsRef<str>,
        callback: impl Fn(&WatchEvent) + Send + Sync + 'static,
    ) -> WatchHandle {
        let handle = WatchHandle(self.next_handle.fetch_add(1, Ordering::SeqCst));
        self.watchers.lock().push(Watcher {
            handle,
            scope: path::normalize(scope.as_ref()),
            callback: Box::new(callback),
        });
        handle
    }

    /// Remove a previously registered watcher. A no-op if `handle` is unknown (already
    /// unregistered).
    pub fn unregister(&self, handle: WatchHandle) {
        self.watchers.lock().retain(|w| w.handle != handle);
    }

    /// Notify every watcher whose scope contains `path`, per the standing instruction
    /// "emits a `change`/`rename` event to registered watchers" (§4.I step 7).
    pub fn emit(&self, kind: WatchEventKind, path: &str) {
        let normalized = path::normalize(path);
        let event = WatchEvent {
            kind,
            path: normalized.clone(),
        };
        for watcher in self.watchers.lock().iter() {
            if path::is_self_or_descendant(&watcher.scope, &normalized) {
                (watcher.callback)(&event);
            }
        }
    }

    /// `true` if any watcher is currently registered. Lets the facade skip event
    /// construction entirely on the common no-watcher path.
    pub fn is_empty(&self) -> bool {
        self.watchers.lock().is_empty()
    }
}

/// A shareable registry handle, the shape the VFS facade actually stores.
pub type SharedWatchRegistry = Arc<WatchRegistry>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn watcher_fires_for_scoped_path_and_descendants() {
        let registry = WatchRegistry::new();
        let count = Arc::new(AtomicUsize::new(0));
        let counted = count.clone();
        registry.register("/data", move |_event| {
            counted.fetch_add(1, Ordering::SeqCst);
        });

        registry.emit(WatchEventKind::Change, "/data");
        registry.emit(WatchEventKind::Rename, "/data/nested/file");
        registry.emit(WatchEventKind::Change, "/other");

        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn unregister_stops_delivery() {
        let registry = WatchRegistry::new();
        let count = Arc::new(AtomicUsize::new(0));
        let counted = count.clone();
        let handle = registry.register("/data", move |_event| {
            counted.fetch_add(1, Ordering::SeqCst);
        });

        registry.emit(WatchEventKind::Change, "/data");
        registry.unregister(handle);
        registry.emit(WatchEventKind::Change, "/data");

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn empty_registry_reports_empty() {
        let registry = WatchRegistry::new();
        assert!(registry.is_empty());
        registry.register("/", |_event| {});
        assert!(!registry.is_empty());
    }
}
