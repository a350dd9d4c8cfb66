//! Eviction reasons and the insertion/eviction observer registries.
//!
//! Each registry is an id-keyed table behind its own mutex. Registering
//! returns a [`ListenerHandle`] whose `deregister` is idempotent and safe
//! to call from inside a callback. Dispatch snapshots the table first and
//! invokes with no cache locks held, so observers may freely register,
//! deregister, or call back into the cache.
//!
//! A panicking observer is isolated per invocation; the remaining
//! observers still receive the event.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::item::ItemView;

/// Why an item left the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EvictionReason {
    /// Removed explicitly (`remove`, `clear`).
    Deleted,
    /// Displaced by a new insert while the cache was full.
    CapacityReached,
    /// The item's deadline passed.
    Expired,
}

pub(crate) type InsertionFn<K, V> = dyn Fn(&ItemView<K, V>) + Send + Sync;
pub(crate) type EvictionFn<K, V> = dyn Fn(EvictionReason, &ItemView<K, V>) + Send + Sync;

/// Id-keyed callback table with monotonically increasing ids.
pub(crate) struct Registry<F: ?Sized> {
    fns: FxHashMap<u64, Arc<F>>,
    next_id: u64,
}

impl<F: ?Sized> Registry<F> {
    pub(crate) fn new() -> Self {
        Registry {
            fns: FxHashMap::default(),
            next_id: 0,
        }
    }

    pub(crate) fn add(&mut self, f: Arc<F>) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.fns.insert(id, f);
        id
    }

    pub(crate) fn remove(&mut self, id: u64) -> bool {
        self.fns.remove(&id).is_some()
    }

    pub(crate) fn len(&self) -> usize {
        self.fns.len()
    }

    /// The current observer set, decoupled from later table mutation.
    pub(crate) fn snapshot(&self) -> Vec<Arc<F>> {
        self.fns.values().cloned().collect()
    }
}

/// Deregistration handle returned by `on_insertion` / `on_eviction`.
///
/// Dropping the handle leaves the observer registered; only
/// [`deregister`](ListenerHandle::deregister) removes it.
pub struct ListenerHandle {
    done: AtomicBool,
    cancel: Box<dyn Fn() + Send + Sync>,
}

impl ListenerHandle {
    pub(crate) fn new<F>(registry: Arc<Mutex<Registry<F>>>, id: u64) -> Self
    where
        F: ?Sized + Send + Sync + 'static,
    {
        ListenerHandle {
            done: AtomicBool::new(false),
            cancel: Box::new(move || {
                registry.lock().remove(id);
            }),
        }
    }

    /// Removes the observer. Calling this more than once is a no-op.
    pub fn deregister(&self) {
        if !self.done.swap(true, Ordering::AcqRel) {
            (self.cancel)();
        }
    }
}

impl std::fmt::Debug for ListenerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerHandle")
            .field("deregistered", &self.done.load(Ordering::Acquire))
            .finish()
    }
}

/// Both observer tables, one mutex each.
pub(crate) struct Events<K, V> {
    pub(crate) insertion: Arc<Mutex<Registry<InsertionFn<K, V>>>>,
    pub(crate) eviction: Arc<Mutex<Registry<EvictionFn<K, V>>>>,
}

impl<K, V> Events<K, V> {
    pub(crate) fn new() -> Self {
        Events {
            insertion: Arc::new(Mutex::new(Registry::new())),
            eviction: Arc::new(Mutex::new(Registry::new())),
        }
    }

    /// Delivers one insertion event to every observer registered at
    /// dispatch time. Must be called with no cache locks held.
    pub(crate) fn notify_insertion(&self, item: &ItemView<K, V>) {
        let fns = self.insertion.lock().snapshot();
        for f in fns {
            let _ = catch_unwind(AssertUnwindSafe(|| f(item)));
        }
    }

    /// Delivers one eviction event to every observer registered at
    /// dispatch time. Must be called with no cache locks held.
    pub(crate) fn notify_eviction(&self, reason: EvictionReason, item: &ItemView<K, V>) {
        let fns = self.eviction.lock().snapshot();
        for f in fns {
            let _ = catch_unwind(AssertUnwindSafe(|| f(reason, item)));
        }
    }
}
