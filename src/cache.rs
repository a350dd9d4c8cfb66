//! # TTL + LRU Cache Core
//!
//! This module provides the item index, the public cache facade, and the
//! background expiration driver.
//!
//! ## Architecture
//!
//! ```text
//!   ┌──────────────────────────────────────────────────────────────────────────┐
//!   │                              Cache<K, V>                                 │
//!   │                        (cheap Clone, shared Arc)                         │
//!   │                                                                          │
//!   │   ┌────────────────────────────────────────────────────────────────────┐ │
//!   │   │                  RwLock<ItemIndex<K, V>>                           │ │
//!   │   │                                                                    │ │
//!   │   │   ┌──────────────────────────────────────────────────────────┐     │ │
//!   │   │   │  values: FxHashMap<K, NonNull<Item>>                     │     │ │
//!   │   │   └────────────────────────┬─────────────────────────────────┘     │ │
//!   │   │                            │                                       │ │
//!   │   │   ┌────────────────────────▼─────────────────────────────────┐     │ │
//!   │   │   │  lru: LruList      front ──► [MRU] ◄──► [LRU] ◄── back   │     │ │
//!   │   │   └──────────────────────────────────────────────────────────┘     │ │
//!   │   │   ┌──────────────────────────────────────────────────────────┐     │ │
//!   │   │   │  queue: ExpiryHeap   root = earliest deadline            │     │ │
//!   │   │   │  (items carry their heap slot in queue_index)            │     │ │
//!   │   │   └──────────────────────────────────────────────────────────┘     │ │
//!   │   └────────────────────────────────────────────────────────────────────┘ │
//!   │                                                                          │
//!   │   RwLock<Metrics>        insertions / hits / misses / evictions          │
//!   │   Events<K, V>           insertion + eviction observer tables            │
//!   │   timer mailbox          bounded(1) Duration channel to the driver       │
//!   │   stop signal            bounded(1) one-shot                             │
//!   └──────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Locking Discipline
//!
//! | Lock              | Mode                | Covers                          |
//! |-------------------|---------------------|---------------------------------|
//! | items             | write for mutators  | map + list + heap + item fields |
//! | items             | read for snapshots  | `len`, `keys`, `items`, peeks   |
//! | metrics           | write (brief)       | the four counters               |
//! | event registries  | own mutex each      | observer tables                 |
//!
//! Acquisition order is fixed: items → metrics → registries. Callbacks and
//! loaders run with no cache locks held; a loader may therefore call
//! `insert` on the cache that invoked it.
//!
//! ## Timer-Reset Protocol
//!
//! Mutations that can pull the earliest deadline closer (insert with a TTL,
//! TTL update, touch) push the new wake duration into a one-slot mailbox,
//! draining any pending hint first and keeping the smaller of the two. The
//! drain-then-push runs under the items lock, so the hint always agrees
//! with the heap it was computed from. Removals never push: dropping an
//! item can only postpone the earliest deadline, and an early wake is
//! harmless (the driver sweeps nothing and re-arms from the heap root).
//!
//! ## Expiration Driver
//!
//! ```text
//!              hint(d)                     deadline reached
//!   ┌──────┐ ─────────► ┌─────────────┐ ─────────────────► ┌─────────┐
//!   │ Idle │            │ Sleeping(d) │ ◄───────────────── │ Firing  │
//!   └──────┘ ◄───────── └─────────────┘    re-arm / idle   └─────────┘
//!       ▲    heap empty     │    ▲
//!       │                   └────┘ hint(d') replaces the sleep
//!       └── stop wins in every state
//! ```
//!
//! A single long-running task owned by `start`, fed exclusively through the
//! mailbox; confining timer state to one task keeps mutators latency-bound
//! and removes timer races between overlapping writers.
//!
//! ## Example
//!
//! ```
//! use std::time::Duration;
//!
//! use ttlkit::builder::CacheBuilder;
//! use ttlkit::item::Ttl;
//!
//! let cache = CacheBuilder::new()
//!     .capacity(2)
//!     .default_ttl(Duration::from_secs(60))
//!     .build();
//!
//! cache.insert("a", "alpha", Ttl::Default);
//! cache.insert("b", "beta", Ttl::Never);
//! assert_eq!(cache.get(&"a").map(|item| *item.value()), Some("alpha"));
//!
//! // "b" is now least recently used; the next insert evicts it
//! cache.insert("c", "gamma", Ttl::Default);
//! assert!(!cache.contains(&"b"));
//! ```

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, select, Receiver, Sender};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::error::CacheError;
use crate::events::{EvictionReason, Events, ListenerHandle};
use crate::item::{Item, ItemView, Ttl};
use crate::loader::Loader;
use crate::metrics::{Metrics, MetricsSnapshot};

use crate::ds::{ExpiryHeap, LruList};

/// The three coupled structures, mutated together under one lock.
///
/// Owns every live item: nodes are allocated on insert and freed when they
/// are detached or when the index is dropped.
struct ItemIndex<K, V> {
    values: FxHashMap<K, NonNull<Item<K, V>>>,
    lru: LruList<K, V>,
    queue: ExpiryHeap<K, V>,
}

impl<K, V> ItemIndex<K, V>
where
    K: Clone + Eq + Hash,
{
    fn new() -> Self {
        ItemIndex {
            values: FxHashMap::default(),
            lru: LruList::new(),
            queue: ExpiryHeap::new(),
        }
    }

    /// Allocates a node, links it everywhere, and returns its handle.
    fn insert_new(
        &mut self,
        key: K,
        value: Arc<V>,
        ttl: Option<Duration>,
        now: Instant,
    ) -> NonNull<Item<K, V>> {
        let boxed = Box::new(Item::new(key.clone(), value, ttl, now));
        let node_ptr = NonNull::new(Box::into_raw(boxed)).unwrap();

        self.values.insert(key, node_ptr);
        self.lru.attach_front(node_ptr);
        if unsafe { (*node_ptr.as_ptr()).expires_at.is_some() } {
            self.queue.push(node_ptr);
        }
        node_ptr
    }

    /// Unlinks a node from all three structures and takes back its
    /// allocation. The node must be live in this index.
    fn detach(&mut self, node_ptr: NonNull<Item<K, V>>) -> Box<Item<K, V>> {
        self.lru.detach(node_ptr);
        self.queue.remove(node_ptr);
        let boxed = unsafe { Box::from_raw(node_ptr.as_ptr()) };
        self.values.remove(&boxed.key);
        boxed
    }

    #[cfg(debug_assertions)]
    fn debug_validate(&self) {
        debug_assert_eq!(self.values.len(), self.lru.len());
        debug_assert!(self.queue.len() <= self.values.len());
        self.lru.debug_validate();
        self.queue.debug_validate();
    }
}

impl<K, V> Drop for ItemIndex<K, V> {
    fn drop(&mut self) {
        // Free every node through the list; map and heap only hold copies
        // of the same pointers.
        while let Some(node_ptr) = self.lru.pop_back() {
            unsafe { drop(Box::from_raw(node_ptr.as_ptr())) }
        }
        self.values.clear();
    }
}

// SAFETY: the NonNull pointers only reference heap nodes owned by this
// index; nothing else aliases them. Sending the index moves ownership of
// every node with it. `Arc<V>` requires `V: Send + Sync` to cross threads.
unsafe impl<K: Send, V: Send + Sync> Send for ItemIndex<K, V> {}

// SAFETY: shared access never mutates through the pointers without the
// outer RwLock's write guard; read-side methods only copy metadata and
// clone `Arc`s.
unsafe impl<K: Sync, V: Send + Sync> Sync for ItemIndex<K, V> {}

struct Shared<K, V> {
    capacity: usize,
    default_ttl: Option<Duration>,
    touch_on_hit: bool,
    loader: Option<Box<dyn Loader<K, V>>>,

    items: RwLock<ItemIndex<K, V>>,
    metrics: RwLock<Metrics>,
    events: Events<K, V>,

    timer_tx: Sender<Duration>,
    timer_rx: Receiver<Duration>,
    stop_tx: Sender<()>,
    stop_rx: Receiver<()>,
    stopped: AtomicBool,
}

/// Thread-safe key/value cache with per-item TTL and LRU capacity
/// eviction.
///
/// Cloning is cheap and every clone operates on the same underlying cache,
/// so a clone can be moved into the thread that runs the expiration
/// driver:
///
/// ```
/// use std::thread;
///
/// use ttlkit::cache::Cache;
///
/// let cache: Cache<String, String> = Cache::new();
/// let driver = {
///     let cache = cache.clone();
///     thread::spawn(move || {
///         let _ = cache.start();
///     })
/// };
///
/// // ... use the cache ...
///
/// cache.stop();
/// driver.join().unwrap();
/// ```
pub struct Cache<K, V> {
    shared: Arc<Shared<K, V>>,
}

impl<K, V> Clone for Cache<K, V> {
    fn clone(&self) -> Self {
        Cache {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<K, V> Cache<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    /// Creates an unbounded cache with no default TTL and no loader.
    ///
    /// Use [`CacheBuilder`](crate::builder::CacheBuilder) for anything
    /// beyond that.
    pub fn new() -> Self {
        Self::from_parts(0, None, true, None)
    }

    pub(crate) fn from_parts(
        capacity: usize,
        default_ttl: Option<Duration>,
        touch_on_hit: bool,
        loader: Option<Box<dyn Loader<K, V>>>,
    ) -> Self {
        let (timer_tx, timer_rx) = bounded(1);
        let (stop_tx, stop_rx) = bounded(1);
        Cache {
            shared: Arc::new(Shared {
                capacity,
                default_ttl,
                touch_on_hit,
                loader,
                items: RwLock::new(ItemIndex::new()),
                metrics: RwLock::new(Metrics::default()),
                events: Events::new(),
                timer_tx,
                timer_rx,
                stop_tx,
                stop_rx,
                stopped: AtomicBool::new(false),
            }),
        }
    }

    /// Maximum item count before LRU eviction; 0 means unbounded.
    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    /// The TTL applied when an insert passes [`Ttl::Default`].
    pub fn default_ttl(&self) -> Option<Duration> {
        self.shared.default_ttl
    }

    fn resolve_ttl(&self, ttl: Ttl) -> Option<Duration> {
        match ttl {
            Ttl::Default => self.shared.default_ttl,
            Ttl::Never => None,
            Ttl::After(d) if d.is_zero() => None,
            Ttl::After(d) => Some(d),
        }
    }

    /// Inserts or updates `key`, returning a view of the stored item.
    ///
    /// A full cache evicts its least recently used item (reason
    /// `CapacityReached`) before a new key is linked, so the incoming item
    /// is never its own victim. Updates keep the key's identity: no
    /// insertion event fires and the insertion counter is untouched.
    pub fn insert(&self, key: K, value: V, ttl: Ttl) -> ItemView<K, V> {
        let value = Arc::new(value);
        let ttl = self.resolve_ttl(ttl);
        let now = Instant::now();

        let mut capacity_victim: Option<ItemView<K, V>> = None;
        let mut inserted = false;

        let view = {
            let mut items = self.shared.items.write();

            if let Some(&node_ptr) = items.values.get(&key) {
                let old_root = items.queue.root_deadline();
                unsafe {
                    let item = &mut *node_ptr.as_ptr();
                    item.value = value;
                    item.ttl = ttl;
                    item.touch(now);
                }
                items.lru.move_to_front(node_ptr);

                let enqueued = unsafe { (*node_ptr.as_ptr()).queue_index.is_some() };
                let has_deadline = unsafe { (*node_ptr.as_ptr()).expires_at.is_some() };
                match (enqueued, has_deadline) {
                    (true, true) => items.queue.fix(node_ptr),
                    (true, false) => {
                        items.queue.remove(node_ptr);
                    }
                    (false, true) => items.queue.push(node_ptr),
                    (false, false) => {}
                }

                self.update_timer_hint(old_root, items.queue.root_deadline(), now);

                #[cfg(debug_assertions)]
                items.debug_validate();

                unsafe { (*node_ptr.as_ptr()).view() }
            } else {
                if self.shared.capacity > 0 && items.values.len() >= self.shared.capacity {
                    if let Some(back) = items.lru.back() {
                        let victim = items.detach(back);
                        capacity_victim = Some(victim.view());
                        self.shared.metrics.write().record_evictions(1);
                    }
                }

                let old_root = items.queue.root_deadline();
                let node_ptr = items.insert_new(key, value, ttl, now);
                self.update_timer_hint(old_root, items.queue.root_deadline(), now);
                self.shared.metrics.write().record_insertion();
                inserted = true;

                #[cfg(debug_assertions)]
                items.debug_validate();

                unsafe { (*node_ptr.as_ptr()).view() }
            }
        };

        if let Some(victim) = &capacity_victim {
            self.shared
                .events
                .notify_eviction(EvictionReason::CapacityReached, victim);
        }
        if inserted {
            self.shared.events.notify_insertion(&view);
        }
        view
    }

    /// Looks up `key`, marking it most recently used on a hit and, unless
    /// touch-on-hit is disabled, pushing its deadline out by its TTL.
    ///
    /// A missing or expired key counts as a miss; if a loader is
    /// configured its result is returned instead of `None`. Expired items
    /// are left in place for the expiration driver.
    pub fn get(&self, key: &K) -> Option<ItemView<K, V>> {
        let now = Instant::now();
        let mut found: Option<ItemView<K, V>> = None;

        {
            let mut items = self.shared.items.write();
            if let Some(&node_ptr) = items.values.get(key) {
                let expired = unsafe { (*node_ptr.as_ptr()).is_expired_at(now) };
                if !expired {
                    items.lru.move_to_front(node_ptr);

                    let has_ttl = unsafe { (*node_ptr.as_ptr()).ttl.is_some() };
                    if self.shared.touch_on_hit && has_ttl {
                        let old_root = items.queue.root_deadline();
                        unsafe { (*node_ptr.as_ptr()).touch(now) };
                        items.queue.fix(node_ptr);
                        self.update_timer_hint(old_root, items.queue.root_deadline(), now);
                    }

                    found = Some(unsafe { (*node_ptr.as_ptr()).view() });
                }
            }

            let mut metrics = self.shared.metrics.write();
            match found {
                Some(_) => metrics.record_hit(),
                None => metrics.record_miss(),
            }
        }

        if found.is_none() {
            if let Some(loader) = &self.shared.loader {
                return loader.load(self, key);
            }
        }
        found
    }

    /// Explicit-error variant of [`get`](Cache::get).
    pub fn try_get(&self, key: &K) -> Result<ItemView<K, V>, CacheError> {
        self.get(key).ok_or(CacheError::NotFound)
    }

    /// Looks up `key` without touching recency, deadline, or the loader.
    /// Hit/miss counters still move.
    pub fn peek(&self, key: &K) -> Option<ItemView<K, V>> {
        let now = Instant::now();
        let found = {
            let items = self.shared.items.read();
            items.values.get(key).and_then(|&node_ptr| {
                let item = unsafe { &*node_ptr.as_ptr() };
                if item.is_expired_at(now) {
                    None
                } else {
                    Some(item.view())
                }
            })
        };

        let mut metrics = self.shared.metrics.write();
        match found {
            Some(_) => metrics.record_hit(),
            None => metrics.record_miss(),
        }
        drop(metrics);
        found
    }

    /// Whether a live (non-expired) item exists for `key`. Does not move
    /// counters or recency.
    pub fn contains(&self, key: &K) -> bool {
        let now = Instant::now();
        let items = self.shared.items.read();
        items
            .values
            .get(key)
            .is_some_and(|&node_ptr| unsafe { !(*node_ptr.as_ptr()).is_expired_at(now) })
    }

    /// Removes `key` if present (reason `Deleted`); a miss is a no-op.
    pub fn remove(&self, key: &K) -> Option<ItemView<K, V>> {
        let removed = {
            let mut items = self.shared.items.write();
            let node_ptr = items.values.get(key).copied()?;
            let victim = items.detach(node_ptr);
            self.shared.metrics.write().record_evictions(1);

            #[cfg(debug_assertions)]
            items.debug_validate();

            victim.view()
        };

        self.shared
            .events
            .notify_eviction(EvictionReason::Deleted, &removed);
        Some(removed)
    }

    /// Removes every item (reason `Deleted`).
    pub fn clear(&self) {
        let victims: Vec<ItemView<K, V>> = {
            let mut items = self.shared.items.write();
            let mut victims = Vec::with_capacity(items.values.len());
            while let Some(front) = items.lru.front() {
                victims.push(items.detach(front).view());
            }
            if !victims.is_empty() {
                self.shared
                    .metrics
                    .write()
                    .record_evictions(victims.len() as u64);
            }

            #[cfg(debug_assertions)]
            items.debug_validate();

            victims
        };

        for victim in &victims {
            self.shared
                .events
                .notify_eviction(EvictionReason::Deleted, victim);
        }
    }

    /// Removes every item whose deadline has passed (reason `Expired`),
    /// walking the heap from the root. Returns the number of evictions.
    ///
    /// The expiration driver calls this on every wake; without a running
    /// driver it can be called manually.
    pub fn remove_expired(&self) -> usize {
        let now = Instant::now();
        let victims: Vec<ItemView<K, V>> = {
            let mut items = self.shared.items.write();
            let mut victims = Vec::new();
            while let Some(root) = items.queue.peek() {
                if unsafe { !(*root.as_ptr()).is_expired_at(now) } {
                    break;
                }
                victims.push(items.detach(root).view());
            }
            if !victims.is_empty() {
                self.shared
                    .metrics
                    .write()
                    .record_evictions(victims.len() as u64);
            }

            #[cfg(debug_assertions)]
            items.debug_validate();

            victims
        };

        for victim in &victims {
            self.shared
                .events
                .notify_eviction(EvictionReason::Expired, victim);
        }
        victims.len()
    }

    /// Resets `key`'s deadline to now + TTL and marks it most recently
    /// used. A miss is a no-op; counters are untouched.
    pub fn touch(&self, key: &K) -> bool {
        let now = Instant::now();
        let mut items = self.shared.items.write();
        let Some(&node_ptr) = items.values.get(key) else {
            return false;
        };

        let old_root = items.queue.root_deadline();
        unsafe { (*node_ptr.as_ptr()).touch(now) };
        if unsafe { (*node_ptr.as_ptr()).queue_index.is_some() } {
            items.queue.fix(node_ptr);
        }
        items.lru.move_to_front(node_ptr);
        self.update_timer_hint(old_root, items.queue.root_deadline(), now);

        #[cfg(debug_assertions)]
        items.debug_validate();

        true
    }

    /// Number of items, expired corpses included.
    pub fn len(&self) -> usize {
        self.shared.items.read().values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every key currently in the cache, in no particular order.
    pub fn keys(&self) -> Vec<K> {
        self.shared.items.read().values.keys().cloned().collect()
    }

    /// A copy of the key → item mapping, decoupled from later mutation.
    pub fn items(&self) -> HashMap<K, ItemView<K, V>> {
        let items = self.shared.items.read();
        items
            .values
            .iter()
            .map(|(key, &node_ptr)| (key.clone(), unsafe { (*node_ptr.as_ptr()).view() }))
            .collect()
    }

    /// The least recently used item, if any.
    pub fn peek_lru(&self) -> Option<ItemView<K, V>> {
        let items = self.shared.items.read();
        items
            .lru
            .back()
            .map(|node_ptr| unsafe { (*node_ptr.as_ptr()).view() })
    }

    /// The most recently used item, if any.
    pub fn peek_mru(&self) -> Option<ItemView<K, V>> {
        let items = self.shared.items.read();
        items
            .lru
            .front()
            .map(|node_ptr| unsafe { (*node_ptr.as_ptr()).view() })
    }

    /// Copies out the counters plus current len/capacity gauges.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        let cache_len = self.shared.items.read().values.len();
        let metrics = self.shared.metrics.read();
        MetricsSnapshot {
            insertions: metrics.insertions,
            hits: metrics.hits,
            misses: metrics.misses,
            evictions: metrics.evictions,
            cache_len,
            capacity: self.shared.capacity,
        }
    }

    /// Registers an observer for new-key insertions.
    pub fn on_insertion(
        &self,
        f: impl Fn(&ItemView<K, V>) + Send + Sync + 'static,
    ) -> ListenerHandle {
        let registry = Arc::clone(&self.shared.events.insertion);
        let id = registry.lock().add(Arc::new(f));
        ListenerHandle::new(registry, id)
    }

    /// Registers an observer for evictions of every reason.
    pub fn on_eviction(
        &self,
        f: impl Fn(EvictionReason, &ItemView<K, V>) + Send + Sync + 'static,
    ) -> ListenerHandle {
        let registry = Arc::clone(&self.shared.events.eviction);
        let id = registry.lock().add(Arc::new(f));
        ListenerHandle::new(registry, id)
    }

    /// Runs the expiration driver on the calling thread until
    /// [`stop`](Cache::stop) is signalled.
    ///
    /// The driver sleeps until the earliest scheduled deadline, evicts
    /// everything that has expired (reason `Expired`), and re-arms from
    /// the heap. Timer-reset hints from mutators preempt the sleep.
    /// Returns `Err(CacheError::Closed)` if the cache was already stopped.
    pub fn start(&self) -> Result<(), CacheError> {
        if self.shared.stopped.load(Ordering::Acquire) {
            return Err(CacheError::Closed);
        }

        let stop_rx = &self.shared.stop_rx;
        let timer_rx = &self.shared.timer_rx;
        let mut sleep = self.next_wake(Instant::now());

        loop {
            match sleep {
                // Idle: nothing scheduled, wait for a hint or stop.
                None => {
                    select! {
                        recv(stop_rx) -> _ => return Ok(()),
                        recv(timer_rx) -> hint => {
                            match hint {
                                Ok(d) => sleep = Some(d),
                                Err(_) => return Ok(()),
                            }
                        }
                    }
                }
                // Sleeping: a hint replaces the sleep, the deadline fires
                // the sweep.
                Some(d) => {
                    select! {
                        recv(stop_rx) -> _ => return Ok(()),
                        recv(timer_rx) -> hint => {
                            if let Ok(d) = hint {
                                sleep = Some(d);
                            }
                        }
                        default(d) => {
                            self.remove_expired();
                            sleep = self.next_wake(Instant::now());
                        }
                    }
                }
            }
        }
    }

    /// Signals the driver to halt. Idempotent; safe without a running
    /// driver. After `stop`, `start` reports [`CacheError::Closed`].
    pub fn stop(&self) {
        self.shared.stopped.store(true, Ordering::Release);
        let _ = self.shared.stop_tx.try_send(());
    }

    fn next_wake(&self, now: Instant) -> Option<Duration> {
        self.shared
            .items
            .read()
            .queue
            .root_deadline()
            .map(|at| at.saturating_duration_since(now))
    }

    /// Pushes a wake hint when the earliest deadline moved closer.
    ///
    /// Must be called under the items write lock so the drain-then-push is
    /// atomic with respect to the heap change it describes. The smaller of
    /// the pending and the new hint survives.
    fn update_timer_hint(
        &self,
        old_root: Option<Instant>,
        new_root: Option<Instant>,
        now: Instant,
    ) {
        let Some(new_at) = new_root else { return };
        if let Some(old_at) = old_root {
            if new_at >= old_at {
                return;
            }
        }

        let mut wake = new_at.saturating_duration_since(now);
        if let Ok(pending) = self.shared.timer_rx.try_recv() {
            if pending < wake {
                wake = pending;
            }
        }
        let _ = self.shared.timer_tx.try_send(wake);
    }
}

impl<K, V> Default for Cache<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> fmt::Debug for Cache<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cache")
            .field("len", &self.len())
            .field("capacity", &self.shared.capacity)
            .field("default_ttl", &self.shared.default_ttl)
            .finish_non_exhaustive()
    }
}
