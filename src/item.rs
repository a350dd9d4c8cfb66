//! Cached item storage and the read-only views handed to callers.
//!
//! ## Key Components
//!
//! | Component      | Description                                              |
//! |----------------|----------------------------------------------------------|
//! | `Ttl`          | Per-insert time-to-live sentinel (default/never/custom)  |
//! | `Item<K, V>`   | Heap-allocated node owned by the item index              |
//! | `ItemView<K, V>` | Owned snapshot of one item returned by the facade      |
//!
//! ## Item Layout
//!
//! ```text
//!   ┌─────────────────────────────────────────────┐
//!   │                Item<K, V>                   │
//!   ├─────────────────────────────────────────────┤
//!   │  prev / next: Option<NonNull<Item>>         │  recency-list links
//!   │  queue_index: Option<usize>                 │  expiration-heap slot
//!   ├─────────────────────────────────────────────┤
//!   │  key: K                                     │
//!   │  value: Arc<V>                              │  zero-copy sharing
//!   │  ttl: Option<Duration>                      │  None = never expires
//!   │  expires_at: Option<Instant>                │  absolute deadline
//!   └─────────────────────────────────────────────┘
//! ```
//!
//! Items never point back at the index, so there is no reference cycle to
//! break. `ttl` and `expires_at` are `Some`/`None` together, and
//! `queue_index` is `Some` exactly while the item sits in the expiration
//! heap.

use std::fmt;
use std::ptr::NonNull;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Time-to-live requested for a single insert.
///
/// `Ttl::Default` resolves to the cache-wide default configured through
/// [`CacheBuilder::default_ttl`](crate::builder::CacheBuilder::default_ttl)
/// at insert time. `Ttl::Never` disables expiration for the item. Any
/// positive `Ttl::After` duration is used verbatim; a zero duration is
/// treated as `Never`.
///
/// # Example
///
/// ```
/// use std::time::Duration;
///
/// use ttlkit::item::Ttl;
///
/// assert_eq!(Ttl::from(Duration::from_secs(5)), Ttl::After(Duration::from_secs(5)));
/// assert_eq!(Ttl::from(Duration::ZERO), Ttl::Never);
/// assert_eq!(Ttl::default(), Ttl::Default);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ttl {
    /// Use the cache-wide default TTL.
    Default,
    /// The item never expires.
    Never,
    /// The item expires this long after the insert or the latest touch.
    After(Duration),
}

impl Default for Ttl {
    fn default() -> Self {
        Ttl::Default
    }
}

impl From<Duration> for Ttl {
    fn from(d: Duration) -> Self {
        if d.is_zero() { Ttl::Never } else { Ttl::After(d) }
    }
}

/// Node stored by the item index.
///
/// Layout mirrors access patterns: list links first (traversal), then the
/// heap back-index (expiration bookkeeping), then the payload.
#[repr(C)]
pub(crate) struct Item<K, V> {
    pub(crate) prev: Option<NonNull<Item<K, V>>>,
    pub(crate) next: Option<NonNull<Item<K, V>>>,
    pub(crate) queue_index: Option<usize>,
    pub(crate) key: K,
    pub(crate) value: Arc<V>,
    pub(crate) ttl: Option<Duration>,
    pub(crate) expires_at: Option<Instant>,
}

impl<K, V> Item<K, V> {
    pub(crate) fn new(key: K, value: Arc<V>, ttl: Option<Duration>, now: Instant) -> Self {
        Item {
            prev: None,
            next: None,
            queue_index: None,
            key,
            value,
            ttl,
            expires_at: ttl.map(|d| now + d),
        }
    }

    /// Recomputes the absolute deadline from `ttl`. Clears it for items
    /// without a TTL.
    pub(crate) fn touch(&mut self, now: Instant) {
        self.expires_at = self.ttl.map(|d| now + d);
    }

    pub(crate) fn is_expired_at(&self, now: Instant) -> bool {
        matches!(self.expires_at, Some(at) if at <= now)
    }
}

impl<K: Clone, V> Item<K, V> {
    pub(crate) fn view(&self) -> ItemView<K, V> {
        ItemView {
            key: self.key.clone(),
            value: Arc::clone(&self.value),
            ttl: self.ttl,
            expires_at: self.expires_at,
        }
    }
}

/// Owned snapshot of a cached item.
///
/// Views are cheap to clone: the value is shared through an `Arc`, the
/// metadata is copied. A view reflects the item as of the operation that
/// produced it; later mutations of the same key are not visible through it.
pub struct ItemView<K, V> {
    key: K,
    value: Arc<V>,
    ttl: Option<Duration>,
    expires_at: Option<Instant>,
}

impl<K, V> ItemView<K, V> {
    /// Builds a view that is not backed by any cache.
    ///
    /// Intended for [`Loader`](crate::loader::Loader) implementations that
    /// answer a miss without inserting. The view carries no deadline.
    pub fn detached(key: K, value: V) -> Self {
        ItemView {
            key,
            value: Arc::new(value),
            ttl: None,
            expires_at: None,
        }
    }

    /// The item's key.
    pub fn key(&self) -> &K {
        &self.key
    }

    /// The item's value.
    pub fn value(&self) -> &V {
        &self.value
    }

    /// The shared handle to the item's value.
    pub fn value_arc(&self) -> Arc<V> {
        Arc::clone(&self.value)
    }

    /// The TTL the item was stored with; `None` means it never expires.
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    /// The absolute deadline, if the item expires.
    pub fn expires_at(&self) -> Option<Instant> {
        self.expires_at
    }

    /// Whether the deadline has passed.
    pub fn is_expired(&self) -> bool {
        matches!(self.expires_at, Some(at) if at <= Instant::now())
    }
}

impl<K: Clone, V> Clone for ItemView<K, V> {
    fn clone(&self) -> Self {
        ItemView {
            key: self.key.clone(),
            value: Arc::clone(&self.value),
            ttl: self.ttl,
            expires_at: self.expires_at,
        }
    }
}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for ItemView<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ItemView")
            .field("key", &self.key)
            .field("value", &self.value)
            .field("ttl", &self.ttl)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}
