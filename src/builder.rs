//! Cache builder: capacity, default TTL, touch-on-hit, and the loader.
//!
//! Provides the one place configuration enters the cache; every option has
//! a usable default, so `CacheBuilder::new().build()` is equivalent to
//! [`Cache::new`](crate::cache::Cache::new).
//!
//! ## Example
//!
//! ```rust
//! use std::time::Duration;
//!
//! use ttlkit::builder::CacheBuilder;
//! use ttlkit::item::Ttl;
//!
//! let cache = CacheBuilder::new()
//!     .capacity(100)
//!     .default_ttl(Duration::from_secs(60))
//!     .build();
//!
//! cache.insert(1, "hello".to_string(), Ttl::Default);
//! assert_eq!(cache.get(&1).map(|item| item.value().clone()), Some("hello".to_string()));
//! ```

use std::hash::Hash;
use std::time::Duration;

use crate::cache::Cache;
use crate::loader::Loader;

/// Builder for [`Cache`] instances.
pub struct CacheBuilder<K, V> {
    capacity: usize,
    default_ttl: Option<Duration>,
    touch_on_hit: bool,
    loader: Option<Box<dyn Loader<K, V>>>,
}

impl<K, V> CacheBuilder<K, V> {
    /// Starts from the defaults: unbounded, no default TTL, touch-on-hit
    /// enabled, no loader.
    pub fn new() -> Self {
        CacheBuilder {
            capacity: 0,
            default_ttl: None,
            touch_on_hit: true,
            loader: None,
        }
    }

    /// Maximum item count before LRU eviction on insert. Zero (the
    /// default) means unbounded.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// The TTL applied when an insert passes
    /// [`Ttl::Default`](crate::item::Ttl::Default). A zero duration means
    /// no expiration, which is also the default.
    pub fn default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = if ttl.is_zero() { None } else { Some(ttl) };
        self
    }

    /// Stops `get` from pushing an item's deadline out on every hit.
    pub fn disable_touch_on_hit(mut self) -> Self {
        self.touch_on_hit = false;
        self
    }

    /// Miss handler consulted by `get`. Wrap it in
    /// [`SuppressedLoader`](crate::loader::SuppressedLoader) to collapse
    /// concurrent misses on the same key.
    pub fn loader(mut self, loader: impl Loader<K, V> + 'static) -> Self {
        self.loader = Some(Box::new(loader));
        self
    }

    /// Builds the cache.
    pub fn build(self) -> Cache<K, V>
    where
        K: Clone + Eq + Hash + Send + Sync + 'static,
        V: Send + Sync + 'static,
    {
        Cache::from_parts(
            self.capacity,
            self.default_ttl,
            self.touch_on_hit,
            self.loader,
        )
    }
}

impl<K, V> Default for CacheBuilder<K, V> {
    fn default() -> Self {
        Self::new()
    }
}
