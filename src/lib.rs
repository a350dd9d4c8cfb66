//! ttlkit: in-process key/value cache with per-item TTL, LRU capacity
//! eviction, observer callbacks, and on-demand loading.
//!
//! ```
//! use std::time::Duration;
//!
//! use ttlkit::builder::CacheBuilder;
//! use ttlkit::item::Ttl;
//!
//! let cache = CacheBuilder::new()
//!     .capacity(1024)
//!     .default_ttl(Duration::from_secs(300))
//!     .build();
//!
//! cache.insert("session".to_string(), vec![1u8, 2, 3], Ttl::Default);
//! assert!(cache.contains(&"session".to_string()));
//! ```
//!
//! Expiration runs either on demand (`Cache::remove_expired`) or through
//! the background driver (`Cache::start` on a dedicated thread, stopped
//! with `Cache::stop`).

mod ds;

pub mod builder;
pub mod cache;
pub mod error;
pub mod events;
pub mod item;
pub mod loader;
pub mod metrics;
pub mod prelude;
