//! Error types for the ttlkit library.
//!
//! Most of the public surface encodes absence as `Option`; the error type
//! exists for the explicit-error variants and the driver lifecycle.
//!
//! ## Example Usage
//!
//! ```
//! use ttlkit::cache::Cache;
//! use ttlkit::error::CacheError;
//!
//! let cache: Cache<String, String> = Cache::new();
//! let err = cache.try_get(&"missing".to_string()).unwrap_err();
//! assert_eq!(err, CacheError::NotFound);
//! ```

use std::fmt;

/// Error returned by the explicit-error lookup variant and the driver
/// lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheError {
    /// The expiration driver was torn down with `stop` and cannot run
    /// again.
    Closed,
    /// The operation required a key that is absent (or expired).
    NotFound,
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheError::Closed => f.write_str("cache driver has been stopped"),
            CacheError::NotFound => f.write_str("key not found"),
        }
    }
}

impl std::error::Error for CacheError {}
