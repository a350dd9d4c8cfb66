pub use crate::builder::CacheBuilder;
pub use crate::cache::Cache;
pub use crate::error::CacheError;
pub use crate::events::{EvictionReason, ListenerHandle};
pub use crate::item::{ItemView, Ttl};
pub use crate::loader::{Loader, SuppressedLoader};
pub use crate::metrics::MetricsSnapshot;
