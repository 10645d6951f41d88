//! Versioned response caches.
//!
//! This module provides the storage side of the agent:
//! - Named stores, one per cache generation
//! - Response snapshots keyed by normalized request (method, URL, vary headers)
//! - A SQLite backend that persists stores across runs

mod key;
mod storage;
mod traits;

pub use key::{RequestKey, VaryHeaders};
pub use storage::SqliteStorage;
pub use traits::{CacheStorage, CachedResponse};
