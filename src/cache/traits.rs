//! Cache store interface.

use chrono::{DateTime, Utc};
use color_eyre::Result;

use crate::http::{Request, Response};

/// A response found in a cache store.
#[derive(Debug, Clone)]
pub struct CachedResponse {
  /// The stored snapshot
  pub response: Response,
  /// When the snapshot was written
  pub cached_at: DateTime<Utc>,
}

/// Named cache stores holding response snapshots keyed by request.
///
/// Stores are addressed by name; the agent uses its version tag as the name.
pub trait CacheStorage: Send + Sync {
  /// Create the named store if it does not exist yet.
  fn open(&self, cache: &str) -> Result<()>;

  /// Whether the named store exists.
  fn has(&self, cache: &str) -> Result<bool>;

  /// Names of all stores, in creation order.
  fn keys(&self) -> Result<Vec<String>>;

  /// Delete a store and every entry in it. Returns false if it did not exist.
  fn delete(&self, cache: &str) -> Result<bool>;

  /// Find the stored response for a request. Only `GET` requests match.
  fn match_request(&self, cache: &str, request: &Request) -> Result<Option<CachedResponse>>;

  /// Store a response for a request, replacing any previous entry.
  /// Creates the store if needed.
  fn put(&self, cache: &str, request: &Request, response: &Response) -> Result<()>;

  /// Store several entries atomically: either all are written or none.
  fn put_all(&self, cache: &str, entries: &[(Request, Response)]) -> Result<()>;
}
