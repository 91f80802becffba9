//! Core traits and types for the cache store.

use chrono::{DateTime, Utc};
use color_eyre::Result;

use super::key::RequestKey;
use crate::http::Response;

/// A response read back from a cache generation.
#[derive(Debug, Clone)]
pub struct CachedResponse {
  pub response: Response,
  /// When the entry was last written
  pub cached_at: DateTime<Utc>,
}

/// Storage for named cache generations.
///
/// Implementations must make `put` safe under concurrent use (last write
/// wins), and `put_all` / `retain` must be atomic towards readers.
pub trait CacheStorage: Send + Sync {
  /// Names of all existing generations, oldest first.
  fn keys(&self) -> Result<Vec<String>>;

  /// Delete a generation and its entries. Returns false if it did not exist.
  fn delete(&self, generation: &str) -> Result<bool>;

  /// Delete every generation not named in `keep`, in one step.
  /// Returns the names that were deleted.
  fn retain(&self, keep: &[&str]) -> Result<Vec<String>>;

  /// Look up a request in one generation.
  fn match_request(&self, generation: &str, key: &RequestKey) -> Result<Option<CachedResponse>>;

  /// Store (or replace) a single entry, opening the generation if needed.
  fn put(&self, generation: &str, key: &RequestKey, response: &Response) -> Result<()>;

  /// Store several entries, all or nothing.
  fn put_all(&self, generation: &str, entries: &[(RequestKey, Response)]) -> Result<()>;

  /// Number of entries in a generation.
  fn entry_count(&self, generation: &str) -> Result<usize>;
}
