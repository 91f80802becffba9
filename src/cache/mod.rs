//! Cache store for offline support.
//!
//! This module provides named, versioned cache generations that:
//! - Map normalized GET requests to buffered response snapshots
//! - Replace entries on write (last write wins)
//! - Populate and evict generations atomically
//!
//! Caching strategies live in `crate::strategy` and only talk to the store
//! through the `CacheStorage` trait.

mod generation;
mod key;
mod storage;
mod traits;

pub use generation::{CacheGeneration, Role};
pub use key::RequestKey;
pub use storage::SqliteStorage;
pub use traits::CacheStorage;
