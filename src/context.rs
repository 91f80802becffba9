use color_eyre::Result;
use std::sync::Arc;

use crate::cache::{CacheStorage, RequestKey};
use crate::config::Config;
use crate::network::Network;

/// Worker-scoped state shared by every event task.
///
/// Cloning is cheap; all fields are reference counted. The cache store is
/// only ever mutated through `storage`.
#[derive(Clone)]
pub struct Context {
  pub config: Arc<Config>,
  pub storage: Arc<dyn CacheStorage>,
  pub network: Arc<dyn Network>,
}

impl Context {
  pub fn new(config: Config, storage: Arc<dyn CacheStorage>, network: Arc<dyn Network>) -> Self {
    Self {
      config: Arc::new(config),
      storage,
      network,
    }
  }

  /// The same context addressing another version's cache generations.
  pub fn for_version(&self, version: &str) -> Self {
    let mut config = (*self.config).clone();
    config.version = version.to_string();

    Self {
      config: Arc::new(config),
      storage: Arc::clone(&self.storage),
      network: Arc::clone(&self.network),
    }
  }

  /// Cache key for a GET of a root-relative path on the app origin.
  pub fn key_for_path(&self, path: &str) -> Result<RequestKey> {
    Ok(RequestKey::for_url(&self.config.url_for(path)?))
  }
}
