//! Request classification.

use reqwest::Method;
use std::collections::HashSet;

use super::RequestClass;
use crate::config::Config;
use crate::http::Request;

/// Classifies intercepted requests by URL shape.
#[derive(Debug, Clone)]
pub struct Selector {
  manifest: HashSet<String>,
  base_path: String,
  app_root: String,
  api_prefix: String,
}

impl Selector {
  pub fn new(config: &Config) -> Self {
    Self {
      manifest: config.manifest().into_iter().collect(),
      base_path: config.base_path.clone(),
      app_root: config.app_root(),
      api_prefix: config.api_prefix(),
    }
  }

  /// Classify `request`, or `None` if it must pass through untouched
  /// (non-GET, or a scheme the network cannot serve).
  pub fn classify(&self, request: &Request) -> Option<RequestClass> {
    if request.method != Method::GET {
      return None;
    }
    if !matches!(request.url.scheme(), "http" | "https") {
      return None;
    }

    let path = request.url.path();
    if self.manifest.contains(path) || path == self.app_root || path == self.base_path {
      Some(RequestClass::StaticAsset)
    } else if path.starts_with(&self.api_prefix) {
      Some(RequestClass::Api)
    } else {
      Some(RequestClass::Other)
    }
  }
}
