//! Normalized cache keys for requests.

use reqwest::Method;
use sha2::{Digest, Sha256};
use url::Url;

use crate::http::Request;

/// Cache key for a GET request: method + URL without fragment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
  hash: String,
  url: String,
}

impl RequestKey {
  /// Build the key for `request`. Only GET requests are cacheable.
  pub fn for_request(request: &Request) -> Option<Self> {
    if request.method != Method::GET {
      return None;
    }
    Some(Self::for_url(&request.url))
  }

  /// Key for a GET of `url`.
  pub fn for_url(url: &Url) -> Self {
    let mut url = url.clone();
    url.set_fragment(None);
    let url = url.to_string();

    // SHA256 hash for stable, fixed-length keys
    let mut hasher = Sha256::new();
    hasher.update(Method::GET.as_str().as_bytes());
    hasher.update(b" ");
    hasher.update(url.as_bytes());

    Self {
      hash: hex::encode(hasher.finalize()),
      url,
    }
  }

  pub fn hash(&self) -> &str {
    &self.hash
  }

  /// The normalized URL this key was built from.
  pub fn url(&self) -> &str {
    &self.url
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn url(s: &str) -> Url {
    Url::parse(s).unwrap()
  }

  #[test]
  fn test_fragment_is_ignored() {
    let a = RequestKey::for_url(&url("https://example.com/app/index.html"));
    let b = RequestKey::for_url(&url("https://example.com/app/index.html#top"));
    assert_eq!(a, b);
    assert_eq!(a.url(), "https://example.com/app/index.html");
  }

  #[test]
  fn test_query_is_significant() {
    let a = RequestKey::for_url(&url("https://example.com/api/items?page=1"));
    let b = RequestKey::for_url(&url("https://example.com/api/items?page=2"));
    assert_ne!(a.hash(), b.hash());
    assert_eq!(a.hash().len(), 64);
  }

  #[test]
  fn test_non_get_has_no_key() {
    let request = Request::post_json(url("https://example.com/api/analytics"), b"{}".to_vec());
    assert!(RequestKey::for_request(&request).is_none());
    assert!(RequestKey::for_request(&Request::get(url("https://example.com/"))).is_some());
  }
}
