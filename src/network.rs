//! Outbound network access.

use futures::future::BoxFuture;
use thiserror::Error;

use crate::http::{Request, Response};

/// Transport-level fetch failure (offline, DNS, connection reset...).
///
/// An HTTP error status is not a `NetworkError`; it arrives as a `Response`.
#[derive(Debug, Clone, Error)]
pub enum NetworkError {
  #[error("request to {url} failed: {reason}")]
  Unreachable { url: String, reason: String },

  #[error("failed to read response body from {url}: {reason}")]
  Body { url: String, reason: String },
}

/// The network as seen by the worker.
pub trait Network: Send + Sync {
  fn fetch(&self, request: Request) -> BoxFuture<'static, Result<Response, NetworkError>>;
}

/// `Network` backed by a shared reqwest client.
#[derive(Clone)]
pub struct HttpNetwork {
  client: reqwest::Client,
}

impl HttpNetwork {
  pub fn new() -> color_eyre::Result<Self> {
    let client = reqwest::Client::builder()
      .user_agent(concat!("offline-worker/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| color_eyre::eyre::eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { client })
  }
}

impl Network for HttpNetwork {
  fn fetch(&self, request: Request) -> BoxFuture<'static, Result<Response, NetworkError>> {
    let client = self.client.clone();

    Box::pin(async move {
      let url = request.url.to_string();

      let mut builder = client.request(request.method, request.url);
      for (name, value) in &request.headers {
        builder = builder.header(name.as_str(), value.as_str());
      }
      if let Some(body) = request.body {
        builder = builder.body(body);
      }

      let response = builder.send().await.map_err(|e| NetworkError::Unreachable {
        url: url.clone(),
        reason: e.to_string(),
      })?;

      let status = response.status();
      let headers = response
        .headers()
        .iter()
        .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.to_string(), v.to_string())))
        .collect();

      let body = response.bytes().await.map_err(|e| NetworkError::Body {
        url,
        reason: e.to_string(),
      })?;

      Ok(Response {
        status: status.as_u16(),
        status_text: status.canonical_reason().unwrap_or_default().to_string(),
        headers,
        body: body.to_vec(),
      })
    })
  }
}
