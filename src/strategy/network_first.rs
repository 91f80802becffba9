use color_eyre::{eyre::eyre, Result};
use tracing::info;

use super::{FetchOutcome, ResponseSource};
use crate::cache::RequestKey;
use crate::context::Context;
use crate::http::{Request, Response};

/// Network-first strategy for API requests.
///
/// Network failures never reach the caller: they fall back to the dynamic
/// generation, then to a synthetic 503 JSON response.
pub async fn network_first(ctx: &Context, request: Request) -> Result<FetchOutcome> {
  let generation = ctx.config.dynamic_generation();
  let key = RequestKey::for_request(&request)
    .ok_or_else(|| eyre!("{} {} is not cacheable", request.method, request.url))?;

  match ctx.network.fetch(request).await {
    Ok(response) => {
      if response.is_ok() {
        ctx.storage.put(generation.name(), &key, &response)?;
      }
      Ok(FetchOutcome::new(response, ResponseSource::Network))
    }
    Err(err) => {
      info!(url = %key.url(), error = %err, "Network failed, trying cache");

      if let Some(cached) = ctx.storage.match_request(generation.name(), &key)? {
        info!(url = %key.url(), cached_at = %cached.cached_at, "Serving cached response");
        return Ok(FetchOutcome::new(cached.response, ResponseSource::Cache));
      }

      Ok(FetchOutcome::new(
        Response::offline(&ctx.config.offline_message()),
        ResponseSource::Offline,
      ))
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::http::OfflineBody;
  use crate::test_support::{context, url, FakeNetwork};

  #[tokio::test]
  async fn test_network_response_is_cached() {
    let network = FakeNetwork::new();
    network.route("/coba-web-app/api/items", Response::new(200, "[1,2]"));
    let ctx = context(network.clone());

    let outcome = network_first(&ctx, Request::get(url("/coba-web-app/api/items")))
      .await
      .unwrap();
    assert_eq!(outcome.source, ResponseSource::Network);
    assert_eq!(ctx.storage.entry_count("dynamic-v1").unwrap(), 1);
  }

  #[tokio::test]
  async fn test_network_preferred_over_cache() {
    let network = FakeNetwork::new();
    network.route("/coba-web-app/api/items", Response::new(200, "fresh"));
    let ctx = context(network);
    let key = ctx.key_for_path("/coba-web-app/api/items").unwrap();
    ctx
      .storage
      .put("dynamic-v1", &key, &Response::new(200, "stale"))
      .unwrap();

    let outcome = network_first(&ctx, Request::get(url("/coba-web-app/api/items")))
      .await
      .unwrap();
    assert_eq!(outcome.response.body, b"fresh");
  }

  #[tokio::test]
  async fn test_offline_serves_cached_entry() {
    let network = FakeNetwork::new();
    network.route("/coba-web-app/api/content/latest", Response::new(200, "latest"));
    let ctx = context(network.clone());

    network_first(&ctx, Request::get(url("/coba-web-app/api/content/latest")))
      .await
      .unwrap();

    network.set_offline(true);
    let outcome = network_first(&ctx, Request::get(url("/coba-web-app/api/content/latest")))
      .await
      .unwrap();

    assert_eq!(outcome.source, ResponseSource::Cache);
    assert_eq!(outcome.response.status, 200);
    assert_eq!(outcome.response.body, b"latest");
  }

  #[tokio::test]
  async fn test_offline_without_cache_is_503() {
    let network = FakeNetwork::new();
    network.set_offline(true);
    let ctx = context(network);

    let outcome = network_first(&ctx, Request::get(url("/coba-web-app/api/items")))
      .await
      .unwrap();

    assert_eq!(outcome.source, ResponseSource::Offline);
    assert_eq!(outcome.response.status, 503);
    assert_eq!(
      outcome.response.header("Content-Type"),
      Some("application/json")
    );
    let body: OfflineBody = serde_json::from_slice(&outcome.response.body).unwrap();
    assert_eq!(body.error, "Offline");
    assert_eq!(body.message, "Coba Web App is offline");
  }

  #[tokio::test]
  async fn test_error_status_is_returned_uncached() {
    let network = FakeNetwork::new();
    network.route("/coba-web-app/api/items", Response::new(500, "boom"));
    let ctx = context(network);

    let outcome = network_first(&ctx, Request::get(url("/coba-web-app/api/items")))
      .await
      .unwrap();
    assert_eq!(outcome.response.status, 500);
    assert_eq!(ctx.storage.entry_count("dynamic-v1").unwrap(), 0);
  }
}
