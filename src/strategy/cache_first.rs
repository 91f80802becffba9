use color_eyre::{eyre::eyre, Result};
use tracing::{debug, warn};

use super::{FetchOutcome, ResponseSource};
use crate::cache::RequestKey;
use crate::context::Context;
use crate::http::Request;

/// Cache-first strategy for the application shell.
///
/// 1. Serve from the static generation if present (no network check)
/// 2. Otherwise fetch, storing 2xx responses in the static generation
/// 3. On network failure, navigations get the cached index document
pub async fn cache_first(ctx: &Context, request: Request) -> Result<FetchOutcome> {
  let generation = ctx.config.static_generation();
  let key = RequestKey::for_request(&request)
    .ok_or_else(|| eyre!("{} {} is not cacheable", request.method, request.url))?;

  if let Some(cached) = ctx.storage.match_request(generation.name(), &key)? {
    debug!(url = %request.url, cached_at = %cached.cached_at, "Serving from cache");
    return Ok(FetchOutcome::new(cached.response, ResponseSource::Cache));
  }

  let is_navigation = request.is_navigation();
  match ctx.network.fetch(request).await {
    Ok(response) => {
      if response.is_ok() {
        ctx.storage.put(generation.name(), &key, &response)?;
      }
      Ok(FetchOutcome::new(response, ResponseSource::Network))
    }
    Err(err) => {
      warn!(url = %key.url(), error = %err, "Cache first fetch failed");

      if is_navigation {
        let index = ctx.key_for_path(&ctx.config.index_path())?;
        if let Some(cached) = ctx.storage.match_request(generation.name(), &index)? {
          return Ok(FetchOutcome::new(
            cached.response,
            ResponseSource::IndexFallback,
          ));
        }
      }

      Err(err.into())
    }
  }
}
