use color_eyre::{eyre::eyre, Result};
use tracing::{debug, warn};

use super::{FetchOutcome, ResponseSource};
use crate::cache::RequestKey;
use crate::context::Context;
use crate::http::{Request, Response};

/// Stale-while-revalidate strategy for everything that is neither shell nor API.
///
/// The cached copy (if any) is returned without waiting on the network. The
/// refresh runs as a detached task whose only effect is a cache write.
pub async fn stale_while_revalidate(ctx: &Context, request: Request) -> Result<FetchOutcome> {
  let generation = ctx.config.dynamic_generation();
  let key = RequestKey::for_request(&request)
    .ok_or_else(|| eyre!("{} {} is not cacheable", request.method, request.url))?;

  let cached = ctx.storage.match_request(generation.name(), &key)?;

  let url = key.url().to_string();
  let refresh = tokio::spawn(revalidate(ctx.clone(), key, request));

  match cached {
    Some(cached) => {
      debug!(url = %url, "Serving stale, revalidating");
      Ok(FetchOutcome {
        response: cached.response,
        source: ResponseSource::Cache,
        revalidation: Some(refresh),
      })
    }
    None => {
      let response = refresh
        .await
        .map_err(|e| eyre!("Revalidation task failed: {}", e))??;
      Ok(FetchOutcome::new(response, ResponseSource::Network))
    }
  }
}

async fn revalidate(ctx: Context, key: RequestKey, request: Request) -> Result<Response> {
  let generation = ctx.config.dynamic_generation();

  let response = match ctx.network.fetch(request).await {
    Ok(response) => response,
    Err(err) => {
      warn!(url = %key.url(), error = %err, "Network error");
      return Err(err.into());
    }
  };

  if response.is_ok() {
    if let Err(err) = ctx.storage.put(generation.name(), &key, &response) {
      warn!(url = %key.url(), error = %err, "Failed to store revalidated response");
      return Err(err);
    }
  }

  Ok(response)
}
