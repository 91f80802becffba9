//! Caching strategies keyed by request class.
//!
//! | class        | strategy               | generation |
//! |--------------|------------------------|------------|
//! | static asset | cache first            | static     |
//! | api          | network first          | dynamic    |
//! | other        | stale while revalidate | dynamic    |

mod cache_first;
mod network_first;
mod selector;
mod stale_while_revalidate;

use color_eyre::Result;
use tokio::task::JoinHandle;

pub use cache_first::cache_first;
pub use network_first::network_first;
pub use selector::Selector;
pub use stale_while_revalidate::stale_while_revalidate;

use crate::context::Context;
use crate::http::{Request, Response};

/// Request class produced by the selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestClass {
  StaticAsset,
  Api,
  Other,
}

/// Indicates where a response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
  /// Fresh from the network
  Network,
  /// Served from a cache generation
  Cache,
  /// Network failed on a navigation; cached index document served instead
  IndexFallback,
  /// Network and cache both failed; synthetic 503
  Offline,
}

/// Background cache refresh started by stale-while-revalidate.
///
/// Dropping the handle detaches the task; it is never cancelled.
pub type Revalidation = JoinHandle<Result<Response>>;

/// Result of running a strategy.
#[derive(Debug)]
pub struct FetchOutcome {
  pub response: Response,
  pub source: ResponseSource,
  pub revalidation: Option<Revalidation>,
}

impl FetchOutcome {
  pub fn new(response: Response, source: ResponseSource) -> Self {
    Self {
      response,
      source,
      revalidation: None,
    }
  }
}

/// Run the strategy for `class`.
pub async fn respond(ctx: &Context, class: RequestClass, request: Request) -> Result<FetchOutcome> {
  match class {
    RequestClass::StaticAsset => cache_first(ctx, request).await,
    RequestClass::Api => network_first(ctx, request).await,
    RequestClass::Other => stale_while_revalidate(ctx, request).await,
  }
}
