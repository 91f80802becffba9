//! The worker: one instance owns the cache store, the sync queue and the
//! lifecycle, and exposes one handler per host event.

pub mod clients;
pub mod lifecycle;
pub mod message;
pub mod push;
pub mod sync;

use color_eyre::Result;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{info, warn};

use crate::cache::{CacheStorage, SqliteStorage};
use crate::config::Config;
use crate::context::Context;
use crate::db::Database;
use crate::http::Request;
use crate::network::{HttpNetwork, Network};
use crate::strategy::{self, FetchOutcome, Selector};

use clients::{ClientRegistry, Clients, NotificationCenter, Notifier};
use lifecycle::{populate_static, Lifecycle, Registration, WorkerState};
use message::{ControlMessage, VersionReply};
use push::{ClickOutcome, NotificationDescriptor};
use sync::{Connectivity, PendingItem, SyncQueue};

/// Result of intercepting a request.
#[derive(Debug)]
pub enum FetchReply {
  /// Not ours to handle; the host performs the request normally
  PassThrough,
  Respond(Result<FetchOutcome>),
}

/// Cache generation summary for `status`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationStatus {
  pub name: String,
  pub entries: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
  pub state: WorkerState,
  pub version: String,
  /// Version whose generations currently serve requests
  pub active_version: Option<String>,
  pub online: bool,
  pub generations: Vec<GenerationStatus>,
  pub pending_sync: usize,
}

pub struct Worker {
  ctx: Context,
  selector: Selector,
  lifecycle: Lifecycle,
  queue: SyncQueue,
  connectivity: Connectivity,
  clients: Arc<dyn Clients>,
  notifier: Arc<dyn Notifier>,
}

impl Worker {
  /// Wire up a worker from explicit parts.
  pub fn new(
    config: Config,
    db: Arc<Database>,
    network: Arc<dyn Network>,
    clients: Arc<dyn Clients>,
    notifier: Arc<dyn Notifier>,
  ) -> Self {
    let storage: Arc<dyn CacheStorage> = Arc::new(SqliteStorage::new(Arc::clone(&db)));
    let selector = Selector::new(&config);
    let lifecycle = Lifecycle::new(config.skip_waiting, Registration::new(Arc::clone(&db)));

    Self {
      ctx: Context::new(config, storage, network),
      selector,
      lifecycle,
      queue: SyncQueue::new(db),
      connectivity: Connectivity::new(true),
      clients,
      notifier,
    }
  }

  /// Open the worker with the on-disk database, the real network and
  /// in-process client/notification surfaces.
  pub fn open(config: Config) -> Result<Self> {
    let db = Arc::new(Database::open(config.database.as_deref())?);
    let network = Arc::new(HttpNetwork::new()?);

    Ok(Self::new(
      config,
      db,
      network,
      Arc::new(ClientRegistry::new()),
      Arc::new(NotificationCenter::new()),
    ))
  }

  pub fn config(&self) -> &Config {
    &self.ctx.config
  }

  pub fn state(&self) -> Result<WorkerState> {
    self.lifecycle.state()
  }

  /// The version identifier reported to GET_VERSION.
  pub fn version(&self) -> String {
    self.ctx.config.static_generation().name().to_string()
  }

  pub async fn install(&self) -> Result<()> {
    self.lifecycle.install(&self.ctx, self.clients.as_ref()).await
  }

  pub async fn activate(&self) -> Result<()> {
    self.lifecycle.activate(&self.ctx, self.clients.as_ref()).await
  }

  /// Intercept a request.
  ///
  /// Until this worker activates, requests are served from the generations
  /// of the last activated version; if none ever activated they pass
  /// through.
  pub async fn fetch(&self, request: Request) -> FetchReply {
    let Some(class) = self.selector.classify(&request) else {
      return FetchReply::PassThrough;
    };

    match self.serving_context() {
      Ok(Some(ctx)) => FetchReply::Respond(strategy::respond(&ctx, class, request).await),
      Ok(None) => FetchReply::PassThrough,
      Err(err) => FetchReply::Respond(Err(err)),
    }
  }

  fn serving_context(&self) -> Result<Option<Context>> {
    if self.state()? == WorkerState::Activated {
      return Ok(Some(self.ctx.clone()));
    }

    Ok(match self.lifecycle.registration().active_version()? {
      Some(version) if version == self.ctx.config.version => Some(self.ctx.clone()),
      Some(version) => Some(self.ctx.for_version(&version)),
      None => None,
    })
  }

  /// Handle a posted control message. Malformed messages are logged and
  /// dropped.
  pub async fn message(&self, data: &[u8], port: Option<oneshot::Sender<VersionReply>>) -> Result<()> {
    let message = match ControlMessage::parse(data) {
      Ok(message) => message,
      Err(err) => {
        warn!(error = %err, "Ignoring message");
        return Ok(());
      }
    };
    info!(message = ?message, "Message received");

    match message {
      ControlMessage::SkipWaiting => {
        self
          .lifecycle
          .skip_waiting(&self.ctx, self.clients.as_ref())
          .await?
      }
      ControlMessage::GetVersion => match port {
        Some(port) => {
          if port
            .send(VersionReply {
              version: self.version(),
            })
            .is_err()
          {
            warn!("GET_VERSION reply port closed");
          }
        }
        None => warn!("GET_VERSION sent without a reply port"),
      },
      ControlMessage::ClearCache => self.clear_caches()?,
      ControlMessage::ForceUpdate => {
        let count = populate_static(&self.ctx).await?;
        info!(count, "Force update completed");
      }
      ControlMessage::Unknown(kind) => info!(kind, "Unknown message type"),
    }
    Ok(())
  }

  /// Delete every cache generation. Strategies repopulate the dynamic
  /// generation on demand; the static one returns on the next force update
  /// or install.
  pub fn clear_caches(&self) -> Result<()> {
    for name in self.ctx.storage.keys()? {
      self.ctx.storage.delete(&name)?;
    }
    info!("All caches cleared");
    Ok(())
  }

  pub async fn sync(&self, tag: &str) -> Result<()> {
    sync::background_sync(&self.ctx, &self.queue, tag).await
  }

  pub async fn periodic_sync(&self, tag: &str) -> Result<()> {
    sync::periodic_sync(&self.ctx, tag).await
  }

  /// Record a connectivity change; reconnecting triggers background sync.
  pub async fn set_online(&self, online: bool) -> Result<()> {
    if self.connectivity.set_online(online) {
      let tag = self.ctx.config.sync.background_tag.clone();
      self.sync(&tag).await?;
    }
    Ok(())
  }

  /// Queue an analytics payload for delivery on the next background sync.
  pub fn enqueue(&self, payload: &serde_json::Value) -> Result<i64> {
    self
      .queue
      .enqueue(&self.ctx.config.sync.background_tag, payload)
  }

  /// Items waiting for the next background sync, oldest first.
  pub fn pending(&self) -> Result<Vec<PendingItem>> {
    self.queue.pending(&self.ctx.config.sync.background_tag)
  }

  pub fn push(&self, data: Option<&[u8]>) -> Result<NotificationDescriptor> {
    push::handle_push(&self.ctx.config, self.notifier.as_ref(), data)
  }

  pub fn notification_click(&self, tag: &str, action: Option<&str>) -> Result<ClickOutcome> {
    push::handle_click(
      &self.ctx.config,
      self.notifier.as_ref(),
      self.clients.as_ref(),
      tag,
      action,
    )
  }

  pub fn status(&self) -> Result<Status> {
    let generations = self
      .ctx
      .storage
      .keys()?
      .into_iter()
      .map(|name| {
        let entries = self.ctx.storage.entry_count(&name)?;
        Ok(GenerationStatus { name, entries })
      })
      .collect::<Result<Vec<_>>>()?;

    Ok(Status {
      state: self.state()?,
      version: self.version(),
      active_version: self.lifecycle.registration().active_version()?,
      online: self.connectivity.is_online(),
      generations,
      pending_sync: self.queue.count()?,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::http::{Destination, Response};
  use crate::strategy::ResponseSource;
  use crate::test_support::{config, route_shell, url, FakeNetwork};
  use serde_json::json;

  fn worker(network: Arc<FakeNetwork>) -> Worker {
    worker_on(
      config(),
      Arc::new(Database::open_in_memory().unwrap()),
      network,
    )
  }

  fn worker_on(config: Config, db: Arc<Database>, network: Arc<FakeNetwork>) -> Worker {
    Worker::new(
      config,
      db,
      network,
      Arc::new(ClientRegistry::new()),
      Arc::new(NotificationCenter::new()),
    )
  }

  fn respond(reply: FetchReply) -> FetchOutcome {
    match reply {
      FetchReply::Respond(result) => result.unwrap(),
      FetchReply::PassThrough => panic!("expected the worker to respond"),
    }
  }

  #[tokio::test]
  async fn test_shell_served_offline_after_install() {
    let network = FakeNetwork::new();
    route_shell(&network);
    let worker = worker(network.clone());
    worker.install().await.unwrap();
    assert_eq!(worker.state().unwrap(), WorkerState::Activated);

    network.set_offline(true);
    let calls_before = network.call_count();

    for path in worker.config().manifest() {
      let outcome = respond(worker.fetch(Request::get(url(&path))).await);
      assert_eq!(outcome.source, ResponseSource::Cache);
      assert_eq!(outcome.response.body, format!("shell:{}", path).into_bytes());
    }

    let outcome = respond(
      worker
        .fetch(Request::get(url("/coba-web-app/index.html")).with_destination(Destination::Document))
        .await,
    );
    assert_eq!(outcome.response.status, 200);
    assert_eq!(outcome.response.body, b"shell:/coba-web-app/index.html");
    assert_eq!(network.call_count(), calls_before);
  }

  #[tokio::test]
  async fn test_api_with_cached_entry_offline() {
    let network = FakeNetwork::new();
    network.route("/coba-web-app/api/content/latest", Response::new(200, "latest"));
    route_shell(&network);
    let worker = worker(network.clone());
    worker.install().await.unwrap();
    worker.periodic_sync("content-sync").await.unwrap();

    network.set_offline(true);
    let outcome = respond(
      worker
        .fetch(Request::get(url("/coba-web-app/api/content/latest")))
        .await,
    );

    assert_eq!(outcome.source, ResponseSource::Cache);
    assert_eq!(outcome.response.body, b"latest");
  }

  #[tokio::test]
  async fn test_non_get_passes_through() {
    let worker = worker(FakeNetwork::new());
    let reply = worker
      .fetch(Request::post_json(url("/coba-web-app/api/analytics"), b"{}".to_vec()))
      .await;
    assert!(matches!(reply, FetchReply::PassThrough));
  }

  #[tokio::test]
  async fn test_get_version_replies_with_static_generation() {
    let worker = worker(FakeNetwork::new());
    let (tx, rx) = oneshot::channel();

    worker
      .message(br#"{"type":"GET_VERSION"}"#, Some(tx))
      .await
      .unwrap();

    assert_eq!(rx.await.unwrap().version, "static-v1");
  }

  #[tokio::test]
  async fn test_malformed_and_unknown_messages_are_ignored() {
    let worker = worker(FakeNetwork::new());
    worker.message(b"{oops", None).await.unwrap();
    worker.message(br#"{"type":"PING"}"#, None).await.unwrap();
    worker.message(br#"{"type":"GET_VERSION"}"#, None).await.unwrap();
  }

  #[tokio::test]
  async fn test_clear_cache_deletes_all_generations() {
    let network = FakeNetwork::new();
    route_shell(&network);
    network.route("/coba-web-app/img/logo.png", Response::new(200, "png"));
    let worker = worker(network);
    worker.install().await.unwrap();
    respond(worker.fetch(Request::get(url("/coba-web-app/img/logo.png"))).await);
    assert_eq!(worker.status().unwrap().generations.len(), 2);

    worker
      .message(br#"{"type":"CLEAR_CACHE"}"#, None)
      .await
      .unwrap();

    assert!(worker.status().unwrap().generations.is_empty());
  }

  #[tokio::test]
  async fn test_force_update_refreshes_shell() {
    let network = FakeNetwork::new();
    route_shell(&network);
    let worker = worker(network.clone());
    worker.install().await.unwrap();

    network.route("/coba-web-app/app.js", Response::new(200, "app v2"));
    worker
      .message(br#"{"type":"FORCE_UPDATE"}"#, None)
      .await
      .unwrap();

    let outcome = respond(worker.fetch(Request::get(url("/coba-web-app/app.js"))).await);
    assert_eq!(outcome.response.body, b"app v2");
  }

  #[tokio::test]
  async fn test_skip_waiting_message() {
    let network = FakeNetwork::new();
    route_shell(&network);
    let mut config = config();
    config.skip_waiting = false;
    let worker = worker_on(config, Arc::new(Database::open_in_memory().unwrap()), network);

    worker.install().await.unwrap();
    assert_eq!(worker.state().unwrap(), WorkerState::Installed);

    worker
      .message(br#"{"type":"SKIP_WAITING"}"#, None)
      .await
      .unwrap();
    assert_eq!(worker.state().unwrap(), WorkerState::Activated);
  }

  #[tokio::test]
  async fn test_reconnect_drains_queue() {
    let network = FakeNetwork::new();
    network.route("/coba-web-app/api/analytics", Response::new(200, ""));
    let worker = worker(network.clone());
    worker.enqueue(&json!({"event": "open"})).unwrap();
    worker.enqueue(&json!({"event": "close"})).unwrap();

    worker.set_online(false).await.unwrap();
    assert_eq!(worker.status().unwrap().pending_sync, 2);

    worker.set_online(true).await.unwrap();
    assert_eq!(worker.status().unwrap().pending_sync, 0);
    assert_eq!(network.call_count(), 2);
  }

  #[tokio::test]
  async fn test_status_reports_generations() {
    let network = FakeNetwork::new();
    route_shell(&network);
    let worker = worker(network);
    worker.install().await.unwrap();

    let status = worker.status().unwrap();
    assert_eq!(status.version, "static-v1");
    assert_eq!(
      status.generations,
      vec![GenerationStatus {
        name: "static-v1".to_string(),
        entries: 5,
      }]
    );
    assert_eq!(status.pending_sync, 0);
  }

  #[tokio::test]
  async fn test_nothing_intercepted_before_first_activation() {
    let network = FakeNetwork::new();
    route_shell(&network);
    let worker = worker(network.clone());

    let reply = worker.fetch(Request::get(url("/coba-web-app/index.html"))).await;
    assert!(matches!(reply, FetchReply::PassThrough));
    assert_eq!(network.call_count(), 0);
  }

  #[tokio::test]
  async fn test_failed_upgrade_keeps_serving_previous_version() {
    let network = FakeNetwork::new();
    route_shell(&network);
    let db = Arc::new(Database::open_in_memory().unwrap());
    let v1 = worker_on(config(), Arc::clone(&db), network.clone());
    v1.install().await.unwrap();

    network.set_offline(true);
    let mut next = config();
    next.version = "v2".to_string();
    let v2 = worker_on(next, db, network);
    assert!(v2.install().await.is_err());
    assert_eq!(v2.state().unwrap(), WorkerState::Redundant);

    let outcome = respond(
      v2.fetch(Request::get(url("/coba-web-app/")).with_destination(Destination::Document))
        .await,
    );
    assert_eq!(outcome.source, ResponseSource::Cache);
    assert_eq!(outcome.response.body, b"shell:/coba-web-app/");

    let status = v2.status().unwrap();
    assert_eq!(status.active_version.as_deref(), Some("v1"));
    assert_eq!(
      status.generations,
      vec![GenerationStatus {
        name: "static-v1".to_string(),
        entries: 5,
      }]
    );
  }

  #[tokio::test]
  async fn test_waiting_worker_serves_previous_version_until_activated() {
    let network = FakeNetwork::new();
    route_shell(&network);
    let db = Arc::new(Database::open_in_memory().unwrap());
    worker_on(config(), Arc::clone(&db), network.clone())
      .install()
      .await
      .unwrap();

    network.route("/coba-web-app/app.js", Response::new(200, "app v2"));
    let mut next = config();
    next.version = "v2".to_string();
    next.skip_waiting = false;
    let v2 = worker_on(next, db, network);
    v2.install().await.unwrap();

    let app = || Request::get(url("/coba-web-app/app.js"));
    let outcome = respond(v2.fetch(app()).await);
    assert_eq!(outcome.response.body, b"shell:/coba-web-app/app.js");

    v2.activate().await.unwrap();
    let outcome = respond(v2.fetch(app()).await);
    assert_eq!(outcome.response.body, b"app v2");
    assert_eq!(v2.status().unwrap().active_version.as_deref(), Some("v2"));
  }
}
