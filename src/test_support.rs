//! Shared fixtures for unit tests.

use futures::future::BoxFuture;
use reqwest::Method;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use url::Url;

use crate::cache::SqliteStorage;
use crate::config::Config;
use crate::context::Context;
use crate::db::Database;
use crate::http::{Request, Response};
use crate::network::{Network, NetworkError};

pub const ORIGIN: &str = "https://example.github.io";

#[derive(Default)]
struct FakeState {
  routes: HashMap<String, Response>,
  offline: bool,
  fail_body: Option<String>,
  calls: Vec<(Method, String)>,
  gate: Option<Arc<Notify>>,
  held: HashMap<String, Arc<Notify>>,
}

/// Scripted in-process network.
///
/// Routes are keyed by URL path; unknown paths answer 404.
#[derive(Default)]
pub struct FakeNetwork {
  state: Mutex<FakeState>,
}

impl FakeNetwork {
  pub fn new() -> Arc<Self> {
    Arc::new(Self::default())
  }

  pub fn route(&self, path: &str, response: Response) {
    self
      .state
      .lock()
      .unwrap()
      .routes
      .insert(path.to_string(), response);
  }

  pub fn set_offline(&self, offline: bool) {
    self.state.lock().unwrap().offline = offline;
  }

  /// Fail any request whose body contains `needle`.
  pub fn fail_body_containing(&self, needle: Option<&str>) {
    self.state.lock().unwrap().fail_body = needle.map(String::from);
  }

  /// Hold every subsequent fetch until the returned `Notify` is signalled.
  pub fn hold(&self) -> Arc<Notify> {
    let gate = Arc::new(Notify::new());
    self.state.lock().unwrap().gate = Some(gate.clone());
    gate
  }

  /// Hold fetches of one path only.
  pub fn hold_path(&self, path: &str) -> Arc<Notify> {
    let gate = Arc::new(Notify::new());
    self
      .state
      .lock()
      .unwrap()
      .held
      .insert(path.to_string(), gate.clone());
    gate
  }

  pub fn release(&self) {
    self.state.lock().unwrap().gate = None;
  }

  pub fn calls(&self) -> Vec<(Method, String)> {
    self.state.lock().unwrap().calls.clone()
  }

  pub fn call_count(&self) -> usize {
    self.state.lock().unwrap().calls.len()
  }
}

impl Network for FakeNetwork {
  fn fetch(&self, request: Request) -> BoxFuture<'static, Result<Response, NetworkError>> {
    let mut state = self.state.lock().unwrap();
    state
      .calls
      .push((request.method.clone(), request.url.path().to_string()));

    let body_fails = match (&state.fail_body, &request.body) {
      (Some(needle), Some(body)) => String::from_utf8_lossy(body).contains(needle.as_str()),
      _ => false,
    };

    let result = if state.offline || body_fails {
      Err(NetworkError::Unreachable {
        url: request.url.to_string(),
        reason: "offline".to_string(),
      })
    } else {
      Ok(
        state
          .routes
          .get(request.url.path())
          .cloned()
          .unwrap_or_else(|| Response::new(404, "not found")),
      )
    };
    let gate = state
      .gate
      .clone()
      .or_else(|| state.held.get(request.url.path()).cloned());

    Box::pin(async move {
      if let Some(gate) = gate {
        gate.notified().await;
      }
      result
    })
  }
}

pub fn config() -> Config {
  Config::from_yaml(&format!(
    "origin: {}\nbase_path: /coba-web-app\nversion: v1\napp_name: Coba Web App\n",
    ORIGIN
  ))
  .unwrap()
}

pub fn url(path: &str) -> Url {
  Url::parse(ORIGIN).unwrap().join(path).unwrap()
}

pub fn context(network: Arc<FakeNetwork>) -> Context {
  context_with(config(), network)
}

pub fn context_with(config: Config, network: Arc<FakeNetwork>) -> Context {
  let db = Arc::new(Database::open_in_memory().unwrap());
  Context::new(config, Arc::new(SqliteStorage::new(db)), network)
}

/// Route every manifest entry of the test config.
pub fn route_shell(network: &FakeNetwork) {
  for path in config().manifest() {
    network.route(&path, Response::new(200, format!("shell:{}", path)));
  }
}
