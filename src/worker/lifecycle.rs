//! Install / activate state machine.

use color_eyre::{eyre::eyre, Result};
use futures::future::try_join_all;
use rusqlite::{params, OptionalExtension};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{error, info};

use super::clients::Clients;
use crate::cache::RequestKey;
use crate::context::Context;
use crate::db::Database;
use crate::http::{Request, Response};
use crate::network::Network;

/// Worker lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
  /// Loaded, install not started
  Parsed,
  Installing,
  /// Installed, waiting to activate
  Installed,
  Activating,
  /// Active and controlling clients
  Activated,
  /// Install failed; this instance will never activate
  Redundant,
}

#[derive(Debug, Error)]
pub enum LifecycleError {
  #[error("cannot {operation} while {state:?}")]
  InvalidState {
    operation: &'static str,
    state: WorkerState,
  },

  #[error("failed to cache {url}: {reason}")]
  AssetUnavailable { url: String, reason: String },
}

/// Persistent record of which version last activated.
///
/// Survives restarts, so a new worker that has not activated yet (or never
/// will) can keep serving the generations of the one before it.
#[derive(Clone)]
pub struct Registration {
  db: Arc<Database>,
}

impl Registration {
  pub fn new(db: Arc<Database>) -> Self {
    Self { db }
  }

  pub fn active_version(&self) -> Result<Option<String>> {
    self
      .db
      .lock()?
      .query_row(
        "SELECT active_version FROM registration WHERE id = 1",
        [],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| eyre!("Failed to read registration: {}", e))
  }

  pub fn set_active_version(&self, version: &str) -> Result<()> {
    self
      .db
      .lock()?
      .execute(
        "INSERT INTO registration (id, active_version) VALUES (1, ?)
         ON CONFLICT(id) DO UPDATE SET
           active_version = excluded.active_version,
           activated_at = datetime('now')",
        params![version],
      )
      .map_err(|e| eyre!("Failed to record active version {}: {}", version, e))?;
    Ok(())
  }
}

/// Drives install and activate.
///
/// Transitions hold an async mutex for their whole duration, so an install
/// always finishes (or fails) before an activate starts.
pub struct Lifecycle {
  state: Mutex<WorkerState>,
  transition: tokio::sync::Mutex<()>,
  skip_waiting: AtomicBool,
  registration: Registration,
}

impl Lifecycle {
  pub fn new(skip_waiting: bool, registration: Registration) -> Self {
    Self {
      state: Mutex::new(WorkerState::Parsed),
      transition: tokio::sync::Mutex::new(()),
      skip_waiting: AtomicBool::new(skip_waiting),
      registration,
    }
  }

  pub fn state(&self) -> Result<WorkerState> {
    self
      .state
      .lock()
      .map(|s| *s)
      .map_err(|e| eyre!("Lock poisoned: {}", e))
  }

  fn set_state(&self, state: WorkerState) -> Result<()> {
    let mut s = self.state.lock().map_err(|e| eyre!("Lock poisoned: {}", e))?;
    *s = state;
    Ok(())
  }

  pub fn registration(&self) -> &Registration {
    &self.registration
  }

  /// Populate the static generation with the whole manifest.
  ///
  /// On failure nothing is written and the previous generation stays active.
  /// With skip-waiting set, activation follows immediately.
  pub async fn install(&self, ctx: &Context, clients: &dyn Clients) -> Result<()> {
    {
      let _guard = self.transition.lock().await;

      let state = self.state()?;
      if state != WorkerState::Parsed {
        return Err(
          LifecycleError::InvalidState {
            operation: "install",
            state,
          }
          .into(),
        );
      }

      info!("Installing");
      self.set_state(WorkerState::Installing)?;

      match populate_static(ctx).await {
        Ok(count) => {
          info!(count, generation = %ctx.config.static_generation(), "Static files cached");
          self.set_state(WorkerState::Installed)?;
        }
        Err(err) => {
          error!(error = %err, "Error caching static files");
          self.set_state(WorkerState::Redundant)?;
          return Err(err);
        }
      }
    }

    if self.skip_waiting.load(Ordering::SeqCst) {
      self.activate(ctx, clients).await?;
    }

    Ok(())
  }

  /// Evict every generation except the current static and dynamic ones,
  /// record this version as active, then claim all open clients. Running it
  /// again is a no-op on the store.
  ///
  /// A failed claim still leaves the worker `Activated`: eviction has
  /// already happened and only this version's generations remain.
  pub async fn activate(&self, ctx: &Context, clients: &dyn Clients) -> Result<()> {
    let _guard = self.transition.lock().await;

    let previous = self.state()?;
    if !matches!(previous, WorkerState::Installed | WorkerState::Activated) {
      return Err(
        LifecycleError::InvalidState {
          operation: "activate",
          state: previous,
        }
        .into(),
      );
    }

    info!("Activating");
    self.set_state(WorkerState::Activating)?;

    let static_gen = ctx.config.static_generation();
    let dynamic_gen = ctx.config.dynamic_generation();

    let evicted = ctx
      .storage
      .retain(&[static_gen.name(), dynamic_gen.name()])
      .and_then(|deleted| {
        self.registration.set_active_version(&ctx.config.version)?;
        Ok(deleted)
      });
    let deleted = match evicted {
      Ok(deleted) => deleted,
      Err(err) => {
        error!(error = %err, "Error during activation");
        self.set_state(previous)?;
        return Err(err);
      }
    };
    for name in &deleted {
      info!(cache = %name, "Deleted old cache");
    }

    self.set_state(WorkerState::Activated)?;

    match clients.claim() {
      Ok(claimed) => {
        info!(claimed, "Activated");
        Ok(())
      }
      Err(err) => {
        error!(error = %err, "Activated, but failed to claim clients");
        Err(err)
      }
    }
  }

  /// Activate as soon as possible: now if waiting, otherwise right after
  /// the next successful install.
  pub async fn skip_waiting(&self, ctx: &Context, clients: &dyn Clients) -> Result<()> {
    self.skip_waiting.store(true, Ordering::SeqCst);

    if self.state()? == WorkerState::Installed {
      self.activate(ctx, clients).await?;
    }
    Ok(())
  }
}

/// Fetch every manifest entry and write them to the static generation in
/// one transaction. Existing entries are overwritten.
pub async fn populate_static(ctx: &Context) -> Result<usize> {
  let manifest = ctx.config.manifest();

  let requests = manifest
    .iter()
    .map(|path| Ok(Request::get(ctx.config.url_for(path)?)))
    .collect::<Result<Vec<_>>>()?;

  let entries = try_join_all(
    requests
      .into_iter()
      .map(|request| fetch_asset(Arc::clone(&ctx.network), request)),
  )
  .await?;

  ctx
    .storage
    .put_all(ctx.config.static_generation().name(), &entries)?;

  Ok(entries.len())
}

async fn fetch_asset(
  network: Arc<dyn Network>,
  request: Request,
) -> Result<(RequestKey, Response), LifecycleError> {
  let key = RequestKey::for_url(&request.url);

  let response = network
    .fetch(request)
    .await
    .map_err(|e| LifecycleError::AssetUnavailable {
      url: key.url().to_string(),
      reason: e.to_string(),
    })?;

  if !response.is_ok() {
    return Err(LifecycleError::AssetUnavailable {
      url: key.url().to_string(),
      reason: format!("status {}", response.status),
    });
  }

  Ok((key, response))
}
