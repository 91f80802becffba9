//! Background sync (durable outbound queue) and periodic content refresh.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::params;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::cache::RequestKey;
use crate::context::Context;
use crate::db::{parse_datetime, Database};
use crate::http::Request;

/// A queued outbound payload.
#[derive(Debug, Clone)]
pub struct PendingItem {
  pub id: i64,
  pub tag: String,
  pub payload: Vec<u8>,
  pub attempts: u32,
  pub last_error: Option<String>,
  pub enqueued_at: DateTime<Utc>,
}

/// Durable FIFO of payloads waiting for connectivity.
///
/// Clones share one drain lock: at most one drain runs at a time.
#[derive(Clone)]
pub struct SyncQueue {
  db: Arc<Database>,
  draining: Arc<tokio::sync::Mutex<()>>,
}

impl SyncQueue {
  pub fn new(db: Arc<Database>) -> Self {
    Self {
      db,
      draining: Arc::new(tokio::sync::Mutex::new(())),
    }
  }

  /// Queue a JSON payload under `tag`. Returns the item id.
  pub fn enqueue(&self, tag: &str, payload: &serde_json::Value) -> Result<i64> {
    let data =
      serde_json::to_vec(payload).map_err(|e| eyre!("Failed to serialize payload: {}", e))?;
    let conn = self.db.lock()?;

    conn
      .execute(
        "INSERT INTO sync_queue (tag, payload) VALUES (?, ?)",
        params![tag, data],
      )
      .map_err(|e| eyre!("Failed to enqueue sync item: {}", e))?;

    Ok(conn.last_insert_rowid())
  }

  /// Items queued under `tag`, oldest first.
  pub fn pending(&self, tag: &str) -> Result<Vec<PendingItem>> {
    let conn = self.db.lock()?;

    let mut stmt = conn
      .prepare(
        "SELECT id, tag, payload, attempts, last_error, enqueued_at FROM sync_queue
         WHERE tag = ? ORDER BY id",
      )
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let rows = stmt
      .query_map(params![tag], |row| {
        Ok((
          row.get::<_, i64>(0)?,
          row.get::<_, String>(1)?,
          row.get::<_, Vec<u8>>(2)?,
          row.get::<_, u32>(3)?,
          row.get::<_, Option<String>>(4)?,
          row.get::<_, String>(5)?,
        ))
      })
      .map_err(|e| eyre!("Failed to query sync queue: {}", e))?
      .collect::<rusqlite::Result<Vec<_>>>()
      .map_err(|e| eyre!("Failed to read sync queue: {}", e))?;

    rows
      .into_iter()
      .map(|(id, tag, payload, attempts, last_error, enqueued_at)| {
        Ok(PendingItem {
          id,
          tag,
          payload,
          attempts,
          last_error,
          enqueued_at: parse_datetime(&enqueued_at)?,
        })
      })
      .collect()
  }

  pub fn count(&self) -> Result<usize> {
    let conn = self.db.lock()?;
    let count: i64 = conn
      .query_row("SELECT COUNT(*) FROM sync_queue", [], |row| row.get(0))
      .map_err(|e| eyre!("Failed to count sync queue: {}", e))?;
    Ok(count as usize)
  }

  /// Remove a delivered item.
  pub fn remove(&self, id: i64) -> Result<()> {
    self
      .db
      .lock()?
      .execute("DELETE FROM sync_queue WHERE id = ?", params![id])
      .map_err(|e| eyre!("Failed to remove sync item {}: {}", id, e))?;
    Ok(())
  }

  pub fn record_failure(&self, id: i64, reason: &str) -> Result<()> {
    self
      .db
      .lock()?
      .execute(
        "UPDATE sync_queue SET attempts = attempts + 1, last_error = ? WHERE id = ?",
        params![reason, id],
      )
      .map_err(|e| eyre!("Failed to update sync item {}: {}", id, e))?;
    Ok(())
  }
}

/// Outcome of one drain pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
  pub delivered: usize,
  pub remaining: usize,
}

/// Deliver queued items for `tag` in order, stopping at the first failure.
///
/// An item is removed only after a 2xx delivery; the failed item and every
/// item behind it stay queued for the next trigger.
pub async fn drain(ctx: &Context, queue: &SyncQueue, tag: &str) -> Result<DrainReport> {
  // Held until every item is delivered or one fails, so an overlapping
  // trigger sees only what is still queued
  let _guard = queue.draining.lock().await;
  let items = queue.pending(tag)?;
  let target = ctx.config.url_for(&ctx.config.analytics_path())?;
  let total = items.len();
  let mut delivered = 0;

  for item in items {
    let request = Request::post_json(target.clone(), item.payload.clone());

    let failure = match ctx.network.fetch(request).await {
      Ok(response) if response.is_ok() => None,
      Ok(response) => Some(format!("status {}", response.status)),
      Err(err) => Some(err.to_string()),
    };

    match failure {
      None => {
        queue.remove(item.id)?;
        delivered += 1;
      }
      Some(reason) => {
        warn!(id = item.id, reason = %reason, "Sync delivery failed, will retry later");
        queue.record_failure(item.id, &reason)?;
        break;
      }
    }
  }

  Ok(DrainReport {
    delivered,
    remaining: total - delivered,
  })
}

/// Handle a background sync trigger.
pub async fn background_sync(ctx: &Context, queue: &SyncQueue, tag: &str) -> Result<()> {
  if tag != ctx.config.sync.background_tag {
    info!(tag, "Ignoring unknown sync tag");
    return Ok(());
  }

  info!(tag, "Performing background sync");
  let report = drain(ctx, queue, tag).await?;
  if report.remaining == 0 {
    info!(delivered = report.delivered, "Background sync completed");
  } else {
    info!(
      delivered = report.delivered,
      remaining = report.remaining,
      "Background sync incomplete"
    );
  }
  Ok(())
}

/// Handle a periodic sync trigger.
pub async fn periodic_sync(ctx: &Context, tag: &str) -> Result<()> {
  if tag != ctx.config.sync.periodic_tag {
    info!(tag, "Ignoring unknown periodic sync tag");
    return Ok(());
  }

  info!(tag, "Syncing content");
  match refresh_latest_content(ctx).await {
    Ok(true) => info!("Content sync completed"),
    Ok(false) => info!("Content sync returned no fresh content"),
    Err(err) => error!(error = %err, "Content sync failed"),
  }
  Ok(())
}

/// Fetch the latest-content endpoint into the dynamic generation.
/// Returns whether the cache entry was refreshed.
pub async fn refresh_latest_content(ctx: &Context) -> Result<bool> {
  let url = ctx.config.url_for(&ctx.config.latest_content_path())?;
  let key = RequestKey::for_url(&url);

  let response = ctx.network.fetch(Request::get(url)).await?;
  if !response.is_ok() {
    return Ok(false);
  }

  ctx
    .storage
    .put(ctx.config.dynamic_generation().name(), &key, &response)?;
  Ok(true)
}

/// Turns online/offline observations into background-sync triggers.
pub struct Connectivity {
  online: AtomicBool,
}

impl Connectivity {
  pub fn new(online: bool) -> Self {
    Self {
      online: AtomicBool::new(online),
    }
  }

  pub fn is_online(&self) -> bool {
    self.online.load(Ordering::SeqCst)
  }

  /// Record the current state. Returns true only on an offline → online edge.
  pub fn set_online(&self, online: bool) -> bool {
    let was_online = self.online.swap(online, Ordering::SeqCst);
    online && !was_online
  }
}
