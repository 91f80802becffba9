//! SQLite implementation of the cache store.

use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::Arc;

use super::key::RequestKey;
use super::traits::{CacheStorage, CachedResponse};
use crate::db::{parse_datetime, Database};
use crate::http::Response;

/// SQLite-based cache storage.
pub struct SqliteStorage {
  db: Arc<Database>,
}

impl SqliteStorage {
  pub fn new(db: Arc<Database>) -> Self {
    Self { db }
  }
}

fn ensure_generation(conn: &Connection, generation: &str) -> Result<()> {
  conn
    .execute(
      "INSERT OR IGNORE INTO cache_generations (name) VALUES (?)",
      params![generation],
    )
    .map_err(|e| eyre!("Failed to open cache {}: {}", generation, e))?;
  Ok(())
}

fn write_entry(
  conn: &Connection,
  generation: &str,
  key: &RequestKey,
  response: &Response,
) -> Result<()> {
  let headers = serde_json::to_string(&response.headers)
    .map_err(|e| eyre!("Failed to serialize headers: {}", e))?;

  conn
    .execute(
      "INSERT OR REPLACE INTO cache_entries
         (generation, request_key, method, url, status, status_text, headers, body, cached_at)
       VALUES (?, ?, 'GET', ?, ?, ?, ?, ?, datetime('now'))",
      params![
        generation,
        key.hash(),
        key.url(),
        response.status,
        response.status_text,
        headers,
        response.body
      ],
    )
    .map_err(|e| eyre!("Failed to store {} in {}: {}", key.url(), generation, e))?;

  Ok(())
}

fn delete_generation(conn: &Connection, generation: &str) -> Result<bool> {
  conn
    .execute(
      "DELETE FROM cache_entries WHERE generation = ?",
      params![generation],
    )
    .map_err(|e| eyre!("Failed to delete entries of {}: {}", generation, e))?;

  let deleted = conn
    .execute(
      "DELETE FROM cache_generations WHERE name = ?",
      params![generation],
    )
    .map_err(|e| eyre!("Failed to delete cache {}: {}", generation, e))?;

  Ok(deleted > 0)
}

impl CacheStorage for SqliteStorage {
  fn keys(&self) -> Result<Vec<String>> {
    let conn = self.db.lock()?;

    let mut stmt = conn
      .prepare("SELECT name FROM cache_generations ORDER BY created_at, rowid")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let names = stmt
      .query_map([], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list caches: {}", e))?
      .collect::<rusqlite::Result<Vec<String>>>()
      .map_err(|e| eyre!("Failed to read cache names: {}", e))?;

    Ok(names)
  }

  fn delete(&self, generation: &str) -> Result<bool> {
    let mut conn = self.db.lock()?;
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    let deleted = delete_generation(&tx, generation)?;

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(deleted)
  }

  fn retain(&self, keep: &[&str]) -> Result<Vec<String>> {
    let mut conn = self.db.lock()?;
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    let stale: Vec<String> = {
      let mut stmt = tx
        .prepare("SELECT name FROM cache_generations ORDER BY created_at, rowid")
        .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

      let names = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .map_err(|e| eyre!("Failed to list caches: {}", e))?
        .collect::<rusqlite::Result<Vec<String>>>()
        .map_err(|e| eyre!("Failed to read cache names: {}", e))?;

      names
        .into_iter()
        .filter(|name| !keep.contains(&name.as_str()))
        .collect()
    };

    for name in &stale {
      delete_generation(&tx, name)?;
    }

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(stale)
  }

  fn match_request(&self, generation: &str, key: &RequestKey) -> Result<Option<CachedResponse>> {
    let conn = self.db.lock()?;

    let row: Option<(u16, String, String, Vec<u8>, String)> = conn
      .query_row(
        "SELECT status, status_text, headers, body, cached_at FROM cache_entries
         WHERE generation = ? AND request_key = ?",
        params![generation, key.hash()],
        |row| {
          Ok((
            row.get(0)?,
            row.get(1)?,
            row.get(2)?,
            row.get(3)?,
            row.get(4)?,
          ))
        },
      )
      .optional()
      .map_err(|e| eyre!("Failed to look up {} in {}: {}", key.url(), generation, e))?;

    match row {
      Some((status, status_text, headers, body, cached_at)) => {
        let headers = serde_json::from_str(&headers)
          .map_err(|e| eyre!("Failed to deserialize headers: {}", e))?;

        Ok(Some(CachedResponse {
          response: Response {
            status,
            status_text,
            headers,
            body,
          },
          cached_at: parse_datetime(&cached_at)?,
        }))
      }
      None => Ok(None),
    }
  }

  fn put(&self, generation: &str, key: &RequestKey, response: &Response) -> Result<()> {
    let mut conn = self.db.lock()?;
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    ensure_generation(&tx, generation)?;
    write_entry(&tx, generation, key, response)?;

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(())
  }

  fn put_all(&self, generation: &str, entries: &[(RequestKey, Response)]) -> Result<()> {
    let mut conn = self.db.lock()?;
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    ensure_generation(&tx, generation)?;
    for (key, response) in entries {
      write_entry(&tx, generation, key, response)?;
    }

    // Dropping `tx` on an early return above rolls everything back
    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(())
  }

  fn entry_count(&self, generation: &str) -> Result<usize> {
    let conn = self.db.lock()?;

    let count: i64 = conn
      .query_row(
        "SELECT COUNT(*) FROM cache_entries WHERE generation = ?",
        params![generation],
        |row| row.get(0),
      )
      .map_err(|e| eyre!("Failed to count entries of {}: {}", generation, e))?;

    Ok(count as usize)
  }
}
