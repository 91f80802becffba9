/// Schema for the worker database.
pub const SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

-- Named, versioned cache buckets (e.g. static-v1, dynamic-v1)
CREATE TABLE IF NOT EXISTS cache_generations (
    name TEXT PRIMARY KEY,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Request -> response snapshots, one row per (generation, request)
CREATE TABLE IF NOT EXISTS cache_entries (
    generation TEXT NOT NULL,
    request_key TEXT NOT NULL,
    method TEXT NOT NULL,
    url TEXT NOT NULL,
    status INTEGER NOT NULL,
    status_text TEXT NOT NULL,
    headers TEXT NOT NULL,
    body BLOB NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (generation, request_key),
    FOREIGN KEY (generation) REFERENCES cache_generations(name) ON DELETE CASCADE
);

-- Outbound payloads waiting for background sync (delivered in id order)
CREATE TABLE IF NOT EXISTS sync_queue (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    tag TEXT NOT NULL,
    payload BLOB NOT NULL,
    attempts INTEGER NOT NULL DEFAULT 0,
    last_error TEXT,
    enqueued_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_sync_queue_tag ON sync_queue(tag, id);

-- Version whose generations currently control clients (single row)
CREATE TABLE IF NOT EXISTS registration (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    active_version TEXT NOT NULL,
    activated_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;
