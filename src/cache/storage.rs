//! SQLite implementation of the cache store.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use super::key::{RequestKey, VaryHeaders};
use super::traits::{CacheStorage, CachedResponse};
use crate::http::{Request, Response};

/// SQLite-based cache storage implementation.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

impl SqliteStorage {
  /// Open or create the database at `path`.
  pub fn open(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    Self::with_connection(conn)
  }

  /// Open or create the database at the default location.
  pub fn open_default() -> Result<Self> {
    Self::open(&Self::default_path()?)
  }

  /// A private database that lives as long as this value.
  pub fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| eyre!("Failed to open in-memory cache database: {}", e))?;

    Self::with_connection(conn)
  }

  /// Get the default database path.
  pub fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("offline-agent").join("cache.db"))
  }

  fn with_connection(conn: Connection) -> Result<Self> {
    conn
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    Ok(Self {
      conn: Mutex::new(conn),
    })
  }

  fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
    self.conn.lock().map_err(|e| eyre!("Lock poisoned: {}", e))
  }
}

/// Schema for cache tables.
const CACHE_SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

-- One row per named store
CREATE TABLE IF NOT EXISTS caches (
    name TEXT PRIMARY KEY,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Response snapshots keyed by normalized request
CREATE TABLE IF NOT EXISTS entries (
    cache_name TEXT NOT NULL,
    key_hash TEXT NOT NULL,
    method TEXT NOT NULL,
    url TEXT NOT NULL,
    vary TEXT NOT NULL,
    status INTEGER NOT NULL,
    status_text TEXT NOT NULL,
    headers TEXT NOT NULL,
    body BLOB NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (cache_name, key_hash),
    FOREIGN KEY (cache_name) REFERENCES caches(name) ON DELETE CASCADE
);
"#;

impl CacheStorage for SqliteStorage {
  fn open(&self, cache: &str) -> Result<()> {
    let conn = self.lock()?;
    create_cache(&conn, cache)
  }

  fn has(&self, cache: &str) -> Result<bool> {
    let conn = self.lock()?;

    let found = conn
      .query_row(
        "SELECT 1 FROM caches WHERE name = ?",
        params![cache],
        |_| Ok(()),
      )
      .optional()
      .map_err(|e| eyre!("Failed to look up cache {}: {}", cache, e))?;

    Ok(found.is_some())
  }

  fn keys(&self) -> Result<Vec<String>> {
    let conn = self.lock()?;

    let mut stmt = conn
      .prepare("SELECT name FROM caches ORDER BY rowid")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let names = stmt
      .query_map([], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list caches: {}", e))?
      .collect::<rusqlite::Result<Vec<String>>>()
      .map_err(|e| eyre!("Failed to read cache name: {}", e))?;

    Ok(names)
  }

  fn delete(&self, cache: &str) -> Result<bool> {
    let mut conn = self.lock()?;
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    tx.execute("DELETE FROM entries WHERE cache_name = ?", params![cache])
      .map_err(|e| eyre!("Failed to delete entries of cache {}: {}", cache, e))?;
    let removed = tx
      .execute("DELETE FROM caches WHERE name = ?", params![cache])
      .map_err(|e| eyre!("Failed to delete cache {}: {}", cache, e))?;

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(removed > 0)
  }

  fn match_request(&self, cache: &str, request: &Request) -> Result<Option<CachedResponse>> {
    if request.method != Method::GET {
      return Ok(None);
    }

    let key = RequestKey::from_request(request);
    let conn = self.lock()?;

    let row: Option<(String, u16, String, String, Vec<u8>, String)> = conn
      .query_row(
        "SELECT vary, status, status_text, headers, body, cached_at FROM entries
         WHERE cache_name = ? AND key_hash = ?",
        params![cache, key.cache_hash()],
        |row| {
          Ok((
            row.get(0)?,
            row.get(1)?,
            row.get(2)?,
            row.get(3)?,
            row.get(4)?,
            row.get(5)?,
          ))
        },
      )
      .optional()
      .map_err(|e| eyre!("Failed to look up {} in cache {}: {}", key.url(), cache, e))?;

    let Some((vary, status, status_text, headers, body, cached_at)) = row else {
      return Ok(None);
    };

    let vary: VaryHeaders = serde_json::from_str(&vary)
      .map_err(|e| eyre!("Failed to parse stored vary headers: {}", e))?;
    if !vary.matches(request) {
      return Ok(None);
    }

    let response = Response {
      status: StatusCode::from_u16(status)
        .map_err(|e| eyre!("Invalid stored status {}: {}", status, e))?,
      status_text,
      headers: decode_headers(&headers)?,
      body: body.into(),
    };

    Ok(Some(CachedResponse {
      response,
      cached_at: parse_datetime(&cached_at)?,
    }))
  }

  fn put(&self, cache: &str, request: &Request, response: &Response) -> Result<()> {
    let conn = self.lock()?;
    create_cache(&conn, cache)?;
    insert_entry(&conn, cache, request, response)
  }

  fn put_all(&self, cache: &str, entries: &[(Request, Response)]) -> Result<()> {
    let mut conn = self.lock()?;
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    create_cache(&tx, cache)?;
    for (request, response) in entries {
      insert_entry(&tx, cache, request, response)?;
    }

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(())
  }
}

fn create_cache(conn: &Connection, cache: &str) -> Result<()> {
  conn
    .execute("INSERT OR IGNORE INTO caches (name) VALUES (?)", params![cache])
    .map_err(|e| eyre!("Failed to create cache {}: {}", cache, e))?;
  Ok(())
}

fn insert_entry(conn: &Connection, cache: &str, request: &Request, response: &Response) -> Result<()> {
  if request.method != Method::GET {
    return Err(eyre!(
      "Cannot cache {} request for {}: only GET requests are cacheable",
      request.method,
      request.url
    ));
  }

  let vary = VaryHeaders::capture(request, response)
    .ok_or_else(|| eyre!("Cannot cache response for {} with Vary: *", request.url))?;
  let vary = serde_json::to_string(&vary)
    .map_err(|e| eyre!("Failed to serialize vary headers: {}", e))?;

  let key = RequestKey::from_request(request);
  let headers = encode_headers(&response.headers)?;
  let body: &[u8] = &response.body;

  conn
    .execute(
      "INSERT OR REPLACE INTO entries
         (cache_name, key_hash, method, url, vary, status, status_text, headers, body, cached_at)
       VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, datetime('now'))",
      params![
        cache,
        key.cache_hash(),
        key.method(),
        key.url(),
        vary,
        response.status.as_u16(),
        response.status_text,
        headers,
        body
      ],
    )
    .map_err(|e| eyre!("Failed to store {} in cache {}: {}", key.url(), cache, e))?;

  Ok(())
}

/// Serialize headers as JSON pairs; values are kept as raw bytes.
fn encode_headers(headers: &HeaderMap) -> Result<String> {
  let pairs: Vec<(&str, &[u8])> = headers
    .iter()
    .map(|(name, value)| (name.as_str(), value.as_bytes()))
    .collect();

  serde_json::to_string(&pairs).map_err(|e| eyre!("Failed to serialize headers: {}", e))
}

fn decode_headers(encoded: &str) -> Result<HeaderMap> {
  let pairs: Vec<(String, Vec<u8>)> =
    serde_json::from_str(encoded).map_err(|e| eyre!("Failed to parse stored headers: {}", e))?;

  let mut headers = HeaderMap::with_capacity(pairs.len());
  for (name, value) in pairs {
    let name = HeaderName::from_bytes(name.as_bytes())
      .map_err(|e| eyre!("Invalid stored header name {}: {}", name, e))?;
    let value = HeaderValue::from_bytes(&value)
      .map_err(|e| eyre!("Invalid stored value for header {}: {}", name, e))?;
    headers.append(name, value);
  }

  Ok(headers)
}

/// Parse a datetime string from SQLite format.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  // SQLite stores as "YYYY-MM-DD HH:MM:SS"
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|dt| dt.and_utc())
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}
