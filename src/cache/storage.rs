//! Cache storage trait and SQLite implementation.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

use super::traits::{CachedResponse, RequestKey};
use crate::db::StoreError;
use crate::net::Response;

/// Trait for cache storage backends.
pub trait CacheStorage: Send + Sync {
  /// Names of every generation holding entries or marked installed.
  fn generations(&self) -> Result<Vec<String>, StoreError>;

  /// Whether `populate` has completed for `generation`.
  fn is_installed(&self, generation: &str) -> Result<bool, StoreError>;

  /// Write `entries` into `generation` and mark it installed, in one
  /// transaction.
  fn populate(&self, generation: &str, entries: &[(RequestKey, Response)])
    -> Result<(), StoreError>;

  /// Store a single response, replacing any entry for the same key. Does not
  /// mark the generation installed.
  fn put(&self, generation: &str, key: &RequestKey, response: &Response)
    -> Result<(), StoreError>;

  /// Look up a key within one generation.
  fn get(&self, generation: &str, key: &RequestKey) -> Result<Option<CachedResponse>, StoreError>;

  /// Look up a key in any generation, newest entry first.
  fn match_any(&self, key: &RequestKey) -> Result<Option<CachedResponse>, StoreError>;

  /// Delete a generation and all its entries. Returns whether anything was
  /// removed.
  fn delete_generation(&self, generation: &str) -> Result<bool, StoreError>;

  /// Number of entries held by a generation.
  fn entry_count(&self, generation: &str) -> Result<usize, StoreError>;
}

/// SQLite-based cache storage implementation.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

impl SqliteStorage {
  /// Open or create the cache database under `data_dir`.
  pub fn open(data_dir: &Path) -> Result<Self, StoreError> {
    std::fs::create_dir_all(data_dir).map_err(|source| StoreError::Io {
      path: data_dir.to_path_buf(),
      source,
    })?;

    let conn = Connection::open(data_dir.join("cache.db"))?;
    Self::from_connection(conn)
  }

  pub fn open_in_memory() -> Result<Self, StoreError> {
    Self::from_connection(Connection::open_in_memory()?)
  }

  fn from_connection(conn: Connection) -> Result<Self, StoreError> {
    conn.execute_batch(CACHE_SCHEMA)?;
    Ok(Self {
      conn: Mutex::new(conn),
    })
  }

  fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
    self.conn.lock().map_err(|_| StoreError::LockPoisoned)
  }
}

/// Schema for cache tables.
const CACHE_SCHEMA: &str = r#"
-- A row exists only once the generation's shell is fully written
CREATE TABLE IF NOT EXISTS cache_generations (
    name TEXT PRIMARY KEY,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS cache_entries (
    generation TEXT NOT NULL,
    key_hash TEXT NOT NULL,
    request TEXT NOT NULL,
    status INTEGER NOT NULL,
    headers TEXT NOT NULL,
    body BLOB NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (generation, key_hash)
);

CREATE INDEX IF NOT EXISTS idx_cache_entries_key ON cache_entries(key_hash);
"#;

fn insert_entry(
  conn: &Connection,
  generation: &str,
  key: &RequestKey,
  response: &Response,
) -> Result<(), StoreError> {
  let headers = serde_json::to_string(&response.headers)?;
  conn.execute(
    "INSERT OR REPLACE INTO cache_entries (generation, key_hash, request, status, headers, body, cached_at)
     VALUES (?, ?, ?, ?, ?, ?, datetime('now'))",
    params![
      generation,
      key.cache_hash(),
      key.description(),
      response.status,
      headers,
      response.body
    ],
  )?;
  Ok(())
}

type EntryRow = (String, u16, String, Vec<u8>, String);

fn decode_entry((generation, status, headers, body, cached_at): EntryRow) -> Result<CachedResponse, StoreError> {
  Ok(CachedResponse {
    response: Response {
      status,
      headers: serde_json::from_str(&headers)?,
      body,
    },
    generation,
    cached_at: parse_datetime(&cached_at)?,
  })
}

fn read_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<EntryRow> {
  Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
}

impl CacheStorage for SqliteStorage {
  fn generations(&self) -> Result<Vec<String>, StoreError> {
    let conn = self.lock()?;
    let mut stmt = conn.prepare(
      "SELECT name FROM cache_generations
       UNION
       SELECT DISTINCT generation FROM cache_entries
       ORDER BY 1",
    )?;
    let names = stmt
      .query_map([], |row| row.get(0))?
      .collect::<rusqlite::Result<Vec<String>>>()?;
    Ok(names)
  }

  fn is_installed(&self, generation: &str) -> Result<bool, StoreError> {
    let conn = self.lock()?;
    let found = conn
      .query_row(
        "SELECT 1 FROM cache_generations WHERE name = ?",
        params![generation],
        |_| Ok(()),
      )
      .optional()?;
    Ok(found.is_some())
  }

  fn populate(
    &self,
    generation: &str,
    entries: &[(RequestKey, Response)],
  ) -> Result<(), StoreError> {
    let mut conn = self.lock()?;
    let tx = conn.transaction()?;

    for (key, response) in entries {
      insert_entry(&tx, generation, key, response)?;
    }
    tx.execute(
      "INSERT OR REPLACE INTO cache_generations (name, created_at) VALUES (?, datetime('now'))",
      params![generation],
    )?;

    tx.commit()?;
    Ok(())
  }

  fn put(&self, generation: &str, key: &RequestKey, response: &Response) -> Result<(), StoreError> {
    let conn = self.lock()?;
    insert_entry(&conn, generation, key, response)
  }

  fn get(&self, generation: &str, key: &RequestKey) -> Result<Option<CachedResponse>, StoreError> {
    let conn = self.lock()?;
    let row = conn
      .query_row(
        "SELECT generation, status, headers, body, cached_at FROM cache_entries
         WHERE generation = ? AND key_hash = ?",
        params![generation, key.cache_hash()],
        read_entry,
      )
      .optional()?;

    row.map(decode_entry).transpose()
  }

  fn match_any(&self, key: &RequestKey) -> Result<Option<CachedResponse>, StoreError> {
    let conn = self.lock()?;
    let row = conn
      .query_row(
        "SELECT generation, status, headers, body, cached_at FROM cache_entries
         WHERE key_hash = ?
         ORDER BY cached_at DESC, rowid DESC
         LIMIT 1",
        params![key.cache_hash()],
        read_entry,
      )
      .optional()?;

    row.map(decode_entry).transpose()
  }

  fn delete_generation(&self, generation: &str) -> Result<bool, StoreError> {
    let mut conn = self.lock()?;
    let tx = conn.transaction()?;
    let entries = tx.execute(
      "DELETE FROM cache_entries WHERE generation = ?",
      params![generation],
    )?;
    let marker = tx.execute(
      "DELETE FROM cache_generations WHERE name = ?",
      params![generation],
    )?;
    tx.commit()?;
    Ok(entries + marker > 0)
  }

  fn entry_count(&self, generation: &str) -> Result<usize, StoreError> {
    let conn = self.lock()?;
    let count: i64 = conn.query_row(
      "SELECT COUNT(*) FROM cache_entries WHERE generation = ?",
      params![generation],
      |row| row.get(0),
    )?;
    Ok(usize::try_from(count).unwrap_or(0))
  }
}

/// Parse a datetime string from SQLite format.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>, StoreError> {
  // SQLite stores as "YYYY-MM-DD HH:MM:SS"
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|dt| dt.and_utc())
    .map_err(|e| {
      StoreError::Sqlite(rusqlite::Error::FromSqlConversionFailure(
        0,
        rusqlite::types::Type::Text,
        Box::new(e),
      ))
    })
}
