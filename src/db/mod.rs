//! Persistent store: durable, transactional storage that survives restarts.
//!
//! The store is opened once per process and shared by handle. Every logical
//! operation runs inside its own transaction, so a failure in one cannot
//! leave another half-applied.

pub mod schema;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use serde::{de::DeserializeOwned, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;

/// Durable-storage failure. Fatal for the operation that hit it.
#[derive(Debug, Error)]
pub enum StoreError {
  #[error("database error: {0}")]
  Sqlite(#[from] rusqlite::Error),
  #[error("failed to (de)serialize record: {0}")]
  Serde(#[from] serde_json::Error),
  #[error("failed to prepare data directory {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("store lock poisoned")]
  LockPoisoned,
}

/// The durable containers held by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Container {
  Orders,
  UserActivity,
  Products,
  Cart,
}

impl Container {
  pub fn table(self) -> &'static str {
    match self {
      Self::Orders => "orders",
      Self::UserActivity => "user_activity",
      Self::Products => "products",
      Self::Cart => "cart",
    }
  }
}

/// Trait for entities kept in a keyed document container.
pub trait Document: Serialize + DeserializeOwned {
  /// Container the document lives in.
  const CONTAINER: Container;

  /// Primary key within the container.
  fn key(&self) -> String;

  /// Optional secondary index value (e.g. product category).
  fn index(&self) -> Option<&str> {
    None
  }
}

/// Handle to the persistent store.
pub struct Database {
  conn: Mutex<Connection>,
}

impl Database {
  /// Open or create the store under `data_dir`.
  pub fn open(data_dir: &Path) -> Result<Self, StoreError> {
    std::fs::create_dir_all(data_dir).map_err(|source| StoreError::Io {
      path: data_dir.to_path_buf(),
      source,
    })?;

    let path = data_dir.join("store.db");
    let conn = Connection::open(&path)?;
    Self::from_connection(conn)
  }

  /// Open a throwaway in-memory store.
  pub fn open_in_memory() -> Result<Self, StoreError> {
    Self::from_connection(Connection::open_in_memory()?)
  }

  fn from_connection(conn: Connection) -> Result<Self, StoreError> {
    let db = Self {
      conn: Mutex::new(conn),
    };
    db.run_migrations()?;
    Ok(db)
  }

  fn run_migrations(&self) -> Result<(), StoreError> {
    let conn = self.conn.lock().map_err(|_| StoreError::LockPoisoned)?;
    conn.execute_batch(schema::SCHEMA)?;
    Ok(())
  }

  /// Run `f` inside a single transaction. Commits on `Ok`, rolls back on `Err`.
  pub fn transaction<R, F>(&self, f: F) -> Result<R, StoreError>
  where
    F: FnOnce(&Transaction<'_>) -> Result<R, StoreError>,
  {
    let mut conn = self.conn.lock().map_err(|_| StoreError::LockPoisoned)?;
    let tx = conn.transaction()?;
    let result = f(&tx)?;
    tx.commit()?;
    Ok(result)
  }

  /// Fetch one document by key.
  pub fn get<T: Document>(&self, key: &str) -> Result<Option<T>, StoreError> {
    self.transaction(|tx| get_in(tx, key))
  }

  /// Read-modify-write one document in a single transaction.
  pub fn modify<T, F>(&self, key: &str, f: F) -> Result<T, StoreError>
  where
    T: Document,
    F: FnOnce(Option<T>) -> T,
  {
    self.transaction(|tx| {
      let doc = f(get_in(tx, key)?);
      put_in(tx, &doc)?;
      Ok(doc)
    })
  }

  /// Insert or overwrite a document.
  pub fn put<T: Document>(&self, doc: &T) -> Result<(), StoreError> {
    self.transaction(|tx| put_in(tx, doc))
  }

  /// Delete a document. Deleting an absent key is not an error.
  pub fn delete<T: Document>(&self, key: &str) -> Result<(), StoreError> {
    self.transaction(|tx| {
      let sql = format!("DELETE FROM {} WHERE key = ?", T::CONTAINER.table());
      tx.execute(&sql, params![key])?;
      Ok(())
    })
  }

  /// List every document in the container, ordered by key.
  pub fn list<T: Document>(&self) -> Result<Vec<T>, StoreError> {
    self.transaction(|tx| {
      let sql = format!("SELECT data FROM {} ORDER BY key", T::CONTAINER.table());
      let mut stmt = tx.prepare(&sql)?;
      let rows = stmt.query_map([], |row| row.get::<_, Vec<u8>>(0))?;
      decode_rows(rows)
    })
  }

  /// List documents whose secondary index equals `index`.
  pub fn list_by_index<T: Document>(&self, index: &str) -> Result<Vec<T>, StoreError> {
    self.transaction(|tx| {
      let sql = format!(
        "SELECT data FROM {} WHERE idx = ? ORDER BY key",
        T::CONTAINER.table()
      );
      let mut stmt = tx.prepare(&sql)?;
      let rows = stmt.query_map(params![index], |row| row.get::<_, Vec<u8>>(0))?;
      decode_rows(rows)
    })
  }

  /// Replace the whole container with `docs` in one transaction.
  pub fn replace_all<T: Document>(&self, docs: &[T]) -> Result<(), StoreError> {
    self.transaction(|tx| {
      tx.execute(&format!("DELETE FROM {}", T::CONTAINER.table()), [])?;
      for doc in docs {
        put_in(tx, doc)?;
      }
      Ok(())
    })
  }

  /// Remove every document from the container.
  pub fn clear<T: Document>(&self) -> Result<(), StoreError> {
    self.transaction(|tx| {
      tx.execute(&format!("DELETE FROM {}", T::CONTAINER.table()), [])?;
      Ok(())
    })
  }
}

fn get_in<T: Document>(tx: &Transaction<'_>, key: &str) -> Result<Option<T>, StoreError> {
  let sql = format!("SELECT data FROM {} WHERE key = ?", T::CONTAINER.table());
  let data: Option<Vec<u8>> = tx
    .query_row(&sql, params![key], |row| row.get(0))
    .optional()?;
  data
    .map(|d| serde_json::from_slice(&d).map_err(StoreError::from))
    .transpose()
}

fn put_in<T: Document>(tx: &Transaction<'_>, doc: &T) -> Result<(), StoreError> {
  let data = serde_json::to_vec(doc)?;
  let sql = format!(
    "INSERT OR REPLACE INTO {} (key, idx, data, stored_at) VALUES (?, ?, ?, ?)",
    T::CONTAINER.table()
  );
  tx.execute(
    &sql,
    params![doc.key(), doc.index(), data, Utc::now().to_rfc3339()],
  )?;
  Ok(())
}

fn decode_rows<T, I>(rows: I) -> Result<Vec<T>, StoreError>
where
  T: DeserializeOwned,
  I: Iterator<Item = rusqlite::Result<Vec<u8>>>,
{
  rows
    .map(|row| -> Result<T, StoreError> { Ok(serde_json::from_slice(&row?)?) })
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde::Deserialize;

  #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
  struct Note {
    id: String,
    tag: String,
  }

  impl Document for Note {
    const CONTAINER: Container = Container::Products;

    fn key(&self) -> String {
      self.id.clone()
    }

    fn index(&self) -> Option<&str> {
      Some(&self.tag)
    }
  }

  fn note(id: &str, tag: &str) -> Note {
    Note {
      id: id.to_string(),
      tag: tag.to_string(),
    }
  }

  #[test]
  fn test_put_get_delete() {
    let db = Database::open_in_memory().unwrap();
    db.put(&note("a", "x")).unwrap();

    assert_eq!(db.get::<Note>("a").unwrap(), Some(note("a", "x")));
    db.delete::<Note>("a").unwrap();
    assert_eq!(db.get::<Note>("a").unwrap(), None);

    // Deleting again is fine
    db.delete::<Note>("a").unwrap();
  }

  #[test]
  fn test_replace_all_drops_previous_contents() {
    let db = Database::open_in_memory().unwrap();
    db.put(&note("old", "x")).unwrap();
    db.replace_all(&[note("b", "y"), note("a", "x")]).unwrap();

    let all = db.list::<Note>().unwrap();
    assert_eq!(all, vec![note("a", "x"), note("b", "y")]);
    assert_eq!(db.list_by_index::<Note>("y").unwrap(), vec![note("b", "y")]);
  }

  #[test]
  fn test_modify_sees_previous_value() {
    let db = Database::open_in_memory().unwrap();
    let first = db
      .modify("a", |prev: Option<Note>| {
        assert!(prev.is_none());
        note("a", "x")
      })
      .unwrap();
    let second = db
      .modify("a", |prev: Option<Note>| {
        let mut n = prev.unwrap();
        n.tag.push('y');
        n
      })
      .unwrap();

    assert_eq!(first.tag, "x");
    assert_eq!(second.tag, "xy");
    assert_eq!(db.get::<Note>("a").unwrap(), Some(note("a", "xy")));
  }

  #[test]
  fn test_failed_transaction_rolls_back() {
    let db = Database::open_in_memory().unwrap();
    let result: Result<(), StoreError> = db.transaction(|tx| {
      put_in(tx, &note("a", "x"))?;
      Err(StoreError::LockPoisoned)
    });

    assert!(result.is_err());
    assert!(db.list::<Note>().unwrap().is_empty());
  }

  #[test]
  fn test_open_on_disk_survives_reopen() {
    let dir = std::env::temp_dir().join(format!("shopsync-db-{}", std::process::id()));
    {
      let db = Database::open(&dir).unwrap();
      db.put(&note("a", "x")).unwrap();
    }
    let db = Database::open(&dir).unwrap();
    assert_eq!(db.get::<Note>("a").unwrap(), Some(note("a", "x")));
    let _ = std::fs::remove_dir_all(&dir);
  }
}
