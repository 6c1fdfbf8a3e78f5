//! Durable write-behind outbox.
//!
//! One FIFO queue per record kind, backed by the persistent store. A record
//! exists iff its write has not been acknowledged by the server. Delivery is
//! at-least-once: a crash between the server's acknowledgment and `remove`
//! means the record is sent again on the next drain.

use chrono::{DateTime, Utc};
use rusqlite::params;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

use crate::db::{Container, Database, StoreError};

/// Kind of queued write. Ordering is only guaranteed within a kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecordKind {
  Order,
  Activity,
}

impl RecordKind {
  pub const ALL: [RecordKind; 2] = [RecordKind::Order, RecordKind::Activity];

  pub fn container(self) -> Container {
    match self {
      Self::Order => Container::Orders,
      Self::Activity => Container::UserActivity,
    }
  }

  /// Server endpoint path below the API prefix.
  pub fn endpoint(self) -> &'static str {
    match self {
      Self::Order => "/orders",
      Self::Activity => "/user-activity",
    }
  }

  /// Background-sync tag requested when a record of this kind is queued.
  pub fn sync_tag(self) -> &'static str {
    match self {
      Self::Order => "sync-new-orders",
      Self::Activity => "sync-user-activity",
    }
  }

  pub fn from_sync_tag(tag: &str) -> Option<Self> {
    Self::ALL.into_iter().find(|k| k.sync_tag() == tag)
  }

  pub fn as_str(self) -> &'static str {
    match self {
      Self::Order => "order",
      Self::Activity => "activity",
    }
  }
}

impl fmt::Display for RecordKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Store-assigned record id. Sequence numbers are monotonic within a kind
/// and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId {
  pub kind: RecordKind,
  pub seq: i64,
}

impl fmt::Display for RecordId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}#{}", self.kind, self.seq)
  }
}

/// A pending write.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboxRecord {
  pub id: RecordId,
  pub payload: serde_json::Value,
  pub created_at: DateTime<Utc>,
  pub attempts: u32,
}

impl OutboxRecord {
  pub fn kind(&self) -> RecordKind {
    self.id.kind
  }
}

/// Outbox over the shared persistent store.
#[derive(Clone)]
pub struct Outbox {
  db: Arc<Database>,
}

impl Outbox {
  pub fn new(db: Arc<Database>) -> Self {
    Self { db }
  }

  /// Durably queue a write with `attempts = 0`.
  pub fn append(
    &self,
    kind: RecordKind,
    payload: &serde_json::Value,
  ) -> Result<RecordId, StoreError> {
    let body = serde_json::to_string(payload)?;
    let seq = self.db.transaction(|tx| {
      tx.execute(
        &format!(
          "INSERT INTO {} (payload, created_at, attempts) VALUES (?, ?, 0)",
          kind.container().table()
        ),
        params![body, Utc::now().to_rfc3339()],
      )?;
      Ok(tx.last_insert_rowid())
    })?;

    let id = RecordId { kind, seq };
    info!(%kind, id = %id, "queued write for later sync");
    Ok(id)
  }

  /// Pending records of one kind, oldest first.
  pub fn list_pending(&self, kind: RecordKind) -> Result<Vec<OutboxRecord>, StoreError> {
    self.db.transaction(|tx| {
      let mut stmt = tx.prepare(&format!(
        "SELECT id, payload, created_at, attempts FROM {} ORDER BY id",
        kind.container().table()
      ))?;
      let rows = stmt.query_map([], |row| {
        Ok((
          row.get::<_, i64>(0)?,
          row.get::<_, String>(1)?,
          row.get::<_, String>(2)?,
          row.get::<_, u32>(3)?,
        ))
      })?;

      let mut records = Vec::new();
      for row in rows {
        let (seq, payload, created_at, attempts) = row?;
        records.push(OutboxRecord {
          id: RecordId { kind, seq },
          payload: serde_json::from_str(&payload)?,
          created_at: parse_timestamp(&created_at),
          attempts,
        });
      }
      Ok(records)
    })
  }

  /// Delete a record. Removing an absent id is not an error; returns whether
  /// a record was actually deleted.
  pub fn remove(&self, id: &RecordId) -> Result<bool, StoreError> {
    let removed = self.db.transaction(|tx| {
      Ok(tx.execute(
        &format!("DELETE FROM {} WHERE id = ?", id.kind.container().table()),
        params![id.seq],
      )?)
    })?;

    if removed > 0 {
      debug!(id = %id, "removed acknowledged record");
    }
    Ok(removed > 0)
  }

  /// Bump the attempt counter after a failed submission.
  pub fn record_attempt(&self, id: &RecordId) -> Result<(), StoreError> {
    self.db.transaction(|tx| {
      tx.execute(
        &format!(
          "UPDATE {} SET attempts = attempts + 1 WHERE id = ?",
          id.kind.container().table()
        ),
        params![id.seq],
      )?;
      Ok(())
    })
  }

  pub fn pending_count(&self, kind: RecordKind) -> Result<usize, StoreError> {
    self.db.transaction(|tx| {
      let count: i64 = tx.query_row(
        &format!("SELECT COUNT(*) FROM {}", kind.container().table()),
        [],
        |row| row.get(0),
      )?;
      Ok(usize::try_from(count).unwrap_or(0))
    })
  }
}

/// Timestamps are written by `append` as RFC 3339; anything unreadable
/// is treated as the epoch so the record still drains.
fn parse_timestamp(s: &str) -> DateTime<Utc> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .unwrap_or_default()
}
