//! Sync coordinator: best-effort drain passes over the outbox.
//!
//! No in-progress state is persisted. A pass can be killed at any point and
//! the next trigger starts over from whatever the outbox still holds.

use futures::future::join_all;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::trigger::SyncTrigger;
use crate::db::StoreError;
use crate::net::{Request, Transport};
use crate::outbox::{Outbox, RecordId, RecordKind};

/// Why one record was not delivered in this pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Failure {
  /// No response at all
  Unreachable(String),
  /// Server answered with a non-2xx status
  Rejected { status: u16 },
}

/// Per-kind drain state. Only `Draining` while a pass is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainState {
  Idle,
  Draining,
}

/// Outcome of one drain for one kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrainReport {
  pub kind: RecordKind,
  /// Records found pending across every listing of the outbox
  pub pending: usize,
  /// Acknowledged and removed from the outbox
  pub delivered: Vec<RecordId>,
  /// Acknowledged by the server but still in the outbox; will be resent
  pub unconfirmed: Vec<RecordId>,
  pub failed: Vec<(RecordId, Failure)>,
  /// A drain for this kind was already running; it picks up this trigger
  /// by listing the outbox again before it finishes
  pub coalesced: bool,
}

impl DrainReport {
  fn empty(kind: RecordKind) -> Self {
    Self {
      kind,
      pending: 0,
      delivered: Vec::new(),
      unconfirmed: Vec::new(),
      failed: Vec::new(),
      coalesced: false,
    }
  }
}

/// Per-kind pass lock plus the flag that asks the holder for another listing.
#[derive(Default)]
struct PassSlot {
  running: Mutex<()>,
  rerun: AtomicBool,
}

pub struct SyncCoordinator<T: Transport> {
  outbox: Outbox,
  transport: T,
  api_prefix: String,
  orders: PassSlot,
  activity: PassSlot,
}

impl<T: Transport> SyncCoordinator<T> {
  pub fn new(outbox: Outbox, transport: T, api_prefix: impl Into<String>) -> Self {
    Self {
      outbox,
      transport,
      api_prefix: api_prefix.into(),
      orders: PassSlot::default(),
      activity: PassSlot::default(),
    }
  }

  pub fn outbox(&self) -> &Outbox {
    &self.outbox
  }

  fn slot(&self, kind: RecordKind) -> &PassSlot {
    match kind {
      RecordKind::Order => &self.orders,
      RecordKind::Activity => &self.activity,
    }
  }

  pub fn state(&self, kind: RecordKind) -> DrainState {
    match self.slot(kind).running.try_lock() {
      Ok(_) => DrainState::Idle,
      Err(_) => DrainState::Draining,
    }
  }

  /// Drain every record of `kind` pending at the time of the call.
  ///
  /// Records are submitted one at a time in append order. A failed record
  /// gets its attempt counter bumped and the pass moves on to the next one.
  /// If a drain for the kind is already running, this call only flags it to
  /// list the outbox again and returns a coalesced report. Only failing to
  /// read the outbox itself is an error.
  pub async fn drain(&self, kind: RecordKind) -> Result<DrainReport, StoreError> {
    let slot = self.slot(kind);
    slot.rerun.store(true, Ordering::SeqCst);

    let mut report = DrainReport::empty(kind);
    let mut attempted = HashSet::new();
    loop {
      let Ok(pass) = slot.running.try_lock() else {
        if report.pending == 0 && attempted.is_empty() {
          debug!(%kind, "drain already running, folding trigger into it");
          report.coalesced = true;
        }
        return Ok(report);
      };

      while slot.rerun.swap(false, Ordering::SeqCst) {
        self.pass(kind, &mut attempted, &mut report).await?;
      }
      drop(pass);

      // A trigger may have raised the flag after the last swap but before
      // the lock was released.
      if !slot.rerun.load(Ordering::SeqCst) {
        break;
      }
    }

    if report.pending > 0 {
      info!(
        %kind,
        delivered = report.delivered.len(),
        unconfirmed = report.unconfirmed.len(),
        failed = report.failed.len(),
        "drain finished"
      );
    }
    Ok(report)
  }

  /// One listing of the outbox. Records already tried during this drain are
  /// left for the next trigger.
  async fn pass(
    &self,
    kind: RecordKind,
    attempted: &mut HashSet<RecordId>,
    report: &mut DrainReport,
  ) -> Result<(), StoreError> {
    let pending: Vec<_> = self
      .outbox
      .list_pending(kind)?
      .into_iter()
      .filter(|record| !attempted.contains(&record.id))
      .collect();
    if pending.is_empty() {
      return Ok(());
    }

    info!(%kind, count = pending.len(), "found pending records to sync");
    report.pending += pending.len();
    let endpoint = format!("{}{}", self.api_prefix, kind.endpoint());

    for record in pending {
      attempted.insert(record.id);
      let request = Request::post_json(endpoint.as_str(), &record.payload);
      let failure = match self.transport.send(&request).await {
        Ok(response) if response.is_success() => None,
        Ok(response) => Some(Failure::Rejected {
          status: response.status,
        }),
        Err(e) => Some(Failure::Unreachable(e.to_string())),
      };

      match failure {
        None => match self.outbox.remove(&record.id) {
          Ok(_) => {
            info!(id = %record.id, "record synced successfully");
            report.delivered.push(record.id);
          }
          Err(e) => {
            error!(id = %record.id, error = %e, "record synced but could not be removed");
            report.unconfirmed.push(record.id);
          }
        },
        Some(failure) => {
          warn!(id = %record.id, attempts = record.attempts + 1, failure = ?failure, "failed to sync record, will retry");
          if let Err(e) = self.outbox.record_attempt(&record.id) {
            error!(id = %record.id, error = %e, "failed to record attempt");
          }
          report.failed.push((record.id, failure));
        }
      }
    }
    Ok(())
  }

  /// Drain several kinds concurrently. Kinds are independent on the server,
  /// so their passes may interleave.
  pub async fn drain_kinds(&self, kinds: &[RecordKind]) -> Vec<Result<DrainReport, StoreError>> {
    join_all(kinds.iter().map(|kind| self.drain(*kind))).await
  }

  /// React to a trigger. Failures are logged and left for the next trigger.
  pub async fn on_trigger(&self, trigger: SyncTrigger) -> Vec<DrainReport> {
    debug!(trigger = trigger.as_str(), "sync triggered");
    let kinds = trigger.kinds();
    let mut reports = Vec::new();
    for (kind, result) in kinds.iter().zip(self.drain_kinds(&kinds).await) {
      match result {
        Ok(report) => reports.push(report),
        Err(e) => error!(%kind, error = %e, "error during sync"),
      }
    }
    reports
  }
}
