//! Write path: try the server directly, queue durably on failure.

use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use super::trigger::SyncScheduler;
use crate::db::StoreError;
use crate::net::{Request, Response, Transport};
use crate::outbox::{Outbox, RecordId, RecordKind};

/// Both the network and durable storage failed: the write is lost unless the
/// user retries, so this must be shown to them.
#[derive(Debug, Error)]
pub enum SubmitError {
  #[error("could not save {kind} for later sync: {source}")]
  Storage {
    kind: RecordKind,
    #[source]
    source: StoreError,
  },
}

impl SubmitError {
  pub fn user_message(&self) -> &'static str {
    match self {
      Self::Storage {
        kind: RecordKind::Order,
        ..
      } => "Could not process your order. Please try again later.",
      Self::Storage { .. } => "Could not record your activity. Please try again later.",
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
  /// Server acknowledged directly. Orders carry the server's order id.
  Delivered { order_id: Option<String> },
  /// Saved to the outbox for a later drain
  Queued(RecordId),
}

impl SubmitOutcome {
  pub fn user_message(&self, kind: RecordKind) -> Option<String> {
    match (self, kind) {
      (Self::Delivered { order_id: Some(id) }, RecordKind::Order) => {
        Some(format!("Order #{} has been confirmed.", id))
      }
      (Self::Queued(_), RecordKind::Order) => Some(
        "You appear to be offline. Your order has been saved and will be submitted when you're back online."
          .to_string(),
      ),
      _ => None,
    }
  }
}

pub struct Submitter<T: Transport> {
  outbox: Outbox,
  transport: T,
  api_prefix: String,
  scheduler: Option<Arc<dyn SyncScheduler>>,
}

impl<T: Transport> Submitter<T> {
  pub fn new(outbox: Outbox, transport: T, api_prefix: impl Into<String>) -> Self {
    Self {
      outbox,
      transport,
      api_prefix: api_prefix.into(),
      scheduler: None,
    }
  }

  /// Request a background sync whenever a write gets queued.
  pub fn with_scheduler(mut self, scheduler: Arc<dyn SyncScheduler>) -> Self {
    self.scheduler = Some(scheduler);
    self
  }

  /// Submit a write. Any network failure or non-2xx answer queues it.
  pub async fn submit(
    &self,
    kind: RecordKind,
    payload: &serde_json::Value,
  ) -> Result<SubmitOutcome, SubmitError> {
    let endpoint = format!("{}{}", self.api_prefix, kind.endpoint());
    let request = Request::post_json(endpoint, payload);

    match self.transport.send(&request).await {
      Ok(response) if response.is_success() => {
        let order_id = match kind {
          RecordKind::Order => order_id(&response),
          RecordKind::Activity => None,
        };
        info!(%kind, order_id = ?order_id, "write delivered");
        return Ok(SubmitOutcome::Delivered { order_id });
      }
      Ok(response) => {
        warn!(%kind, status = response.status, "server rejected write, saving for later sync");
      }
      Err(e) => {
        warn!(%kind, error = %e, "network error, saving write for later sync");
      }
    }

    let id = self
      .outbox
      .append(kind, payload)
      .map_err(|source| SubmitError::Storage { kind, source })?;

    if let Some(scheduler) = &self.scheduler {
      scheduler.request_sync(kind);
    }

    Ok(SubmitOutcome::Queued(id))
  }
}

/// `orderId` from the acknowledgment body; accepts strings or numbers.
fn order_id(response: &Response) -> Option<String> {
  let body: serde_json::Value = response.json().ok()?;
  match body.get("orderId")? {
    serde_json::Value::String(s) => Some(s.clone()),
    serde_json::Value::Number(n) => Some(n.to_string()),
    _ => None,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::db::Database;
  use crate::testing::{FakeTransport, RecordingScheduler};
  use serde_json::json;

  fn submitter(transport: FakeTransport) -> (Submitter<FakeTransport>, Arc<RecordingScheduler>) {
    let outbox = Outbox::new(Arc::new(Database::open_in_memory().unwrap()));
    let scheduler = Arc::new(RecordingScheduler::default());
    let submitter = Submitter::new(outbox, transport, "/api").with_scheduler(scheduler.clone());
    (submitter, scheduler)
  }

  #[tokio::test]
  async fn test_delivered_order_returns_order_id() {
    let transport = FakeTransport::new();
    transport.respond("/api/orders", Response::new(200, r#"{"orderId": 42}"#));
    let (submitter, scheduler) = submitter(transport);

    let outcome = submitter
      .submit(RecordKind::Order, &json!({"total": "9.99"}))
      .await
      .unwrap();

    assert_eq!(
      outcome,
      SubmitOutcome::Delivered {
        order_id: Some("42".to_string())
      }
    );
    assert_eq!(submitter.outbox.pending_count(RecordKind::Order).unwrap(), 0);
    assert!(scheduler.requested().is_empty());
  }

  #[tokio::test]
  async fn test_offline_write_is_queued_and_sync_requested() {
    let (submitter, scheduler) = submitter(FakeTransport::new());

    let outcome = submitter
      .submit(RecordKind::Activity, &json!({"type": "product-view"}))
      .await
      .unwrap();

    assert!(matches!(outcome, SubmitOutcome::Queued(id) if id.kind == RecordKind::Activity));
    assert_eq!(scheduler.requested(), vec![RecordKind::Activity]);
    let pending = submitter.outbox.list_pending(RecordKind::Activity).unwrap();
    assert_eq!(pending[0].payload, json!({"type": "product-view"}));
  }

  #[tokio::test]
  async fn test_server_rejection_is_queued() {
    let transport = FakeTransport::new();
    transport.respond("/api/orders", Response::new(502, ""));
    let (submitter, _) = submitter(transport);

    let outcome = submitter.submit(RecordKind::Order, &json!({})).await.unwrap();
    assert!(matches!(outcome, SubmitOutcome::Queued(_)));
    assert!(outcome.user_message(RecordKind::Order).unwrap().contains("offline"));
  }

  #[tokio::test]
  async fn test_unreachable_server_and_broken_store_surface_error() {
    let db = Arc::new(Database::open_in_memory().unwrap());
    db.transaction(|tx| Ok(tx.execute_batch("DROP TABLE orders")?))
      .unwrap();
    let scheduler = Arc::new(RecordingScheduler::default());
    let submitter = Submitter::new(Outbox::new(Arc::clone(&db)), FakeTransport::new(), "/api")
      .with_scheduler(scheduler.clone());

    let err = submitter
      .submit(RecordKind::Order, &json!({"total": "9.99"}))
      .await
      .unwrap_err();

    assert!(matches!(
      err,
      SubmitError::Storage {
        kind: RecordKind::Order,
        ..
      }
    ));
    assert_eq!(
      err.user_message(),
      "Could not process your order. Please try again later."
    );
    assert!(scheduler.requested().is_empty());
  }

  #[test]
  fn test_storage_error_has_user_message() {
    let err = SubmitError::Storage {
      kind: RecordKind::Order,
      source: StoreError::LockPoisoned,
    };
    assert_eq!(
      err.user_message(),
      "Could not process your order. Please try again later."
    );
  }
}
