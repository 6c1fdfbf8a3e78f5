use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

use crate::net::{Request, Transport};
use crate::notify::Notification;
use crate::outbox::RecordKind;
use crate::sync::SyncScheduler;

/// Engine events
#[derive(Debug)]
pub enum Event {
  /// Server became reachable
  Online,
  /// Server stopped answering
  Offline,
  /// Background sync fired for one kind
  SyncRequested(RecordKind),
  /// Periodic timer for resilience drains and update checks
  Tick,
  /// Raw push payload from the push service
  Push(Option<Vec<u8>>),
  /// User clicked a presented notification
  NotificationClick(Notification),
  Shutdown,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Connectivity {
  #[default]
  Unknown,
  Online,
  Offline,
}

impl Connectivity {
  /// Fold a probe result in. Returns the event to emit on a transition.
  pub fn observe(&mut self, reachable: bool) -> Option<Event> {
    let next = if reachable {
      Connectivity::Online
    } else {
      Connectivity::Offline
    };
    if *self == next {
      return None;
    }
    *self = next;
    Some(match next {
      Connectivity::Online => Event::Online,
      _ => Event::Offline,
    })
  }
}

/// Cloneable handle for feeding events into the loop
#[derive(Debug, Clone)]
pub struct EventSender {
  tx: mpsc::UnboundedSender<Event>,
}

impl EventSender {
  /// Returns false once the loop has gone away.
  pub fn send(&self, event: Event) -> bool {
    self.tx.send(event).is_ok()
  }
}

impl SyncScheduler for EventSender {
  fn request_sync(&self, kind: RecordKind) {
    if !self.send(Event::SyncRequested(kind)) {
      debug!(%kind, "event loop closed, dropping sync request");
    }
  }
}

/// Event handler that merges timer, probe, and host signals into one stream
pub struct EventHandler {
  tx: mpsc::UnboundedSender<Event>,
  rx: mpsc::UnboundedReceiver<Event>,
}

impl Default for EventHandler {
  fn default() -> Self {
    Self::new()
  }
}

impl EventHandler {
  pub fn new() -> Self {
    let (tx, rx) = mpsc::unbounded_channel();
    Self { tx, rx }
  }

  pub fn sender(&self) -> EventSender {
    EventSender {
      tx: self.tx.clone(),
    }
  }

  /// Emit `Tick` every `period`. The first tick fires after one full period.
  pub fn spawn_timer(&self, period: Duration) {
    let tx = self.tx.clone();
    tokio::spawn(async move {
      let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
      loop {
        interval.tick().await;
        if tx.send(Event::Tick).is_err() {
          break;
        }
      }
    });
  }

  /// Send `HEAD path` every `period` and emit `Online`/`Offline` on
  /// transitions. Any answer from the server, whatever its status, counts as
  /// reachable.
  pub fn spawn_probe<T>(&self, transport: Arc<T>, path: String, period: Duration)
  where
    T: Transport + 'static,
  {
    let tx = self.tx.clone();
    tokio::spawn(async move {
      let mut state = Connectivity::default();
      let mut interval = tokio::time::interval(period);
      loop {
        interval.tick().await;
        let reachable = transport.send(&Request::head(path.as_str())).await.is_ok();
        if let Some(event) = state.observe(reachable) {
          if tx.send(event).is_err() {
            break;
          }
        } else if tx.is_closed() {
          break;
        }
      }
    });
  }

  /// Receive the next event
  pub async fn next(&mut self) -> Option<Event> {
    self.rx.recv().await
  }
}
