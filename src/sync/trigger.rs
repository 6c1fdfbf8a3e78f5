use crate::outbox::RecordKind;

/// Why a drain pass is starting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncTrigger {
  /// Connectivity came back
  Online,
  /// A background-sync request registered for one kind fired
  BackgroundSync(RecordKind),
  /// Resilience timer
  Periodic,
  /// Explicit request from the user or CLI
  Manual,
}

impl SyncTrigger {
  /// Kinds this trigger drains.
  pub fn kinds(&self) -> Vec<RecordKind> {
    match self {
      Self::BackgroundSync(kind) => vec![*kind],
      Self::Online | Self::Periodic | Self::Manual => RecordKind::ALL.to_vec(),
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Online => "online",
      Self::BackgroundSync(_) => "background-sync",
      Self::Periodic => "periodic",
      Self::Manual => "manual",
    }
  }
}

/// Host facility for requesting a deferred drain of one kind. The host may
/// delay or coalesce requests; nothing may assume when it fires.
pub trait SyncScheduler: Send + Sync {
  fn request_sync(&self, kind: RecordKind);
}
