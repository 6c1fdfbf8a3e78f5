//! Draining the outbox against the server, and the write path that feeds it.

mod coordinator;
mod submit;
mod trigger;

pub use coordinator::{DrainReport, DrainState, Failure, SyncCoordinator};
pub use submit::{SubmitError, SubmitOutcome, Submitter};
pub use trigger::{SyncScheduler, SyncTrigger};
