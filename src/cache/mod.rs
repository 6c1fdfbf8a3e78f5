//! Versioned response cache backing the request router.
//!
//! This module provides a named-generation cache that:
//! - Stores response bytes keyed by request identity (method + URL)
//! - Keeps at most one live entry per key per generation
//! - Installs a new generation from a fixed shell-asset manifest in one step
//! - Evicts every other generation only once the new one is ready

mod layer;
mod storage;
mod traits;

pub use layer::{CacheError, CacheLayer, InstallOutcome};
pub use storage::{CacheStorage, SqliteStorage};
pub use traits::{CachedResponse, RequestKey};
