//! Cache layer that owns generation management on top of a storage backend.

use futures::future::try_join_all;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

use super::storage::CacheStorage;
use super::traits::{CachedResponse, RequestKey};
use crate::db::StoreError;
use crate::net::{Method, Request, Response, Transport};

#[derive(Debug, Error)]
pub enum CacheError {
  #[error(transparent)]
  Store(#[from] StoreError),
  /// A shell asset could not be fetched while installing a generation.
  /// `status` is `None` when the server was unreachable.
  #[error("failed to fetch manifest asset {url} (status {status:?})")]
  ManifestFetch { url: String, status: Option<u16> },
}

/// What `install` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallOutcome {
  /// Target generation was already present
  AlreadyCurrent,
  /// Target generation was created and populated with this many assets
  Installed(usize),
}

/// Cache layer bound to one target generation name.
///
/// Reads look across every generation still present so a stale generation
/// keeps serving until the target one is activated.
pub struct CacheLayer<S: CacheStorage> {
  storage: Arc<S>,
  generation: String,
}

impl<S: CacheStorage> CacheLayer<S> {
  /// Create a new cache layer with the given storage backend.
  pub fn new(storage: S, generation: impl Into<String>) -> Self {
    Self {
      storage: Arc::new(storage),
      generation: generation.into(),
    }
  }

  /// Name of the target generation.
  pub fn generation(&self) -> &str {
    &self.generation
  }

  pub fn storage(&self) -> &S {
    &self.storage
  }

  /// Most recent cached copy for `key`, from any generation.
  pub fn lookup(&self, key: &RequestKey) -> Result<Option<CachedResponse>, CacheError> {
    Ok(self.storage.match_any(key)?)
  }

  /// Write-through: store a response in the target generation.
  pub fn store(&self, key: &RequestKey, response: &Response) -> Result<(), CacheError> {
    debug!(request = %key.description(), generation = %self.generation, "caching response");
    self.storage.put(&self.generation, key, response)?;
    Ok(())
  }

  /// Make sure the target generation exists, fetching every manifest asset
  /// first. Nothing is written unless every asset fetched with a 2xx.
  pub async fn install<T: Transport>(
    &self,
    transport: &T,
    manifest: &[String],
  ) -> Result<InstallOutcome, CacheError> {
    if self.storage.is_installed(&self.generation)? {
      return Ok(InstallOutcome::AlreadyCurrent);
    }

    info!(generation = %self.generation, assets = manifest.len(), "pre-caching app shell");

    let fetches = manifest.iter().map(|url| async move {
      let request = Request::get(url.as_str());
      match transport.send(&request).await {
        Ok(response) if response.is_success() => {
          Ok((RequestKey::new(Method::Get, url), response))
        }
        Ok(response) => Err(CacheError::ManifestFetch {
          url: url.clone(),
          status: Some(response.status),
        }),
        Err(_) => Err(CacheError::ManifestFetch {
          url: url.clone(),
          status: None,
        }),
      }
    });
    let entries = try_join_all(fetches).await?;

    self.storage.populate(&self.generation, &entries)?;
    info!(generation = %self.generation, "app shell cached");

    Ok(InstallOutcome::Installed(entries.len()))
  }

  /// Delete every generation other than the target. Only call once the
  /// target is installed. Returns the names removed.
  pub fn activate(&self) -> Result<Vec<String>, CacheError> {
    let mut removed = Vec::new();
    for name in self.storage.generations()? {
      if name != self.generation {
        info!(generation = %name, "removing old cache");
        self.storage.delete_generation(&name)?;
        removed.push(name);
      }
    }
    Ok(removed)
  }

  /// Install then activate. If install fails the old generations stay.
  pub async fn upgrade<T: Transport>(
    &self,
    transport: &T,
    manifest: &[String],
  ) -> Result<InstallOutcome, CacheError> {
    let outcome = self.install(transport, manifest).await?;
    self.activate()?;
    Ok(outcome)
  }
}

impl<S: CacheStorage> Clone for CacheLayer<S> {
  fn clone(&self) -> Self {
    Self {
      storage: Arc::clone(&self.storage),
      generation: self.generation.clone(),
    }
  }
}
