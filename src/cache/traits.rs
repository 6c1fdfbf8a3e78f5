//! Core types for the response cache.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use crate::net::{Method, Response};

/// Identity of a cached request: method plus normalized URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
  method: Method,
  url: String,
}

impl RequestKey {
  pub fn new(method: Method, url: &str) -> Self {
    Self {
      method,
      url: normalize_url(url),
    }
  }

  pub fn url(&self) -> &str {
    &self.url
  }

  /// Human-readable form, e.g. `GET /products`.
  pub fn description(&self) -> String {
    format!("{} {}", self.method.as_str(), self.url)
  }

  /// SHA256 hash for stable, fixed-length storage keys
  pub fn cache_hash(&self) -> String {
    let mut hasher = Sha256::new();
    hasher.update(self.description().as_bytes());
    hex::encode(hasher.finalize())
  }
}

/// Drop the fragment; it never reaches the server.
fn normalize_url(url: &str) -> String {
  let trimmed = url.trim();
  match trimmed.split_once('#') {
    Some((before, _)) => before.to_string(),
    None => trimmed.to_string(),
  }
}

/// A response replayed from the cache.
#[derive(Debug, Clone)]
pub struct CachedResponse {
  pub response: Response,
  /// Generation the entry belongs to
  pub generation: String,
  /// When the entry was written
  pub cached_at: DateTime<Utc>,
}
