use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::router::RouteRules;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
  pub server: ServerConfig,
  /// Where store.db and cache.db live (defaults to the platform data dir)
  pub data_dir: Option<PathBuf>,
  pub cache: CacheConfig,
  pub sync: SyncConfig,
  /// Filter directive, e.g. "shopsync=debug". RUST_LOG wins when set.
  pub log_level: Option<String>,
  /// Write daily-rotated log files here instead of stderr
  pub log_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
  pub base_url: String,
  pub api_prefix: String,
  pub timeout_secs: u64,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      base_url: "http://localhost:3000".to_string(),
      api_prefix: "/api".to_string(),
      timeout_secs: 10,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  /// Name of the current cache generation; bump it to ship a new shell
  pub generation: String,
  pub offline_url: String,
  /// Shell assets fetched on install
  pub manifest: Vec<String>,
  /// Path prefixes served network-first
  pub dynamic_prefixes: Vec<String>,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      generation: "ecommerce-pwa-v1".to_string(),
      offline_url: "/offline.html".to_string(),
      manifest: default_manifest(),
      dynamic_prefixes: vec!["/api/".to_string(), "/product/".to_string()],
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
  pub periodic_secs: u64,
  pub probe_secs: u64,
  /// Server path checked with `HEAD` to decide reachability
  pub probe_path: String,
}

impl Default for SyncConfig {
  fn default() -> Self {
    Self {
      periodic_secs: 300,
      probe_secs: 15,
      probe_path: "/".to_string(),
    }
  }
}

/// Application shell cached on install
pub fn default_manifest() -> Vec<String> {
  [
    "/",
    "/index.html",
    "/offline.html",
    "/css/style.css",
    "/js/app.js",
    "/js/db.js",
    "/manifest.json",
    "/images/icons/icon-192x192.png",
    "/images/icons/icon-512x512.png",
    "/products.json",
    "/cart.html",
    "/checkout.html",
  ]
  .iter()
  .map(|s| s.to_string())
  .collect()
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./shopsync.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/shopsync/config.yaml
  ///
  /// Falls back to defaults when no file exists. An explicit path must exist.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("shopsync.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("shopsync").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents).map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self, serde_yaml::Error> {
    serde_yaml::from_str(contents)
  }

  /// Resolved data directory
  pub fn data_dir(&self) -> Result<PathBuf> {
    match &self.data_dir {
      Some(dir) => Ok(dir.clone()),
      None => dirs::data_dir()
        .map(|d| d.join("shopsync"))
        .ok_or_else(|| eyre!("Could not determine a data directory. Set data_dir in the config.")),
    }
  }

  pub fn route_rules(&self) -> Result<RouteRules> {
    let origin = url::Url::parse(&self.server.base_url)
      .map_err(|e| eyre!("Invalid server URL {}: {}", self.server.base_url, e))?;
    Ok(RouteRules {
      origin: Some(origin),
      dynamic_prefixes: self.cache.dynamic_prefixes.clone(),
      offline_url: self.cache.offline_url.clone(),
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_empty_file_uses_defaults() {
    let config = Config::parse("{}").unwrap();
    assert_eq!(config.server.base_url, "http://localhost:3000");
    assert_eq!(config.server.api_prefix, "/api");
    assert_eq!(config.cache.generation, "ecommerce-pwa-v1");
    assert_eq!(config.sync.periodic_secs, 300);
    assert_eq!(config.sync.probe_path, "/");
    assert!(config.cache.manifest.contains(&"/offline.html".to_string()));
  }

  #[test]
  fn test_partial_sections_keep_defaults() {
    let config = Config::parse(
      "server:\n  base_url: https://shop.example.com\ncache:\n  generation: ecommerce-pwa-v2\n",
    )
    .unwrap();
    assert_eq!(config.server.base_url, "https://shop.example.com");
    assert_eq!(config.server.timeout_secs, 10);
    assert_eq!(config.cache.generation, "ecommerce-pwa-v2");
    assert_eq!(config.cache.offline_url, "/offline.html");
  }

  #[test]
  fn test_missing_explicit_path_is_error() {
    assert!(Config::load(Some(Path::new("/nonexistent/shopsync.yaml"))).is_err());
  }

  #[test]
  fn test_route_rules_from_server() {
    let rules = Config::default().route_rules().unwrap();
    assert_eq!(rules.origin.unwrap().as_str(), "http://localhost:3000/");
    assert_eq!(rules.offline_url, "/offline.html");
  }
}
