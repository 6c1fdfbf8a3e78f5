//! Request router: picks a fetch strategy per read request and mediates
//! between the network and the response cache.

use tracing::{debug, warn};
use url::Url;

use crate::cache::{CacheLayer, CacheStorage, RequestKey};
use crate::net::{Method, Request, Response, Transport};

/// How a request is served.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
  /// Try the network, fall back to the cached copy
  NetworkFirst,
  /// Serve the cached copy without touching the network
  CacheFirst,
  /// Not ours to cache (cross-origin or non-GET); straight to network
  Passthrough,
}

/// Where a routed response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
  Network,
  Cache,
  /// The designated offline document, served for a failed navigation
  OfflineFallback,
  /// Non-2xx server answer with nothing better to serve
  ServerError,
  /// Neither network nor cache could answer
  SyntheticError,
}

#[derive(Debug, Clone)]
pub struct Routed {
  pub response: Response,
  pub source: Source,
}

/// Path classification rules.
#[derive(Debug, Clone)]
pub struct RouteRules {
  /// Origin of the server; absolute URLs elsewhere are passed through
  pub origin: Option<Url>,
  /// Path prefixes served network-first
  pub dynamic_prefixes: Vec<String>,
  /// Document returned for failed navigations
  pub offline_url: String,
}

impl Default for RouteRules {
  fn default() -> Self {
    Self {
      origin: None,
      dynamic_prefixes: vec!["/api/".to_string(), "/product/".to_string()],
      offline_url: "/offline.html".to_string(),
    }
  }
}

impl RouteRules {
  /// Classify a request and return its same-origin path (with query).
  pub fn classify(&self, request: &Request) -> (Strategy, String) {
    let path = match self.same_origin_path(&request.url) {
      Some(path) => path,
      None => return (Strategy::Passthrough, request.url.clone()),
    };

    if request.method != Method::Get {
      return (Strategy::Passthrough, path);
    }

    let path_only = path.split(['?', '#']).next().unwrap_or("");
    if self
      .dynamic_prefixes
      .iter()
      .any(|prefix| path_only.starts_with(prefix.as_str()))
    {
      (Strategy::NetworkFirst, path)
    } else {
      (Strategy::CacheFirst, path)
    }
  }

  fn same_origin_path(&self, url: &str) -> Option<String> {
    match Url::parse(url) {
      Ok(absolute) => {
        let origin = self.origin.as_ref()?;
        if absolute.origin() != origin.origin() {
          return None;
        }
        let mut path = absolute.path().to_string();
        if let Some(query) = absolute.query() {
          path.push('?');
          path.push_str(query);
        }
        Some(path)
      }
      // Relative URLs are always same-origin
      Err(_) => Some(url.to_string()),
    }
  }
}

/// Dual-strategy read router.
pub struct RequestRouter<S: CacheStorage, T: Transport> {
  cache: CacheLayer<S>,
  transport: T,
  rules: RouteRules,
}

impl<S: CacheStorage, T: Transport> RequestRouter<S, T> {
  pub fn new(cache: CacheLayer<S>, transport: T, rules: RouteRules) -> Self {
    Self {
      cache,
      transport,
      rules,
    }
  }

  pub fn rules(&self) -> &RouteRules {
    &self.rules
  }

  /// Serve a read request. Never fails: every failure degrades to cached
  /// content, the offline document, or a synthetic error response.
  pub async fn handle(&self, request: &Request) -> Routed {
    let (strategy, path) = self.rules.classify(request);
    match strategy {
      Strategy::NetworkFirst => self.network_first(request, &path).await,
      Strategy::CacheFirst => self.cache_first(request, &path).await,
      Strategy::Passthrough => self.passthrough(request).await,
    }
  }

  async fn network_first(&self, request: &Request, path: &str) -> Routed {
    let key = RequestKey::new(request.method, path);
    debug!(url = %path, "fetching from network");

    let server_answer = match self.fetch_and_store(request, &key).await {
      Ok(response) => {
        return Routed {
          response,
          source: Source::Network,
        }
      }
      Err(answer) => answer,
    };

    debug!(url = %path, "network request failed, checking cache");
    if let Some(cached) = self.cached(&key) {
      return Routed {
        response: cached,
        source: Source::Cache,
      };
    }

    self.fallback(request, server_answer)
  }

  async fn cache_first(&self, request: &Request, path: &str) -> Routed {
    let key = RequestKey::new(request.method, path);

    if let Some(cached) = self.cached(&key) {
      debug!(url = %path, "serving from cache");
      return Routed {
        response: cached,
        source: Source::Cache,
      };
    }

    match self.fetch_and_store(request, &key).await {
      Ok(response) => Routed {
        response,
        source: Source::Network,
      },
      Err(server_answer) => {
        debug!(url = %path, "network request failed, serving fallback");
        self.fallback(request, server_answer)
      }
    }
  }

  async fn passthrough(&self, request: &Request) -> Routed {
    match self.transport.send(request).await {
      Ok(response) => Routed {
        response,
        source: Source::Network,
      },
      Err(_) => Routed {
        response: Response::network_error(),
        source: Source::SyntheticError,
      },
    }
  }

  /// Fetch from network and write 2xx responses through to the cache.
  /// On failure returns the server's non-2xx answer, if there was one.
  async fn fetch_and_store(
    &self,
    request: &Request,
    key: &RequestKey,
  ) -> Result<Response, Option<Response>> {
    match self.transport.send(request).await {
      Ok(response) if response.is_success() => {
        if let Err(e) = self.cache.store(key, &response) {
          warn!(request = %key.description(), error = %e, "failed to cache response");
        }
        Ok(response)
      }
      Ok(response) => Err(Some(response)),
      Err(e) => {
        debug!(request = %key.description(), error = %e, "network unreachable");
        Err(None)
      }
    }
  }

  fn cached(&self, key: &RequestKey) -> Option<Response> {
    match self.cache.lookup(key) {
      Ok(hit) => hit.map(|c| c.response),
      Err(e) => {
        warn!(request = %key.description(), error = %e, "cache lookup failed");
        None
      }
    }
  }

  fn fallback(&self, request: &Request, server_answer: Option<Response>) -> Routed {
    if request.is_navigation() {
      let offline_key = RequestKey::new(Method::Get, &self.rules.offline_url);
      if let Some(offline) = self.cached(&offline_key) {
        return Routed {
          response: offline,
          source: Source::OfflineFallback,
        };
      }
    }

    match server_answer {
      Some(response) => Routed {
        response,
        source: Source::ServerError,
      },
      None => Routed {
        response: Response::network_error(),
        source: Source::SyntheticError,
      },
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::SqliteStorage;
  use crate::testing::FakeTransport;

  fn router(transport: FakeTransport) -> RequestRouter<SqliteStorage, FakeTransport> {
    let cache = CacheLayer::new(SqliteStorage::open_in_memory().unwrap(), "v1");
    let rules = RouteRules {
      origin: Url::parse("http://shop.test").ok(),
      ..RouteRules::default()
    };
    RequestRouter::new(cache, transport, rules)
  }

  fn seed(router: &RequestRouter<SqliteStorage, FakeTransport>, url: &str, body: &str) {
    router
      .cache
      .store(&RequestKey::new(Method::Get, url), &Response::new(200, body))
      .unwrap();
  }

  #[test]
  fn test_classify() {
    let rules = RouteRules {
      origin: Url::parse("http://shop.test").ok(),
      ..RouteRules::default()
    };
    assert_eq!(rules.classify(&Request::get("/api/products")).0, Strategy::NetworkFirst);
    assert_eq!(rules.classify(&Request::get("/product/12")).0, Strategy::NetworkFirst);
    assert_eq!(rules.classify(&Request::get("/css/style.css")).0, Strategy::CacheFirst);
    assert_eq!(rules.classify(&Request::get("/products.json")).0, Strategy::CacheFirst);
    assert_eq!(
      rules.classify(&Request::get("https://cdn.test/x.js")).0,
      Strategy::Passthrough
    );
    assert_eq!(
      rules.classify(&Request::get("http://shop.test/product/3?x=1")),
      (Strategy::NetworkFirst, "/product/3?x=1".to_string())
    );
    assert_eq!(
      rules
        .classify(&Request::post_json("/api/orders", &serde_json::json!({})))
        .0,
      Strategy::Passthrough
    );
  }

  #[tokio::test]
  async fn test_cache_first_hit_skips_network() {
    let transport = FakeTransport::new();
    transport.respond("/css/style.css", Response::new(200, "fresh"));
    let router = router(transport);
    seed(&router, "/css/style.css", "cached");

    let routed = router.handle(&Request::get("/css/style.css")).await;

    assert_eq!(routed.source, Source::Cache);
    assert_eq!(routed.response.body, b"cached");
    assert!(router.transport.calls().is_empty());
  }

  #[tokio::test]
  async fn test_cache_first_miss_fetches_and_stores() {
    let transport = FakeTransport::new();
    transport.respond("/cart.html", Response::new(200, "cart"));
    let router = router(transport);

    let first = router.handle(&Request::get("/cart.html")).await;
    assert_eq!(first.source, Source::Network);

    router.transport.fail("/cart.html");
    let second = router.handle(&Request::get("/cart.html")).await;
    assert_eq!(second.source, Source::Cache);
    assert_eq!(second.response.body, b"cart");
  }

  #[tokio::test]
  async fn test_network_first_refreshes_cache() {
    let transport = FakeTransport::new();
    transport.respond("/api/products", Response::new(200, "new"));
    let router = router(transport);
    seed(&router, "/api/products", "old");

    let routed = router.handle(&Request::get("/api/products")).await;
    assert_eq!(routed.source, Source::Network);
    assert_eq!(routed.response.body, b"new");

    let cached = router
      .cache
      .lookup(&RequestKey::new(Method::Get, "/api/products"))
      .unwrap()
      .unwrap();
    assert_eq!(cached.response.body, b"new");
  }

  #[tokio::test]
  async fn test_network_first_falls_back_to_cached_copy() {
    let router = router(FakeTransport::new());
    seed(&router, "/product/9", "cached page");

    let routed = router.handle(&Request::navigate("/product/9")).await;
    assert_eq!(routed.source, Source::Cache);
    assert_eq!(routed.response.body, b"cached page");
  }

  #[tokio::test]
  async fn test_network_first_navigation_gets_offline_document() {
    let router = router(FakeTransport::new());
    seed(&router, "/offline.html", "you are offline");

    let routed = router.handle(&Request::navigate("/product/404")).await;
    assert_eq!(routed.source, Source::OfflineFallback);
    assert_eq!(routed.response.body, b"you are offline");
  }

  #[tokio::test]
  async fn test_subresource_without_cache_gets_synthetic_error() {
    let router = router(FakeTransport::new());
    seed(&router, "/offline.html", "you are offline");

    let routed = router.handle(&Request::get("/api/products")).await;
    assert_eq!(routed.source, Source::SyntheticError);
    assert_eq!(routed.response.status, 408);
  }

  #[tokio::test]
  async fn test_non_2xx_is_not_cached_and_uses_fallback() {
    let transport = FakeTransport::new();
    transport.respond("/api/products", Response::new(503, "down"));
    let router = router(transport);
    seed(&router, "/api/products", "last good");

    let routed = router.handle(&Request::get("/api/products")).await;
    assert_eq!(routed.source, Source::Cache);
    assert_eq!(routed.response.body, b"last good");

    router.transport.respond("/images/a.png", Response::new(404, "missing"));
    let routed = router.handle(&Request::get("/images/a.png")).await;
    assert_eq!(routed.source, Source::ServerError);
    assert_eq!(routed.response.status, 404);
    assert!(router
      .cache
      .lookup(&RequestKey::new(Method::Get, "/images/a.png"))
      .unwrap()
      .is_none());
  }

  #[tokio::test]
  async fn test_cross_origin_is_passed_through() {
    let transport = FakeTransport::new();
    transport.respond("https://cdn.test/lib.js", Response::new(200, "lib"));
    let router = router(transport);

    let routed = router.handle(&Request::get("https://cdn.test/lib.js")).await;
    assert_eq!(routed.source, Source::Network);
    assert!(router.cache.storage().entry_count("v1").unwrap() == 0);
  }
}
