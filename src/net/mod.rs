//! Request/response model and the transport seam to the server.

mod http;

pub use http::HttpTransport;

use serde::{Deserialize, Serialize};
use std::future::Future;
use thiserror::Error;

/// Transient network failure: the request never produced a response.
#[derive(Debug, Clone, Error)]
pub enum NetworkError {
  #[error("server unreachable: {0}")]
  Unreachable(String),
  #[error("invalid request url {0}")]
  InvalidUrl(String),
}

/// HTTP request method
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Method {
  #[default]
  Get,
  Head,
  Post,
}

impl Method {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Get => "GET",
      Self::Head => "HEAD",
      Self::Post => "POST",
    }
  }
}

/// Whether the request is a page navigation or a subresource fetch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RequestMode {
  Navigate,
  #[default]
  Subresource,
}

/// An outgoing request.
///
/// `url` is either a path relative to the server (`/products`) or an
/// absolute URL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Request {
  pub method: Method,
  pub url: String,
  pub mode: RequestMode,
  pub body: Option<Vec<u8>>,
}

impl Request {
  pub fn get(url: impl Into<String>) -> Self {
    Self {
      url: url.into(),
      ..Self::default()
    }
  }

  /// A `HEAD` request: status only, no body transferred.
  pub fn head(url: impl Into<String>) -> Self {
    Self {
      method: Method::Head,
      url: url.into(),
      ..Self::default()
    }
  }

  pub fn navigate(url: impl Into<String>) -> Self {
    Self {
      url: url.into(),
      mode: RequestMode::Navigate,
      ..Self::default()
    }
  }

  /// A JSON `POST` request.
  pub fn post_json(url: impl Into<String>, body: &serde_json::Value) -> Self {
    Self {
      method: Method::Post,
      url: url.into(),
      mode: RequestMode::Subresource,
      body: Some(body.to_string().into_bytes()),
    }
  }

  pub fn is_navigation(&self) -> bool {
    self.mode == RequestMode::Navigate
  }
}

/// A response, either from the network or replayed from cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
  pub status: u16,
  pub headers: Vec<(String, String)>,
  pub body: Vec<u8>,
}

impl Response {
  pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
    Self {
      status,
      headers: Vec::new(),
      body: body.into(),
    }
  }

  pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.headers.push((name.into(), value.into()));
    self
  }

  /// Synthetic response returned when neither network nor cache can answer.
  pub fn network_error() -> Self {
    Self::new(408, "Network error happened").with_header("Content-Type", "text/plain")
  }

  pub fn is_success(&self) -> bool {
    (200..300).contains(&self.status)
  }

  pub fn header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .iter()
      .find(|(k, _)| k.eq_ignore_ascii_case(name))
      .map(|(_, v)| v.as_str())
  }

  /// Parse the body as JSON.
  pub fn json<T: serde::de::DeserializeOwned>(&self) -> serde_json::Result<T> {
    serde_json::from_slice(&self.body)
  }
}

/// Something that can carry a request to the server and bring back a response.
///
/// Non-2xx statuses come back as `Ok`; only failures to get any response at
/// all are `Err`.
pub trait Transport: Send + Sync {
  fn send(&self, request: &Request) -> impl Future<Output = Result<Response, NetworkError>> + Send;
}

impl<T: Transport> Transport for std::sync::Arc<T> {
  fn send(&self, request: &Request) -> impl Future<Output = Result<Response, NetworkError>> + Send {
    (**self).send(request)
  }
}
