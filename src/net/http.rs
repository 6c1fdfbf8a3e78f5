//! reqwest-backed transport.

use std::time::Duration;

use reqwest::header::{ACCEPT, CONTENT_TYPE};
use url::Url;

use super::{Method, NetworkError, Request, Response, Transport};

/// HTTP transport against a single server origin.
#[derive(Clone)]
pub struct HttpTransport {
  client: reqwest::Client,
  base_url: Url,
}

impl HttpTransport {
  pub fn new(base_url: &str, timeout: Duration) -> Result<Self, NetworkError> {
    let base_url =
      Url::parse(base_url).map_err(|e| NetworkError::InvalidUrl(format!("{}: {}", base_url, e)))?;
    let client = reqwest::Client::builder()
      .timeout(timeout)
      .build()
      .map_err(|e| NetworkError::Unreachable(e.to_string()))?;

    Ok(Self { client, base_url })
  }

  pub fn base_url(&self) -> &Url {
    &self.base_url
  }

  fn resolve(&self, url: &str) -> Result<Url, NetworkError> {
    self
      .base_url
      .join(url)
      .map_err(|e| NetworkError::InvalidUrl(format!("{}: {}", url, e)))
  }
}

impl Transport for HttpTransport {
  async fn send(&self, request: &Request) -> Result<Response, NetworkError> {
    let url = self.resolve(&request.url)?;
    let method = match request.method {
      Method::Get => reqwest::Method::GET,
      Method::Head => reqwest::Method::HEAD,
      Method::Post => reqwest::Method::POST,
    };

    let mut builder = self.client.request(method, url);
    if let Some(body) = &request.body {
      builder = builder
        .header(CONTENT_TYPE, "application/json")
        .header(ACCEPT, "application/json")
        .body(body.clone());
    }

    let response = builder
      .send()
      .await
      .map_err(|e| NetworkError::Unreachable(e.to_string()))?;

    let status = response.status().as_u16();
    let headers = response
      .headers()
      .iter()
      .filter_map(|(name, value)| {
        value
          .to_str()
          .ok()
          .map(|v| (name.as_str().to_string(), v.to_string()))
      })
      .collect();
    let body = response
      .bytes()
      .await
      .map_err(|e| NetworkError::Unreachable(e.to_string()))?
      .to_vec();

    Ok(Response {
      status,
      headers,
      body,
    })
  }
}
