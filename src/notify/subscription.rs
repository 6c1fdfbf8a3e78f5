//! Registering the push subscription with the server.

use thiserror::Error;
use tracing::info;

use crate::net::{NetworkError, Request, Transport};

#[derive(Debug, Error)]
pub enum SubscriptionError {
  #[error(transparent)]
  Network(#[from] NetworkError),
  #[error("bad status code from server: {0}")]
  Status(u16),
  #[error("bad response from server")]
  Rejected,
}

/// `POST {api_prefix}/push-subscriptions` with the platform subscription
/// descriptor. Succeeds only on 2xx with `data.success == true` in the body.
pub async fn register_subscription<T: Transport>(
  transport: &T,
  api_prefix: &str,
  descriptor: &serde_json::Value,
) -> Result<serde_json::Value, SubscriptionError> {
  let request = Request::post_json(format!("{}/push-subscriptions", api_prefix), descriptor);
  let response = transport.send(&request).await?;

  if !response.is_success() {
    return Err(SubscriptionError::Status(response.status));
  }

  let body: serde_json::Value = response.json().map_err(|_| SubscriptionError::Rejected)?;
  let accepted = body
    .get("data")
    .and_then(|data| data.get("success"))
    .and_then(serde_json::Value::as_bool)
    .unwrap_or(false);
  if !accepted {
    return Err(SubscriptionError::Rejected);
  }

  info!("push subscription registered");
  Ok(body)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::net::Response;
  use crate::testing::FakeTransport;
  use serde_json::json;

  const PATH: &str = "/api/push-subscriptions";

  fn descriptor() -> serde_json::Value {
    json!({"endpoint": "https://push.test/abc", "keys": {"p256dh": "k", "auth": "a"}})
  }

  #[tokio::test]
  async fn test_nested_success_flag_is_required() {
    let transport = FakeTransport::new();
    transport.respond(PATH, Response::new(200, r#"{"data":{"success":true}}"#));
    assert!(register_subscription(&transport, "/api", &descriptor()).await.is_ok());
    assert_eq!(transport.posted(PATH), vec![descriptor()]);

    transport.respond(PATH, Response::new(200, r#"{"success":true}"#));
    assert!(matches!(
      register_subscription(&transport, "/api", &descriptor()).await,
      Err(SubscriptionError::Rejected)
    ));
  }

  #[tokio::test]
  async fn test_non_2xx_and_unreachable_fail() {
    let transport = FakeTransport::new();
    transport.respond(PATH, Response::new(500, r#"{"data":{"success":true}}"#));
    assert!(matches!(
      register_subscription(&transport, "/api", &descriptor()).await,
      Err(SubscriptionError::Status(500))
    ));

    transport.fail(PATH);
    assert!(matches!(
      register_subscription(&transport, "/api", &descriptor()).await,
      Err(SubscriptionError::Network(_))
    ));
  }
}
