//! Closed decode of push payloads.
//!
//! Payload schema: `{ type?, orderId?, message?, promoId? }`. Anything that
//! does not fully match a known type decodes to `Generic`; decoding never
//! fails.

use serde::{Deserialize, Serialize};

const DEFAULT_TITLE: &str = "E-Commerce Store";
const DEFAULT_BODY: &str = "New notification";
const DEFAULT_URL: &str = "/";
const ICON: &str = "/images/icons/icon-192x192.png";
const BADGE: &str = "/images/icons/badge-72x72.png";
const VIBRATE: [u32; 3] = [100, 50, 100];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushNotification {
  OrderConfirmation { order_id: String },
  Promotion { promo_id: String, message: String },
  ShippingUpdate { order_id: String, message: String },
  Generic,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPayload {
  #[serde(rename = "type")]
  kind: Option<String>,
  order_id: Option<serde_json::Value>,
  promo_id: Option<serde_json::Value>,
  message: Option<String>,
}

/// Ids may arrive as strings or numbers.
fn id_text(value: Option<serde_json::Value>) -> Option<String> {
  match value? {
    serde_json::Value::String(s) if !s.is_empty() => Some(s),
    serde_json::Value::Number(n) => Some(n.to_string()),
    _ => None,
  }
}

impl PushNotification {
  /// Decode a raw push payload. `None` means the push carried no data.
  pub fn decode(raw: Option<&[u8]>) -> Self {
    let Some(bytes) = raw else {
      return Self::Generic;
    };
    let Ok(payload) = serde_json::from_slice::<RawPayload>(bytes) else {
      return Self::Generic;
    };

    let order_id = id_text(payload.order_id);
    let promo_id = id_text(payload.promo_id);
    let message = payload.message.filter(|m| !m.is_empty());

    match (payload.kind.as_deref(), order_id, promo_id, message) {
      (Some("order-confirmation"), Some(order_id), _, _) => Self::OrderConfirmation { order_id },
      (Some("promotion"), _, Some(promo_id), Some(message)) => Self::Promotion { promo_id, message },
      (Some("shipping-update"), Some(order_id), _, Some(message)) => {
        Self::ShippingUpdate { order_id, message }
      }
      _ => Self::Generic,
    }
  }

  pub fn title(&self) -> &'static str {
    match self {
      Self::OrderConfirmation { .. } => "Order Confirmed!",
      Self::Promotion { .. } => "Special Offer!",
      Self::ShippingUpdate { .. } => "Shipping Update",
      Self::Generic => DEFAULT_TITLE,
    }
  }

  pub fn body(&self) -> String {
    match self {
      Self::OrderConfirmation { order_id } => {
        format!("Your order #{} has been confirmed.", order_id)
      }
      Self::Promotion { message, .. } | Self::ShippingUpdate { message, .. } => message.clone(),
      Self::Generic => DEFAULT_BODY.to_string(),
    }
  }

  /// Navigation target opened on click.
  pub fn url(&self) -> String {
    match self {
      Self::OrderConfirmation { order_id } => format!("/order-status/{}", order_id),
      Self::Promotion { promo_id, .. } => format!("/promotions/{}", promo_id),
      Self::ShippingUpdate { order_id, .. } => format!("/order-tracking/{}", order_id),
      Self::Generic => DEFAULT_URL.to_string(),
    }
  }

  pub fn tag(&self) -> &'static str {
    match self {
      Self::OrderConfirmation { .. } => "order-confirmation",
      Self::Promotion { .. } => "promotion",
      Self::ShippingUpdate { .. } => "shipping-update",
      Self::Generic => "generic",
    }
  }

  /// What gets handed to the presenter.
  pub fn to_notification(&self) -> Notification {
    Notification {
      tag: self.tag().to_string(),
      title: self.title().to_string(),
      body: self.body(),
      url: self.url(),
      icon: ICON.to_string(),
      badge: BADGE.to_string(),
      vibrate: VIBRATE.to_vec(),
    }
  }
}

/// A notification ready for display. Lives only until presented and clicked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
  pub tag: String,
  pub title: String,
  pub body: String,
  pub url: String,
  pub icon: String,
  pub badge: String,
  pub vibrate: Vec<u32>,
}
