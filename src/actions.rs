//! User inputs that produce writes, and how raw clicks map onto them

use chrono::Utc;
use serde_json::json;

/// What was clicked: the element's id, the classes of the element and its
/// ancestors (innermost first), and any product id attached to it.
#[derive(Debug, Clone, Default)]
pub struct ClickTarget {
  pub element_id: Option<String>,
  pub classes: Vec<String>,
  pub product_id: Option<String>,
}

impl ClickTarget {
  fn has_class(&self, class: &str) -> bool {
    self.classes.iter().any(|c| c == class)
  }
}

/// Tagged action produced by classifying one input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
  Checkout,
  ViewProduct { product_id: String },
  AddToCart { product_id: String },
  ToggleWishlist { product_id: String },
}

/// One classification rule. Earlier rules win, so a button inside a product
/// card is never also read as a card click.
pub struct Rule {
  pub name: &'static str,
  pub matches: fn(&ClickTarget) -> bool,
  pub build: fn(&ClickTarget) -> Option<Action>,
}

/// All classification rules, in priority order
pub const RULES: &[Rule] = &[
  Rule {
    name: "checkout",
    matches: |t| t.element_id.as_deref() == Some("checkout-button"),
    build: |_| Some(Action::Checkout),
  },
  Rule {
    name: "add-to-cart",
    matches: |t| t.has_class("add-to-cart-btn"),
    build: |t| {
      t.product_id
        .clone()
        .map(|product_id| Action::AddToCart { product_id })
    },
  },
  Rule {
    name: "wishlist",
    matches: |t| t.has_class("wishlist-btn"),
    build: |t| {
      t.product_id
        .clone()
        .map(|product_id| Action::ToggleWishlist { product_id })
    },
  },
  Rule {
    name: "product-card",
    matches: |t| t.has_class("product-card"),
    build: |t| {
      t.product_id
        .clone()
        .map(|product_id| Action::ViewProduct { product_id })
    },
  },
];

/// Classify a click into at most one action.
pub fn classify(target: &ClickTarget) -> Option<Action> {
  RULES
    .iter()
    .find(|rule| (rule.matches)(target))
    .and_then(|rule| (rule.build)(target))
}

impl Action {
  /// Activity record logged for this action, if any.
  pub fn activity(&self) -> Option<serde_json::Value> {
    let (kind, product_id) = match self {
      Action::ViewProduct { product_id } => ("product-view", product_id),
      Action::AddToCart { product_id } => ("add-to-cart", product_id),
      Action::ToggleWishlist { product_id } => ("wishlist-toggle", product_id),
      Action::Checkout => return None,
    };
    Some(json!({
      "type": kind,
      "productId": product_id,
      "timestamp": Utc::now().to_rfc3339(),
    }))
  }

  /// Page the action navigates to, if any.
  pub fn navigation(&self) -> Option<String> {
    match self {
      Action::ViewProduct { product_id } => Some(format!("/product/{}", product_id)),
      _ => None,
    }
  }
}
