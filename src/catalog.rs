//! Product mirror and the local-only cart.
//!
//! Products are overwritten wholesale on every successful fetch so the local
//! copy is always one consistent server snapshot. The cart never leaves the
//! device.

use serde::{Deserialize, Deserializer, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::db::{Container, Database, Document, StoreError};
use crate::net::{Request, Transport};

/// A read-mostly product entity mirrored from the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
  #[serde(deserialize_with = "deserialize_id")]
  pub id: String,
  #[serde(default)]
  pub name: String,
  #[serde(default)]
  pub category: String,
  pub price: serde_json::Number,
  #[serde(default)]
  pub description: String,
  #[serde(default)]
  pub image: String,
}

fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
  D: Deserializer<'de>,
{
  #[derive(Deserialize)]
  #[serde(untagged)]
  enum Id {
    Text(String),
    Number(serde_json::Number),
  }

  Ok(match Id::deserialize(deserializer)? {
    Id::Text(s) => s,
    Id::Number(n) => n.to_string(),
  })
}

impl Document for ProductRecord {
  const CONTAINER: Container = Container::Products;

  fn key(&self) -> String {
    self.id.clone()
  }

  fn index(&self) -> Option<&str> {
    Some(&self.category)
  }
}

/// A cart line. Quantities only ever change locally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
  pub product_id: String,
  pub name: String,
  pub price: serde_json::Number,
  pub image: String,
  pub quantity: u32,
}

impl Document for CartItem {
  const CONTAINER: Container = Container::Cart;

  fn key(&self) -> String {
    self.product_id.clone()
  }
}

/// Where a product list came from.
#[derive(Debug, Clone, PartialEq)]
pub enum Products {
  Fresh(Vec<ProductRecord>),
  /// Network failed; this is the last mirrored snapshot
  Cached(Vec<ProductRecord>),
  /// Network failed and nothing is mirrored
  Unavailable,
}

pub struct Catalog<T: Transport> {
  db: Arc<Database>,
  transport: T,
  api_prefix: String,
}

impl<T: Transport> Catalog<T> {
  pub fn new(db: Arc<Database>, transport: T, api_prefix: impl Into<String>) -> Self {
    Self {
      db,
      transport,
      api_prefix: api_prefix.into(),
    }
  }

  /// Fetch the product list, refreshing the mirror; fall back to the mirror.
  pub async fn load_products(&self) -> Products {
    let request = Request::get(format!("{}/products", self.api_prefix));

    match self.transport.send(&request).await {
      Ok(response) if response.is_success() => match response.json::<Vec<ProductRecord>>() {
        Ok(products) => {
          if let Err(e) = self.db.replace_all(&products) {
            warn!(error = %e, "failed to mirror products");
          }
          info!(count = products.len(), "products refreshed");
          return Products::Fresh(products);
        }
        Err(e) => warn!(error = %e, "unreadable product list from server"),
      },
      Ok(response) => warn!(status = response.status, "failed to fetch products from server"),
      Err(e) => info!(error = %e, "network request failed, loading mirrored products"),
    }

    match self.db.list::<ProductRecord>() {
      Ok(products) if !products.is_empty() => Products::Cached(products),
      Ok(_) => Products::Unavailable,
      Err(e) => {
        warn!(error = %e, "failed to read mirrored products");
        Products::Unavailable
      }
    }
  }

  pub fn product(&self, id: &str) -> Result<Option<ProductRecord>, StoreError> {
    self.db.get(id)
  }

  pub fn products_in_category(&self, category: &str) -> Result<Vec<ProductRecord>, StoreError> {
    self.db.list_by_index(category)
  }

  /// Add one of `product_id` to the cart. `None` when the product is not in
  /// the mirror.
  pub fn add_to_cart(&self, product_id: &str) -> Result<Option<CartItem>, StoreError> {
    let Some(product) = self.product(product_id)? else {
      return Ok(None);
    };

    let item = self.db.modify(product_id, |existing: Option<CartItem>| match existing {
      Some(mut item) => {
        item.quantity += 1;
        item
      }
      None => CartItem {
        product_id: product.id.clone(),
        name: product.name.clone(),
        price: product.price.clone(),
        image: product.image.clone(),
        quantity: 1,
      },
    })?;
    Ok(Some(item))
  }

  pub fn cart_items(&self) -> Result<Vec<CartItem>, StoreError> {
    self.db.list()
  }

  pub fn clear_cart(&self) -> Result<(), StoreError> {
    self.db.clear::<CartItem>()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::net::Response;
  use crate::testing::FakeTransport;

  const PRODUCTS: &str = r#"[
    {"id": 1, "name": "Mug", "category": "kitchen", "price": 12.5, "description": "", "image": "/img/mug.png"},
    {"id": "2", "name": "Tee", "category": "apparel", "price": 20, "description": "Cotton", "image": "/img/tee.png"}
  ]"#;

  fn catalog(transport: FakeTransport) -> Catalog<FakeTransport> {
    Catalog::new(Arc::new(Database::open_in_memory().unwrap()), transport, "/api")
  }

  #[tokio::test]
  async fn test_fresh_products_replace_mirror() {
    let transport = FakeTransport::new();
    transport.respond("/api/products", Response::new(200, PRODUCTS));
    let catalog = catalog(transport);
    catalog
      .db
      .put(&ProductRecord {
        id: "stale".to_string(),
        name: String::new(),
        category: String::new(),
        price: serde_json::Number::from(1u32),
        description: String::new(),
        image: String::new(),
      })
      .unwrap();

    let Products::Fresh(products) = catalog.load_products().await else {
      panic!("expected fresh products");
    };
    assert_eq!(products.len(), 2);
    assert_eq!(products[0].id, "1");
    assert!(catalog.product("stale").unwrap().is_none());
    assert_eq!(catalog.products_in_category("apparel").unwrap()[0].name, "Tee");
  }

  #[tokio::test]
  async fn test_offline_serves_mirror_or_unavailable() {
    let transport = FakeTransport::new();
    let catalog = catalog(transport);
    assert_eq!(catalog.load_products().await, Products::Unavailable);

    catalog.transport.respond("/api/products", Response::new(200, PRODUCTS));
    catalog.load_products().await;
    catalog.transport.fail("/api/products");

    let Products::Cached(products) = catalog.load_products().await else {
      panic!("expected mirrored products");
    };
    assert_eq!(products.len(), 2);
  }

  #[tokio::test]
  async fn test_add_to_cart_increments_quantity() {
    let transport = FakeTransport::new();
    transport.respond("/api/products", Response::new(200, PRODUCTS));
    let catalog = catalog(transport);
    catalog.load_products().await;

    catalog.add_to_cart("2").unwrap();
    let item = catalog.add_to_cart("2").unwrap().unwrap();
    assert_eq!(item.quantity, 2);
    assert_eq!(item.name, "Tee");
    assert!(catalog.add_to_cart("missing").unwrap().is_none());

    assert_eq!(catalog.cart_items().unwrap().len(), 1);
    catalog.clear_cart().unwrap();
    assert!(catalog.cart_items().unwrap().is_empty());
  }
}
