//! Startup catalog seeding from `CATALOG_SEED_PATH`.

use std::path::Path;

use common::{Money, ProductId};
use inventory::{InventoryStore, Product};
use serde::Deserialize;
use thiserror::Error;

/// One entry of the seed file.
#[derive(Debug, Clone, Deserialize)]
pub struct SeedProduct {
    #[serde(default)]
    pub id: Option<ProductId>,
    pub name: String,
    pub price_cents: i64,
    pub stock: u32,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

impl SeedProduct {
    fn into_product(self) -> Product {
        let mut product = Product::new(self.name, Money::from_cents(self.price_cents), self.stock)
            .with_active(self.is_active);
        if let Some(id) = self.id {
            product.id = id;
        }
        product
    }
}

#[derive(Debug, Error)]
pub enum SeedError {
    #[error("failed to read seed file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid seed file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to store seeded product: {0}")]
    Store(#[from] inventory::InventoryError),
}

/// Parses a JSON array of products.
pub fn parse_catalog(json: &str) -> Result<Vec<Product>, SeedError> {
    let entries: Vec<SeedProduct> = serde_json::from_str(json)?;
    Ok(entries.into_iter().map(SeedProduct::into_product).collect())
}

/// Upserts every product in the file, returning how many were loaded.
pub async fn load_catalog<S: InventoryStore + ?Sized>(
    store: &S,
    path: &Path,
) -> Result<usize, SeedError> {
    let json = tokio::fs::read_to_string(path).await?;
    let products = parse_catalog(&json)?;
    let count = products.len();
    for product in products {
        store.upsert_product(product).await?;
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_catalog() {
        let id = ProductId::new();
        let json = format!(
            r#"[
                {{"id": "{id}", "name": "Teapot", "price_cents": 12000, "stock": 4}},
                {{"name": "Cup", "price_cents": 1500, "stock": 0, "is_active": false}}
            ]"#
        );
        let products = parse_catalog(&json).unwrap();
        assert_eq!(products.len(), 2);
        assert_eq!(products[0].id, id);
        assert!(products[0].is_active);
        assert_eq!(products[1].price, Money::from_cents(1500));
        assert!(!products[1].is_active);
    }

    #[test]
    fn test_negative_stock_is_rejected() {
        let json = r#"[{"name": "Cup", "price_cents": 1500, "stock": -1}]"#;
        assert!(matches!(parse_catalog(json), Err(SeedError::Parse(_))));
    }
}
