//! Product rows owned by the inventory ledger.

use common::{Money, ProductId};
use serde::{Deserialize, Serialize};

/// A read-only snapshot of a product row.
///
/// `stock` is the value observed at read time; it may change the moment
/// after the snapshot is taken.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub price: Money,
    pub stock: u32,
    pub is_active: bool,
}

impl Product {
    /// Creates an active product with a fresh id.
    pub fn new(name: impl Into<String>, price: Money, stock: u32) -> Self {
        Self {
            id: ProductId::new(),
            name: name.into(),
            price,
            stock,
            is_active: true,
        }
    }

    /// Returns a copy with the given active flag.
    pub fn with_active(mut self, is_active: bool) -> Self {
        self.is_active = is_active;
        self
    }

    /// Returns a copy with a new unit price.
    pub fn with_price(mut self, price: Money) -> Self {
        self.price = price;
        self
    }
}
