//! Wire contract of the inventory ledger.
//!
//! These are the request and reply shapes exchanged between the order
//! ledger and the inventory ledger. Business failures travel inside the
//! reply (`found = false`, `success = false`) rather than as transport
//! errors, so a client can tell "the ledger said no" apart from "the ledger
//! could not be reached".

use common::{ErrorCode, Money, ProductId};
use serde::{Deserialize, Serialize};

use crate::{InventoryError, Product, ReservationKey};

/// Reply to `GetProduct`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductReply {
    pub found: bool,
    pub id: Option<ProductId>,
    pub name: String,
    pub price: Money,
    pub stock: u32,
    pub is_active: bool,
}

impl ProductReply {
    pub fn not_found() -> Self {
        Self {
            found: false,
            id: None,
            name: String::new(),
            price: Money::zero(),
            stock: 0,
            is_active: false,
        }
    }

    /// Converts the reply back into a product snapshot, if one was found.
    pub fn into_product(self) -> Option<Product> {
        match (self.found, self.id) {
            (true, Some(id)) => Some(Product {
                id,
                name: self.name,
                price: self.price,
                stock: self.stock,
                is_active: self.is_active,
            }),
            _ => None,
        }
    }
}

impl From<Product> for ProductReply {
    fn from(product: Product) -> Self {
        Self {
            found: true,
            id: Some(product.id),
            name: product.name,
            price: product.price,
            stock: product.stock,
            is_active: product.is_active,
        }
    }
}

/// Reply to `CheckStock`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockReply {
    pub found: bool,
    pub stock: u32,
}

/// Body of `DecreaseStock` and `IncreaseStock`.
///
/// With a `reservation` key the change is idempotent: a keyed decrease is
/// applied at most once and a keyed increase returns the units that key
/// holds, at most once, ignoring `quantity`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockChangeRequest {
    pub quantity: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reservation: Option<ReservationKey>,
}

impl StockChangeRequest {
    pub fn new(quantity: u32) -> Self {
        Self {
            quantity,
            reservation: None,
        }
    }

    pub fn keyed(key: ReservationKey, quantity: u32) -> Self {
        Self {
            quantity,
            reservation: Some(key),
        }
    }
}

/// Reply to `DecreaseStock` and `IncreaseStock`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockChangeReply {
    pub success: bool,
    pub remaining_stock: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,
}

impl StockChangeReply {
    pub fn applied(remaining_stock: u32) -> Self {
        Self {
            success: true,
            remaining_stock,
            error_message: None,
            error_code: None,
        }
    }

    /// Builds a rejection reply from a business error.
    ///
    /// For `InsufficientStock` the reply carries the stock that was
    /// available when the decrement was refused.
    pub fn rejected(err: &InventoryError) -> Self {
        let remaining_stock = match err {
            InventoryError::InsufficientStock { available, .. } => *available,
            _ => 0,
        };
        Self {
            success: false,
            remaining_stock,
            error_message: Some(err.to_string()),
            error_code: Some(err.code()),
        }
    }

    /// Reconstructs the ledger's error from a rejection reply.
    ///
    /// Returns `None` for successful replies or for codes that do not
    /// correspond to a business failure.
    pub fn to_error(&self, id: ProductId, requested: u32) -> Option<InventoryError> {
        if self.success {
            return None;
        }
        match self.error_code? {
            ErrorCode::ProductNotFound => Some(InventoryError::ProductNotFound(id)),
            ErrorCode::InsufficientStock => Some(InventoryError::InsufficientStock {
                product_id: id,
                requested,
                available: self.remaining_stock,
            }),
            ErrorCode::InvalidQuantity => Some(InventoryError::InvalidQuantity {
                quantity: requested,
            }),
            ErrorCode::ValidationError => Some(InventoryError::StockOverflow(id)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_product_reply_roundtrip() {
        let product = Product::new("Lamp", Money::from_cents(4599), 7);
        let reply = ProductReply::from(product.clone());
        assert!(reply.found);
        assert_eq!(reply.into_product(), Some(product));
        assert_eq!(ProductReply::not_found().into_product(), None);
    }

    #[test]
    fn test_rejected_reply_carries_available_stock() {
        let id = ProductId::new();
        let err = InventoryError::InsufficientStock {
            product_id: id,
            requested: 5,
            available: 2,
        };
        let reply = StockChangeReply::rejected(&err);
        assert!(!reply.success);
        assert_eq!(reply.remaining_stock, 2);
        assert_eq!(reply.error_code, Some(ErrorCode::InsufficientStock));

        let restored = reply.to_error(id, 5).unwrap();
        assert!(matches!(
            restored,
            InventoryError::InsufficientStock {
                requested: 5,
                available: 2,
                ..
            }
        ));
    }

    #[test]
    fn test_reply_wire_shape() {
        let json = serde_json::to_value(StockChangeReply::applied(3)).unwrap();
        assert_eq!(json, serde_json::json!({"success": true, "remaining_stock": 3}));

        let reply = StockChangeReply::rejected(&InventoryError::ProductNotFound(ProductId::new()));
        let json = serde_json::to_value(&reply).unwrap();
        assert_eq!(json["error_code"], "PRODUCT_NOT_FOUND");
        assert!(StockChangeReply::applied(1).to_error(ProductId::new(), 1).is_none());
    }

    #[test]
    fn test_request_key_is_optional_on_the_wire() {
        let plain: StockChangeRequest = serde_json::from_str(r#"{"quantity": 2}"#).unwrap();
        assert_eq!(plain, StockChangeRequest::new(2));
        assert_eq!(
            serde_json::to_value(plain).unwrap(),
            serde_json::json!({"quantity": 2})
        );

        let key = ReservationKey::new(common::OrderId::new(), 3);
        let json = serde_json::to_value(StockChangeRequest::keyed(key, 2)).unwrap();
        assert_eq!(json["reservation"]["line_no"], 3);
        let back: StockChangeRequest = serde_json::from_value(json).unwrap();
        assert_eq!(back.reservation, Some(key));
    }
}
