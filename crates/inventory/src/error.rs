//! Inventory ledger error types.

use common::{ErrorCode, ProductId};
use thiserror::Error;

use crate::ReservationKey;

/// Errors that can occur when reading or mutating stock.
#[derive(Debug, Error)]
pub enum InventoryError {
    /// No product row exists with the given id.
    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    /// The product does not hold enough stock to satisfy the decrement.
    #[error(
        "Insufficient stock for product {product_id}: requested {requested}, available {available}"
    )]
    InsufficientStock {
        product_id: ProductId,
        requested: u32,
        available: u32,
    },

    /// Stock changes must move at least one unit.
    #[error("Invalid quantity: {quantity} (must be greater than 0)")]
    InvalidQuantity { quantity: u32 },

    /// The stock counter would overflow.
    #[error("Stock overflow for product {0}")]
    StockOverflow(ProductId),

    /// The reservation was already released; it cannot be taken again.
    #[error("Reservation {0} was already released")]
    ReservationReleased(ReservationKey),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl InventoryError {
    /// Returns the stable error code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            InventoryError::ProductNotFound(_) => ErrorCode::ProductNotFound,
            InventoryError::InsufficientStock { .. } => ErrorCode::InsufficientStock,
            InventoryError::InvalidQuantity { .. } => ErrorCode::InvalidQuantity,
            InventoryError::StockOverflow(_) => ErrorCode::ValidationError,
            InventoryError::ReservationReleased(_) => ErrorCode::ReservationReleased,
            InventoryError::Database(_) => ErrorCode::InternalError,
        }
    }
}

/// Result type for inventory operations.
pub type Result<T> = std::result::Result<T, InventoryError>;
