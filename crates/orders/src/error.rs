//! Order ledger error types.

use common::{ErrorCode, OrderId, ProductId};
use thiserror::Error;

use crate::client::InventoryClientError;
use crate::status::OrderStatus;

/// Errors that can occur when creating or mutating orders.
#[derive(Debug, Error)]
pub enum OrderError {
    /// The order contained no items.
    #[error("Order must contain at least one item")]
    EmptyOrder,

    /// An item requested zero units.
    #[error("Invalid quantity for product {product_id}: must be greater than 0")]
    InvalidQuantity { product_id: ProductId },

    /// A status string could not be parsed.
    #[error("Invalid order status: {0}")]
    InvalidStatus(String),

    /// The referenced product does not exist.
    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    /// The referenced product is inactive.
    #[error("Product {0} is not available")]
    ProductUnavailable(ProductId),

    /// The product holds too little stock.
    #[error(
        "Insufficient stock for product {product_id}: requested {requested}, available {available}"
    )]
    InsufficientStock {
        product_id: ProductId,
        requested: u32,
        available: u32,
    },

    /// No order exists with the given id.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// The requested status change is not a legal edge.
    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    /// The operation requires a pending order.
    #[error("Order is not pending (current status: {status})")]
    NotPending { status: OrderStatus },

    /// Another writer changed the order first.
    #[error("Order {0} was modified concurrently")]
    ConcurrencyConflict(OrderId),

    /// The inventory ledger could not be reached.
    #[error("Inventory ledger unavailable: {0}")]
    Upstream(String),

    /// The order was persisted but fulfillment failed; it has been cancelled
    /// and any reserved stock returned.
    #[error("Order {order_id} was cancelled: {cause}")]
    OrderCancelled {
        order_id: OrderId,
        cause: Box<OrderError>,
    },

    /// The caller stopped waiting before fulfillment finished.
    #[error("Request abandoned by caller")]
    Abandoned,

    /// An unexpected internal failure.
    #[error("Internal error: {0}")]
    Internal(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl OrderError {
    /// Returns the stable error code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            OrderError::EmptyOrder => ErrorCode::EmptyOrder,
            OrderError::InvalidQuantity { .. } => ErrorCode::InvalidQuantity,
            OrderError::InvalidStatus(_) => ErrorCode::ValidationError,
            OrderError::ProductNotFound(_) => ErrorCode::ProductNotFound,
            OrderError::ProductUnavailable(_) => ErrorCode::ProductUnavailable,
            OrderError::InsufficientStock { .. } => ErrorCode::InsufficientStock,
            OrderError::OrderNotFound(_) => ErrorCode::OrderNotFound,
            OrderError::InvalidTransition { .. } => ErrorCode::InvalidTransition,
            OrderError::NotPending { .. } => ErrorCode::OrderNotPending,
            OrderError::ConcurrencyConflict(_) => ErrorCode::ConcurrencyConflict,
            OrderError::Upstream(_) => ErrorCode::UpstreamUnavailable,
            OrderError::OrderCancelled { cause, .. } => cause.code(),
            OrderError::Abandoned | OrderError::Internal(_) | OrderError::Database(_) => {
                ErrorCode::InternalError
            }
        }
    }

    /// Returns the id of the cancelled order, if fulfillment ran far
    /// enough to persist one.
    pub fn cancelled_order(&self) -> Option<OrderId> {
        match self {
            OrderError::OrderCancelled { order_id, .. } => Some(*order_id),
            _ => None,
        }
    }

    /// Returns the underlying failure, unwrapping `OrderCancelled`.
    pub fn root_cause(&self) -> &OrderError {
        match self {
            OrderError::OrderCancelled { cause, .. } => cause.root_cause(),
            other => other,
        }
    }
}

impl From<InventoryClientError> for OrderError {
    fn from(err: InventoryClientError) -> Self {
        match err {
            InventoryClientError::NotFound(id) => OrderError::ProductNotFound(id),
            InventoryClientError::InsufficientStock {
                product_id,
                requested,
                available,
            } => OrderError::InsufficientStock {
                product_id,
                requested,
                available,
            },
            InventoryClientError::InvalidQuantity { product_id } => {
                OrderError::InvalidQuantity { product_id }
            }
            InventoryClientError::Timeout(_) | InventoryClientError::Transport(_) => {
                OrderError::Upstream(err.to_string())
            }
            InventoryClientError::Rejected(msg) => OrderError::Internal(msg),
        }
    }
}

/// Result type for order operations.
pub type Result<T> = std::result::Result<T, OrderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancelled_error_reports_cause_code() {
        let order_id = OrderId::new();
        let err = OrderError::OrderCancelled {
            order_id,
            cause: Box::new(OrderError::InsufficientStock {
                product_id: ProductId::new(),
                requested: 3,
                available: 2,
            }),
        };
        assert_eq!(err.code(), ErrorCode::InsufficientStock);
        assert_eq!(err.cancelled_order(), Some(order_id));
        assert!(matches!(
            err.root_cause(),
            OrderError::InsufficientStock { .. }
        ));
    }

    #[test]
    fn test_transient_client_errors_map_to_upstream() {
        let err: OrderError =
            InventoryClientError::Timeout(std::time::Duration::from_millis(10)).into();
        assert_eq!(err.code(), ErrorCode::UpstreamUnavailable);
    }
}
