//! How the order ledger reaches the inventory ledger.

mod http;
mod local;
mod retry;

pub use http::HttpInventoryClient;
pub use local::LocalInventoryClient;
pub use retry::{RetryPolicy, with_retry};

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::ProductId;
use inventory::{Product, ReservationKey};
use thiserror::Error;

/// Failures of an inventory RPC.
///
/// `NotFound`, `InsufficientStock` and `InvalidQuantity` are answers from
/// the ledger and are never retried. `Timeout` and `Transport` mean the
/// answer never arrived; the call may or may not have been applied, which
/// is why every retried stock change carries a [`ReservationKey`].
#[derive(Debug, Clone, Error)]
pub enum InventoryClientError {
    #[error("Product not found: {0}")]
    NotFound(ProductId),

    #[error(
        "Insufficient stock for product {product_id}: requested {requested}, available {available}"
    )]
    InsufficientStock {
        product_id: ProductId,
        requested: u32,
        available: u32,
    },

    #[error("Invalid quantity for product {product_id}")]
    InvalidQuantity { product_id: ProductId },

    #[error("Inventory call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Inventory transport error: {0}")]
    Transport(String),

    /// The ledger refused the call for a reason the client cannot classify.
    #[error("Inventory rejected the call: {0}")]
    Rejected(String),
}

impl InventoryClientError {
    /// Returns true if the call may be retried.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            InventoryClientError::Timeout(_) | InventoryClientError::Transport(_)
        )
    }
}

/// Client-side result type.
pub type ClientResult<T> = std::result::Result<T, InventoryClientError>;

/// The inventory ledger's RPC surface, as seen by the order ledger.
#[async_trait]
pub trait InventoryClient: Send + Sync {
    /// `GetProduct`.
    async fn get_product(&self, id: ProductId) -> ClientResult<Product>;

    /// `CheckStock`.
    async fn check_stock(&self, id: ProductId) -> ClientResult<u32>;

    /// `DecreaseStock` keyed by order line. Returns the remaining stock.
    ///
    /// Safe to repeat: the ledger applies a key at most once.
    async fn reserve_stock(
        &self,
        key: ReservationKey,
        id: ProductId,
        quantity: u32,
    ) -> ClientResult<u32>;

    /// `IncreaseStock` keyed by order line. Returns the remaining stock.
    ///
    /// Returns whatever the key holds, at most once; a key that never took
    /// stock is fenced so a late `reserve_stock` for it is refused.
    async fn release_stock(
        &self,
        key: ReservationKey,
        id: ProductId,
        quantity: u32,
    ) -> ClientResult<u32>;

    /// Unkeyed `IncreaseStock`, for administrative restocks.
    async fn increase_stock(&self, id: ProductId, quantity: u32) -> ClientResult<u32>;
}

#[async_trait]
impl<T: InventoryClient + ?Sized> InventoryClient for Arc<T> {
    async fn get_product(&self, id: ProductId) -> ClientResult<Product> {
        (**self).get_product(id).await
    }

    async fn check_stock(&self, id: ProductId) -> ClientResult<u32> {
        (**self).check_stock(id).await
    }

    async fn reserve_stock(
        &self,
        key: ReservationKey,
        id: ProductId,
        quantity: u32,
    ) -> ClientResult<u32> {
        (**self).reserve_stock(key, id, quantity).await
    }

    async fn release_stock(
        &self,
        key: ReservationKey,
        id: ProductId,
        quantity: u32,
    ) -> ClientResult<u32> {
        (**self).release_stock(key, id, quantity).await
    }

    async fn increase_stock(&self, id: ProductId, quantity: u32) -> ClientResult<u32> {
        (**self).increase_stock(id, quantity).await
    }
}
