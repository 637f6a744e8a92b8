use std::sync::Arc;

use async_trait::async_trait;
use common::ProductId;

use crate::{InventoryError, Product, ReservationKey, Result};

/// Storage for product rows and their stock counters.
///
/// Implementations must make `decrease_stock` and `increase_stock`
/// linearizable per product id: a decrement either observes enough stock
/// and applies atomically, or fails without touching the row. Callers never
/// read-then-write stock themselves.
#[async_trait]
pub trait InventoryStore: Send + Sync {
    /// Returns a snapshot of the product, or None if it doesn't exist.
    async fn get_product(&self, id: ProductId) -> Result<Option<Product>>;

    /// Returns the current stock of a product.
    async fn check_stock(&self, id: ProductId) -> Result<u32> {
        self.get_product(id)
            .await?
            .map(|product| product.stock)
            .ok_or(InventoryError::ProductNotFound(id))
    }

    /// Atomically removes `quantity` units if at least that many are available.
    ///
    /// Returns the remaining stock.
    async fn decrease_stock(&self, id: ProductId, quantity: u32) -> Result<u32>;

    /// Atomically returns `quantity` units to the pool.
    ///
    /// Returns the remaining stock.
    async fn increase_stock(&self, id: ProductId, quantity: u32) -> Result<u32>;

    /// Removes `quantity` units on behalf of `key`, at most once.
    ///
    /// The hold is recorded atomically with the decrement. Replaying an
    /// applied key returns the current stock and leaves it unchanged; a key
    /// that was already released fails with `ReservationReleased`.
    async fn reserve_stock(&self, key: ReservationKey, id: ProductId, quantity: u32)
    -> Result<u32>;

    /// Returns the units held by `key`, at most once.
    ///
    /// Releasing an already-released key returns the current stock.
    /// Releasing a key with no hold records it as released, so a decrement
    /// still in flight for that key is refused when it arrives.
    async fn release_stock(&self, key: ReservationKey, id: ProductId) -> Result<u32>;

    /// Inserts or replaces a product row, including its stock.
    ///
    /// This is the administrative catalog edit; it is not part of the
    /// reservation protocol.
    async fn upsert_product(&self, product: Product) -> Result<()>;
}

#[async_trait]
impl<T: InventoryStore + ?Sized> InventoryStore for Arc<T> {
    async fn get_product(&self, id: ProductId) -> Result<Option<Product>> {
        (**self).get_product(id).await
    }

    async fn check_stock(&self, id: ProductId) -> Result<u32> {
        (**self).check_stock(id).await
    }

    async fn decrease_stock(&self, id: ProductId, quantity: u32) -> Result<u32> {
        (**self).decrease_stock(id, quantity).await
    }

    async fn increase_stock(&self, id: ProductId, quantity: u32) -> Result<u32> {
        (**self).increase_stock(id, quantity).await
    }

    async fn reserve_stock(
        &self,
        key: ReservationKey,
        id: ProductId,
        quantity: u32,
    ) -> Result<u32> {
        (**self).reserve_stock(key, id, quantity).await
    }

    async fn release_stock(&self, key: ReservationKey, id: ProductId) -> Result<u32> {
        (**self).release_stock(key, id).await
    }

    async fn upsert_product(&self, product: Product) -> Result<()> {
        (**self).upsert_product(product).await
    }
}

/// Rejects zero-unit stock changes.
pub(crate) fn ensure_positive(quantity: u32) -> Result<()> {
    if quantity == 0 {
        return Err(InventoryError::InvalidQuantity { quantity });
    }
    Ok(())
}
