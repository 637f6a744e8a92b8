//! Inventory ledger service.

use common::ProductId;

use crate::store::InventoryStore;
use crate::{InventoryError, Product, ReservationKey, Result};

/// The inventory ledger's public operations.
///
/// Wraps a store with tracing and metrics. It has no knowledge of orders
/// beyond the opaque [`ReservationKey`] a caller attaches to make a
/// decrement or its compensation safe to repeat.
#[derive(Clone)]
pub struct InventoryService<S: InventoryStore> {
    store: S,
}

impl<S: InventoryStore> InventoryService<S> {
    /// Creates a new inventory service over the given store.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Returns a reference to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Returns a read-only snapshot of a product.
    #[tracing::instrument(skip(self))]
    pub async fn get_product(&self, id: ProductId) -> Result<Product> {
        self.store
            .get_product(id)
            .await?
            .ok_or(InventoryError::ProductNotFound(id))
    }

    /// Returns the current stock of a product.
    #[tracing::instrument(skip(self))]
    pub async fn check_stock(&self, id: ProductId) -> Result<u32> {
        self.store.check_stock(id).await
    }

    /// Reserves `quantity` units, returning the remaining stock.
    #[tracing::instrument(skip(self))]
    pub async fn decrease_stock(&self, id: ProductId, quantity: u32) -> Result<u32> {
        match self.store.decrease_stock(id, quantity).await {
            Ok(remaining) => {
                metrics::counter!("inventory_stock_decrements_total").increment(1);
                tracing::debug!(%id, quantity, remaining, "stock decreased");
                Ok(remaining)
            }
            Err(err) => {
                if matches!(err, InventoryError::InsufficientStock { .. }) {
                    metrics::counter!("inventory_stock_rejections_total").increment(1);
                }
                tracing::debug!(%id, quantity, error = %err, "stock decrease rejected");
                Err(err)
            }
        }
    }

    /// Returns `quantity` units to the pool, returning the remaining stock.
    #[tracing::instrument(skip(self))]
    pub async fn increase_stock(&self, id: ProductId, quantity: u32) -> Result<u32> {
        let remaining = self.store.increase_stock(id, quantity).await?;
        metrics::counter!("inventory_stock_increments_total").increment(1);
        tracing::debug!(%id, quantity, remaining, "stock increased");
        Ok(remaining)
    }

    /// Reserves `quantity` units for `key`; replays do not decrement again.
    #[tracing::instrument(skip(self), fields(reservation = %key))]
    pub async fn reserve_stock(
        &self,
        key: ReservationKey,
        id: ProductId,
        quantity: u32,
    ) -> Result<u32> {
        match self.store.reserve_stock(key, id, quantity).await {
            Ok(remaining) => {
                metrics::counter!("inventory_stock_decrements_total").increment(1);
                tracing::debug!(%id, quantity, remaining, "stock reserved");
                Ok(remaining)
            }
            Err(err) => {
                if matches!(err, InventoryError::InsufficientStock { .. }) {
                    metrics::counter!("inventory_stock_rejections_total").increment(1);
                }
                tracing::debug!(%id, quantity, error = %err, "stock reservation rejected");
                Err(err)
            }
        }
    }

    /// Releases whatever `key` holds, at most once.
    #[tracing::instrument(skip(self), fields(reservation = %key))]
    pub async fn release_stock(&self, key: ReservationKey, id: ProductId) -> Result<u32> {
        let remaining = self.store.release_stock(key, id).await?;
        metrics::counter!("inventory_stock_increments_total").increment(1);
        tracing::debug!(%id, remaining, "reservation released");
        Ok(remaining)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryInventoryStore;
    use common::Money;

    #[tokio::test]
    async fn test_get_product_not_found() {
        let service = InventoryService::new(InMemoryInventoryStore::new());
        let result = service.get_product(ProductId::new()).await;
        assert!(matches!(result, Err(InventoryError::ProductNotFound(_))));
    }

    #[tokio::test]
    async fn test_reserve_then_release() {
        let product = Product::new("Gadget", Money::from_cents(2500), 4);
        let id = product.id;
        let service =
            InventoryService::new(InMemoryInventoryStore::with_products([product]).await);

        assert_eq!(service.decrease_stock(id, 4).await.unwrap(), 0);
        assert!(matches!(
            service.decrease_stock(id, 1).await,
            Err(InventoryError::InsufficientStock { available: 0, .. })
        ));
        assert_eq!(service.increase_stock(id, 4).await.unwrap(), 4);
        assert_eq!(service.check_stock(id).await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_keyed_reservation_survives_replays() {
        let product = Product::new("Gadget", Money::from_cents(2500), 4);
        let id = product.id;
        let service =
            InventoryService::new(InMemoryInventoryStore::with_products([product]).await);
        let key = ReservationKey::new(common::OrderId::new(), 1);

        assert_eq!(service.reserve_stock(key, id, 3).await.unwrap(), 1);
        assert_eq!(service.reserve_stock(key, id, 3).await.unwrap(), 1);
        assert_eq!(service.release_stock(key, id).await.unwrap(), 4);
        assert_eq!(service.release_stock(key, id).await.unwrap(), 4);
        assert!(matches!(
            service.reserve_stock(key, id, 3).await,
            Err(InventoryError::ReservationReleased(_))
        ));
    }
}
