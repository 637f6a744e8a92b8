use async_trait::async_trait;
use common::ProductId;
use inventory::{InventoryError, InventoryService, InventoryStore, Product, ReservationKey};

use super::{ClientResult, InventoryClient, InventoryClientError};

/// Reaches an inventory ledger running in the same process.
#[derive(Clone)]
pub struct LocalInventoryClient<S: InventoryStore> {
    service: InventoryService<S>,
}

impl<S: InventoryStore> LocalInventoryClient<S> {
    pub fn new(service: InventoryService<S>) -> Self {
        Self { service }
    }

    pub fn service(&self) -> &InventoryService<S> {
        &self.service
    }
}

fn map_error(id: ProductId, err: InventoryError) -> InventoryClientError {
    match err {
        InventoryError::ProductNotFound(id) => InventoryClientError::NotFound(id),
        InventoryError::InsufficientStock {
            product_id,
            requested,
            available,
        } => InventoryClientError::InsufficientStock {
            product_id,
            requested,
            available,
        },
        InventoryError::InvalidQuantity { .. } => {
            InventoryClientError::InvalidQuantity { product_id: id }
        }
        InventoryError::StockOverflow(_) | InventoryError::ReservationReleased(_) => {
            InventoryClientError::Rejected(err.to_string())
        }
        InventoryError::Database(e) => InventoryClientError::Transport(e.to_string()),
    }
}

#[async_trait]
impl<S: InventoryStore> InventoryClient for LocalInventoryClient<S> {
    async fn get_product(&self, id: ProductId) -> ClientResult<Product> {
        self.service.get_product(id).await.map_err(|e| map_error(id, e))
    }

    async fn check_stock(&self, id: ProductId) -> ClientResult<u32> {
        self.service.check_stock(id).await.map_err(|e| map_error(id, e))
    }

    async fn reserve_stock(
        &self,
        key: ReservationKey,
        id: ProductId,
        quantity: u32,
    ) -> ClientResult<u32> {
        self.service
            .reserve_stock(key, id, quantity)
            .await
            .map_err(|e| map_error(id, e))
    }

    async fn release_stock(
        &self,
        key: ReservationKey,
        id: ProductId,
        _quantity: u32,
    ) -> ClientResult<u32> {
        self.service
            .release_stock(key, id)
            .await
            .map_err(|e| map_error(id, e))
    }

    async fn increase_stock(&self, id: ProductId, quantity: u32) -> ClientResult<u32> {
        self.service
            .increase_stock(id, quantity)
            .await
            .map_err(|e| map_error(id, e))
    }
}
