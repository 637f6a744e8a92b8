use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, PoisonError, RwLock as StdRwLock};

use async_trait::async_trait;
use common::{Money, ProductId};
use tokio::sync::{Mutex, RwLock};

use crate::store::{InventoryStore, ensure_positive};
use crate::{InventoryError, Product, ReservationKey, Result};

/// Catalog fields of a row; only changed by administrative edits.
#[derive(Debug, Clone)]
struct ProductMeta {
    name: String,
    price: Money,
    is_active: bool,
}

/// A product row: catalog fields plus an atomic stock counter.
#[derive(Debug)]
struct ProductRow {
    meta: StdRwLock<ProductMeta>,
    stock: AtomicU32,
}

impl ProductRow {
    fn snapshot(&self, id: ProductId) -> Product {
        let meta = self
            .meta
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        Product {
            id,
            name: meta.name,
            price: meta.price,
            stock: self.stock.load(Ordering::Acquire),
            is_active: meta.is_active,
        }
    }
}

/// A keyed hold on stock. A tombstone has zero quantity and starts released.
#[derive(Debug, Clone, Copy)]
struct Hold {
    product_id: ProductId,
    quantity: u32,
    released: bool,
}

/// In-memory inventory store.
///
/// Rows live in an arena keyed by product id. Each row's stock is an
/// `AtomicU32` mutated only through compare-and-swap, so a decrement can
/// never observe stale stock or drive the counter below zero. Keyed holds
/// sit behind one mutex, taken for the whole check-mutate-record sequence.
#[derive(Clone, Default)]
pub struct InMemoryInventoryStore {
    rows: Arc<RwLock<HashMap<ProductId, Arc<ProductRow>>>>,
    holds: Arc<Mutex<HashMap<ReservationKey, Hold>>>,
}

impl InMemoryInventoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store seeded with the given products.
    pub async fn with_products(products: impl IntoIterator<Item = Product>) -> Self {
        let store = Self::new();
        for product in products {
            store.insert(product).await;
        }
        store
    }

    /// Returns the number of product rows.
    pub async fn product_count(&self) -> usize {
        self.rows.read().await.len()
    }

    /// Returns the units still held by `key`, if it holds any.
    pub async fn held_quantity(&self, key: ReservationKey) -> Option<u32> {
        self.holds
            .lock()
            .await
            .get(&key)
            .filter(|hold| !hold.released)
            .map(|hold| hold.quantity)
    }

    async fn insert(&self, product: Product) {
        let mut rows = self.rows.write().await;
        let meta = ProductMeta {
            name: product.name,
            price: product.price,
            is_active: product.is_active,
        };

        match rows.get(&product.id) {
            Some(row) => {
                *row.meta.write().unwrap_or_else(PoisonError::into_inner) = meta;
                row.stock.store(product.stock, Ordering::Release);
            }
            None => {
                rows.insert(
                    product.id,
                    Arc::new(ProductRow {
                        meta: StdRwLock::new(meta),
                        stock: AtomicU32::new(product.stock),
                    }),
                );
            }
        }
    }

    async fn row(&self, id: ProductId) -> Result<Arc<ProductRow>> {
        self.rows
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(InventoryError::ProductNotFound(id))
    }
}

#[async_trait]
impl InventoryStore for InMemoryInventoryStore {
    async fn get_product(&self, id: ProductId) -> Result<Option<Product>> {
        let rows = self.rows.read().await;
        Ok(rows.get(&id).map(|row| row.snapshot(id)))
    }

    async fn decrease_stock(&self, id: ProductId, quantity: u32) -> Result<u32> {
        ensure_positive(quantity)?;
        let row = self.row(id).await?;

        match row
            .stock
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |stock| {
                stock.checked_sub(quantity)
            }) {
            Ok(previous) => Ok(previous - quantity),
            Err(available) => Err(InventoryError::InsufficientStock {
                product_id: id,
                requested: quantity,
                available,
            }),
        }
    }

    async fn increase_stock(&self, id: ProductId, quantity: u32) -> Result<u32> {
        ensure_positive(quantity)?;
        let row = self.row(id).await?;

        row.stock
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |stock| {
                stock.checked_add(quantity)
            })
            .map(|previous| previous + quantity)
            .map_err(|_| InventoryError::StockOverflow(id))
    }

    async fn reserve_stock(
        &self,
        key: ReservationKey,
        id: ProductId,
        quantity: u32,
    ) -> Result<u32> {
        ensure_positive(quantity)?;
        let mut holds = self.holds.lock().await;

        match holds.get(&key).copied() {
            Some(hold) if hold.released => Err(InventoryError::ReservationReleased(key)),
            Some(hold) => self.check_stock(hold.product_id).await,
            None => {
                let remaining = self.decrease_stock(id, quantity).await?;
                holds.insert(
                    key,
                    Hold {
                        product_id: id,
                        quantity,
                        released: false,
                    },
                );
                Ok(remaining)
            }
        }
    }

    async fn release_stock(&self, key: ReservationKey, id: ProductId) -> Result<u32> {
        let mut holds = self.holds.lock().await;

        match holds.get(&key).copied() {
            Some(hold) if !hold.released => {
                let remaining = self.increase_stock(hold.product_id, hold.quantity).await?;
                holds.insert(
                    key,
                    Hold {
                        released: true,
                        ..hold
                    },
                );
                Ok(remaining)
            }
            Some(hold) => self.check_stock(hold.product_id).await,
            None => {
                holds.insert(
                    key,
                    Hold {
                        product_id: id,
                        quantity: 0,
                        released: true,
                    },
                );
                self.check_stock(id).await
            }
        }
    }

    async fn upsert_product(&self, product: Product) -> Result<()> {
        self.insert(product).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seeded(stock: u32) -> (InMemoryInventoryStore, ProductId) {
        let product = Product::new("Widget", Money::from_cents(1000), stock);
        let id = product.id;
        let store = InMemoryInventoryStore::with_products([product]).await;
        (store, id)
    }

    #[tokio::test]
    async fn test_get_product_snapshot() {
        let (store, id) = seeded(5).await;

        let product = store.get_product(id).await.unwrap().unwrap();
        assert_eq!(product.name, "Widget");
        assert_eq!(product.stock, 5);
        assert!(product.is_active);

        assert!(store.get_product(ProductId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_decrease_and_increase() {
        let (store, id) = seeded(5).await;

        assert_eq!(store.decrease_stock(id, 3).await.unwrap(), 2);
        assert_eq!(store.increase_stock(id, 3).await.unwrap(), 5);
        assert_eq!(store.check_stock(id).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_decrease_never_goes_negative() {
        let (store, id) = seeded(2).await;

        let err = store.decrease_stock(id, 3).await.unwrap_err();
        assert!(matches!(
            err,
            InventoryError::InsufficientStock {
                requested: 3,
                available: 2,
                ..
            }
        ));
        assert_eq!(store.check_stock(id).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_unknown_product() {
        let store = InMemoryInventoryStore::new();
        let id = ProductId::new();

        assert!(matches!(
            store.decrease_stock(id, 1).await,
            Err(InventoryError::ProductNotFound(_))
        ));
        assert!(matches!(
            store.increase_stock(id, 1).await,
            Err(InventoryError::ProductNotFound(_))
        ));
        assert!(matches!(
            store.check_stock(id).await,
            Err(InventoryError::ProductNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_zero_quantity_rejected() {
        let (store, id) = seeded(2).await;
        assert!(matches!(
            store.decrease_stock(id, 0).await,
            Err(InventoryError::InvalidQuantity { quantity: 0 })
        ));
    }

    #[tokio::test]
    async fn test_increase_overflow_rejected() {
        let (store, id) = seeded(u32::MAX).await;
        assert!(matches!(
            store.increase_stock(id, 1).await,
            Err(InventoryError::StockOverflow(_))
        ));
        assert_eq!(store.check_stock(id).await.unwrap(), u32::MAX);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_decrements_serialize() {
        let (store, id) = seeded(10).await;

        let handles: Vec<_> = (0..25)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.decrease_stock(id, 1).await })
            })
            .collect();

        let mut succeeded = 0;
        let mut rejected = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => succeeded += 1,
                Err(InventoryError::InsufficientStock { .. }) => rejected += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        assert_eq!(succeeded, 10);
        assert_eq!(rejected, 15);
        assert_eq!(store.check_stock(id).await.unwrap(), 0);
    }

    fn key(line_no: u32) -> ReservationKey {
        ReservationKey::new(common::OrderId::new(), line_no)
    }

    #[tokio::test]
    async fn test_reserve_replay_applies_once() {
        let (store, id) = seeded(10).await;
        let k = key(1);

        assert_eq!(store.reserve_stock(k, id, 3).await.unwrap(), 7);
        assert_eq!(store.reserve_stock(k, id, 3).await.unwrap(), 7);
        assert_eq!(store.check_stock(id).await.unwrap(), 7);
        assert_eq!(store.held_quantity(k).await, Some(3));
    }

    #[tokio::test]
    async fn test_release_applies_once() {
        let (store, id) = seeded(10).await;
        let k = key(1);
        store.reserve_stock(k, id, 4).await.unwrap();

        assert_eq!(store.release_stock(k, id).await.unwrap(), 10);
        assert_eq!(store.release_stock(k, id).await.unwrap(), 10);
        assert_eq!(store.check_stock(id).await.unwrap(), 10);
        assert_eq!(store.held_quantity(k).await, None);

        assert!(matches!(
            store.reserve_stock(k, id, 4).await,
            Err(InventoryError::ReservationReleased(released)) if released == k
        ));
        assert_eq!(store.check_stock(id).await.unwrap(), 10);
    }

    #[tokio::test]
    async fn test_release_before_reserve_blocks_late_reserve() {
        let (store, id) = seeded(5).await;
        let k = key(2);

        assert_eq!(store.release_stock(k, id).await.unwrap(), 5);
        assert!(matches!(
            store.reserve_stock(k, id, 2).await,
            Err(InventoryError::ReservationReleased(_))
        ));
        assert_eq!(store.check_stock(id).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_rejected_reserve_records_nothing() {
        let (store, id) = seeded(1).await;
        let k = key(1);

        assert!(matches!(
            store.reserve_stock(k, id, 2).await,
            Err(InventoryError::InsufficientStock { .. })
        ));
        assert_eq!(store.held_quantity(k).await, None);

        store.increase_stock(id, 1).await.unwrap();
        assert_eq!(store.reserve_stock(k, id, 2).await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_replays_reserve_once() {
        let (store, id) = seeded(10).await;
        let k = key(1);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.reserve_stock(k, id, 3).await })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), 7);
        }
        assert_eq!(store.check_stock(id).await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_upsert_updates_in_place() {
        let (store, id) = seeded(5).await;
        let product = store.get_product(id).await.unwrap().unwrap();

        store
            .upsert_product(product.with_price(Money::from_cents(2000)).with_active(false))
            .await
            .unwrap();

        let updated = store.get_product(id).await.unwrap().unwrap();
        assert_eq!(updated.price, Money::from_cents(2000));
        assert!(!updated.is_active);
        assert_eq!(updated.stock, 5);
        assert_eq!(store.product_count().await, 1);
    }
}
