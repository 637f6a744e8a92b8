use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{OrderId, PageRequest, UserId};
use tokio::sync::RwLock;

use super::OrderStore;
use crate::{Order, OrderError, OrderStatus, ReservationState, Result};

/// In-memory order store.
///
/// Provides the same interface and compare-and-set semantics as the
/// PostgreSQL implementation.
#[derive(Clone, Default)]
pub struct InMemoryOrderStore {
    orders: Arc<RwLock<HashMap<OrderId, Order>>>,
}

impl InMemoryOrderStore {
    /// Creates a new empty in-memory order store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of orders stored.
    pub async fn order_count(&self) -> usize {
        self.orders.read().await.len()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn insert(&self, order: &Order) -> Result<()> {
        let mut orders = self.orders.write().await;
        if orders.contains_key(&order.id) {
            return Err(OrderError::ConcurrencyConflict(order.id));
        }
        orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn get(&self, id: OrderId) -> Result<Option<Order>> {
        Ok(self.orders.read().await.get(&id).cloned())
    }

    async fn list_by_user(&self, user_id: UserId, page: PageRequest) -> Result<(Vec<Order>, u64)> {
        let orders = self.orders.read().await;
        let mut owned: Vec<&Order> = orders.values().filter(|o| o.user_id == user_id).collect();
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        let total = owned.len() as u64;
        let items = owned
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.page_size() as usize)
            .cloned()
            .collect();
        Ok((items, total))
    }

    async fn list_pending(&self, created_before: DateTime<Utc>) -> Result<Vec<OrderId>> {
        let orders = self.orders.read().await;
        let mut pending: Vec<&Order> = orders
            .values()
            .filter(|o| o.status == OrderStatus::Pending && o.created_at < created_before)
            .collect();
        pending.sort_by_key(|o| o.created_at);
        Ok(pending.into_iter().map(|o| o.id).collect())
    }

    async fn set_line_reservation(
        &self,
        id: OrderId,
        line_no: u32,
        state: ReservationState,
    ) -> Result<()> {
        let mut orders = self.orders.write().await;
        let order = orders.get_mut(&id).ok_or(OrderError::OrderNotFound(id))?;
        let line = order
            .lines
            .iter_mut()
            .find(|line| line.line_no == line_no)
            .ok_or_else(|| OrderError::Internal(format!("order {id} has no line {line_no}")))?;
        line.reservation = state;
        order.updated_at = Utc::now();
        Ok(())
    }

    async fn mark_failed(&self, id: OrderId, reason: &str) -> Result<()> {
        let mut orders = self.orders.write().await;
        let order = orders.get_mut(&id).ok_or(OrderError::OrderNotFound(id))?;
        if order.status != OrderStatus::Pending {
            return Err(OrderError::NotPending {
                status: order.status,
            });
        }
        order.failure_reason = Some(reason.to_string());
        order.updated_at = Utc::now();
        Ok(())
    }

    async fn transition(&self, id: OrderId, from: OrderStatus, to: OrderStatus) -> Result<Order> {
        let mut orders = self.orders.write().await;
        let order = orders.get_mut(&id).ok_or(OrderError::OrderNotFound(id))?;
        if order.status != from {
            return Err(OrderError::ConcurrencyConflict(id));
        }
        order.status = to;
        order.updated_at = Utc::now();
        Ok(order.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::OrderLine;
    use common::{Money, ProductId};

    fn sample_order(user_id: UserId) -> Order {
        Order::new_pending(
            user_id,
            vec![OrderLine::new(
                1,
                ProductId::new(),
                "Widget",
                Money::from_cents(500),
                2,
            )
            .unwrap()],
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let store = InMemoryOrderStore::new();
        let order = sample_order(UserId::new());
        store.insert(&order).await.unwrap();

        assert_eq!(store.get(order.id).await.unwrap(), Some(order.clone()));
        assert!(store.get(OrderId::new()).await.unwrap().is_none());
        assert!(matches!(
            store.insert(&order).await,
            Err(OrderError::ConcurrencyConflict(_))
        ));
    }

    #[tokio::test]
    async fn test_transition_is_compare_and_set() {
        let store = InMemoryOrderStore::new();
        let order = sample_order(UserId::new());
        store.insert(&order).await.unwrap();

        let confirmed = store
            .transition(order.id, OrderStatus::Pending, OrderStatus::Confirmed)
            .await
            .unwrap();
        assert_eq!(confirmed.status, OrderStatus::Confirmed);

        let stale = store
            .transition(order.id, OrderStatus::Pending, OrderStatus::Cancelled)
            .await;
        assert!(matches!(stale, Err(OrderError::ConcurrencyConflict(_))));
    }

    #[tokio::test]
    async fn test_list_by_user_paginates_newest_first() {
        let store = InMemoryOrderStore::new();
        let user = UserId::new();
        let mut ids = Vec::new();
        for i in 0..5 {
            let mut order = sample_order(user);
            order.created_at += chrono::Duration::seconds(i);
            ids.push(order.id);
            store.insert(&order).await.unwrap();
        }
        store.insert(&sample_order(UserId::new())).await.unwrap();

        let (page, total) = store
            .list_by_user(user, PageRequest::new(2, 2))
            .await
            .unwrap();
        assert_eq!(total, 5);
        assert_eq!(
            page.iter().map(|o| o.id).collect::<Vec<_>>(),
            vec![ids[2], ids[1]]
        );
    }

    #[tokio::test]
    async fn test_line_reservation_and_failure_marking() {
        let store = InMemoryOrderStore::new();
        let order = sample_order(UserId::new());
        store.insert(&order).await.unwrap();

        store
            .set_line_reservation(order.id, 1, ReservationState::Reserved)
            .await
            .unwrap();
        store.mark_failed(order.id, "out of stock").await.unwrap();

        let loaded = store.get(order.id).await.unwrap().unwrap();
        assert_eq!(loaded.lines[0].reservation, ReservationState::Reserved);
        assert!(loaded.is_compensating());

        assert!(
            store
                .set_line_reservation(order.id, 9, ReservationState::Reserved)
                .await
                .is_err()
        );
    }
}
