//! Order storage.

mod memory;
mod postgres;

pub use memory::InMemoryOrderStore;
pub use postgres::PostgresOrderStore;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{OrderId, PageRequest, UserId};

use crate::{Order, OrderStatus, ReservationState, Result};

/// Storage for orders and their lines.
///
/// Status changes are compare-and-set: `transition` only applies when the
/// stored status still equals `from`, and reports
/// [`OrderError::ConcurrencyConflict`](crate::OrderError::ConcurrencyConflict)
/// otherwise.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Persists a new order together with all its lines, atomically.
    async fn insert(&self, order: &Order) -> Result<()>;

    /// Loads an order with its lines.
    async fn get(&self, id: OrderId) -> Result<Option<Order>>;

    /// Returns one page of a user's orders, newest first, plus the total
    /// number of orders the user has.
    async fn list_by_user(&self, user_id: UserId, page: PageRequest) -> Result<(Vec<Order>, u64)>;

    /// Returns ids of pending orders created before `created_before`,
    /// oldest first.
    async fn list_pending(&self, created_before: DateTime<Utc>) -> Result<Vec<OrderId>>;

    /// Records the reservation state of one line.
    async fn set_line_reservation(
        &self,
        id: OrderId,
        line_no: u32,
        state: ReservationState,
    ) -> Result<()>;

    /// Records why fulfillment failed. Only applies to pending orders.
    async fn mark_failed(&self, id: OrderId, reason: &str) -> Result<()>;

    /// Moves the order from `from` to `to` if it is still in `from`.
    async fn transition(&self, id: OrderId, from: OrderStatus, to: OrderStatus) -> Result<Order>;
}

#[async_trait]
impl<T: OrderStore + ?Sized> OrderStore for Arc<T> {
    async fn insert(&self, order: &Order) -> Result<()> {
        (**self).insert(order).await
    }

    async fn get(&self, id: OrderId) -> Result<Option<Order>> {
        (**self).get(id).await
    }

    async fn list_by_user(&self, user_id: UserId, page: PageRequest) -> Result<(Vec<Order>, u64)> {
        (**self).list_by_user(user_id, page).await
    }

    async fn list_pending(&self, created_before: DateTime<Utc>) -> Result<Vec<OrderId>> {
        (**self).list_pending(created_before).await
    }

    async fn set_line_reservation(
        &self,
        id: OrderId,
        line_no: u32,
        state: ReservationState,
    ) -> Result<()> {
        (**self).set_line_reservation(id, line_no, state).await
    }

    async fn mark_failed(&self, id: OrderId, reason: &str) -> Result<()> {
        (**self).mark_failed(id, reason).await
    }

    async fn transition(&self, id: OrderId, from: OrderStatus, to: OrderStatus) -> Result<Order> {
        (**self).transition(id, from, to).await
    }
}
