//! Payment storage.

mod memory;
mod postgres;

pub use memory::InMemoryPaymentStore;
pub use postgres::PostgresPaymentStore;

use std::sync::Arc;

use async_trait::async_trait;
use common::{OrderId, PageRequest, PaymentId, UserId};

use crate::{Payment, PaymentStatus, Result, TransactionId};

/// Storage for payments.
///
/// At most one payment exists per order; `insert` reports
/// [`SettlementError::PaymentExists`](crate::SettlementError::PaymentExists)
/// for a second one.
#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn insert(&self, payment: &Payment) -> Result<()>;

    async fn get(&self, id: PaymentId) -> Result<Option<Payment>>;

    async fn get_by_order(&self, order_id: OrderId) -> Result<Option<Payment>>;

    async fn get_by_transaction(&self, transaction_id: &TransactionId) -> Result<Option<Payment>>;

    /// Returns one page of a user's payments, newest first, plus the total.
    async fn list_by_user(&self, user_id: UserId, page: PageRequest)
    -> Result<(Vec<Payment>, u64)>;

    /// Writes the mutable fields of `payment` if the stored status still
    /// equals `expected`.
    async fn update(&self, payment: &Payment, expected: PaymentStatus) -> Result<()>;
}

#[async_trait]
impl<T: PaymentStore + ?Sized> PaymentStore for Arc<T> {
    async fn insert(&self, payment: &Payment) -> Result<()> {
        (**self).insert(payment).await
    }

    async fn get(&self, id: PaymentId) -> Result<Option<Payment>> {
        (**self).get(id).await
    }

    async fn get_by_order(&self, order_id: OrderId) -> Result<Option<Payment>> {
        (**self).get_by_order(order_id).await
    }

    async fn get_by_transaction(&self, transaction_id: &TransactionId) -> Result<Option<Payment>> {
        (**self).get_by_transaction(transaction_id).await
    }

    async fn list_by_user(
        &self,
        user_id: UserId,
        page: PageRequest,
    ) -> Result<(Vec<Payment>, u64)> {
        (**self).list_by_user(user_id, page).await
    }

    async fn update(&self, payment: &Payment, expected: PaymentStatus) -> Result<()> {
        (**self).update(payment, expected).await
    }
}
