use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::{OrderId, PageRequest, PaymentId, UserId};
use tokio::sync::RwLock;

use super::PaymentStore;
use crate::{Payment, PaymentStatus, Result, SettlementError, TransactionId};

/// In-memory payment store with the same uniqueness and compare-and-set
/// rules as the PostgreSQL one.
#[derive(Clone, Default)]
pub struct InMemoryPaymentStore {
    payments: Arc<RwLock<HashMap<PaymentId, Payment>>>,
}

impl InMemoryPaymentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn payment_count(&self) -> usize {
        self.payments.read().await.len()
    }
}

#[async_trait]
impl PaymentStore for InMemoryPaymentStore {
    async fn insert(&self, payment: &Payment) -> Result<()> {
        let mut payments = self.payments.write().await;
        if payments.values().any(|p| p.order_id == payment.order_id) {
            return Err(SettlementError::PaymentExists(payment.order_id));
        }
        if payments.contains_key(&payment.id)
            || payments
                .values()
                .any(|p| p.transaction_id == payment.transaction_id)
        {
            return Err(SettlementError::ConcurrencyConflict(payment.id));
        }
        payments.insert(payment.id, payment.clone());
        Ok(())
    }

    async fn get(&self, id: PaymentId) -> Result<Option<Payment>> {
        Ok(self.payments.read().await.get(&id).cloned())
    }

    async fn get_by_order(&self, order_id: OrderId) -> Result<Option<Payment>> {
        let payments = self.payments.read().await;
        Ok(payments.values().find(|p| p.order_id == order_id).cloned())
    }

    async fn get_by_transaction(&self, transaction_id: &TransactionId) -> Result<Option<Payment>> {
        let payments = self.payments.read().await;
        Ok(payments
            .values()
            .find(|p| &p.transaction_id == transaction_id)
            .cloned())
    }

    async fn list_by_user(
        &self,
        user_id: UserId,
        page: PageRequest,
    ) -> Result<(Vec<Payment>, u64)> {
        let payments = self.payments.read().await;
        let mut owned: Vec<&Payment> = payments.values().filter(|p| p.user_id == user_id).collect();
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

    async fn update(&self, payment: &Payment, expected: PaymentStatus) -> Result<()> {
        let mut payments = self.payments.write().await;
        let stored = payments
            .get_mut(&payment.id)
            .ok_or(SettlementError::PaymentNotFound(payment.id))?;
        if stored.status != expected {
            return Err(SettlementError::ConcurrencyConflict(payment.id));
        }
        stored.status = payment.status;
        stored.provider_ref = payment.provider_ref.clone();
        stored.failure_reason = payment.failure_reason.clone();
        stored.paid_at = payment.paid_at;
        stored.updated_at = payment.updated_at;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PaymentMethod;
    use common::Money;

    fn payment(user: UserId) -> Payment {
        Payment::new_pending(
            user,
            OrderId::new(),
            Money::from_cents(10_000),
            PaymentMethod::BankTransfer,
        )
    }

    #[tokio::test]
    async fn test_one_payment_per_order() {
        let store = InMemoryPaymentStore::new();
        let first = payment(UserId::new());
        store.insert(&first).await.unwrap();

        let mut second = payment(first.user_id);
        second.order_id = first.order_id;
        let err = store.insert(&second).await.unwrap_err();
        assert!(matches!(err, SettlementError::PaymentExists(id) if id == first.order_id));
        assert_eq!(store.payment_count().await, 1);
    }

    #[tokio::test]
    async fn test_update_requires_expected_status() {
        let store = InMemoryPaymentStore::new();
        let mut p = payment(UserId::new());
        store.insert(&p).await.unwrap();

        p.status = PaymentStatus::Processing;
        store.update(&p, PaymentStatus::Pending).await.unwrap();

        p.status = PaymentStatus::Cancelled;
        let err = store.update(&p, PaymentStatus::Pending).await.unwrap_err();
        assert!(matches!(err, SettlementError::ConcurrencyConflict(_)));

        let stored = store.get(p.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PaymentStatus::Processing);
        let by_txn = store
            .get_by_transaction(&p.transaction_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_txn.id, p.id);
    }

    #[tokio::test]
    async fn test_list_by_user_pages() {
        let store = InMemoryPaymentStore::new();
        let user = UserId::new();
        for _ in 0..3 {
            store.insert(&payment(user)).await.unwrap();
        }
        store.insert(&payment(UserId::new())).await.unwrap();

        let (items, total) = store
            .list_by_user(user, PageRequest::new(2, 2))
            .await
            .unwrap();
        assert_eq!(total, 3);
        assert_eq!(items.len(), 1);
    }
}
