//! Settlement ledger service.

use chrono::Utc;
use common::{Money, OrderId, Page, PageRequest, PaymentId, UserId};
use serde::{Deserialize, Serialize};

use crate::store::PaymentStore;
use crate::{Payment, PaymentMethod, PaymentStatus, Result, SettlementError, TransactionId};

/// Attempts at a compare-and-set update before giving up on a hot payment.
const MAX_UPDATE_ATTEMPTS: usize = 3;

/// A provider callback reporting a payment's new status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentCallback {
    pub transaction_id: TransactionId,
    pub status: PaymentStatus,
    #[serde(default)]
    pub provider_ref: Option<String>,
    #[serde(default)]
    pub failure_reason: Option<String>,
}

/// What a callback does to a payment.
enum Outcome {
    /// The payment already reflects the callback.
    Unchanged,
    Apply(Payment),
}

fn apply_callback(current: &Payment, callback: &PaymentCallback) -> Result<Outcome> {
    let target = callback.status;
    if current.status == target {
        return Ok(Outcome::Unchanged);
    }
    // A late notification for a state the payment has already moved past.
    if target.precedes(current.status) {
        tracing::info!(
            payment_id = %current.id,
            status = %current.status,
            callback_status = %target,
            "ignoring stale callback"
        );
        return Ok(Outcome::Unchanged);
    }
    if !current.status.can_transition_to(target) {
        return Err(SettlementError::InvalidTransition {
            from: current.status,
            to: target,
        });
    }

    let now = Utc::now();
    let mut next = current.clone();
    next.status = target;
    if callback.provider_ref.is_some() {
        next.provider_ref = callback.provider_ref.clone();
    }
    match target {
        PaymentStatus::Success => next.paid_at = Some(now),
        PaymentStatus::Failed => next.failure_reason = callback.failure_reason.clone(),
        _ => {}
    }
    next.updated_at = now;
    Ok(Outcome::Apply(next))
}

/// The settlement ledger's operations.
///
/// Payments never reach into the order or inventory ledgers; reflecting a
/// payment outcome onto its order is left to the caller.
#[derive(Clone)]
pub struct SettlementService<S: PaymentStore> {
    store: S,
}

impl<S: PaymentStore> SettlementService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Records a pending payment for an order.
    #[tracing::instrument(skip(self))]
    pub async fn create_payment(
        &self,
        user_id: UserId,
        order_id: OrderId,
        amount: Money,
        method: PaymentMethod,
    ) -> Result<Payment> {
        if !amount.is_positive() {
            return Err(SettlementError::InvalidAmount);
        }
        if self.store.get_by_order(order_id).await?.is_some() {
            return Err(SettlementError::PaymentExists(order_id));
        }

        let payment = Payment::new_pending(user_id, order_id, amount, method);
        self.store.insert(&payment).await?;

        metrics::counter!("payments_created_total").increment(1);
        tracing::info!(
            payment_id = %payment.id,
            transaction_id = %payment.transaction_id,
            "payment created"
        );
        Ok(payment)
    }

    /// Applies a provider callback. Replaying a callback is a no-op.
    #[tracing::instrument(skip(self), fields(transaction_id = %callback.transaction_id))]
    pub async fn process_payment(&self, callback: &PaymentCallback) -> Result<Payment> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let current = self
                .store
                .get_by_transaction(&callback.transaction_id)
                .await?
                .ok_or_else(|| {
                    SettlementError::TransactionNotFound(callback.transaction_id.to_string())
                })?;

            let next = match apply_callback(&current, callback)? {
                Outcome::Unchanged => return Ok(current),
                Outcome::Apply(next) => next,
            };

            match self.store.update(&next, current.status).await {
                Ok(()) => {
                    metrics::counter!("payments_processed_total", "status" => next.status.as_str())
                        .increment(1);
                    tracing::info!(
                        payment_id = %next.id,
                        from = %current.status,
                        to = %next.status,
                        "payment status updated"
                    );
                    return Ok(next);
                }
                // A concurrent callback won; re-evaluate against what it wrote.
                Err(SettlementError::ConcurrencyConflict(_)) if attempt < MAX_UPDATE_ATTEMPTS => {
                    continue;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Cancels a payment that has not started processing.
    #[tracing::instrument(skip(self))]
    pub async fn cancel_payment(&self, id: PaymentId) -> Result<Payment> {
        let current = self.get_payment(id).await?;
        if current.status != PaymentStatus::Pending {
            return Err(SettlementError::NotPending {
                status: current.status,
            });
        }

        let mut next = current.clone();
        next.status = PaymentStatus::Cancelled;
        next.updated_at = Utc::now();
        match self.store.update(&next, PaymentStatus::Pending).await {
            Ok(()) => {}
            Err(SettlementError::ConcurrencyConflict(_)) => {
                let status = self.get_payment(id).await?.status;
                return Err(SettlementError::NotPending { status });
            }
            Err(err) => return Err(err),
        }

        tracing::info!(payment_id = %id, "payment cancelled");
        Ok(next)
    }

    /// Refunds a settled payment. Stock is not returned here.
    #[tracing::instrument(skip(self))]
    pub async fn refund_payment(&self, id: PaymentId, reason: &str) -> Result<Payment> {
        let current = self.get_payment(id).await?;
        if current.status != PaymentStatus::Success {
            return Err(SettlementError::NotSuccess {
                status: current.status,
            });
        }

        let mut next = current.clone();
        next.status = PaymentStatus::Refunded;
        next.failure_reason = Some(format!("Refund: {reason}"));
        next.updated_at = Utc::now();
        match self.store.update(&next, PaymentStatus::Success).await {
            Ok(()) => {}
            Err(SettlementError::ConcurrencyConflict(_)) => {
                let status = self.get_payment(id).await?.status;
                return Err(SettlementError::NotSuccess { status });
            }
            Err(err) => return Err(err),
        }

        metrics::counter!("payments_refunded_total").increment(1);
        tracing::info!(payment_id = %id, "payment refunded");
        Ok(next)
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_payment(&self, id: PaymentId) -> Result<Payment> {
        self.store
            .get(id)
            .await?
            .ok_or(SettlementError::PaymentNotFound(id))
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_payment_by_order(&self, order_id: OrderId) -> Result<Payment> {
        self.store
            .get_by_order(order_id)
            .await?
            .ok_or(SettlementError::NoPaymentForOrder(order_id))
    }

    /// Lists a user's payments, newest first.
    #[tracing::instrument(skip(self))]
    pub async fn get_user_payments(
        &self,
        user_id: UserId,
        page: PageRequest,
    ) -> Result<Page<Payment>> {
        let (items, total) = self.store.list_by_user(user_id, page).await?;
        Ok(Page::new(items, total, page))
    }

    pub async fn get_payment_status(&self, order_id: OrderId) -> Result<PaymentStatus> {
        Ok(self.get_payment_by_order(order_id).await?.status)
    }

    /// Returns true if the order's payment has settled successfully.
    /// An order without a payment is simply unpaid.
    pub async fn verify_payment(&self, order_id: OrderId) -> Result<bool> {
        Ok(self
            .store
            .get_by_order(order_id)
            .await?
            .is_some_and(|p| p.status == PaymentStatus::Success))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryPaymentStore;

    fn service() -> SettlementService<InMemoryPaymentStore> {
        SettlementService::new(InMemoryPaymentStore::new())
    }

    async fn created(service: &SettlementService<InMemoryPaymentStore>) -> Payment {
        service
            .create_payment(
                UserId::new(),
                OrderId::new(),
                Money::from_cents(25_000),
                PaymentMethod::EWallet,
            )
            .await
            .unwrap()
    }

    fn callback(payment: &Payment, status: PaymentStatus) -> PaymentCallback {
        PaymentCallback {
            transaction_id: payment.transaction_id.clone(),
            status,
            provider_ref: Some("prov-1".to_string()),
            failure_reason: None,
        }
    }

    #[tokio::test]
    async fn test_second_payment_for_order_is_rejected() {
        let service = service();
        let first = created(&service).await;

        let err = service
            .create_payment(
                first.user_id,
                first.order_id,
                Money::from_cents(1),
                PaymentMethod::Qris,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SettlementError::PaymentExists(_)));
        assert_eq!(service.store().payment_count().await, 1);
    }

    #[tokio::test]
    async fn test_non_positive_amount_is_rejected() {
        let err = service()
            .create_payment(
                UserId::new(),
                OrderId::new(),
                Money::zero(),
                PaymentMethod::Qris,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SettlementError::InvalidAmount));
    }

    #[tokio::test]
    async fn test_success_stamps_paid_at_and_replay_is_noop() {
        let service = service();
        let payment = created(&service).await;

        service
            .process_payment(&callback(&payment, PaymentStatus::Processing))
            .await
            .unwrap();
        let settled = service
            .process_payment(&callback(&payment, PaymentStatus::Success))
            .await
            .unwrap();
        assert_eq!(settled.status, PaymentStatus::Success);
        assert!(settled.paid_at.is_some());
        assert_eq!(settled.provider_ref.as_deref(), Some("prov-1"));

        let replayed = service
            .process_payment(&callback(&payment, PaymentStatus::Success))
            .await
            .unwrap();
        assert_eq!(replayed, settled);

        let stale = service
            .process_payment(&callback(&payment, PaymentStatus::Processing))
            .await
            .unwrap();
        assert_eq!(stale.status, PaymentStatus::Success);
        assert!(service.verify_payment(payment.order_id).await.unwrap());
    }

    #[tokio::test]
    async fn test_pending_cannot_jump_to_success() {
        let service = service();
        let payment = created(&service).await;

        let err = service
            .process_payment(&callback(&payment, PaymentStatus::Success))
            .await
            .unwrap_err();
        assert!(matches!(err, SettlementError::InvalidTransition { .. }));
        assert_eq!(
            service.get_payment_status(payment.order_id).await.unwrap(),
            PaymentStatus::Pending
        );
    }

    #[tokio::test]
    async fn test_failure_records_reason() {
        let service = service();
        let payment = created(&service).await;

        let mut cb = callback(&payment, PaymentStatus::Failed);
        cb.failure_reason = Some("card declined".to_string());
        let failed = service.process_payment(&cb).await.unwrap();

        assert_eq!(failed.status, PaymentStatus::Failed);
        assert_eq!(failed.failure_reason.as_deref(), Some("card declined"));
        assert!(failed.paid_at.is_none());
        assert!(!service.verify_payment(payment.order_id).await.unwrap());
    }

    #[tokio::test]
    async fn test_unknown_transaction() {
        let err = service()
            .process_payment(&PaymentCallback {
                transaction_id: TransactionId::new("TXN-0-deadbeef"),
                status: PaymentStatus::Success,
                provider_ref: None,
                failure_reason: None,
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), common::ErrorCode::PaymentNotFound);
    }

    #[tokio::test]
    async fn test_cancel_only_from_pending() {
        let service = service();
        let payment = created(&service).await;
        service
            .process_payment(&callback(&payment, PaymentStatus::Processing))
            .await
            .unwrap();

        let err = service.cancel_payment(payment.id).await.unwrap_err();
        assert!(matches!(
            err,
            SettlementError::NotPending {
                status: PaymentStatus::Processing
            }
        ));

        let other = created(&service).await;
        let cancelled = service.cancel_payment(other.id).await.unwrap();
        assert_eq!(cancelled.status, PaymentStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_refund_only_from_success() {
        let service = service();
        let payment = created(&service).await;

        let err = service
            .refund_payment(payment.id, "changed mind")
            .await
            .unwrap_err();
        assert!(matches!(err, SettlementError::NotSuccess { .. }));

        for status in [PaymentStatus::Processing, PaymentStatus::Success] {
            service
                .process_payment(&callback(&payment, status))
                .await
                .unwrap();
        }
        let refunded = service
            .refund_payment(payment.id, "changed mind")
            .await
            .unwrap();
        assert_eq!(refunded.status, PaymentStatus::Refunded);
        assert_eq!(
            refunded.failure_reason.as_deref(),
            Some("Refund: changed mind")
        );
    }

    #[tokio::test]
    async fn test_callbacks_replayed_after_refund_are_noops() {
        let service = service();
        let payment = created(&service).await;
        for status in [PaymentStatus::Processing, PaymentStatus::Success] {
            service
                .process_payment(&callback(&payment, status))
                .await
                .unwrap();
        }
        let refunded = service
            .refund_payment(payment.id, "damaged")
            .await
            .unwrap();

        for status in [PaymentStatus::Success, PaymentStatus::Processing] {
            let replayed = service
                .process_payment(&callback(&payment, status))
                .await
                .unwrap();
            assert_eq!(replayed, refunded);
        }

        let err = service
            .process_payment(&callback(&payment, PaymentStatus::Failed))
            .await
            .unwrap_err();
        assert!(matches!(err, SettlementError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn test_verify_without_payment_is_false() {
        let service = service();
        assert!(!service.verify_payment(OrderId::new()).await.unwrap());
        let err = service
            .get_payment_status(OrderId::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SettlementError::NoPaymentForOrder(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_replays_settle_once() {
        let service = service();
        let payment = created(&service).await;
        service
            .process_payment(&callback(&payment, PaymentStatus::Processing))
            .await
            .unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let service = service.clone();
                let cb = callback(&payment, PaymentStatus::Success);
                tokio::spawn(async move { service.process_payment(&cb).await })
            })
            .collect();

        let results = futures_util::future::join_all(handles).await;
        let paid_at: Vec<_> = results
            .into_iter()
            .map(|r| r.unwrap().unwrap().paid_at)
            .collect();
        assert!(paid_at.iter().all(|t| t.is_some() && *t == paid_at[0]));
    }
}
