//! Edge-side orchestration across ledgers.
//!
//! The settlement ledger never pushes into the order ledger. The edge
//! reflects payment outcomes onto orders here, and runs the periodic sweep
//! that finishes or unwinds orders a crash left pending.

use std::time::Duration;

use orders::{Order, OrderError, OrderStatus};
use settlement::{Payment, PaymentStatus};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::state::SharedOrderService;

/// Moves the order of a settled payment from `confirmed` to `paid`.
///
/// Returns the updated order, or `None` when there was nothing to do.
/// Safe to call again for the same payment.
#[tracing::instrument(skip_all, fields(payment_id = %payment.id, order_id = %payment.order_id))]
pub async fn reflect_payment(
    orders: &SharedOrderService,
    payment: &Payment,
) -> Result<Option<Order>, OrderError> {
    if payment.status != PaymentStatus::Success {
        return Ok(None);
    }

    let order = orders.get_order(payment.order_id).await?;
    match order.status {
        OrderStatus::Confirmed => {
            let paid = orders
                .update_order_status(order.id, OrderStatus::Paid)
                .await?;
            metrics::counter!("orders_paid_total").increment(1);
            tracing::info!("order marked paid");
            Ok(Some(paid))
        }
        OrderStatus::Paid | OrderStatus::Shipped | OrderStatus::Delivered => Ok(None),
        OrderStatus::Pending | OrderStatus::Cancelled => {
            tracing::warn!(status = %order.status, "payment settled for an order that is not confirmed");
            Ok(None)
        }
    }
}

/// Runs `recover_pending` every `interval` until `shutdown` flips to true.
pub fn spawn_recovery(
    orders: SharedOrderService,
    interval: Duration,
    grace: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick fires immediately; skip it so startup is not a sweep.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    metrics::counter!("recovery_sweeps_total").increment(1);
                    match orders.recover_pending(grace).await {
                        Ok(report) => {
                            metrics::counter!("recovery_orders_failed_total")
                                .increment(report.failed as u64);
                        }
                        Err(err) => tracing::error!(error = %err, "recovery sweep failed"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::info!("recovery task stopping");
                        break;
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use common::{Money, OrderId, UserId};
    use inventory::{InMemoryInventoryStore, InventoryService, Product};
    use orders::{InMemoryOrderStore, LineItem, LocalInventoryClient, RetryPolicy};
    use settlement::{InMemoryPaymentStore, PaymentMethod};

    use super::*;
    use crate::identity::StaticTokenIdentity;
    use crate::state::AppState;

    async fn state_with_product() -> (AppState, inventory::Product) {
        let product = Product::new("Kettle", Money::from_cents(4_500), 10);
        let inventory = InMemoryInventoryStore::with_products([product.clone()]).await;
        let client = LocalInventoryClient::new(InventoryService::new(inventory));
        let state = AppState::new(
            Arc::new(InMemoryOrderStore::new()),
            Arc::new(client),
            Arc::new(InMemoryPaymentStore::new()),
            Arc::new(StaticTokenIdentity::new()),
            RetryPolicy::default(),
        );
        (state, product)
    }

    fn settled(order_id: OrderId, user_id: UserId, status: PaymentStatus) -> Payment {
        let mut payment =
            Payment::new_pending(user_id, order_id, Money::from_cents(1), PaymentMethod::Qris);
        payment.status = status;
        payment
    }

    #[tokio::test]
    async fn test_success_marks_confirmed_order_paid_once() {
        let (state, product) = state_with_product().await;
        let user = UserId::new();
        let order = state
            .orders
            .create_order(user, &[LineItem::new(product.id, 1)])
            .await
            .unwrap();
        let payment = settled(order.id, user, PaymentStatus::Success);

        let paid = reflect_payment(&state.orders, &payment).await.unwrap();
        assert_eq!(paid.unwrap().status, OrderStatus::Paid);

        let again = reflect_payment(&state.orders, &payment).await.unwrap();
        assert!(again.is_none());
    }

    #[tokio::test]
    async fn test_unsettled_payment_leaves_order_alone() {
        let (state, product) = state_with_product().await;
        let user = UserId::new();
        let order = state
            .orders
            .create_order(user, &[LineItem::new(product.id, 1)])
            .await
            .unwrap();

        let payment = settled(order.id, user, PaymentStatus::Processing);
        assert!(reflect_payment(&state.orders, &payment).await.unwrap().is_none());
        let stored = state.orders.get_order(order.id).await.unwrap();
        assert_eq!(stored.status, OrderStatus::Confirmed);
    }

    #[tokio::test]
    async fn test_recovery_task_stops_on_shutdown() {
        let (state, _) = state_with_product().await;
        let (tx, rx) = watch::channel(false);
        let handle = spawn_recovery(
            state.orders.clone(),
            Duration::from_millis(10),
            Duration::from_secs(60),
            rx,
        );

        tokio::time::sleep(Duration::from_millis(30)).await;
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
