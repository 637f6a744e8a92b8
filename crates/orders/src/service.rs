//! Order ledger service.

use std::time::Duration;

use common::{OrderId, Page, PageRequest, UserId};

use crate::client::InventoryClient;
use crate::coordinator::{FulfillmentCoordinator, RecoveryReport};
use crate::store::OrderStore;
use crate::{LineItem, Order, OrderError, OrderStatus, Result};

/// The order ledger's public operations.
///
/// Reads go straight to the store; anything that can move stock goes
/// through the [`FulfillmentCoordinator`].
pub struct OrderService<S, C> {
    coordinator: FulfillmentCoordinator<S, C>,
}

impl<S, C> Clone for OrderService<S, C> {
    fn clone(&self) -> Self {
        Self {
            coordinator: self.coordinator.clone(),
        }
    }
}

impl<S, C> OrderService<S, C>
where
    S: OrderStore + 'static,
    C: InventoryClient + 'static,
{
    /// Creates a new order service.
    pub fn new(coordinator: FulfillmentCoordinator<S, C>) -> Self {
        Self { coordinator }
    }

    pub fn coordinator(&self) -> &FulfillmentCoordinator<S, C> {
        &self.coordinator
    }

    /// Creates an order and reserves its stock.
    pub async fn create_order(&self, user_id: UserId, items: &[LineItem]) -> Result<Order> {
        self.coordinator.create_order(user_id, items).await
    }

    /// Loads an order by id.
    #[tracing::instrument(skip(self))]
    pub async fn get_order(&self, id: OrderId) -> Result<Order> {
        self.coordinator
            .store()
            .get(id)
            .await?
            .ok_or(OrderError::OrderNotFound(id))
    }

    /// Lists a user's orders, newest first.
    #[tracing::instrument(skip(self))]
    pub async fn get_user_orders(&self, user_id: UserId, page: PageRequest) -> Result<Page<Order>> {
        let (items, total) = self.coordinator.store().list_by_user(user_id, page).await?;
        Ok(Page::new(items, total, page))
    }

    /// Moves an order along its status machine.
    ///
    /// `cancelled` goes through [`cancel_order`](Self::cancel_order) so that
    /// reserved stock is returned. `confirmed` on a pending order re-drives
    /// its reservations instead of flipping the status blindly.
    #[tracing::instrument(skip(self))]
    pub async fn update_order_status(&self, id: OrderId, next: OrderStatus) -> Result<Order> {
        let order = self.get_order(id).await?;

        if !order.status.can_transition_to(next) {
            return Err(OrderError::InvalidTransition {
                from: order.status,
                to: next,
            });
        }

        match next {
            OrderStatus::Cancelled => self.cancel_order(id).await,
            OrderStatus::Confirmed => {
                if order.is_compensating() {
                    return Err(OrderError::InvalidTransition {
                        from: order.status,
                        to: next,
                    });
                }
                self.coordinator.resume(id).await
            }
            _ => {
                let _guard = self.coordinator.claim(id)?;
                let updated = self
                    .coordinator
                    .store()
                    .transition(id, order.status, next)
                    .await?;
                tracing::info!(order_id = %id, from = %order.status, to = %next, "order status updated");
                Ok(updated)
            }
        }
    }

    /// Cancels a pending order, returning any stock it holds.
    pub async fn cancel_order(&self, id: OrderId) -> Result<Order> {
        let order = self.get_order(id).await?;
        if order.status != OrderStatus::Pending {
            return Err(OrderError::NotPending {
                status: order.status,
            });
        }
        self.coordinator.cancel_order(id).await
    }

    /// Resumes every pending order older than `grace`.
    pub async fn recover_pending(&self, grace: Duration) -> Result<RecoveryReport> {
        self.coordinator.recover_pending(grace).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{LocalInventoryClient, RetryPolicy};
    use crate::store::InMemoryOrderStore;
    use common::{Money, ProductId};
    use inventory::{InMemoryInventoryStore, InventoryService, Product};

    type TestService = OrderService<InMemoryOrderStore, LocalInventoryClient<InMemoryInventoryStore>>;

    async fn setup(stock: u32) -> (TestService, ProductId) {
        let product = Product::new("Widget", Money::from_cents(1000), stock);
        let id = product.id;
        let inventory = InMemoryInventoryStore::with_products([product]).await;
        let client = LocalInventoryClient::new(InventoryService::new(inventory));
        let coordinator =
            FulfillmentCoordinator::new(InMemoryOrderStore::new(), client, RetryPolicy::default());
        (OrderService::new(coordinator), id)
    }

    #[tokio::test]
    async fn test_create_and_get_order() {
        let (service, product_id) = setup(10).await;
        let user = UserId::new();

        let order = service
            .create_order(user, &[LineItem::new(product_id, 3)])
            .await
            .unwrap();
        assert_eq!(order.status, OrderStatus::Confirmed);
        assert_eq!(order.total, Money::from_cents(3000));

        let loaded = service.get_order(order.id).await.unwrap();
        assert_eq!(loaded, order);
    }

    #[tokio::test]
    async fn test_get_order_not_found() {
        let (service, _) = setup(1).await;
        assert!(matches!(
            service.get_order(OrderId::new()).await,
            Err(OrderError::OrderNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_forward_status_updates() {
        let (service, product_id) = setup(10).await;
        let order = service
            .create_order(UserId::new(), &[LineItem::new(product_id, 1)])
            .await
            .unwrap();

        for next in [
            OrderStatus::Paid,
            OrderStatus::Shipped,
            OrderStatus::Delivered,
        ] {
            let updated = service.update_order_status(order.id, next).await.unwrap();
            assert_eq!(updated.status, next);
        }

        let err = service
            .update_order_status(order.id, OrderStatus::Shipped)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            OrderError::InvalidTransition {
                from: OrderStatus::Delivered,
                to: OrderStatus::Shipped
            }
        ));
    }

    #[tokio::test]
    async fn test_cancel_requires_pending() {
        let (service, product_id) = setup(10).await;
        let order = service
            .create_order(UserId::new(), &[LineItem::new(product_id, 1)])
            .await
            .unwrap();

        let err = service.cancel_order(order.id).await.unwrap_err();
        assert!(matches!(
            err,
            OrderError::NotPending {
                status: OrderStatus::Confirmed
            }
        ));
        assert_eq!(
            service.get_order(order.id).await.unwrap().status,
            OrderStatus::Confirmed
        );
    }

    #[tokio::test]
    async fn test_user_orders_pagination() {
        let (service, product_id) = setup(100).await;
        let user = UserId::new();
        for _ in 0..3 {
            service
                .create_order(user, &[LineItem::new(product_id, 1)])
                .await
                .unwrap();
        }

        let page = service
            .get_user_orders(user, PageRequest::new(1, 2))
            .await
            .unwrap();
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.total, 3);
        assert_eq!(page.total_pages, 2);

        let empty = service
            .get_user_orders(UserId::new(), PageRequest::default())
            .await
            .unwrap();
        assert!(empty.items.is_empty());
        assert_eq!(empty.total_pages, 0);
    }
}
