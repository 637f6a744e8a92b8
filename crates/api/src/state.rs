//! Shared application state.

use std::sync::Arc;

use axum::extract::FromRef;
use inventory::{InventoryService, InventoryStore};
use orders::{FulfillmentCoordinator, InventoryClient, OrderService, OrderStore, RetryPolicy};
use settlement::{PaymentStore, SettlementService};

use crate::identity::IdentityProvider;

/// Order ledger over whichever store and inventory client the binary picked.
pub type SharedOrderService = OrderService<Arc<dyn OrderStore>, Arc<dyn InventoryClient>>;

pub type SharedSettlementService = SettlementService<Arc<dyn PaymentStore>>;

pub type SharedInventoryService = InventoryService<Arc<dyn InventoryStore>>;

/// State shared by the edge routes.
#[derive(Clone)]
pub struct AppState {
    pub orders: SharedOrderService,
    pub payments: SharedSettlementService,
    pub identity: Arc<dyn IdentityProvider>,
}

impl AppState {
    pub fn new(
        order_store: Arc<dyn OrderStore>,
        inventory: Arc<dyn InventoryClient>,
        payment_store: Arc<dyn PaymentStore>,
        identity: Arc<dyn IdentityProvider>,
        policy: RetryPolicy,
    ) -> Self {
        let coordinator = FulfillmentCoordinator::new(order_store, inventory, policy);
        Self {
            orders: OrderService::new(coordinator),
            payments: SettlementService::new(payment_store),
            identity,
        }
    }
}

impl FromRef<AppState> for Arc<dyn IdentityProvider> {
    fn from_ref(state: &AppState) -> Self {
        Arc::clone(&state.identity)
    }
}
