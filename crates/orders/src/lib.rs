//! Order ledger.
//!
//! Owns orders and their lines, and coordinates the stock reservations an
//! order needs. The inventory ledger stays the sole authority over stock;
//! this crate only reaches it through [`InventoryClient`].

pub mod client;
pub mod coordinator;
pub mod error;
pub mod order;
pub mod service;
pub mod status;
pub mod store;

pub use client::{
    HttpInventoryClient, InventoryClient, InventoryClientError, LocalInventoryClient, RetryPolicy,
};
pub use coordinator::{FulfillmentCoordinator, RecoveryReport};
pub use error::{OrderError, Result};
pub use order::{LineItem, Order, OrderLine, ReservationState};
pub use service::OrderService;
pub use status::OrderStatus;
pub use store::{InMemoryOrderStore, OrderStore, PostgresOrderStore};
