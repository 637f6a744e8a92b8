//! Inventory ledger.
//!
//! The sole authority over product stock. Stock only moves through two
//! primitives: an atomic decrement-if-available (`decrease_stock`) and its
//! compensating increment (`increase_stock`). Order lines use the keyed
//! forms (`reserve_stock`, `release_stock`), which apply each at most once
//! per [`ReservationKey`].

pub mod error;
pub mod memory;
pub mod postgres;
pub mod product;
pub mod reservation;
pub mod rpc;
pub mod service;
pub mod store;

pub use error::{InventoryError, Result};
pub use memory::InMemoryInventoryStore;
pub use postgres::PostgresInventoryStore;
pub use product::Product;
pub use reservation::ReservationKey;
pub use rpc::{ProductReply, StockChangeReply, StockChangeRequest, StockReply};
pub use service::InventoryService;
pub use store::InventoryStore;
