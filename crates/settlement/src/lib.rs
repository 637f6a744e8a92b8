//! Settlement ledger.
//!
//! Records at most one payment per order and moves it through its status
//! machine as provider callbacks arrive. Callbacks are keyed by the
//! transaction id handed out at creation, so replays are harmless.

pub mod error;
pub mod payment;
pub mod service;
pub mod store;

pub use error::{Result, SettlementError};
pub use payment::{DEFAULT_CURRENCY, Payment, PaymentMethod, PaymentStatus, TransactionId};
pub use service::{PaymentCallback, SettlementService};
pub use store::{InMemoryPaymentStore, PaymentStore, PostgresPaymentStore};
