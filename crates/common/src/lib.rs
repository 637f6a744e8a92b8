//! Shared types for the fulfillment ledgers.
//!
//! Every ledger crate depends on this one for identifiers, money,
//! pagination and the stable error codes surfaced to callers.

pub mod error_code;
pub mod ids;
pub mod money;
pub mod pagination;

pub use error_code::ErrorCode;
pub use ids::{OrderId, PaymentId, ProductId, UserId};
pub use money::Money;
pub use pagination::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE, Page, PageRequest};
