//! Settlement ledger error types.

use common::{ErrorCode, OrderId, PaymentId};
use thiserror::Error;

use crate::payment::PaymentStatus;

/// Errors that can occur when recording or settling payments.
#[derive(Debug, Error)]
pub enum SettlementError {
    #[error("Payment not found: {0}")]
    PaymentNotFound(PaymentId),

    #[error("No payment with transaction id {0}")]
    TransactionNotFound(String),

    #[error("No payment for order {0}")]
    NoPaymentForOrder(OrderId),

    /// The order already has a payment.
    #[error("Payment already exists for order {0}")]
    PaymentExists(OrderId),

    #[error("Payment amount must be positive")]
    InvalidAmount,

    #[error("Invalid payment status: {0}")]
    InvalidStatus(String),

    #[error("Invalid payment method: {0}")]
    InvalidMethod(String),

    #[error("Invalid payment transition from {from} to {to}")]
    InvalidTransition {
        from: PaymentStatus,
        to: PaymentStatus,
    },

    #[error("Payment is not pending (current status: {status})")]
    NotPending { status: PaymentStatus },

    #[error("Payment has not succeeded (current status: {status})")]
    NotSuccess { status: PaymentStatus },

    /// Another writer changed the payment first.
    #[error("Payment {0} was modified concurrently")]
    ConcurrencyConflict(PaymentId),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl SettlementError {
    /// Returns the stable error code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            SettlementError::PaymentNotFound(_)
            | SettlementError::TransactionNotFound(_)
            | SettlementError::NoPaymentForOrder(_) => ErrorCode::PaymentNotFound,
            SettlementError::PaymentExists(_) => ErrorCode::PaymentExists,
            SettlementError::InvalidAmount => ErrorCode::InvalidAmount,
            SettlementError::InvalidStatus(_) | SettlementError::InvalidMethod(_) => {
                ErrorCode::ValidationError
            }
            SettlementError::InvalidTransition { .. } => ErrorCode::InvalidTransition,
            SettlementError::NotPending { .. } => ErrorCode::PaymentNotPending,
            SettlementError::NotSuccess { .. } => ErrorCode::PaymentNotSuccess,
            SettlementError::ConcurrencyConflict(_) => ErrorCode::ConcurrencyConflict,
            SettlementError::Database(_) => ErrorCode::InternalError,
        }
    }
}

/// Result type for settlement operations.
pub type Result<T> = std::result::Result<T, SettlementError>;
