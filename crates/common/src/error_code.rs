//! Stable, caller-visible error codes.

use serde::{Deserialize, Serialize};

/// A stable error code attached to every failure surfaced to a caller.
///
/// Codes never change meaning; messages may.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ValidationError,
    EmptyOrder,
    InvalidQuantity,
    ProductNotFound,
    ProductUnavailable,
    InsufficientStock,
    ReservationReleased,
    OrderNotFound,
    InvalidTransition,
    OrderNotPending,
    PaymentNotFound,
    PaymentExists,
    PaymentNotPending,
    PaymentNotSuccess,
    InvalidAmount,
    Unauthorized,
    Forbidden,
    UpstreamUnavailable,
    ConcurrencyConflict,
    InternalError,
}

impl ErrorCode {
    /// Returns the wire representation of the code.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ValidationError => "VALIDATION_ERROR",
            ErrorCode::EmptyOrder => "EMPTY_ORDER",
            ErrorCode::InvalidQuantity => "INVALID_QUANTITY",
            ErrorCode::ProductNotFound => "PRODUCT_NOT_FOUND",
            ErrorCode::ProductUnavailable => "PRODUCT_UNAVAILABLE",
            ErrorCode::InsufficientStock => "INSUFFICIENT_STOCK",
            ErrorCode::ReservationReleased => "RESERVATION_RELEASED",
            ErrorCode::OrderNotFound => "ORDER_NOT_FOUND",
            ErrorCode::InvalidTransition => "INVALID_TRANSITION",
            ErrorCode::OrderNotPending => "ORDER_NOT_PENDING",
            ErrorCode::PaymentNotFound => "PAYMENT_NOT_FOUND",
            ErrorCode::PaymentExists => "PAYMENT_EXISTS",
            ErrorCode::PaymentNotPending => "PAYMENT_NOT_PENDING",
            ErrorCode::PaymentNotSuccess => "PAYMENT_NOT_SUCCESS",
            ErrorCode::InvalidAmount => "INVALID_AMOUNT",
            ErrorCode::Unauthorized => "UNAUTHORIZED",
            ErrorCode::Forbidden => "FORBIDDEN",
            ErrorCode::UpstreamUnavailable => "UPSTREAM_UNAVAILABLE",
            ErrorCode::ConcurrencyConflict => "CONCURRENCY_CONFLICT",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
