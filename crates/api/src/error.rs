//! API error types with HTTP response mapping.

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use common::{ErrorCode, OrderId};
use inventory::InventoryError;
use orders::OrderError;
use serde::Serialize;
use settlement::SettlementError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Missing or unrecognised credential.
    Unauthorized,
    /// The caller may not act on this resource.
    Forbidden(String),
    /// Malformed request body, path or query.
    BadRequest(String),
    /// A business rule of the edge itself, with its code.
    Rejected { code: ErrorCode, message: String },
    Order(OrderError),
    Settlement(SettlementError),
    Inventory(InventoryError),
    Internal(String),
}

#[derive(Serialize)]
struct ErrorDetail {
    code: ErrorCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    order_id: Option<OrderId>,
}

#[derive(Serialize)]
struct ErrorEnvelope {
    success: bool,
    message: String,
    error: ErrorDetail,
}

/// Maps a stable error code onto its HTTP status.
pub fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::ValidationError
        | ErrorCode::EmptyOrder
        | ErrorCode::InvalidQuantity
        | ErrorCode::InvalidAmount => StatusCode::BAD_REQUEST,
        ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorCode::Forbidden => StatusCode::FORBIDDEN,
        ErrorCode::ProductNotFound | ErrorCode::OrderNotFound | ErrorCode::PaymentNotFound => {
            StatusCode::NOT_FOUND
        }
        ErrorCode::ProductUnavailable
        | ErrorCode::InsufficientStock
        | ErrorCode::ReservationReleased
        | ErrorCode::InvalidTransition
        | ErrorCode::OrderNotPending
        | ErrorCode::PaymentExists
        | ErrorCode::PaymentNotPending
        | ErrorCode::PaymentNotSuccess
        | ErrorCode::ConcurrencyConflict => StatusCode::CONFLICT,
        ErrorCode::UpstreamUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl ApiError {
    pub fn code(&self) -> ErrorCode {
        match self {
            ApiError::Unauthorized => ErrorCode::Unauthorized,
            ApiError::Forbidden(_) => ErrorCode::Forbidden,
            ApiError::BadRequest(_) => ErrorCode::ValidationError,
            ApiError::Rejected { code, .. } => *code,
            ApiError::Order(err) => err.code(),
            ApiError::Settlement(err) => err.code(),
            ApiError::Inventory(err) => err.code(),
            ApiError::Internal(_) => ErrorCode::InternalError,
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::Unauthorized => "missing or invalid credentials".to_string(),
            ApiError::Forbidden(msg) | ApiError::BadRequest(msg) | ApiError::Internal(msg) => {
                msg.clone()
            }
            ApiError::Rejected { message, .. } => message.clone(),
            ApiError::Order(err) => err.to_string(),
            ApiError::Settlement(err) => err.to_string(),
            ApiError::Inventory(err) => err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = self.code();
        let message = if code == ErrorCode::InternalError {
            tracing::error!(error = %self.message(), "internal server error");
            "internal error".to_string()
        } else {
            self.message()
        };
        let order_id = match &self {
            ApiError::Order(err) => err.cancelled_order(),
            _ => None,
        };

        let body = ErrorEnvelope {
            success: false,
            message,
            error: ErrorDetail { code, order_id },
        };
        (status_for(code), axum::Json(body)).into_response()
    }
}

impl From<OrderError> for ApiError {
    fn from(err: OrderError) -> Self {
        ApiError::Order(err)
    }
}

impl From<SettlementError> for ApiError {
    fn from(err: SettlementError) -> Self {
        ApiError::Settlement(err)
    }
}

impl From<InventoryError> for ApiError {
    fn from(err: InventoryError) -> Self {
        ApiError::Inventory(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}
