//! Payment endpoints and the provider callback.

use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::response::Response;
use common::{ErrorCode, OrderId, Page, PaymentId};
use orders::OrderStatus;
use serde::{Deserialize, Serialize};
use settlement::{Payment, PaymentCallback, PaymentMethod, PaymentStatus};

use super::PageQuery;
use crate::error::ApiError;
use crate::identity::Caller;
use crate::reconcile;
use crate::response::ApiResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreatePaymentRequest {
    pub order_id: OrderId,
    pub method: PaymentMethod,
}

#[derive(Debug, Deserialize)]
pub struct RefundRequest {
    pub reason: String,
}

#[derive(Debug, Serialize)]
pub struct PaymentStatusResponse {
    pub order_id: OrderId,
    pub status: PaymentStatus,
}

#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    pub order_id: OrderId,
    pub paid: bool,
}

/// POST /payments
///
/// Opens a payment for one of the caller's confirmed orders, for exactly
/// the order total.
#[tracing::instrument(skip_all, fields(user_id = %caller.user_id))]
pub async fn create(
    State(state): State<AppState>,
    Caller(caller): Caller,
    body: Result<Json<CreatePaymentRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(req) = body?;
    let order = state.orders.get_order(req.order_id).await?;
    caller.ensure_owner(order.user_id)?;
    if order.status != OrderStatus::Confirmed {
        return Err(ApiError::Rejected {
            code: ErrorCode::InvalidTransition,
            message: format!(
                "order must be confirmed before payment (current status: {})",
                order.status
            ),
        });
    }

    let payment = state
        .payments
        .create_payment(order.user_id, order.id, order.total, req.method)
        .await?;
    Ok(ApiResponse::created("payment created", payment))
}

/// GET /payments
#[tracing::instrument(skip_all, fields(user_id = %caller.user_id))]
pub async fn list(
    State(state): State<AppState>,
    Caller(caller): Caller,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> Result<ApiResponse<Page<Payment>>, ApiError> {
    let Query(query) = query?;
    let page = state
        .payments
        .get_user_payments(caller.user_id, query.to_request())
        .await?;
    Ok(ApiResponse::ok("payments retrieved", page))
}

/// GET /payments/{id}
#[tracing::instrument(skip_all, fields(user_id = %caller.user_id))]
pub async fn get(
    State(state): State<AppState>,
    Caller(caller): Caller,
    id: Result<Path<PaymentId>, PathRejection>,
) -> Result<ApiResponse<Payment>, ApiError> {
    let Path(id) = id?;
    let payment = state.payments.get_payment(id).await?;
    caller.ensure_owner(payment.user_id)?;
    Ok(ApiResponse::ok("payment retrieved", payment))
}

/// GET /payments/order/{order_id}
#[tracing::instrument(skip_all, fields(user_id = %caller.user_id))]
pub async fn get_by_order(
    State(state): State<AppState>,
    Caller(caller): Caller,
    order_id: Result<Path<OrderId>, PathRejection>,
) -> Result<ApiResponse<Payment>, ApiError> {
    let Path(order_id) = order_id?;
    let payment = state.payments.get_payment_by_order(order_id).await?;
    caller.ensure_owner(payment.user_id)?;
    Ok(ApiResponse::ok("payment retrieved", payment))
}

/// GET /payments/order/{order_id}/status
#[tracing::instrument(skip_all, fields(user_id = %caller.user_id))]
pub async fn status(
    State(state): State<AppState>,
    Caller(caller): Caller,
    order_id: Result<Path<OrderId>, PathRejection>,
) -> Result<ApiResponse<PaymentStatusResponse>, ApiError> {
    let Path(order_id) = order_id?;
    let payment = state.payments.get_payment_by_order(order_id).await?;
    caller.ensure_owner(payment.user_id)?;
    let status = state.payments.get_payment_status(order_id).await?;
    Ok(ApiResponse::ok(
        "payment status retrieved",
        PaymentStatusResponse { order_id, status },
    ))
}

/// GET /payments/order/{order_id}/verify
#[tracing::instrument(skip_all, fields(user_id = %caller.user_id))]
pub async fn verify(
    State(state): State<AppState>,
    Caller(caller): Caller,
    order_id: Result<Path<OrderId>, PathRejection>,
) -> Result<ApiResponse<VerifyResponse>, ApiError> {
    let Path(order_id) = order_id?;
    let order = state.orders.get_order(order_id).await?;
    caller.ensure_owner(order.user_id)?;
    let paid = state.payments.verify_payment(order_id).await?;
    Ok(ApiResponse::ok(
        "payment verified",
        VerifyResponse { order_id, paid },
    ))
}

/// POST /payments/callback (admin)
///
/// Provider notification keyed by transaction id. A settled payment is
/// reflected onto its order; replaying the callback retries that step.
#[tracing::instrument(skip_all, fields(user_id = %caller.user_id))]
pub async fn callback(
    State(state): State<AppState>,
    Caller(caller): Caller,
    body: Result<Json<PaymentCallback>, JsonRejection>,
) -> Result<ApiResponse<Payment>, ApiError> {
    caller.ensure_admin()?;
    let Json(callback) = body?;
    let payment = state.payments.process_payment(&callback).await?;

    if let Err(err) = reconcile::reflect_payment(&state.orders, &payment).await {
        tracing::error!(
            payment_id = %payment.id,
            order_id = %payment.order_id,
            error = %err,
            "failed to reflect payment onto order"
        );
    }
    Ok(ApiResponse::ok("payment processed", payment))
}

/// POST /payments/{id}/cancel
#[tracing::instrument(skip_all, fields(user_id = %caller.user_id))]
pub async fn cancel(
    State(state): State<AppState>,
    Caller(caller): Caller,
    id: Result<Path<PaymentId>, PathRejection>,
) -> Result<ApiResponse<Payment>, ApiError> {
    let Path(id) = id?;
    let payment = state.payments.get_payment(id).await?;
    caller.ensure_owner(payment.user_id)?;
    let cancelled = state.payments.cancel_payment(id).await?;
    Ok(ApiResponse::ok("payment cancelled", cancelled))
}

/// POST /payments/{id}/refund (admin)
///
/// Stock is not returned; restocking is a separate inventory call.
#[tracing::instrument(skip_all, fields(user_id = %caller.user_id))]
pub async fn refund(
    State(state): State<AppState>,
    Caller(caller): Caller,
    id: Result<Path<PaymentId>, PathRejection>,
    body: Result<Json<RefundRequest>, JsonRejection>,
) -> Result<ApiResponse<Payment>, ApiError> {
    caller.ensure_admin()?;
    let Path(id) = id?;
    let Json(req) = body?;
    let refunded = state.payments.refund_payment(id, &req.reason).await?;
    Ok(ApiResponse::ok("payment refunded", refunded))
}
