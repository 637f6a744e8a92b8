//! Order endpoints. Each maps onto one order ledger operation.

use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::response::Response;
use common::{OrderId, Page, ProductId};
use orders::{LineItem, Order, OrderStatus};
use serde::Deserialize;

use super::PageQuery;
use crate::error::ApiError;
use crate::identity::Caller;
use crate::response::ApiResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub items: Vec<OrderItemRequest>,
}

#[derive(Debug, Deserialize)]
pub struct OrderItemRequest {
    pub product_id: ProductId,
    pub quantity: u32,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

/// POST /orders
#[tracing::instrument(skip_all, fields(user_id = %caller.user_id))]
pub async fn create(
    State(state): State<AppState>,
    Caller(caller): Caller,
    body: Result<Json<CreateOrderRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(req) = body?;
    let items: Vec<LineItem> = req
        .items
        .iter()
        .map(|item| LineItem::new(item.product_id, item.quantity))
        .collect();

    let order = state.orders.create_order(caller.user_id, &items).await?;
    Ok(ApiResponse::created("order created", order))
}

/// GET /orders
#[tracing::instrument(skip_all, fields(user_id = %caller.user_id))]
pub async fn list(
    State(state): State<AppState>,
    Caller(caller): Caller,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> Result<ApiResponse<Page<Order>>, ApiError> {
    let Query(query) = query?;
    let page = state
        .orders
        .get_user_orders(caller.user_id, query.to_request())
        .await?;
    Ok(ApiResponse::ok("orders retrieved", page))
}

/// GET /orders/{id}
#[tracing::instrument(skip_all, fields(user_id = %caller.user_id))]
pub async fn get(
    State(state): State<AppState>,
    Caller(caller): Caller,
    id: Result<Path<OrderId>, PathRejection>,
) -> Result<ApiResponse<Order>, ApiError> {
    let Path(id) = id?;
    let order = state.orders.get_order(id).await?;
    caller.ensure_owner(order.user_id)?;
    Ok(ApiResponse::ok("order retrieved", order))
}

/// PATCH /orders/{id}/status (admin)
#[tracing::instrument(skip_all, fields(user_id = %caller.user_id))]
pub async fn update_status(
    State(state): State<AppState>,
    Caller(caller): Caller,
    id: Result<Path<OrderId>, PathRejection>,
    body: Result<Json<UpdateStatusRequest>, JsonRejection>,
) -> Result<ApiResponse<Order>, ApiError> {
    caller.ensure_admin()?;
    let Path(id) = id?;
    let Json(req) = body?;
    let next: OrderStatus = req.status.parse()?;

    let order = state.orders.update_order_status(id, next).await?;
    Ok(ApiResponse::ok("order status updated", order))
}

/// POST /orders/{id}/cancel
#[tracing::instrument(skip_all, fields(user_id = %caller.user_id))]
pub async fn cancel(
    State(state): State<AppState>,
    Caller(caller): Caller,
    id: Result<Path<OrderId>, PathRejection>,
) -> Result<ApiResponse<Order>, ApiError> {
    let Path(id) = id?;
    let order = state.orders.get_order(id).await?;
    caller.ensure_owner(order.user_id)?;

    let cancelled = state.orders.cancel_order(id).await?;
    Ok(ApiResponse::ok("order cancelled", cancelled))
}
