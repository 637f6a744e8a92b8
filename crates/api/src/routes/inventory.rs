//! Inventory ledger surfaces.
//!
//! The RPC handlers speak the `inventory::rpc` contract consumed by
//! `HttpInventoryClient`: business rejections come back as `200` with
//! `found = false` or `success = false`, storage failures as `503` so the
//! client treats them as transient. Stock changes that carry a reservation
//! key are applied at most once per key. `restock` is the admin adjustment
//! on the public edge.

use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use common::ProductId;
use inventory::{
    InventoryError, ProductReply, StockChangeReply, StockChangeRequest, StockReply,
};
use orders::{InventoryClient, OrderError};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::identity::Caller;
use crate::response::ApiResponse;
use crate::state::{AppState, SharedInventoryService};

fn unavailable(err: &InventoryError) -> Response {
    tracing::error!(error = %err, "inventory storage failure");
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(StockChangeReply::rejected(err)),
    )
        .into_response()
}

/// GET /inventory/products/{id}
#[tracing::instrument(skip(service))]
pub async fn get_product(
    State(service): State<SharedInventoryService>,
    Path(id): Path<ProductId>,
) -> Response {
    match service.get_product(id).await {
        Ok(product) => Json(ProductReply::from(product)).into_response(),
        Err(InventoryError::ProductNotFound(_)) => Json(ProductReply::not_found()).into_response(),
        Err(err) => unavailable(&err),
    }
}

/// GET /inventory/products/{id}/stock
#[tracing::instrument(skip(service))]
pub async fn check_stock(
    State(service): State<SharedInventoryService>,
    Path(id): Path<ProductId>,
) -> Response {
    match service.check_stock(id).await {
        Ok(stock) => Json(StockReply { found: true, stock }).into_response(),
        Err(InventoryError::ProductNotFound(_)) => Json(StockReply {
            found: false,
            stock: 0,
        })
        .into_response(),
        Err(err) => unavailable(&err),
    }
}

/// POST /inventory/products/{id}/decrease
#[tracing::instrument(skip(service))]
pub async fn decrease_stock(
    State(service): State<SharedInventoryService>,
    Path(id): Path<ProductId>,
    Json(req): Json<StockChangeRequest>,
) -> Response {
    let result = match req.reservation {
        Some(key) => service.reserve_stock(key, id, req.quantity).await,
        None => service.decrease_stock(id, req.quantity).await,
    };
    stock_change_reply(result)
}

/// POST /inventory/products/{id}/increase
#[tracing::instrument(skip(service))]
pub async fn increase_stock(
    State(service): State<SharedInventoryService>,
    Path(id): Path<ProductId>,
    Json(req): Json<StockChangeRequest>,
) -> Response {
    let result = match req.reservation {
        Some(key) => service.release_stock(key, id).await,
        None => service.increase_stock(id, req.quantity).await,
    };
    stock_change_reply(result)
}

fn stock_change_reply(result: inventory::Result<u32>) -> Response {
    match result {
        Ok(remaining) => Json(StockChangeReply::applied(remaining)).into_response(),
        Err(err @ InventoryError::Database(_)) => unavailable(&err),
        Err(err) => Json(StockChangeReply::rejected(&err)).into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct RestockRequest {
    pub quantity: u32,
}

#[derive(Debug, Serialize)]
pub struct RestockResponse {
    pub product_id: ProductId,
    pub remaining_stock: u32,
}

/// POST /admin/inventory/{id}/restock (admin)
///
/// Returns units to stock through the same primitive compensation uses,
/// e.g. after a refund.
#[tracing::instrument(skip_all, fields(user_id = %caller.user_id))]
pub async fn restock(
    State(state): State<AppState>,
    Caller(caller): Caller,
    id: Result<Path<ProductId>, PathRejection>,
    body: Result<Json<RestockRequest>, JsonRejection>,
) -> Result<ApiResponse<RestockResponse>, ApiError> {
    caller.ensure_admin()?;
    let Path(product_id) = id?;
    let Json(req) = body?;

    let remaining_stock = state
        .orders
        .coordinator()
        .inventory()
        .increase_stock(product_id, req.quantity)
        .await
        .map_err(OrderError::from)?;
    tracing::info!(%product_id, quantity = req.quantity, remaining_stock, "stock restocked");

    Ok(ApiResponse::ok(
        "stock increased",
        RestockResponse {
            product_id,
            remaining_stock,
        },
    ))
}
