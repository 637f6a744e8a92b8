//! HTTP edge for the fulfillment ledgers.
//!
//! Exposes order and payment operations behind bearer-token identity, the
//! inventory ledger's RPC surface on its own router, and Prometheus metrics.
//! Payment outcomes are reflected onto orders here rather than inside the
//! settlement ledger.

pub mod config;
pub mod error;
pub mod identity;
pub mod reconcile;
pub mod response;
pub mod routes;
pub mod seed;
pub mod state;

use axum::Router;
use axum::routing::{get, patch, post};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use state::{AppState, SharedInventoryService, SharedOrderService, SharedSettlementService};

/// Creates the public router with all edge routes and shared state.
pub fn create_app(state: AppState, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::ops::metrics))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::ops::health))
        .route(
            "/orders",
            post(routes::orders::create).get(routes::orders::list),
        )
        .route("/orders/{id}", get(routes::orders::get))
        .route("/orders/{id}/status", patch(routes::orders::update_status))
        .route("/orders/{id}/cancel", post(routes::orders::cancel))
        .route(
            "/payments",
            post(routes::payments::create).get(routes::payments::list),
        )
        .route("/payments/callback", post(routes::payments::callback))
        .route("/payments/{id}", get(routes::payments::get))
        .route("/payments/{id}/cancel", post(routes::payments::cancel))
        .route("/payments/{id}/refund", post(routes::payments::refund))
        .route(
            "/payments/order/{order_id}",
            get(routes::payments::get_by_order),
        )
        .route(
            "/payments/order/{order_id}/status",
            get(routes::payments::status),
        )
        .route(
            "/payments/order/{order_id}/verify",
            get(routes::payments::verify),
        )
        .route(
            "/admin/inventory/{id}/restock",
            post(routes::inventory::restock),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates the inventory ledger's RPC router.
///
/// Served on its own listener; it is the surface `HttpInventoryClient`
/// talks to and carries no caller identity.
pub fn create_inventory_router(service: SharedInventoryService) -> Router {
    Router::new()
        .route(
            "/inventory/products/{id}",
            get(routes::inventory::get_product),
        )
        .route(
            "/inventory/products/{id}/stock",
            get(routes::inventory::check_stock),
        )
        .route(
            "/inventory/products/{id}/decrease",
            post(routes::inventory::decrease_stock),
        )
        .route(
            "/inventory/products/{id}/increase",
            post(routes::inventory::increase_stock),
        )
        .with_state(service)
        .layer(TraceLayer::new_for_http())
}
