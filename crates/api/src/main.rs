//! API server entry point.

use std::sync::Arc;

use api::config::{Config, LogFormat};
use api::identity::StaticTokenIdentity;
use api::{AppState, reconcile, seed};
use inventory::{InMemoryInventoryStore, InventoryService, InventoryStore, PostgresInventoryStore};
use orders::{
    HttpInventoryClient, InMemoryOrderStore, InventoryClient, LocalInventoryClient, OrderStore,
    PostgresOrderStore,
};
use settlement::{InMemoryPaymentStore, PaymentStore, PostgresPaymentStore};
use tokio::signal;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

async fn stopped(mut shutdown: watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let registry = tracing_subscriber::registry().with(filter);
    match config.log_format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

#[tokio::main]
async fn main() {
    // 1. Configuration and tracing
    let config = Config::from_env();
    init_tracing(&config);

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Stores
    let (order_store, payment_store, inventory_store): (
        Arc<dyn OrderStore>,
        Arc<dyn PaymentStore>,
        Arc<dyn InventoryStore>,
    ) = match &config.database_url {
        Some(url) => {
            let pool = sqlx::postgres::PgPoolOptions::new()
                .max_connections(10)
                .connect(url)
                .await
                .expect("failed to connect to database");
            sqlx::migrate!("../../migrations")
                .run(&pool)
                .await
                .expect("failed to run migrations");
            tracing::info!("using PostgreSQL stores");
            (
                Arc::new(PostgresOrderStore::new(pool.clone())),
                Arc::new(PostgresPaymentStore::new(pool.clone())),
                Arc::new(PostgresInventoryStore::new(pool)),
            )
        }
        None => {
            tracing::info!("using in-memory stores");
            (
                Arc::new(InMemoryOrderStore::new()),
                Arc::new(InMemoryPaymentStore::new()),
                Arc::new(InMemoryInventoryStore::new()),
            )
        }
    };

    if let Some(path) = &config.catalog_seed_path {
        match seed::load_catalog(inventory_store.as_ref(), path).await {
            Ok(count) => tracing::info!(count, path = %path.display(), "catalog seeded"),
            Err(err) => tracing::error!(error = %err, path = %path.display(), "catalog seeding failed"),
        }
    }

    // 4. Ledgers and application state
    let inventory_service = InventoryService::new(inventory_store);
    let inventory_client: Arc<dyn InventoryClient> = match &config.inventory_url {
        Some(url) => {
            tracing::info!(%url, "reaching inventory over HTTP");
            Arc::new(HttpInventoryClient::new(url.clone()).expect("failed to build inventory client"))
        }
        None => Arc::new(LocalInventoryClient::new(inventory_service.clone())),
    };

    let identity = match &config.api_tokens {
        Some(tokens) => StaticTokenIdentity::parse(tokens).expect("invalid API_TOKENS"),
        None => {
            tracing::warn!("API_TOKENS is not set; every authenticated route will answer 401");
            StaticTokenIdentity::new()
        }
    };

    let state = AppState::new(
        order_store,
        inventory_client,
        payment_store,
        Arc::new(identity),
        config.retry_policy(),
    );

    // 5. Background work
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let recovery = config.recovery_interval.map(|interval| {
        reconcile::spawn_recovery(
            state.orders.clone(),
            interval,
            config.recovery_grace,
            shutdown_rx.clone(),
        )
    });

    let inventory_server = match config.inventory_rpc_addr() {
        Some(addr) => {
            let listener = tokio::net::TcpListener::bind(&addr)
                .await
                .expect("failed to bind inventory address");
            tracing::info!(%addr, "starting inventory ledger listener");
            let router = api::create_inventory_router(inventory_service);
            let shutdown = stopped(shutdown_rx.clone());
            Some(tokio::spawn(async move {
                if let Err(err) = axum::serve(listener, router)
                    .with_graceful_shutdown(shutdown)
                    .await
                {
                    tracing::error!(error = %err, "inventory listener failed");
                }
            }))
        }
        None => None,
    };

    // 6. Start server
    let app = api::create_app(state, metrics_handle);
    let addr = config.addr();
    tracing::info!(%addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    // 7. Stop background work
    let _ = shutdown_tx.send(true);
    for handle in [recovery, inventory_server].into_iter().flatten() {
        let _ = handle.await;
    }

    tracing::info!("server shut down gracefully");
}
