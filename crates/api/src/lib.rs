//! HTTP API server with observability for the store backend.
//!
//! Provides REST endpoints for the product catalog, customer registration,
//! and checkout, with structured logging (tracing) and Prometheus metrics.

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use common::StaffId;
use domain::{AccountDirectory, CheckoutService};
use metrics_exporter_prometheus::PrometheusHandle;
use store::Store;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared application state accessible from all handlers.
pub struct AppState<S: Store> {
    pub checkout: CheckoutService<S>,
    pub store: S,
    pub directory: Arc<dyn AccountDirectory>,
    /// Staff member recorded on self-checkout orders.
    pub default_staff: StaffId,
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: Store + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health))
        .route("/customers", post(routes::customers::register::<S>))
        .route(
            "/products",
            get(routes::products::list::<S>).post(routes::products::create::<S>),
        )
        .route("/products/search", get(routes::products::search::<S>))
        .route("/products/report", get(routes::products::report::<S>))
        .route(
            "/products/{id}",
            get(routes::products::get::<S>)
                .put(routes::products::update::<S>)
                .delete(routes::products::delete::<S>),
        )
        .route("/orders", post(routes::orders::create::<S>))
        .route("/orders/{id}", get(routes::orders::get::<S>))
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

/// Creates the application state over a store and directory.
pub fn create_default_state<S: Store + Clone + 'static>(
    store: S,
    directory: Arc<dyn AccountDirectory>,
    default_staff: StaffId,
) -> Arc<AppState<S>> {
    Arc::new(AppState {
        checkout: CheckoutService::new(store.clone()),
        store,
        directory,
        default_staff,
    })
}
