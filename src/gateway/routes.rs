//! Route Configuration
//!
//! The mock surface (STAC catalog, service status, system metrics), the
//! live gateway admin endpoints, and the fallback dispatcher that handles
//! proxying and 404s. Cross-cutting behavior (CORS, rate limits, redirects)
//! lives in the middleware stack, not here.

use super::handlers::{self, AppState};
use super::monitoring;
use super::stac;
use axum::{routing::get, Router};
use std::sync::Arc;

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // STAC catalog mock
        .route("/", get(stac::catalog_handler))
        .route("/collections", get(stac::collections_handler))
        .route("/collections/:id", get(stac::collection_handler))
        .route("/collections/:id/items", get(stac::collection_items_handler))
        .route("/search", get(stac::search_handler))
        // Dashboard mocks
        .route("/services", get(handlers::services_handler))
        .route("/metrics", get(handlers::metrics_mock_handler))
        // Health and gateway admin
        .route("/health", get(handlers::health_handler))
        .route(
            "/admin-api/gateway/metrics",
            get(monitoring::gateway_metrics_handler),
        )
        .route(
            "/admin-api/gateway/rate-limits",
            get(monitoring::rate_limits_handler),
        )
        .route(
            "/admin-api/gateway/redirects",
            get(monitoring::redirect_usage_handler),
        )
        // Everything else: reverse proxy or 404 with the endpoint directory
        .fallback(handlers::dispatch_handler)
        .with_state(state)
}
