//! Request handlers and shared state
//!
//! `AppState` wires the injected stores together: origin validator, rate
//! limiter, redirect map, usage tracker, proxy table, and metrics. Handlers
//! here cover the service-status and system-metrics mocks plus the fallback
//! dispatcher that decides between proxying and a 404.

use super::{
    cors::{CorsPolicy, OriginValidator},
    errors::ApiError,
    middleware::RequestId,
    models::{
        Envelope, HealthResponse, MockMetricsData, ServiceInfo, ServicesData, ServicesSummary,
        SystemMetrics,
    },
    monitoring::GatewayMetrics,
    proxy::{self, HttpUpstreamClient, ProxyError, ProxyTable, UpstreamClient},
    ratelimit::RateLimiter,
    redirect::{RedirectMap, UsageTracker},
};
use crate::config::GatewayConfig;
use axum::{
    extract::{Request, State},
    response::{IntoResponse, Response},
    Extension, Json,
};
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

/// Shared application state
pub struct AppState {
    pub config: GatewayConfig,
    pub validator: OriginValidator,
    pub policy: CorsPolicy,
    pub limiter: Arc<RateLimiter>,
    pub redirects: RedirectMap,
    pub usage: UsageTracker,
    pub proxy_routes: ProxyTable,
    pub upstream: Arc<dyn UpstreamClient>,
    pub metrics: GatewayMetrics,
}

impl AppState {
    pub fn new(config: GatewayConfig) -> Result<Self, ProxyError> {
        let upstream = Arc::new(HttpUpstreamClient::new(config.upstream_timeout())?);
        Ok(Self::with_upstream(config, upstream))
    }

    /// Test seam: same wiring, caller-provided upstream client.
    pub fn with_upstream(config: GatewayConfig, upstream: Arc<dyn UpstreamClient>) -> Self {
        Self {
            validator: OriginValidator::new(config.environment, &config.cors),
            policy: CorsPolicy::new(config.environment, config.server.frame_options),
            limiter: Arc::new(RateLimiter::new(&config.rate_limit)),
            redirects: RedirectMap::new(&config.redirects),
            usage: UsageTracker::new(),
            proxy_routes: ProxyTable::new(&config.proxy),
            upstream,
            metrics: GatewayMetrics::new(),
            config,
        }
    }
}

/// Health check handler - never rate-limited, never proxied
/// GET /health
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "bgapp-edge".to_string(),
        version: state.config.server.version.clone(),
        timestamp: Utc::now(),
    })
}

/// Platform service-status mock for the admin dashboard
/// GET /services
pub async fn services_handler(State(state): State<Arc<AppState>>) -> Json<Envelope<ServicesData>> {
    state.metrics.incr_mock_hits();
    let services = platform_services();
    let summary = summarize(&services);
    Json(Envelope::ok(ServicesData { services, summary }))
}

/// Canned system metrics for the dashboard's metrics card
/// GET /metrics
pub async fn metrics_mock_handler(
    State(state): State<Arc<AppState>>,
) -> Json<Envelope<MockMetricsData>> {
    state.metrics.incr_mock_hits();
    let services = platform_services();
    Json(Envelope::ok(MockMetricsData {
        system: SystemMetrics {
            cpu_percent: 45.2,
            memory_percent: 67.8,
            disk_percent: 23.1,
            uptime_seconds: state.metrics.uptime_seconds(),
        },
        services: summarize(&services),
    }))
}

/// Fallback for paths without a dedicated route: forward to the matching
/// upstream if one is configured, otherwise 404 with the endpoint directory.
pub async fn dispatch_handler(
    State(state): State<Arc<AppState>>,
    request_id: Option<Extension<RequestId>>,
    request: Request,
) -> Response {
    let request_id = request_id
        .map(|Extension(RequestId(id))| id)
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let path = request.uri().path().to_string();

    if let Some(route) = state.proxy_routes.route_for(&path) {
        state.metrics.incr_proxied();
        return match proxy::forward(state.upstream.as_ref(), route, request).await {
            Ok(response) => response,
            Err(error) => {
                state.metrics.incr_upstream_failures();
                ApiError::upstream_unavailable(request_id, &error).into_response()
            }
        };
    }

    state.metrics.incr_not_found();
    ApiError::not_found(
        request_id,
        format!("Endpoint {} not found", path),
        available_endpoints(&state),
    )
    .into_response()
}

/// The mock/admin surface plus the configured proxy prefixes.
fn available_endpoints(state: &AppState) -> Vec<String> {
    let mut endpoints: Vec<String> = [
        "/",
        "/health",
        "/collections",
        "/collections/{id}",
        "/collections/{id}/items",
        "/search",
        "/services",
        "/metrics",
        "/admin-api/gateway/metrics",
        "/admin-api/gateway/rate-limits",
        "/admin-api/gateway/redirects",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    endpoints.extend(
        state
            .proxy_routes
            .routes()
            .iter()
            .map(|route| format!("{}/*", route.prefix)),
    );
    endpoints
}

/// The seven services the original platform dashboard tracks.
fn platform_services() -> Vec<ServiceInfo> {
    let now = Utc::now();
    [
        ("PostGIS", 5432, 0.012),
        ("MinIO", 9000, 0.028),
        ("STAC API", 8081, 0.055),
        ("PyGeoAPI", 5080, 0.062),
        ("STAC Browser", 8082, 0.041),
        ("Keycloak", 8083, 0.089),
        ("Frontend", 8085, 0.018),
    ]
    .iter()
    .map(|(name, port, response_time)| ServiceInfo {
        name: name.to_string(),
        status: "online".to_string(),
        port: *port,
        url: format!("http://localhost:{}", port),
        response_time: *response_time,
        last_check: now,
    })
    .collect()
}

fn summarize(services: &[ServiceInfo]) -> ServicesSummary {
    let total = services.len();
    let online = services.iter().filter(|s| s.status == "online").count();
    ServicesSummary {
        total,
        online,
        offline: total - online,
        health_percentage: if total > 0 {
            online as f64 / total as f64 * 100.0
        } else {
            0.0
        },
    }
}
