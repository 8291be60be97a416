//! Gateway metrics and admin introspection
//!
//! Unlike the `/metrics` dashboard mock, everything here reports live
//! gateway state: traffic counters in Prometheus text format, the rate
//! limiter's configured rules and busiest windows, and the legacy-URL
//! usage records.

use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Instant,
};

use axum::{
    extract::State,
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;

use super::handlers::AppState;
use super::models::Envelope;

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Atomic traffic counters, shared through the application state.
pub struct GatewayMetrics {
    started: Instant,
    requests_total: AtomicU64,
    preflights_total: AtomicU64,
    origins_denied_total: AtomicU64,
    dev_fallbacks_total: AtomicU64,
    rate_limited_total: AtomicU64,
    redirects_total: AtomicU64,
    proxied_total: AtomicU64,
    upstream_failures_total: AtomicU64,
    mock_hits_total: AtomicU64,
    not_found_total: AtomicU64,
    panics_total: AtomicU64,
}

impl GatewayMetrics {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            requests_total: AtomicU64::new(0),
            preflights_total: AtomicU64::new(0),
            origins_denied_total: AtomicU64::new(0),
            dev_fallbacks_total: AtomicU64::new(0),
            rate_limited_total: AtomicU64::new(0),
            redirects_total: AtomicU64::new(0),
            proxied_total: AtomicU64::new(0),
            upstream_failures_total: AtomicU64::new(0),
            mock_hits_total: AtomicU64::new(0),
            not_found_total: AtomicU64::new(0),
            panics_total: AtomicU64::new(0),
        }
    }

    pub fn incr_requests(&self) {
        self.requests_total.fetch_add(1, Ordering::SeqCst);
    }

    pub fn incr_preflights(&self) {
        self.preflights_total.fetch_add(1, Ordering::SeqCst);
    }

    pub fn incr_origins_denied(&self) {
        self.origins_denied_total.fetch_add(1, Ordering::SeqCst);
    }

    pub fn incr_dev_fallbacks(&self) {
        self.dev_fallbacks_total.fetch_add(1, Ordering::SeqCst);
    }

    pub fn incr_rate_limited(&self) {
        self.rate_limited_total.fetch_add(1, Ordering::SeqCst);
    }

    pub fn incr_redirects(&self) {
        self.redirects_total.fetch_add(1, Ordering::SeqCst);
    }

    pub fn incr_proxied(&self) {
        self.proxied_total.fetch_add(1, Ordering::SeqCst);
    }

    pub fn incr_upstream_failures(&self) {
        self.upstream_failures_total.fetch_add(1, Ordering::SeqCst);
    }

    pub fn incr_mock_hits(&self) {
        self.mock_hits_total.fetch_add(1, Ordering::SeqCst);
    }

    pub fn incr_not_found(&self) {
        self.not_found_total.fetch_add(1, Ordering::SeqCst);
    }

    pub fn incr_panics(&self) {
        self.panics_total.fetch_add(1, Ordering::SeqCst);
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started.elapsed().as_secs()
    }

    pub fn snapshot(&self) -> GatewayMetricsSnapshot {
        GatewayMetricsSnapshot {
            timestamp: Utc::now(),
            uptime_seconds: self.uptime_seconds(),
            requests_total: self.requests_total.load(Ordering::SeqCst),
            preflights_total: self.preflights_total.load(Ordering::SeqCst),
            origins_denied_total: self.origins_denied_total.load(Ordering::SeqCst),
            dev_fallbacks_total: self.dev_fallbacks_total.load(Ordering::SeqCst),
            rate_limited_total: self.rate_limited_total.load(Ordering::SeqCst),
            redirects_total: self.redirects_total.load(Ordering::SeqCst),
            proxied_total: self.proxied_total.load(Ordering::SeqCst),
            upstream_failures_total: self.upstream_failures_total.load(Ordering::SeqCst),
            mock_hits_total: self.mock_hits_total.load(Ordering::SeqCst),
            not_found_total: self.not_found_total.load(Ordering::SeqCst),
            panics_total: self.panics_total.load(Ordering::SeqCst),
        }
    }

    /// Prometheus text exposition, rendered by hand.
    pub fn to_prometheus_format(&self) -> String {
        let snapshot = self.snapshot();
        let mut output = String::new();

        let counters: [(&str, &str, u64); 11] = [
            (
                "bgapp_edge_requests_total",
                "Total requests seen by the gateway",
                snapshot.requests_total,
            ),
            (
                "bgapp_edge_preflights_total",
                "CORS preflight requests answered",
                snapshot.preflights_total,
            ),
            (
                "bgapp_edge_origins_denied_total",
                "Requests whose origin failed validation",
                snapshot.origins_denied_total,
            ),
            (
                "bgapp_edge_dev_fallbacks_total",
                "Unlisted origins allowed by the development fallback",
                snapshot.dev_fallbacks_total,
            ),
            (
                "bgapp_edge_rate_limited_total",
                "Requests rejected with 429",
                snapshot.rate_limited_total,
            ),
            (
                "bgapp_edge_redirects_total",
                "Legacy-host requests answered with 301",
                snapshot.redirects_total,
            ),
            (
                "bgapp_edge_proxied_total",
                "Requests forwarded to an upstream",
                snapshot.proxied_total,
            ),
            (
                "bgapp_edge_upstream_failures_total",
                "Upstream fetches that failed or timed out",
                snapshot.upstream_failures_total,
            ),
            (
                "bgapp_edge_mock_hits_total",
                "Requests answered by a mock responder",
                snapshot.mock_hits_total,
            ),
            (
                "bgapp_edge_not_found_total",
                "Requests matching no route, mock, or proxy prefix",
                snapshot.not_found_total,
            ),
            (
                "bgapp_edge_panics_total",
                "Handler panics converted to 500 responses",
                snapshot.panics_total,
            ),
        ];

        for (name, help, value) in counters {
            output.push_str(&format!(
                "# HELP {name} {help}\n# TYPE {name} counter\n{name} {value}\n\n"
            ));
        }

        output.push_str(&format!(
            "# HELP bgapp_edge_uptime_seconds Seconds since the gateway started\n\
             # TYPE bgapp_edge_uptime_seconds gauge\n\
             bgapp_edge_uptime_seconds {}\n",
            snapshot.uptime_seconds
        ));

        output
    }
}

impl Default for GatewayMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Counter snapshot for JSON consumers and log summaries.
#[derive(Debug, Clone, Serialize)]
pub struct GatewayMetricsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub uptime_seconds: u64,
    pub requests_total: u64,
    pub preflights_total: u64,
    pub origins_denied_total: u64,
    pub dev_fallbacks_total: u64,
    pub rate_limited_total: u64,
    pub redirects_total: u64,
    pub proxied_total: u64,
    pub upstream_failures_total: u64,
    pub mock_hits_total: u64,
    pub not_found_total: u64,
    pub panics_total: u64,
}

/// `GET /admin-api/gateway/metrics` — Prometheus text exposition.
pub async fn gateway_metrics_handler(State(state): State<Arc<AppState>>) -> Response {
    let body = state.metrics.to_prometheus_format();
    ([(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)], body).into_response()
}

/// `GET /admin-api/gateway/rate-limits` — configured rules plus live windows.
pub async fn rate_limits_handler(State(state): State<Arc<AppState>>) -> Response {
    Json(Envelope::ok(state.limiter.snapshot())).into_response()
}

/// `GET /admin-api/gateway/redirects` — legacy-URL migration telemetry.
pub async fn redirect_usage_handler(State(state): State<Arc<AppState>>) -> Response {
    let report = state.usage.report();
    Json(Envelope::ok(json!({
        "tracked_urls": report.len(),
        "usage": report,
    })))
    .into_response()
}
