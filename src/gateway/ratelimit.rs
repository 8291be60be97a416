//! Sliding-window rate limiting
//!
//! Per-client request timestamps in a 60-second window, with the limit chosen
//! by longest matching path prefix. State is per-instance and in-memory:
//! a restart clears every window, so this is soft throttling for one edge
//! node, not a distributed quota.

use std::{
    net::SocketAddr,
    sync::Arc,
    time::{Duration, Instant},
};

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use dashmap::DashMap;
use tracing::{debug, warn};

use super::handlers::AppState;
use super::models::{ClientWindowView, Envelope, RateLimitSnapshot};
use crate::config::{RateLimitConfig, RateRule};

/// Window length every rule counts against.
pub const WINDOW: Duration = Duration::from_secs(60);

/// Lookback for the burst spike guard.
const SPIKE_WINDOW: Duration = Duration::from_secs(1);

pub const HEADER_LIMIT: &str = "x-ratelimit-limit";
pub const HEADER_REMAINING: &str = "x-ratelimit-remaining";
pub const HEADER_RESET: &str = "x-ratelimit-reset";

/// Outcome of one rate check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateDecision {
    Allowed { limit: u32, remaining: u32 },
    Limited { limit: u32, retry_after_secs: u64 },
}

/// Injected per-instance limiter. Rules are frozen at construction, sorted
/// longest prefix first so the most specific rule always wins.
pub struct RateLimiter {
    rules: Vec<RateRule>,
    default_rule: RateRule,
    exempt_paths: Vec<String>,
    windows: DashMap<String, Vec<Instant>>,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        let mut rules = config.rules.clone();
        // Stable sort: equal-length prefixes keep their configured order.
        rules.sort_by(|a, b| b.prefix.len().cmp(&a.prefix.len()));
        Self {
            rules,
            default_rule: RateRule {
                prefix: String::new(),
                requests_per_minute: config.default_requests_per_minute,
                burst: config.default_burst,
            },
            exempt_paths: config.exempt_paths.clone(),
            windows: DashMap::new(),
        }
    }

    /// Exempt paths (health and metrics probes) bypass accounting entirely.
    pub fn is_exempt(&self, path: &str) -> bool {
        self.exempt_paths.iter().any(|p| p == path)
    }

    pub fn rule_for(&self, path: &str) -> &RateRule {
        self.rules
            .iter()
            .find(|rule| path.starts_with(rule.prefix.as_str()))
            .unwrap_or(&self.default_rule)
    }

    pub fn check(&self, client_id: &str, path: &str) -> RateDecision {
        self.check_at(client_id, path, Instant::now())
    }

    // The DashMap entry guard serializes read-modify-write per client, so
    // concurrent requests from one client never undercount.
    fn check_at(&self, client_id: &str, path: &str, now: Instant) -> RateDecision {
        let rule = self.rule_for(path);
        let limit = rule.requests_per_minute;

        let mut window = self.windows.entry(client_id.to_string()).or_default();
        window.retain(|t| now.duration_since(*t) < WINDOW);

        if window.len() as u32 >= limit {
            // Capacity frees up when the oldest timestamp leaves the window.
            let retry_after_secs = window
                .first()
                .map(|oldest| {
                    WINDOW
                        .saturating_sub(now.duration_since(*oldest))
                        .as_secs()
                        .max(1)
                })
                .unwrap_or(1);
            return RateDecision::Limited {
                limit,
                retry_after_secs,
            };
        }

        if rule.burst > 0 {
            let spike = window
                .iter()
                .filter(|t| now.duration_since(**t) < SPIKE_WINDOW)
                .count();
            if spike as u32 >= rule.burst {
                return RateDecision::Limited {
                    limit,
                    retry_after_secs: 1,
                };
            }
        }

        window.push(now);
        let remaining = limit.saturating_sub(window.len() as u32);
        RateDecision::Allowed { limit, remaining }
    }

    /// Drop clients whose windows hold no fresh timestamps.
    pub fn sweep(&self) {
        self.sweep_at(Instant::now());
    }

    fn sweep_at(&self, now: Instant) {
        self.windows.retain(|_, window| {
            window.retain(|t| now.duration_since(*t) < WINDOW);
            !window.is_empty()
        });
    }

    pub fn tracked_clients(&self) -> usize {
        self.windows.len()
    }

    /// Admin snapshot: configured rules plus the busiest live windows.
    pub fn snapshot(&self) -> RateLimitSnapshot {
        let now = Instant::now();
        let mut windows: Vec<ClientWindowView> = self
            .windows
            .iter()
            .map(|entry| ClientWindowView {
                client: entry.key().clone(),
                requests_in_window: entry
                    .value()
                    .iter()
                    .filter(|t| now.duration_since(**t) < WINDOW)
                    .count(),
            })
            .collect();
        windows.sort_by(|a, b| b.requests_in_window.cmp(&a.requests_in_window));

        RateLimitSnapshot {
            rules: self.rules.clone(),
            default_requests_per_minute: self.default_rule.requests_per_minute,
            default_burst: self.default_rule.burst,
            tracked_clients: windows.len(),
            windows,
        }
    }
}

/// Periodic cleanup so one-off clients do not accumulate forever.
pub fn spawn_sweeper(limiter: Arc<RateLimiter>, every: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            limiter.sweep();
            debug!(
                "Rate window sweep complete; {} clients tracked",
                limiter.tracked_clients()
            );
        }
    })
}

/// Client identity for rate accounting. The edge platform sets
/// `CF-Connecting-IP`; the remaining headers cover local and proxied
/// deployments, with the socket peer as the final fallback.
pub fn extract_client_id(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    if let Some(ip) = non_empty_header(headers, "cf-connecting-ip") {
        return ip;
    }
    if let Some(forwarded) = non_empty_header(headers, "x-forwarded-for") {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }
    if let Some(ip) = non_empty_header(headers, "x-real-ip") {
        return ip;
    }
    peer.map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn non_empty_header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Rate-limit middleware: checks the window before routing, answers 429 with
/// `Retry-After` on denial, and annotates allowed responses with the
/// remaining budget.
pub async fn ratelimit_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    if state.limiter.is_exempt(&path) {
        return next.run(request).await;
    }

    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0);
    let client = extract_client_id(request.headers(), peer);

    match state.limiter.check(&client, &path) {
        RateDecision::Allowed { limit, remaining } => {
            let mut response = next.run(request).await;
            let headers = response.headers_mut();
            headers.insert(HeaderName::from_static(HEADER_LIMIT), HeaderValue::from(limit));
            headers.insert(
                HeaderName::from_static(HEADER_REMAINING),
                HeaderValue::from(remaining),
            );
            response
        }
        RateDecision::Limited {
            limit,
            retry_after_secs,
        } => {
            state.metrics.incr_rate_limited();
            warn!("🚦 Rate limit exceeded for {} on {}", client, path);

            let envelope = Envelope::error(
                "Rate limit exceeded",
                format!("Too many requests; retry in {}s", retry_after_secs),
            );
            let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(envelope)).into_response();
            let headers = response.headers_mut();
            headers.insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
            headers.insert(HeaderName::from_static(HEADER_LIMIT), HeaderValue::from(limit));
            headers.insert(
                HeaderName::from_static(HEADER_REMAINING),
                HeaderValue::from(0u16),
            );
            let reset = Utc::now()
                .timestamp()
                .saturating_add(retry_after_secs as i64);
            headers.insert(HeaderName::from_static(HEADER_RESET), HeaderValue::from(reset));
            response
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter_with(rules: Vec<RateRule>, default_rpm: u32) -> RateLimiter {
        RateLimiter::new(&RateLimitConfig {
            rules,
            default_requests_per_minute: default_rpm,
            default_burst: 0,
            exempt_paths: vec!["/health".to_string(), "/metrics".to_string()],
            sweep_interval_secs: 300,
        })
    }

    fn rule(prefix: &str, rpm: u32, burst: u32) -> RateRule {
        RateRule {
            prefix: prefix.to_string(),
            requests_per_minute: rpm,
            burst,
        }
    }

    #[test]
    fn test_longest_prefix_rule_wins() {
        let limiter = limiter_with(
            vec![rule("/api", 100, 0), rule("/api/export", 5, 0)],
            60,
        );

        assert_eq!(limiter.rule_for("/api/export/csv").requests_per_minute, 5);
        assert_eq!(limiter.rule_for("/api/other").requests_per_minute, 100);
        assert_eq!(limiter.rule_for("/elsewhere").requests_per_minute, 60);
    }

    #[test]
    fn test_limit_is_enforced_and_window_slides() {
        let limiter = limiter_with(vec![rule("/api", 3, 0)], 60);
        let start = Instant::now();

        for i in 0..3 {
            let decision = limiter.check_at("1.2.3.4", "/api/data", start);
            assert!(
                matches!(decision, RateDecision::Allowed { .. }),
                "request {} should pass",
                i
            );
        }

        match limiter.check_at("1.2.3.4", "/api/data", start + Duration::from_secs(5)) {
            RateDecision::Limited {
                limit,
                retry_after_secs,
            } => {
                assert_eq!(limit, 3);
                assert!(retry_after_secs >= 1);
                assert!(retry_after_secs <= 60);
            }
            other => panic!("expected Limited, got {:?}", other),
        }

        // A minute later the window has drained.
        let decision = limiter.check_at("1.2.3.4", "/api/data", start + Duration::from_secs(61));
        assert!(matches!(decision, RateDecision::Allowed { .. }));
    }

    #[test]
    fn test_remaining_counts_down() {
        let limiter = limiter_with(vec![rule("/api", 3, 0)], 60);
        let start = Instant::now();

        let first = limiter.check_at("c", "/api", start);
        assert_eq!(
            first,
            RateDecision::Allowed {
                limit: 3,
                remaining: 2
            }
        );
        let second = limiter.check_at("c", "/api", start + Duration::from_secs(2));
        assert_eq!(
            second,
            RateDecision::Allowed {
                limit: 3,
                remaining: 1
            }
        );
    }

    #[test]
    fn test_clients_have_independent_windows() {
        let limiter = limiter_with(vec![rule("/api", 1, 0)], 60);
        let start = Instant::now();

        assert!(matches!(
            limiter.check_at("a", "/api", start),
            RateDecision::Allowed { .. }
        ));
        assert!(matches!(
            limiter.check_at("a", "/api", start),
            RateDecision::Limited { .. }
        ));
        assert!(matches!(
            limiter.check_at("b", "/api", start),
            RateDecision::Allowed { .. }
        ));
    }

    #[test]
    fn test_burst_guard_blocks_spikes_inside_one_second() {
        let limiter = limiter_with(vec![rule("/ml", 100, 2)], 60);
        let start = Instant::now();

        assert!(matches!(
            limiter.check_at("c", "/ml/predict", start),
            RateDecision::Allowed { .. }
        ));
        assert!(matches!(
            limiter.check_at("c", "/ml/predict", start + Duration::from_millis(100)),
            RateDecision::Allowed { .. }
        ));
        match limiter.check_at("c", "/ml/predict", start + Duration::from_millis(200)) {
            RateDecision::Limited {
                retry_after_secs, ..
            } => assert_eq!(retry_after_secs, 1),
            other => panic!("expected spike rejection, got {:?}", other),
        }

        // Spread out, the same volume passes.
        assert!(matches!(
            limiter.check_at("c", "/ml/predict", start + Duration::from_secs(2)),
            RateDecision::Allowed { .. }
        ));
    }

    #[test]
    fn test_zero_burst_disables_spike_guard() {
        let limiter = limiter_with(vec![rule("/api", 10, 0)], 60);
        let start = Instant::now();

        for _ in 0..10 {
            assert!(matches!(
                limiter.check_at("c", "/api", start),
                RateDecision::Allowed { .. }
            ));
        }
    }

    #[test]
    fn test_exempt_paths() {
        let limiter = limiter_with(vec![], 60);
        assert!(limiter.is_exempt("/health"));
        assert!(limiter.is_exempt("/metrics"));
        assert!(!limiter.is_exempt("/api"));
    }

    #[test]
    fn test_sweep_drops_idle_clients() {
        let limiter = limiter_with(vec![rule("/api", 10, 0)], 60);
        let start = Instant::now();

        limiter.check_at("stale", "/api", start);
        assert_eq!(limiter.tracked_clients(), 1);

        limiter.sweep_at(start + Duration::from_secs(120));
        assert_eq!(limiter.tracked_clients(), 0);
    }

    #[test]
    fn test_client_id_prefers_edge_header() {
        let mut headers = HeaderMap::new();
        headers.insert("cf-connecting-ip", HeaderValue::from_static("203.0.113.7"));
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("10.0.0.1, 10.0.0.2"),
        );
        assert_eq!(extract_client_id(&headers, None), "203.0.113.7");
    }

    #[test]
    fn test_client_id_takes_first_forwarded_entry() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("198.51.100.4, 10.0.0.2"),
        );
        assert_eq!(extract_client_id(&headers, None), "198.51.100.4");
    }

    #[test]
    fn test_client_id_falls_back_to_peer_then_unknown() {
        let headers = HeaderMap::new();
        let peer: SocketAddr = "192.0.2.9:55000".parse().unwrap();
        assert_eq!(extract_client_id(&headers, Some(peer)), "192.0.2.9");
        assert_eq!(extract_client_id(&headers, None), "unknown");
    }
}
