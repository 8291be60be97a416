//! Legacy-host redirects
//!
//! Requests arriving on a retired hostname get a permanent redirect to the
//! canonical host with path and query preserved, plus diagnostic headers and
//! a usage record so the migration team can see who still calls the old
//! URLs. The no-chain rule (a canonical host must never itself be a legacy
//! key) is enforced at configuration time, not here.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use axum::{
    extract::{Request, State},
    http::{header, HeaderName, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::info;

use super::handlers::AppState;
use super::models::RedirectUsageView;
use crate::config::RedirectRule;

pub const REDIRECT_FROM_HEADER: &str = "x-bgapp-redirect-from";
pub const REDIRECT_TO_HEADER: &str = "x-bgapp-redirect-to";

/// Permanent redirects are safe to cache hard: one year.
const REDIRECT_CACHE_CONTROL: &str = "public, max-age=31536000";

/// Immutable legacy-host → canonical-host table, keyed by normalized
/// hostname.
pub struct RedirectMap {
    mappings: HashMap<String, String>,
}

impl RedirectMap {
    pub fn new(rules: &[RedirectRule]) -> Self {
        Self {
            mappings: rules
                .iter()
                .map(|rule| {
                    (
                        rule.legacy_host.to_ascii_lowercase(),
                        rule.canonical_host.to_ascii_lowercase(),
                    )
                })
                .collect(),
        }
    }

    pub fn canonical_for(&self, host: &str) -> Option<&str> {
        self.mappings
            .get(&normalize_host(host))
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }
}

/// Lowercase and drop any port so `Host: Legacy.Example:8443` still matches
/// its rule.
pub fn normalize_host(host: &str) -> String {
    let host = host.trim();
    let bare = if let Some(rest) = host.strip_prefix('[') {
        // Bracketed IPv6 literal.
        rest.split(']').next().unwrap_or(rest)
    } else {
        match host.rsplit_once(':') {
            Some((name, port)) if port.chars().all(|c| c.is_ascii_digit()) => name,
            _ => host,
        }
    };
    bare.to_ascii_lowercase()
}

/// Per-(legacy host, path) call records for the migration dashboard.
#[derive(Debug, Clone)]
pub struct UsageRecord {
    pub count: u64,
    pub origins: HashSet<String>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

/// Best-effort in-memory telemetry; resets with the process like the rate
/// windows do.
#[derive(Default)]
pub struct UsageTracker {
    records: DashMap<(String, String), UsageRecord>,
}

impl UsageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, legacy_host: &str, path: &str, origin: Option<&str>) {
        let now = Utc::now();
        let mut entry = self
            .records
            .entry((legacy_host.to_string(), path.to_string()))
            .or_insert_with(|| UsageRecord {
                count: 0,
                origins: HashSet::new(),
                first_seen: now,
                last_seen: now,
            });
        entry.count += 1;
        entry.last_seen = now;
        if let Some(origin) = origin {
            entry.origins.insert(origin.to_string());
        }
    }

    /// Busiest legacy URLs first.
    pub fn report(&self) -> Vec<RedirectUsageView> {
        let mut report: Vec<RedirectUsageView> = self
            .records
            .iter()
            .map(|entry| {
                let (legacy_host, path) = entry.key();
                let record = entry.value();
                let mut origins: Vec<String> = record.origins.iter().cloned().collect();
                origins.sort();
                RedirectUsageView {
                    legacy_host: legacy_host.clone(),
                    path: path.clone(),
                    count: record.count,
                    origins,
                    first_seen: record.first_seen,
                    last_seen: record.last_seen,
                }
            })
            .collect();
        report.sort_by(|a, b| b.count.cmp(&a.count));
        report
    }

    pub fn tracked_urls(&self) -> usize {
        self.records.len()
    }
}

/// Redirect middleware: answers 301 for mapped legacy hosts before the
/// request reaches any handler; everything else passes through untouched.
pub async fn redirect_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let host = request
        .headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(normalize_host);
    let Some(host) = host else {
        return next.run(request).await;
    };
    let Some(canonical) = state.redirects.canonical_for(&host) else {
        return next.run(request).await;
    };

    let path_and_query = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let origin = request
        .headers()
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok());

    state.usage.record(&host, request.uri().path(), origin);
    state.metrics.incr_redirects();
    info!("🔀 Legacy host {} redirected to {}", host, canonical);

    let from_url = format!("https://{}{}", host, path_and_query);
    let to_url = format!("https://{}{}", canonical, path_and_query);

    let mut response = StatusCode::MOVED_PERMANENTLY.into_response();
    let headers = response.headers_mut();
    if let Ok(location) = HeaderValue::from_str(&to_url) {
        headers.insert(header::LOCATION, location.clone());
        headers.insert(HeaderName::from_static(REDIRECT_TO_HEADER), location);
    }
    if let Ok(from) = HeaderValue::from_str(&from_url) {
        headers.insert(HeaderName::from_static(REDIRECT_FROM_HEADER), from);
    }
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static(REDIRECT_CACHE_CONTROL),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_redirects;

    #[test]
    fn test_legacy_hosts_map_to_canonical() {
        let map = RedirectMap::new(&default_redirects());
        assert_eq!(
            map.canonical_for("bgapp-api.majearcasa.workers.dev"),
            Some("api.bgapp.majearcasa.com")
        );
        assert_eq!(
            map.canonical_for("bgapp-stac.majearcasa.workers.dev"),
            Some("stac.bgapp.majearcasa.com")
        );
    }

    #[test]
    fn test_canonical_and_unknown_hosts_do_not_map() {
        let map = RedirectMap::new(&default_redirects());
        assert_eq!(map.canonical_for("api.bgapp.majearcasa.com"), None);
        assert_eq!(map.canonical_for("example.com"), None);
    }

    #[test]
    fn test_host_lookup_ignores_case_and_port() {
        let map = RedirectMap::new(&default_redirects());
        assert!(map
            .canonical_for("BGAPP-API.majearcasa.workers.dev:8443")
            .is_some());
    }

    #[test]
    fn test_normalize_host() {
        assert_eq!(normalize_host("Example.COM"), "example.com");
        assert_eq!(normalize_host("example.com:8080"), "example.com");
        assert_eq!(normalize_host("[::1]:8080"), "::1");
        assert_eq!(normalize_host(" example.com "), "example.com");
    }

    #[test]
    fn test_usage_tracker_accumulates_per_url() {
        let tracker = UsageTracker::new();
        tracker.record("old.example.com", "/api/data", Some("https://a.example"));
        tracker.record("old.example.com", "/api/data", Some("https://b.example"));
        tracker.record("old.example.com", "/other", None);

        let report = tracker.report();
        assert_eq!(report.len(), 2);

        let busiest = &report[0];
        assert_eq!(busiest.legacy_host, "old.example.com");
        assert_eq!(busiest.path, "/api/data");
        assert_eq!(busiest.count, 2);
        assert_eq!(busiest.origins.len(), 2);
        assert!(busiest.first_seen <= busiest.last_seen);
    }

    #[test]
    fn test_usage_report_sorted_by_count() {
        let tracker = UsageTracker::new();
        tracker.record("old.example.com", "/rare", None);
        for _ in 0..3 {
            tracker.record("old.example.com", "/hot", None);
        }

        let report = tracker.report();
        assert_eq!(report[0].path, "/hot");
        assert_eq!(report[0].count, 3);
        assert_eq!(report[1].path, "/rare");
    }
}
