//! Origin validation and CORS/security header construction
//!
//! The whitelist is environment-scoped: exact origins are matched against the
//! raw `Origin` header, wildcard entries (`*.domain`) are matched against the
//! parsed hostname, and unmatched origins are denied — except in development,
//! where they fall through to allowed with a warning so local frontends on
//! unlisted ports keep working. Denied origins never see an
//! `Access-Control-Allow-Origin` header; `*` is never emitted.

use std::{
    collections::HashSet,
    sync::{Arc, RwLock},
};

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{debug, warn};
use url::Url;

use super::cache::{BoundedCache, CacheStats};
use super::handlers::AppState;
use crate::config::{CorsRules, Environment, FrameOptions};

/// Methods the gateway accepts cross-origin. Explicit list, never `*`.
pub const ALLOWED_METHODS: &str = "GET, POST, PUT, PATCH, DELETE, OPTIONS, HEAD";

/// Request headers the dashboards are allowed to send. Explicit list, never `*`.
pub const ALLOWED_HEADERS: &str =
    "Authorization, Content-Type, Accept, X-Requested-With, X-Request-ID, X-API-Key";

/// Response headers exposed to browser scripts.
pub const EXPOSED_HEADERS: &str =
    "X-Request-ID, X-RateLimit-Limit, X-RateLimit-Remaining, X-RateLimit-Reset";

/// Preflight cache lifetime: one day, to keep OPTIONS volume down.
pub const MAX_AGE_SECS: u64 = 86_400;

const ORIGIN_CACHE_CAPACITY: usize = 128;

/// Outcome of validating one `Origin` header value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OriginDecision {
    /// Exact or wildcard whitelist hit; echo the origin back.
    Allowed,
    /// Development-only fallback for an unlisted origin.
    DevFallback,
    /// Not whitelisted; the response carries no `Access-Control-Allow-Origin`.
    Denied,
}

impl OriginDecision {
    pub fn is_allowed(self) -> bool {
        !matches!(self, OriginDecision::Denied)
    }
}

/// Whitelist in matchable form: exact origins plus lowercased `.domain`
/// suffixes derived from the wildcard patterns.
#[derive(Debug, Default)]
struct CompiledWhitelist {
    exact: HashSet<String>,
    wildcard_suffixes: Vec<String>,
}

impl CompiledWhitelist {
    fn compile(rules: &CorsRules) -> Self {
        Self {
            exact: rules.allowed_origins.iter().cloned().collect(),
            wildcard_suffixes: rules
                .wildcard_origins
                .iter()
                .filter_map(|p| p.strip_prefix("*."))
                .map(|domain| format!(".{}", domain.to_ascii_lowercase()))
                .collect(),
        }
    }

    fn matches(&self, origin: &str) -> bool {
        if self.exact.contains(origin) {
            return true;
        }
        if self.wildcard_suffixes.is_empty() {
            return false;
        }
        // Wildcards match the parsed hostname, not the raw string, so
        // `https://example.com.evil.net` can never satisfy `*.example.com`
        // and both http and https forms of a subdomain are covered.
        let Ok(url) = Url::parse(origin) else {
            return false;
        };
        if url.scheme() != "http" && url.scheme() != "https" {
            return false;
        }
        let Some(host) = url.host_str() else {
            return false;
        };
        self.wildcard_suffixes
            .iter()
            .any(|suffix| host.ends_with(suffix.as_str()))
    }
}

/// Environment-scoped origin validator with a bounded decision cache.
///
/// The whitelist is immutable at request time; `add_origin`/`remove_origin`
/// are the only mutation points and both invalidate the cache under the same
/// lock, so a stale decision can never be inserted after a mutation.
pub struct OriginValidator {
    environment: Environment,
    whitelist: RwLock<CompiledWhitelist>,
    cache: BoundedCache<String, OriginDecision>,
}

impl OriginValidator {
    pub fn new(environment: Environment, rules: &CorsRules) -> Self {
        Self {
            environment,
            whitelist: RwLock::new(CompiledWhitelist::compile(rules)),
            cache: BoundedCache::new(ORIGIN_CACHE_CAPACITY),
        }
    }

    pub fn environment(&self) -> Environment {
        self.environment
    }

    /// Validate an `Origin` header value. Absent or empty origins are denied
    /// outright (non-browser callers get no CORS decoration, and the
    /// development fallback applies only to origins that are present).
    pub fn decide(&self, origin: Option<&str>) -> OriginDecision {
        let origin = match origin {
            Some(o) if !o.is_empty() => o,
            _ => return OriginDecision::Denied,
        };

        if let Some(cached) = self.cache.get(&origin.to_string()) {
            return cached;
        }

        let Ok(whitelist) = self.whitelist.read() else {
            return OriginDecision::Denied;
        };

        let decision = if whitelist.matches(origin) {
            OriginDecision::Allowed
        } else if self.environment.is_development() {
            warn!(
                "⚠️  Origin '{}' not whitelisted; allowing as development fallback",
                origin
            );
            OriginDecision::DevFallback
        } else {
            debug!("Origin '{}' denied in {}", origin, self.environment);
            OriginDecision::Denied
        };

        // Insert while still holding the whitelist read lock; mutations take
        // the write lock before clearing, so this can never race a clear.
        self.cache.put(origin.to_string(), decision);
        decision
    }

    /// Boolean shorthand over [`OriginValidator::decide`].
    pub fn is_allowed(&self, origin: &str) -> bool {
        self.decide(Some(origin)).is_allowed()
    }

    /// Admin operation: whitelist an origin (`*.domain` adds a wildcard).
    /// Clears the decision cache.
    pub fn add_origin(&self, origin: &str) {
        if let Ok(mut whitelist) = self.whitelist.write() {
            if let Some(domain) = origin.strip_prefix("*.") {
                let suffix = format!(".{}", domain.to_ascii_lowercase());
                if !whitelist.wildcard_suffixes.contains(&suffix) {
                    whitelist.wildcard_suffixes.push(suffix);
                }
            } else {
                whitelist.exact.insert(origin.to_string());
            }
            self.cache.clear();
        }
    }

    /// Admin operation: remove an origin or `*.domain` wildcard. Clears the
    /// decision cache.
    pub fn remove_origin(&self, origin: &str) {
        if let Ok(mut whitelist) = self.whitelist.write() {
            if let Some(domain) = origin.strip_prefix("*.") {
                let suffix = format!(".{}", domain.to_ascii_lowercase());
                whitelist.wildcard_suffixes.retain(|s| s != &suffix);
            } else {
                whitelist.exact.remove(origin);
            }
            self.cache.clear();
        }
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }
}

/// Builds the response header set: CORS headers according to the validation
/// decision, plus the unconditional security headers.
pub struct CorsPolicy {
    frame_options: FrameOptions,
    csp: String,
}

impl CorsPolicy {
    pub fn new(environment: Environment, frame_options: FrameOptions) -> Self {
        Self {
            frame_options,
            csp: content_security_policy(environment, frame_options),
        }
    }

    /// Decorate a response. Security headers always; CORS headers only when
    /// the origin was allowed. Credentials are only ever sent alongside an
    /// explicit echoed origin (credentialed CORS forbids wildcards).
    pub fn apply(&self, headers: &mut HeaderMap, decision: OriginDecision, origin: Option<&str>) {
        headers.insert(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        );
        headers.insert(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static(self.frame_options.as_header_value()),
        );
        headers.insert(
            header::REFERRER_POLICY,
            HeaderValue::from_static("strict-origin-when-cross-origin"),
        );
        if let Ok(csp) = HeaderValue::from_str(&self.csp) {
            headers.insert(header::CONTENT_SECURITY_POLICY, csp);
        }

        if let Some(origin) = origin {
            // The answer depends on the caller's origin either way.
            headers.insert(header::VARY, HeaderValue::from_static("Origin"));

            if decision.is_allowed() {
                if let Ok(value) = HeaderValue::from_str(origin) {
                    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, value);
                    headers.insert(
                        header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
                        HeaderValue::from_static("true"),
                    );
                    headers.insert(
                        header::ACCESS_CONTROL_ALLOW_METHODS,
                        HeaderValue::from_static(ALLOWED_METHODS),
                    );
                    headers.insert(
                        header::ACCESS_CONTROL_ALLOW_HEADERS,
                        HeaderValue::from_static(ALLOWED_HEADERS),
                    );
                    headers.insert(
                        header::ACCESS_CONTROL_EXPOSE_HEADERS,
                        HeaderValue::from_static(EXPOSED_HEADERS),
                    );
                    headers.insert(
                        header::ACCESS_CONTROL_MAX_AGE,
                        HeaderValue::from_static("86400"),
                    );
                }
            }
        }
    }
}

fn content_security_policy(environment: Environment, frame_options: FrameOptions) -> String {
    match environment {
        // Permissive profile: the development dashboards embed iframes and
        // call sibling workers from arbitrary local ports.
        Environment::Development => "default-src 'self' http://localhost:* http://127.0.0.1:*; \
             img-src * data: blob:; style-src * 'unsafe-inline'; \
             script-src * 'unsafe-inline' 'unsafe-eval'; connect-src *; \
             frame-src *; frame-ancestors *"
            .to_string(),
        Environment::Staging | Environment::Production => {
            let frame_ancestors = match frame_options {
                FrameOptions::Deny => "'none'",
                FrameOptions::SameOrigin => "'self'",
            };
            format!(
                "default-src 'self'; img-src 'self' data:; \
                 style-src 'self' 'unsafe-inline'; script-src 'self'; \
                 connect-src 'self' https://*.bgapp.ao https://*.majearcasa.com; \
                 frame-ancestors {}",
                frame_ancestors
            )
        }
    }
}

/// CORS middleware: answers preflights with 204 before any routing, validates
/// the origin for everything else, and decorates every outgoing response —
/// including 429/301/404/503 short-circuits from the inner layers.
pub async fn cors_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    state.metrics.incr_requests();

    let origin = request
        .headers()
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());

    let decision = state.validator.decide(origin.as_deref());
    match decision {
        OriginDecision::Denied if origin.is_some() => state.metrics.incr_origins_denied(),
        OriginDecision::DevFallback => state.metrics.incr_dev_fallbacks(),
        _ => {}
    }

    // Preflights are answered here: no routing, no rate accounting, no
    // upstream call, empty body.
    if request.method() == Method::OPTIONS {
        state.metrics.incr_preflights();
        let mut response = StatusCode::NO_CONTENT.into_response();
        state
            .policy
            .apply(response.headers_mut(), decision, origin.as_deref());
        return response;
    }

    let mut response = next.run(request).await;
    state
        .policy
        .apply(response.headers_mut(), decision, origin.as_deref());
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    fn production_validator() -> OriginValidator {
        OriginValidator::new(
            Environment::Production,
            &CorsRules::for_environment(Environment::Production),
        )
    }

    #[test]
    fn test_whitelisted_origins_are_allowed() {
        let validator = production_validator();
        for origin in CorsRules::for_environment(Environment::Production).allowed_origins {
            assert!(validator.is_allowed(&origin), "{} must be allowed", origin);
        }
    }

    #[test]
    fn test_unlisted_origin_denied_outside_development() {
        for env in [Environment::Production, Environment::Staging] {
            let validator = OriginValidator::new(env, &CorsRules::for_environment(env));
            assert_eq!(
                validator.decide(Some("https://evil.example.net")),
                OriginDecision::Denied
            );
        }
    }

    #[test]
    fn test_wildcard_matches_subdomains_of_both_schemes() {
        let rules = CorsRules {
            allowed_origins: vec![],
            wildcard_origins: vec!["*.example.com".to_string()],
        };
        let validator = OriginValidator::new(Environment::Production, &rules);

        assert!(validator.is_allowed("https://sub.example.com"));
        assert!(validator.is_allowed("http://sub.example.com"));
        assert!(validator.is_allowed("https://deep.sub.example.com"));
    }

    #[test]
    fn test_wildcard_rejects_lookalike_hosts() {
        let rules = CorsRules {
            allowed_origins: vec![],
            wildcard_origins: vec!["*.example.com".to_string()],
        };
        let validator = OriginValidator::new(Environment::Production, &rules);

        assert!(!validator.is_allowed("https://example.com.evil.net"));
        assert!(!validator.is_allowed("https://notexample.com"));
        // The apex is not a subdomain; list it exactly if wanted.
        assert!(!validator.is_allowed("https://example.com"));
    }

    #[test]
    fn test_development_fallback_allows_unlisted_origin() {
        let validator = OriginValidator::new(
            Environment::Development,
            &CorsRules::for_environment(Environment::Development),
        );
        assert_eq!(
            validator.decide(Some("http://localhost:5173")),
            OriginDecision::DevFallback
        );
    }

    #[test]
    fn test_absent_origin_is_denied_even_in_development() {
        let validator = OriginValidator::new(
            Environment::Development,
            &CorsRules::for_environment(Environment::Development),
        );
        assert_eq!(validator.decide(None), OriginDecision::Denied);
        assert_eq!(validator.decide(Some("")), OriginDecision::Denied);
    }

    #[test]
    fn test_decisions_are_cached() {
        let validator = production_validator();
        validator.is_allowed("https://bgapp.ao");
        validator.is_allowed("https://bgapp.ao");

        let stats = validator.cache_stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn test_whitelist_mutation_invalidates_cache() {
        let validator = production_validator();
        assert!(!validator.is_allowed("https://new.partner.org"));

        validator.add_origin("https://new.partner.org");
        assert!(validator.is_allowed("https://new.partner.org"));

        validator.remove_origin("https://new.partner.org");
        assert!(!validator.is_allowed("https://new.partner.org"));
    }

    #[test]
    fn test_wildcard_mutation_invalidates_cache() {
        let validator = production_validator();
        assert!(!validator.is_allowed("https://viewer.ocean-partners.org"));

        validator.add_origin("*.ocean-partners.org");
        assert!(validator.is_allowed("https://viewer.ocean-partners.org"));
    }

    #[test]
    fn test_allowed_origin_gets_full_cors_headers() {
        let policy = CorsPolicy::new(Environment::Production, FrameOptions::Deny);
        let mut headers = HeaderMap::new();

        policy.apply(
            &mut headers,
            OriginDecision::Allowed,
            Some("https://bgapp.ao"),
        );

        assert_eq!(
            headers.get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
            "https://bgapp.ao"
        );
        assert_eq!(
            headers
                .get(header::ACCESS_CONTROL_ALLOW_CREDENTIALS)
                .unwrap(),
            "true"
        );
        assert_eq!(headers.get(header::ACCESS_CONTROL_MAX_AGE).unwrap(), "86400");
        assert_eq!(headers.get(header::VARY).unwrap(), "Origin");
    }

    #[test]
    fn test_denied_origin_gets_security_headers_only() {
        let policy = CorsPolicy::new(Environment::Production, FrameOptions::Deny);
        let mut headers = HeaderMap::new();

        policy.apply(
            &mut headers,
            OriginDecision::Denied,
            Some("https://evil.example.net"),
        );

        assert!(headers.get(header::ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
        assert!(headers
            .get(header::ACCESS_CONTROL_ALLOW_CREDENTIALS)
            .is_none());
        assert_eq!(headers.get(header::X_CONTENT_TYPE_OPTIONS).unwrap(), "nosniff");
        assert_eq!(headers.get(header::X_FRAME_OPTIONS).unwrap(), "DENY");
        assert!(headers.get(header::CONTENT_SECURITY_POLICY).is_some());
    }

    #[test]
    fn test_csp_profile_differs_by_environment() {
        let strict = CorsPolicy::new(Environment::Production, FrameOptions::Deny);
        let permissive = CorsPolicy::new(Environment::Development, FrameOptions::Deny);

        assert!(strict.csp.contains("frame-ancestors 'none'"));
        assert!(permissive.csp.contains("frame-ancestors *"));
        assert_ne!(strict.csp, permissive.csp);
    }

    #[test]
    fn test_same_origin_frame_option_relaxes_frame_ancestors() {
        let policy = CorsPolicy::new(Environment::Production, FrameOptions::SameOrigin);
        assert!(policy.csp.contains("frame-ancestors 'self'"));

        let mut headers = HeaderMap::new();
        policy.apply(&mut headers, OriginDecision::Denied, None);
        assert_eq!(headers.get(header::X_FRAME_OPTIONS).unwrap(), "SAMEORIGIN");
    }
}
