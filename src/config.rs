//! Gateway configuration with validation and per-environment defaults
//!
//! All policy tables (origin whitelists, rate-limit rules, legacy-host
//! redirects, proxy routes) are plain data defined here and injected into the
//! components at construction time. Nothing in the request path reads process
//! environment variables or mutates this configuration.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::net::IpAddr;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

/// Deployment environment the gateway serves.
///
/// The environment decides the origin whitelist, the CSP profile, and whether
/// unmatched origins fall back to allowed (development only).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Production,
    Staging,
    Development,
}

impl Environment {
    pub fn is_development(self) -> bool {
        matches!(self, Environment::Development)
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Environment::Production => write!(f, "production"),
            Environment::Staging => write!(f, "staging"),
            Environment::Development => write!(f, "development"),
        }
    }
}

impl FromStr for Environment {
    type Err = ConfigValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "production" => Ok(Environment::Production),
            "staging" => Ok(Environment::Staging),
            "development" => Ok(Environment::Development),
            other => Err(ConfigValidationError::InvalidValue(format!(
                "unknown environment '{}' (expected production, staging or development)",
                other
            ))),
        }
    }
}

/// Value emitted in the `X-Frame-Options` header.
///
/// Deployments that intentionally serve iframe-embedded dashboards use
/// `SameOrigin`; everything else should keep the `Deny` default.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameOptions {
    Deny,
    SameOrigin,
}

impl FrameOptions {
    pub fn as_header_value(self) -> &'static str {
        match self {
            FrameOptions::Deny => "DENY",
            FrameOptions::SameOrigin => "SAMEORIGIN",
        }
    }
}

/// Complete gateway configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub environment: Environment,
    pub server: ServerConfig,
    pub cors: CorsRules,
    pub rate_limit: RateLimitConfig,
    pub redirects: Vec<RedirectRule>,
    pub proxy: ProxyConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self::for_environment(Environment::Development)
    }
}

/// HTTP listener settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub request_timeout_secs: u64,
    pub frame_options: FrameOptions,
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8787,
            request_timeout_secs: 30,
            frame_options: FrameOptions::Deny,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Origin whitelist for one environment.
///
/// `allowed_origins` are matched exactly against the raw `Origin` header;
/// `wildcard_origins` hold `*.domain` patterns matched against the parsed
/// hostname of the origin.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsRules {
    pub allowed_origins: Vec<String>,
    pub wildcard_origins: Vec<String>,
}

impl CorsRules {
    /// Whitelist shipped for each environment.
    pub fn for_environment(environment: Environment) -> Self {
        match environment {
            Environment::Development => Self {
                allowed_origins: vec![
                    "http://localhost:3000".to_string(),
                    "http://localhost:8085".to_string(),
                    "http://127.0.0.1:3000".to_string(),
                    "http://127.0.0.1:8085".to_string(),
                ],
                wildcard_origins: vec![],
            },
            Environment::Staging => Self {
                allowed_origins: vec![
                    "https://staging.bgapp.ao".to_string(),
                    "https://test.bgapp.ao".to_string(),
                ],
                wildcard_origins: vec![],
            },
            Environment::Production => Self {
                allowed_origins: vec![
                    "https://bgapp.ao".to_string(),
                    "https://www.bgapp.ao".to_string(),
                    "https://arcasadeveloping.org".to_string(),
                    "https://bgapp-admin.pages.dev".to_string(),
                    "https://bgapp.majearcasa.com".to_string(),
                    "https://admin.bgapp.majearcasa.com".to_string(),
                ],
                wildcard_origins: vec!["*.majearcasa.com".to_string()],
            },
        }
    }
}

/// One path-prefix rate-limit tier.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RateRule {
    pub prefix: String,
    pub requests_per_minute: u32,
    /// Spike guard: more than this many requests inside one second are
    /// rejected even when the minute budget has room. 0 disables the guard.
    pub burst: u32,
}

/// Rate limiter settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Prefix tiers; matching picks the longest prefix, so order here does
    /// not matter. The limiter sorts at startup.
    pub rules: Vec<RateRule>,
    pub default_requests_per_minute: u32,
    pub default_burst: u32,
    /// Paths that bypass the limiter entirely.
    pub exempt_paths: Vec<String>,
    /// Idle client windows are swept on this interval.
    pub sweep_interval_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            rules: vec![
                RateRule {
                    prefix: "/admin-api".to_string(),
                    requests_per_minute: 300,
                    burst: 50,
                },
                RateRule {
                    prefix: "/collections".to_string(),
                    requests_per_minute: 120,
                    burst: 30,
                },
                RateRule {
                    prefix: "/api".to_string(),
                    requests_per_minute: 60,
                    burst: 20,
                },
                RateRule {
                    prefix: "/ml".to_string(),
                    requests_per_minute: 10,
                    burst: 5,
                },
                RateRule {
                    prefix: "/export".to_string(),
                    requests_per_minute: 5,
                    burst: 2,
                },
            ],
            default_requests_per_minute: 60,
            default_burst: 20,
            exempt_paths: vec!["/health".to_string(), "/metrics".to_string()],
            sweep_interval_secs: 300,
        }
    }
}

/// One legacy-host to canonical-host mapping.
///
/// Hostnames are bare (no scheme, no path). Canonical hosts must never appear
/// as legacy keys; `GatewayConfig::validate` rejects chains.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RedirectRule {
    pub legacy_host: String,
    pub canonical_host: String,
}

pub fn default_redirects() -> Vec<RedirectRule> {
    vec![
        RedirectRule {
            legacy_host: "bgapp-api.majearcasa.workers.dev".to_string(),
            canonical_host: "api.bgapp.majearcasa.com".to_string(),
        },
        RedirectRule {
            legacy_host: "bgapp-stac.majearcasa.workers.dev".to_string(),
            canonical_host: "stac.bgapp.majearcasa.com".to_string(),
        },
        RedirectRule {
            legacy_host: "bgapp-geoapi.majearcasa.workers.dev".to_string(),
            canonical_host: "geoapi.bgapp.majearcasa.com".to_string(),
        },
        RedirectRule {
            legacy_host: "bgapp-auth.majearcasa.workers.dev".to_string(),
            canonical_host: "auth.bgapp.majearcasa.com".to_string(),
        },
    ]
}

/// One path-prefix to upstream base URL route.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProxyRoute {
    pub prefix: String,
    pub upstream: String,
}

/// Reverse-proxy settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Prefix routes; matching picks the longest prefix.
    pub routes: Vec<ProxyRoute>,
    /// Bound on every upstream fetch. On timeout the request fails over to
    /// the 503 path, never retried in-gateway.
    pub upstream_timeout_secs: u64,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            routes: vec![
                ProxyRoute {
                    prefix: "/api".to_string(),
                    upstream: "http://localhost:8000".to_string(),
                },
                ProxyRoute {
                    prefix: "/geoapi".to_string(),
                    upstream: "http://localhost:5080".to_string(),
                },
                ProxyRoute {
                    prefix: "/auth".to_string(),
                    upstream: "http://localhost:8083".to_string(),
                },
            ],
            upstream_timeout_secs: 10,
        }
    }
}

impl GatewayConfig {
    /// Build the stock configuration for an environment: its origin
    /// whitelist, the shared rate tiers and redirect table, and the upstream
    /// addresses used by that deployment shape.
    pub fn for_environment(environment: Environment) -> Self {
        let proxy = match environment {
            Environment::Development => ProxyConfig::default(),
            Environment::Staging | Environment::Production => ProxyConfig {
                routes: vec![
                    ProxyRoute {
                        prefix: "/api".to_string(),
                        upstream: "http://admin-api:8000".to_string(),
                    },
                    ProxyRoute {
                        prefix: "/geoapi".to_string(),
                        upstream: "http://pygeoapi:80".to_string(),
                    },
                    ProxyRoute {
                        prefix: "/auth".to_string(),
                        upstream: "http://keycloak:8080".to_string(),
                    },
                ],
                upstream_timeout_secs: 10,
            },
        };

        Self {
            environment,
            server: ServerConfig::default(),
            cors: CorsRules::for_environment(environment),
            rate_limit: RateLimitConfig::default(),
            redirects: default_redirects(),
            proxy,
        }
    }

    /// Parse a TOML document. Missing sections fall back to the development
    /// defaults; callers wanting another environment's whitelist set
    /// `environment` and `[cors]` explicitly or start from
    /// [`GatewayConfig::for_environment`].
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigValidationError> {
        toml::from_str(raw)
            .map_err(|e| ConfigValidationError::LoadFailed(format!("invalid TOML: {}", e)))
    }

    /// Read and parse a TOML config file.
    pub fn load(path: &Path) -> Result<Self, ConfigValidationError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ConfigValidationError::LoadFailed(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&raw)
    }

    /// Validate tables for internal consistency. Runs once at startup (and in
    /// the `check-config` tool); request handling assumes a validated config.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        self.server
            .host
            .parse::<IpAddr>()
            .map_err(|_| {
                ConfigValidationError::InvalidValue(format!(
                    "server.host '{}' is not an IP address",
                    self.server.host
                ))
            })
            .map(|_| ())?;

        if self.server.request_timeout_secs == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "server.request_timeout_secs must be > 0".to_string(),
            ));
        }

        for origin in &self.cors.allowed_origins {
            let url = Url::parse(origin).map_err(|_| {
                ConfigValidationError::InvalidValue(format!(
                    "allowed origin '{}' is not an absolute URL",
                    origin
                ))
            })?;
            if url.scheme() != "http" && url.scheme() != "https" {
                return Err(ConfigValidationError::InvalidValue(format!(
                    "allowed origin '{}' must use http or https",
                    origin
                )));
            }
            if url.host_str().is_none() {
                return Err(ConfigValidationError::InvalidValue(format!(
                    "allowed origin '{}' has no host",
                    origin
                )));
            }
            if url.path() != "/" || origin.ends_with('/') {
                return Err(ConfigValidationError::InvalidValue(format!(
                    "allowed origin '{}' must not carry a path",
                    origin
                )));
            }
        }

        for pattern in &self.cors.wildcard_origins {
            let domain = pattern.strip_prefix("*.").ok_or_else(|| {
                ConfigValidationError::InvalidValue(format!(
                    "wildcard origin '{}' must start with '*.'",
                    pattern
                ))
            })?;
            if domain.is_empty()
                || domain.contains('/')
                || domain.contains(':')
                || domain.contains('*')
                || domain.starts_with('.')
            {
                return Err(ConfigValidationError::InvalidValue(format!(
                    "wildcard origin '{}' must be '*.' followed by a bare domain",
                    pattern
                )));
            }
        }

        if self.rate_limit.default_requests_per_minute == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "rate_limit.default_requests_per_minute must be > 0".to_string(),
            ));
        }
        for rule in &self.rate_limit.rules {
            if !rule.prefix.starts_with('/') {
                return Err(ConfigValidationError::InvalidValue(format!(
                    "rate rule prefix '{}' must start with '/'",
                    rule.prefix
                )));
            }
            if rule.requests_per_minute == 0 {
                return Err(ConfigValidationError::InvalidValue(format!(
                    "rate rule '{}' must allow at least 1 request per minute",
                    rule.prefix
                )));
            }
        }
        for path in &self.rate_limit.exempt_paths {
            if !path.starts_with('/') {
                return Err(ConfigValidationError::InvalidValue(format!(
                    "exempt path '{}' must start with '/'",
                    path
                )));
            }
        }

        self.validate_redirects()?;

        if self.proxy.upstream_timeout_secs == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "proxy.upstream_timeout_secs must be > 0".to_string(),
            ));
        }
        for route in &self.proxy.routes {
            if !route.prefix.starts_with('/') {
                return Err(ConfigValidationError::InvalidValue(format!(
                    "proxy route prefix '{}' must start with '/'",
                    route.prefix
                )));
            }
            let url = Url::parse(&route.upstream).map_err(|_| {
                ConfigValidationError::InvalidValue(format!(
                    "proxy upstream '{}' is not an absolute URL",
                    route.upstream
                ))
            })?;
            if url.scheme() != "http" && url.scheme() != "https" {
                return Err(ConfigValidationError::InvalidValue(format!(
                    "proxy upstream '{}' must use http or https",
                    route.upstream
                )));
            }
        }

        Ok(())
    }

    /// Redirect-table invariants: bare hostnames, unique legacy keys, no
    /// self-mapping, and no canonical host doubling as a legacy key (a chain
    /// would make browsers hop twice and cache both hops for a year).
    fn validate_redirects(&self) -> Result<(), ConfigValidationError> {
        let mut legacy_keys: HashSet<&str> = HashSet::new();

        for rule in &self.redirects {
            for host in [rule.legacy_host.as_str(), rule.canonical_host.as_str()] {
                if host.is_empty() || host.contains('/') || host.contains("://") {
                    return Err(ConfigValidationError::InvalidValue(format!(
                        "redirect host '{}' must be a bare hostname",
                        host
                    )));
                }
            }
            if rule.legacy_host == rule.canonical_host {
                return Err(ConfigValidationError::LogicalInconsistency(format!(
                    "redirect for '{}' maps the host to itself",
                    rule.legacy_host
                )));
            }
            if !legacy_keys.insert(rule.legacy_host.as_str()) {
                return Err(ConfigValidationError::LogicalInconsistency(format!(
                    "legacy host '{}' is mapped more than once",
                    rule.legacy_host
                )));
            }
        }

        for rule in &self.redirects {
            if legacy_keys.contains(rule.canonical_host.as_str()) {
                return Err(ConfigValidationError::LogicalInconsistency(format!(
                    "redirect chain: canonical host '{}' is itself a legacy key",
                    rule.canonical_host
                )));
            }
        }

        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.proxy.upstream_timeout_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.rate_limit.sweep_interval_secs)
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    #[error("Configuration logical inconsistency: {0}")]
    LogicalInconsistency(String),

    #[error("Configuration load failed: {0}")]
    LoadFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_configs_are_valid() {
        for env in [
            Environment::Production,
            Environment::Staging,
            Environment::Development,
        ] {
            let config = GatewayConfig::for_environment(env);
            assert!(config.validate().is_ok(), "{} defaults must validate", env);
        }
    }

    #[test]
    fn test_environment_parsing() {
        assert_eq!(
            "production".parse::<Environment>().unwrap(),
            Environment::Production
        );
        assert_eq!(
            " Staging ".parse::<Environment>().unwrap(),
            Environment::Staging
        );
        assert!("prod".parse::<Environment>().is_err());
    }

    #[test]
    fn test_redirect_chain_is_rejected() {
        let mut config = GatewayConfig::default();
        config.redirects = vec![
            RedirectRule {
                legacy_host: "old.bgapp.ao".to_string(),
                canonical_host: "mid.bgapp.ao".to_string(),
            },
            RedirectRule {
                legacy_host: "mid.bgapp.ao".to_string(),
                canonical_host: "new.bgapp.ao".to_string(),
            },
        ];
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            ConfigValidationError::LogicalInconsistency(_)
        ));
    }

    #[test]
    fn test_duplicate_legacy_host_is_rejected() {
        let mut config = GatewayConfig::default();
        config.redirects = vec![
            RedirectRule {
                legacy_host: "old.bgapp.ao".to_string(),
                canonical_host: "a.bgapp.ao".to_string(),
            },
            RedirectRule {
                legacy_host: "old.bgapp.ao".to_string(),
                canonical_host: "b.bgapp.ao".to_string(),
            },
        ];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_self_redirect_is_rejected() {
        let mut config = GatewayConfig::default();
        config.redirects = vec![RedirectRule {
            legacy_host: "same.bgapp.ao".to_string(),
            canonical_host: "same.bgapp.ao".to_string(),
        }];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_wildcard_patterns_are_rejected() {
        for pattern in ["majearcasa.com", "*.", "*.bad/domain", "*.*.com", "*.a:1"] {
            let mut config = GatewayConfig::default();
            config.cors.wildcard_origins = vec![pattern.to_string()];
            assert!(
                config.validate().is_err(),
                "pattern '{}' must be rejected",
                pattern
            );
        }
    }

    #[test]
    fn test_origin_with_path_is_rejected() {
        let mut config = GatewayConfig::default();
        config.cors.allowed_origins = vec!["https://bgapp.ao/dashboard".to_string()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_rate_limit_is_rejected() {
        let mut config = GatewayConfig::default();
        config.rate_limit.rules[0].requests_per_minute = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = GatewayConfig::from_toml_str(
            r#"
            environment = "staging"

            [server]
            port = 9000
            "#,
        )
        .unwrap();

        assert_eq!(config.environment, Environment::Staging);
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert!(!config.rate_limit.rules.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_toml_reports_load_error() {
        let err = GatewayConfig::from_toml_str("environment = 42").unwrap_err();
        assert!(matches!(err, ConfigValidationError::LoadFailed(_)));
    }
}
