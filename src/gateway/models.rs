//! Gateway response models
//!
//! Every body the gateway authors itself follows the `{success, data?,
//! error?, message?, timestamp}` envelope the BGAPP dashboards expect.
//! STAC documents and proxied upstream bodies are passed through as-is.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Standard response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T = serde_json::Value> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl<T: Serialize> Envelope<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            message: None,
            timestamp: Utc::now(),
        }
    }
}

impl Envelope<serde_json::Value> {
    pub fn error(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            message: Some(message.into()),
            timestamp: Utc::now(),
        }
    }

    /// Error envelope carrying extra context (e.g. the available endpoints
    /// on a 404).
    pub fn error_with_data(
        error: impl Into<String>,
        message: impl Into<String>,
        data: serde_json::Value,
    ) -> Self {
        Self {
            data: Some(data),
            ..Self::error(error, message)
        }
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub timestamp: DateTime<Utc>,
}

/// One platform service as reported by the service-status mock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub name: String,
    pub status: String,
    pub port: u16,
    pub url: String,
    pub response_time: f64,
    pub last_check: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServicesSummary {
    pub total: usize,
    pub online: usize,
    pub offline: usize,
    pub health_percentage: f64,
}

/// Payload of `GET /services`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServicesData {
    pub services: Vec<ServiceInfo>,
    pub summary: ServicesSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemMetrics {
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub disk_percent: f64,
    pub uptime_seconds: u64,
}

/// Payload of the `GET /metrics` dashboard mock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MockMetricsData {
    pub system: SystemMetrics,
    pub services: ServicesSummary,
}

/// One tracked client window in the rate-limit admin snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientWindowView {
    pub client: String,
    pub requests_in_window: usize,
}

/// Payload of `GET /admin-api/gateway/rate-limits`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitSnapshot {
    pub rules: Vec<crate::config::RateRule>,
    pub default_requests_per_minute: u32,
    pub default_burst: u32,
    pub tracked_clients: usize,
    pub windows: Vec<ClientWindowView>,
}

/// One redirect usage record in the migration telemetry report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedirectUsageView {
    pub legacy_host: String,
    pub path: String,
    pub count: u64,
    pub origins: Vec<String>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_envelope_omits_error_fields() {
        let envelope = Envelope::ok(serde_json::json!({"value": 1}));
        let body = serde_json::to_value(&envelope).unwrap();

        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["value"], 1);
        assert!(body.get("error").is_none());
        assert!(body.get("message").is_none());
        assert!(body["timestamp"].is_string());
    }

    #[test]
    fn test_error_envelope_omits_data() {
        let envelope = Envelope::error("Not found", "No such endpoint");
        let body = serde_json::to_value(&envelope).unwrap();

        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "Not found");
        assert_eq!(body["message"], "No such endpoint");
        assert!(body.get("data").is_none());
    }

    #[test]
    fn test_error_envelope_can_carry_context() {
        let envelope = Envelope::error_with_data(
            "Not found",
            "No such endpoint",
            serde_json::json!({"available_endpoints": ["/health"]}),
        );
        let body = serde_json::to_value(&envelope).unwrap();

        assert_eq!(body["success"], false);
        assert_eq!(body["data"]["available_endpoints"][0], "/health");
    }
}
