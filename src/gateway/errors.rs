//! Gateway error responses
//!
//! Structured errors with request tracking, rendered as the standard JSON
//! envelope. Origin denial is deliberately absent here: it is not an HTTP
//! error, the response simply ships without CORS headers.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::fmt;
use tracing::{error, warn};

use super::models::Envelope;
use super::proxy::ProxyError;

/// Gateway error with the originating request's id.
#[derive(Debug)]
pub struct ApiError {
    pub kind: ApiErrorKind,
    pub request_id: String,
}

#[derive(Debug)]
pub enum ApiErrorKind {
    /// No route, mock, or proxy prefix matched.
    NotFound {
        message: String,
        available_endpoints: Vec<String>,
    },
    /// The proxied backend failed or timed out.
    UpstreamUnavailable(String),
    InternalError(String),
}

impl ApiError {
    pub fn not_found(
        request_id: String,
        message: String,
        available_endpoints: Vec<String>,
    ) -> Self {
        Self {
            kind: ApiErrorKind::NotFound {
                message,
                available_endpoints,
            },
            request_id,
        }
    }

    pub fn upstream_unavailable(request_id: String, error: &ProxyError) -> Self {
        Self {
            kind: ApiErrorKind::UpstreamUnavailable(error.to_string()),
            request_id,
        }
    }

    pub fn internal_error(request_id: String, detail: String) -> Self {
        Self {
            kind: ApiErrorKind::InternalError(detail),
            request_id,
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ApiErrorKind::NotFound { message, .. } => {
                write!(f, "[{}] Not Found: {}", self.request_id, message)
            }
            ApiErrorKind::UpstreamUnavailable(detail) => {
                write!(f, "[{}] Upstream Unavailable: {}", self.request_id, detail)
            }
            ApiErrorKind::InternalError(detail) => {
                write!(f, "[{}] Internal Error: {}", self.request_id, detail)
            }
        }
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, envelope) = match &self.kind {
            ApiErrorKind::NotFound {
                message,
                available_endpoints,
            } => (
                StatusCode::NOT_FOUND,
                Envelope::error_with_data(
                    "Not found",
                    message.clone(),
                    json!({ "available_endpoints": available_endpoints }),
                ),
            ),
            ApiErrorKind::UpstreamUnavailable(detail) => {
                warn!("🔌 [{}] Upstream request failed: {}", self.request_id, detail);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    Envelope::error(
                        "Upstream unavailable",
                        "The backend service is temporarily unavailable; please try again shortly",
                    ),
                )
            }
            ApiErrorKind::InternalError(detail) => {
                error!("💥 [{}] Internal error: {}", self.request_id, detail);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Envelope::error_with_data(
                        "Internal server error",
                        "An unexpected error occurred; quote the request id when reporting",
                        json!({ "request_id": self.request_id }),
                    ),
                )
            }
        };

        (status, Json(envelope)).into_response()
    }
}
