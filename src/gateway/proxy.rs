//! Reverse proxy to the platform backends
//!
//! Requests that match a configured path prefix are forwarded to that
//! upstream with the original method, headers (minus hop-by-hop), path and
//! query. The upstream is behind a trait so tests can substitute a failing
//! or recording client. Failures never retry in-gateway; the caller gets a
//! 503 envelope and decides for itself.

use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::{Body, Bytes},
    extract::Request,
    http::{HeaderMap, Method},
    response::Response,
};

use crate::config::{ProxyConfig, ProxyRoute};

/// Request bodies are buffered before forwarding; responses stream through.
const MAX_REQUEST_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Connection-scoped headers that must not cross the proxy hop, plus
/// `host` (rewritten by the client) and `content-length` (recomputed from
/// the buffered body).
const SKIPPED_HEADERS: [&str; 10] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "host",
    "content-length",
];

#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("upstream request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("failed to read client request body: {0}")]
    ClientBody(String),
    /// For [`UpstreamClient`] implementations not backed by reqwest.
    #[error("upstream unavailable: {0}")]
    Unavailable(String),
}

/// Boundary to the backend HTTP client.
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    async fn fetch(
        &self,
        method: Method,
        url: String,
        headers: HeaderMap,
        body: Bytes,
    ) -> Result<Response, ProxyError>;
}

/// reqwest-backed client with the configured per-request timeout.
pub struct HttpUpstreamClient {
    client: reqwest::Client,
}

impl HttpUpstreamClient {
    pub fn new(timeout: Duration) -> Result<Self, ProxyError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl UpstreamClient for HttpUpstreamClient {
    async fn fetch(
        &self,
        method: Method,
        url: String,
        headers: HeaderMap,
        body: Bytes,
    ) -> Result<Response, ProxyError> {
        let upstream = self
            .client
            .request(method, &url)
            .headers(headers)
            .body(body)
            .send()
            .await?;

        let status = upstream.status();
        let headers = forwardable_headers(upstream.headers());

        let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        Ok(response)
    }
}

/// Configured proxy routes, longest prefix first.
pub struct ProxyTable {
    routes: Vec<ProxyRoute>,
}

impl ProxyTable {
    pub fn new(config: &ProxyConfig) -> Self {
        let mut routes = config.routes.clone();
        routes.sort_by(|a, b| b.prefix.len().cmp(&a.prefix.len()));
        Self { routes }
    }

    pub fn route_for(&self, path: &str) -> Option<&ProxyRoute> {
        self.routes
            .iter()
            .find(|route| path.starts_with(route.prefix.as_str()))
    }

    pub fn routes(&self) -> &[ProxyRoute] {
        &self.routes
    }
}

/// Forward one request to its upstream and relay the response.
pub async fn forward(
    client: &dyn UpstreamClient,
    route: &ProxyRoute,
    request: Request,
) -> Result<Response, ProxyError> {
    let method = request.method().clone();
    let path_and_query = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let url = format!("{}{}", route.upstream.trim_end_matches('/'), path_and_query);
    let headers = forwardable_headers(request.headers());

    let body = axum::body::to_bytes(request.into_body(), MAX_REQUEST_BODY_BYTES)
        .await
        .map_err(|e| ProxyError::ClientBody(e.to_string()))?;

    client.fetch(method, url, headers, body).await
}

fn forwardable_headers(headers: &HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::new();
    for (name, value) in headers {
        if SKIPPED_HEADERS.contains(&name.as_str()) {
            continue;
        }
        out.append(name.clone(), value.clone());
    }
    out
}
