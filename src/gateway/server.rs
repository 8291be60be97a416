//! Gateway Server
//!
//! Wires the middleware pipeline around the router and runs it:
//!
//! trace → timeout → request-id → CORS → panic catch → rate limit →
//! redirect → routes
//!
//! CORS sits outside the panic catch and the short-circuiting layers so
//! every response — 204 preflights, 429s, 301s, 404s, 503s, and panic
//! 500s — leaves with the right header set.

use super::{
    cors::cors_middleware,
    handlers::AppState,
    middleware::{panic_handler, request_id_middleware},
    proxy::{ProxyError, UpstreamClient},
    ratelimit::{self, ratelimit_middleware},
    redirect::redirect_middleware,
    routes::create_router,
};
use crate::config::GatewayConfig;
use std::{net::SocketAddr, sync::Arc};
use tokio::signal;
use tower_http::{catch_panic::CatchPanicLayer, timeout::TimeoutLayer, trace::TraceLayer};
use tracing::info;

/// The edge gateway service.
pub struct GatewayServer {
    state: Arc<AppState>,
}

impl GatewayServer {
    pub fn new(config: GatewayConfig) -> Result<Self, ProxyError> {
        Ok(Self {
            state: Arc::new(AppState::new(config)?),
        })
    }

    /// Same wiring with a caller-provided upstream client.
    pub fn with_upstream(config: GatewayConfig, upstream: Arc<dyn UpstreamClient>) -> Self {
        Self {
            state: Arc::new(AppState::with_upstream(config, upstream)),
        }
    }

    pub fn state(&self) -> Arc<AppState> {
        self.state.clone()
    }

    /// Start the gateway
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "bgapp_edge=info,tower_http=info".into()),
            )
            .init();

        info!("🚀 Starting BGAPP Edge Gateway");
        info!("   Environment: {}", self.state.config.environment);

        self.run_http().await
    }

    async fn run_http(self) -> Result<(), Box<dyn std::error::Error>> {
        let addr = self.get_socket_addr()?;
        let app = create_app(self.state.clone());

        // Idle rate windows are reclaimed in the background.
        ratelimit::spawn_sweeper(
            self.state.limiter.clone(),
            self.state.config.sweep_interval(),
        );

        info!("🌐 Starting gateway (HTTP)");
        info!("   Listen: http://{}", addr);
        self.log_server_info();

        let listener = tokio::net::TcpListener::bind(addr).await?;

        info!("✅ Gateway running");

        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await?;

        info!("🛑 Gateway stopped gracefully");
        Ok(())
    }

    fn get_socket_addr(&self) -> Result<SocketAddr, Box<dyn std::error::Error>> {
        Ok(SocketAddr::from((
            self.state.config.server.host.parse::<std::net::IpAddr>()?,
            self.state.config.server.port,
        )))
    }

    fn log_server_info(&self) {
        let config = &self.state.config;
        info!("📋 Gateway Configuration:");
        info!("   Environment: {}", config.environment);
        info!("   Version: {}", config.server.version);
        info!(
            "   Origins: {} exact, {} wildcard",
            config.cors.allowed_origins.len(),
            config.cors.wildcard_origins.len()
        );
        info!(
            "   Rate rules: {} (+default {}/min)",
            config.rate_limit.rules.len(),
            config.rate_limit.default_requests_per_minute
        );
        info!("   Legacy redirects: {}", config.redirects.len());
        info!("   Proxy routes: {}", config.proxy.routes.len());
        info!("   Frame options: {}", config.server.frame_options.as_header_value());

        info!("📊 Available endpoints:");
        info!("   GET  /                             - STAC catalog root");
        info!("   GET  /collections                  - STAC collections");
        info!("   GET  /collections/:id              - Collection detail");
        info!("   GET  /collections/:id/items        - Collection items");
        info!("   GET  /search                       - STAC search");
        info!("   GET  /services                     - Service status mock");
        info!("   GET  /metrics                      - System metrics mock");
        info!("   GET  /health                       - Health check");
        info!("   GET  /admin-api/gateway/metrics    - Gateway metrics (Prometheus)");
        info!("   GET  /admin-api/gateway/rate-limits- Rate limiter state");
        info!("   GET  /admin-api/gateway/redirects  - Legacy URL telemetry");
        for route in self.state.proxy_routes.routes() {
            info!("   ANY  {}/*  →  {}", route.prefix, route.upstream);
        }
    }
}

/// Assemble the full middleware stack around the router. Public so tests can
/// drive the exact production pipeline without binding a socket.
pub fn create_app(state: Arc<AppState>) -> axum::Router {
    let request_timeout = state.config.request_timeout();

    create_router(state.clone())
        // Legacy-host redirects (innermost: only reached by allowed traffic)
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            redirect_middleware,
        ))
        // Rate limiting
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            ratelimit_middleware,
        ))
        // Panic catch, inside CORS so 500s still carry the header set
        .layer(CatchPanicLayer::custom(panic_handler(state.clone())))
        // CORS validation, preflights, and response decoration
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            cors_middleware,
        ))
        // Request ID assignment/echo
        .layer(axum::middleware::from_fn(request_id_middleware))
        // Bounded request handling time
        .layer(TimeoutLayer::new(request_timeout))
        // Tracing last for complete request spans
        .layer(TraceLayer::new_for_http())
}

/// Wait for shutdown signal
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received terminate signal");
        },
    }
}
