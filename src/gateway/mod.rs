//! BGAPP Edge Gateway
//!
//! CORS enforcement, preflight handling, soft rate limiting, legacy-host
//! redirects, and backend proxy/mock responders for the BGAPP ocean-data
//! platform.

pub mod cache;
pub mod cors;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod monitoring;
pub mod proxy;
pub mod ratelimit;
pub mod redirect;
pub mod routes;
pub mod server;
pub mod stac;

pub use server::{create_app, GatewayServer};
