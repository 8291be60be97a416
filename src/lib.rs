//! BGAPP Edge - CORS and URL-Compatibility Gateway
//!
//! HTTP edge layer for the BGAPP marine data platform: validates browser
//! origins, applies security headers, rate-limits clients, rewrites legacy
//! hostnames and proxies API traffic to the platform backends.

pub mod config;
pub mod gateway;
