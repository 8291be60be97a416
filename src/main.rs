//! BGAPP Edge Gateway Binary
//!
//! Standalone edge server for the BGAPP marine data platform.

use bgapp_edge::config::{Environment, GatewayConfig};
use bgapp_edge::gateway::GatewayServer;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "bgapp-edge")]
#[command(about = "BGAPP Edge Gateway", long_about = None)]
struct Args {
    /// Gateway host
    #[arg(long)]
    host: Option<String>,

    /// Gateway port
    #[arg(long)]
    port: Option<u16>,

    /// Deployment environment (production, staging, development)
    #[arg(long)]
    environment: Option<Environment>,

    /// TOML configuration file; defaults are derived from --environment when absent
    #[arg(long)]
    config: Option<PathBuf>,

    /// Request timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Upstream fetch timeout in seconds
    #[arg(long)]
    upstream_timeout: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Start from the config file when one is given, otherwise from the
    // environment's stock tables. Explicit flags win either way.
    let mut config = match &args.config {
        Some(path) => {
            println!("📂 Loading gateway configuration: {}", path.display());
            GatewayConfig::load(path)?
        }
        None => {
            GatewayConfig::for_environment(args.environment.unwrap_or(Environment::Development))
        }
    };

    if let Some(environment) = args.environment {
        config.environment = environment;
    }
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(timeout) = args.timeout {
        config.server.request_timeout_secs = timeout;
    }
    if let Some(upstream_timeout) = args.upstream_timeout {
        config.proxy.upstream_timeout_secs = upstream_timeout;
    }

    config.validate()?;
    println!("✅ Gateway configuration valid ({})", config.environment);

    let server = GatewayServer::new(config)?;
    server.run().await?;

    Ok(())
}
