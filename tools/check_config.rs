use bgapp_edge::config::GatewayConfig;
use std::path::PathBuf;

fn main() {
    let path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("./config/gateway.toml"));

    println!("Checking gateway configuration: {}", path.display());

    let config = match GatewayConfig::load(&path) {
        Ok(config) => config,
        Err(e) => {
            println!("❌ {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = config.validate() {
        println!("❌ {}", e);
        std::process::exit(1);
    }

    println!("✅ Configuration valid");
    println!("  Environment:  {}", config.environment);
    println!("  Listen:       {}:{}", config.server.host, config.server.port);
    println!(
        "  Origins:      {} exact, {} wildcard",
        config.cors.allowed_origins.len(),
        config.cors.wildcard_origins.len()
    );
    println!("  Rate tiers:   {}", config.rate_limit.rules.len());
    println!("  Redirects:    {}", config.redirects.len());
    println!("  Proxy routes: {}", config.proxy.routes.len());
}
