//! Watch Gateway Server entry point
//!
//! Run with:
//! ```bash
//! cargo run -p watch-gateway
//! ```
//!
//! Configuration is loaded from environment variables.

use tracing::{error, info};
use watch_common::{init_tracing, AppConfig, TracingConfig};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!(error = %e, "Gateway failed to start");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::from_env().map_err(|e| {
        eprintln!("Failed to load configuration: {e}");
        e
    })?;

    if let Err(e) = init_tracing(&TracingConfig::for_environment(config.app.env)) {
        eprintln!("Warning: Failed to initialize tracing: {e}");
    }

    info!(
        env = ?config.app.env,
        node_id = %config.node.id,
        address = %config.gateway.address(),
        "Configuration loaded"
    );

    watch_gateway::run(config).await?;

    Ok(())
}
