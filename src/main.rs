//! Server entry point: wires the system together from environment
//! configuration and serves the HTTP/WebSocket API.

use tracing::{error, info};

use heimdall::api::{ApiServer, ApiServerConfig};
use heimdall::config::Config;
use heimdall::{Heimdall, Result};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(true)
        .with_level(true)
        .init();

    print_banner();

    let config = Config::from_env()?;
    info!("configuration loaded from environment");

    let heimdall = Heimdall::new(config);
    info!("core subsystems initialized");

    let mut server_config = ApiServerConfig::default();
    if let Some(port) = std::env::var("API_PORT").ok().and_then(|v| v.parse().ok()) {
        server_config.port = port;
    }
    let server = ApiServer::new(server_config, heimdall.app_state());

    if let Err(e) = server.run().await {
        error!(error = %e, "API server exited with an error");
        heimdall.shutdown();
        return Err(e);
    }

    heimdall.shutdown();
    Ok(())
}

fn print_banner() {
    println!("╔════════════════════════════════════════════════════════════╗");
    println!("║                    Heimdall Observability                    ║");
    println!("║                         v{:<37}║", VERSION);
    println!("╚════════════════════════════════════════════════════════════╝");
    println!();
}
