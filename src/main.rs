//! ctrl-httpd: serve the grid API on a TCP port.
//!
//! Configuration via CLI arguments or TOML file. Runs until the listener
//! stops accepting connections.

use ctrl_httpd::config::Config;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(
        name = %config.name,
        listen = %config.listen,
        port = config.port,
        "Starting ctrl-httpd"
    );

    run(config)
}

#[cfg(unix)]
fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    use ctrl_httpd::{GridApi, Server};
    use std::time::Duration;
    use tracing::error;

    const LIVENESS_INTERVAL: Duration = Duration::from_millis(500);

    let server = Server::bind(config.server_options());
    server.set_handler(GridApi::new());

    while server.is_active() {
        std::thread::sleep(LIVENESS_INTERVAL);
    }

    error!("Listener is no longer accepting connections");
    server.stop();
    Err("listener stopped".into())
}

#[cfg(not(unix))]
fn run(_config: Config) -> Result<(), Box<dyn std::error::Error>> {
    Err("Unsupported platform: only Unix-like systems are supported".into())
}
