//! Binary entry point: resolve configuration, bind the listening socket,
//! optionally daemonize, then run the server on a multi-thread runtime.

use echolog::config::Config;
use echolog::daemon;
use echolog::server::{self, Server};
use tracing::{error, info};
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
        port = config.port,
        log_file = %config.log_file.display(),
        timestamp_interval = config.timestamp_interval,
        daemon = config.daemon,
        "Starting echolog server"
    );

    // Bind before forking so a failed bind exits nonzero in the foreground
    let listener = match server::bind(config.port) {
        Ok(listener) => listener,
        Err(e) => {
            error!(error = %e, port = config.port, "Failed to bind listening socket");
            return Err(e.into());
        }
    };

    if config.daemon {
        daemon::daemonize()?;
    }

    // The runtime must not exist before the fork
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(Server::new(config).run(listener))?;
    Ok(())
}
