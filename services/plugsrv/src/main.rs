use anyhow::{anyhow, Result};
use clap::Parser;
use plugsrv::cli::{self, Cli};
use tracing::{debug, error};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = cli.load_config()?;

    // Initialize logging
    common::init_with_config(cli.log_config(&config))
        .map_err(|e| anyhow!("Failed to initialize logging: {}", e))?;

    debug!(
        "Device {}:{} (rules port {:?}), store {:?}",
        config.device.host, config.device.port, config.device.rules_port, config.store.backend
    );

    if let Err(e) = cli::execute(&cli, config).await {
        error!("{:#}", e);
        return Err(e);
    }
    Ok(())
}
