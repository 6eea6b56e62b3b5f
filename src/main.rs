use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use mempool_relay::config::Config;
use mempool_relay::console::Console;
use mempool_relay::contracts::known_interfaces;
use mempool_relay::decoder::PayloadDecoder;
use mempool_relay::node::WsConnector;
use mempool_relay::session::ConnectionManager;

#[derive(Debug, Parser)]
#[command(name = "mempool-relay", about = "Watch pending transactions sent to a contract")]
struct Args {
    /// Contract to watch right away
    #[arg(long)]
    contract: Option<String>,

    /// Websocket endpoint, overrides NODE_ENDPOINT
    #[arg(long)]
    endpoint: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .init();

    let args = Args::parse();

    info!("========================================");
    info!("      MEMPOOL RELAY STARTING            ");
    info!("========================================");

    let mut config = Config::load()?;
    if let Some(endpoint) = &args.endpoint {
        config.node_endpoint = Some(endpoint.clone());
    }
    match &config.credential {
        Some(credential) => info!("✓ Relay credential loaded for {:?}", credential.address()),
        None => warn!("PRIVATE_KEY not found in environment, running watch-only"),
    }
    if config.node_endpoint.is_none() {
        warn!("NODE_ENDPOINT not set, pass an endpoint to `connect`");
    }

    let abis = known_interfaces(config.abi_path.as_deref())?;
    info!("✓ Payload decoder ready with {} interfaces", abis.len());
    let decoder = PayloadDecoder::with_interfaces(&abis);

    let manager = Arc::new(ConnectionManager::new(config, Arc::new(WsConnector), decoder));

    if let Some(contract) = &args.contract {
        if let Err(e) = manager.connect(contract, None).await {
            error!("Connect failed: {}", e);
        }
    }

    let console = Console::new(manager.clone());
    tokio::select! {
        result = console.run() => result?,
        _ = tokio::signal::ctrl_c() => info!("Interrupted"),
    }

    manager.disconnect().await;
    info!("Stopped");
    Ok(())
}
