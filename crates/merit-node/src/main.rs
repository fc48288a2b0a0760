use anyhow::Result;
use merit_node::{logging, MeritEngine, NodeConfig};
use std::path::PathBuf;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    logging::init_logging("info");

    let mut config = match std::env::args().nth(1).map(PathBuf::from) {
        Some(path) => NodeConfig::from_file(&path)?,
        None => NodeConfig::default(),
    };
    config.apply_env_overrides();

    info!(node = %config.node.name, "Starting merit node");

    let engine = MeritEngine::new(&config);
    engine.start().await?;

    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal");
    engine.shutdown().await;

    Ok(())
}
