//! Node binary. The mode is the first argument or `RS_NODE_MODE`:
//!
//! - `devnet` (default): the whole committee in one process
//! - `collator`: a collator against a JSON-RPC sequencer, over libp2p
//! - `keyper`: one committee member, over libp2p
//!
//! Each mode loads its configuration from the environment, runs until
//! Ctrl+C and shuts down gracefully.

use anyhow::{Context, Result};
use node_runtime::{
    CollatorNodeConfig, CollatorRuntime, KeyperNodeConfig, KeyperRuntime, NodeConfig, NodeMode,
    NodeRuntime,
};
use shutter_telemetry::{init_telemetry, TelemetryConfig};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let mode = NodeMode::select(std::env::args().nth(1), std::env::var("RS_NODE_MODE").ok())
        .context("invalid node mode")?;

    let telemetry = TelemetryConfig::from_env().for_role(&mode.to_string());
    let _guard = init_telemetry(telemetry.clone())
        .await
        .context("failed to initialize telemetry")?;

    match mode {
        NodeMode::Devnet => run_devnet(telemetry).await,
        NodeMode::Collator => run_collator(telemetry).await,
        NodeMode::Keyper => run_keyper(telemetry).await,
    }
}

async fn run_devnet(telemetry: TelemetryConfig) -> Result<()> {
    let mut config = NodeConfig::from_env().context("invalid configuration")?;
    config.telemetry = telemetry;

    let runtime = NodeRuntime::new(config)
        .await
        .context("failed to assemble devnet")?;
    runtime.start().await.context("failed to start devnet")?;

    info!("devnet is running, press Ctrl+C to stop");
    tokio::signal::ctrl_c().await?;
    runtime.shutdown().await?;
    Ok(())
}

async fn run_collator(telemetry: TelemetryConfig) -> Result<()> {
    let mut config = CollatorNodeConfig::from_env().context("invalid configuration")?;
    config.telemetry = telemetry;

    let runtime = CollatorRuntime::new(config)
        .await
        .context("failed to assemble collator")?;
    let rpc = runtime.start().await.context("failed to start collator")?;

    info!(%rpc, "collator is running, press Ctrl+C to stop");
    tokio::signal::ctrl_c().await?;
    runtime.shutdown().await?;
    Ok(())
}

async fn run_keyper(telemetry: TelemetryConfig) -> Result<()> {
    let mut config = KeyperNodeConfig::from_env().context("invalid configuration")?;
    config.telemetry = telemetry;

    let runtime = KeyperRuntime::new(config)
        .await
        .context("failed to assemble keyper")?;
    runtime.start().await.context("failed to start keyper")?;

    info!("keyper is running, press Ctrl+C to stop");
    tokio::signal::ctrl_c().await?;
    runtime.shutdown().await?;
    Ok(())
}
