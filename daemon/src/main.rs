//! Civic daemon: entry point for running a civic node.

use anyhow::Context;
use civic_node::{CivicNode, NodeConfig};
use civic_utils::{init_logging, LogFormat};
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "civic-daemon", about = "Community issue verification node")]
struct Cli {
    /// Data directory for issue snapshots.
    #[arg(long, env = "CIVIC_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Enable or disable the RPC server.
    #[arg(long, env = "CIVIC_ENABLE_RPC")]
    rpc: Option<bool>,

    /// RPC server port.
    #[arg(long, env = "CIVIC_RPC_PORT")]
    rpc_port: Option<u16>,

    /// Enable or disable the WebSocket server.
    #[arg(long, env = "CIVIC_ENABLE_WEBSOCKET")]
    websocket: Option<bool>,

    /// WebSocket server port.
    #[arg(long, env = "CIVIC_WS_PORT")]
    websocket_port: Option<u16>,

    /// Seconds between escalation/repost scheduler passes.
    #[arg(long, env = "CIVIC_SCHEDULER_INTERVAL")]
    scheduler_interval: Option<u64>,

    /// Log format: "human" or "json".
    #[arg(long, env = "CIVIC_LOG_FORMAT")]
    log_format: Option<String>,

    /// Log level: "trace", "debug", "info", "warn", "error".
    #[arg(long, env = "CIVIC_LOG_LEVEL")]
    log_level: Option<String>,

    /// Path to a TOML configuration file. If provided, file settings
    /// are used as the base; CLI flags and env vars override them.
    #[arg(long, env = "CIVIC_CONFIG")]
    config: Option<PathBuf>,

    /// Subcommand.
    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Node operations.
    #[command(name = "node")]
    Node {
        #[command(subcommand)]
        action: NodeAction,
    },
    /// Print the effective configuration as TOML.
    #[command(name = "config")]
    Config,
}

#[derive(clap::Subcommand)]
enum NodeAction {
    /// Run the node until SIGINT/SIGTERM.
    Run,
}

impl Cli {
    /// Layer CLI flags and env vars over the file (or default) config.
    fn resolve_config(&self) -> anyhow::Result<NodeConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let path = path.to_string_lossy();
                NodeConfig::from_toml_file(&path)
                    .with_context(|| format!("loading config file {path}"))?
            }
            None => NodeConfig::default(),
        };

        if let Some(dir) = &self.data_dir {
            config.data_dir = dir.clone();
        }
        if let Some(rpc) = self.rpc {
            config.enable_rpc = rpc;
        }
        if let Some(port) = self.rpc_port {
            config.rpc_port = port;
        }
        if let Some(ws) = self.websocket {
            config.enable_websocket = ws;
        }
        if let Some(port) = self.websocket_port {
            config.websocket_port = port;
        }
        if let Some(secs) = self.scheduler_interval {
            config.scheduler_interval_secs = secs;
        }
        if let Some(format) = &self.log_format {
            config.log_format = format.clone();
        }
        if let Some(level) = &self.log_level {
            config.log_level = level.clone();
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.resolve_config()?;

    match cli.command {
        Command::Config => {
            print!("{}", config.to_toml_string()?);
        }
        Command::Node { action } => match action {
            NodeAction::Run => {
                init_logging(LogFormat::parse(&config.log_format), &config.log_level);
                if let Some(path) = &cli.config {
                    tracing::info!(path = %path.display(), "loaded config file");
                }
                let rpc = if config.enable_rpc {
                    config.rpc_port.to_string()
                } else {
                    "off".into()
                };
                let ws = if config.enable_websocket {
                    config.websocket_port.to_string()
                } else {
                    "off".into()
                };
                tracing::info!(%rpc, %ws, "starting civic node");

                let mut node = CivicNode::new(config)?;
                node.start().await?;

                node.shutdown.wait_for_signal().await;
                tracing::info!("shutdown signal received, stopping node");
                node.stop().await?;

                tracing::info!("civic daemon exited cleanly");
            }
        },
    }

    Ok(())
}
