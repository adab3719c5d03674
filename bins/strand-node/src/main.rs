//! Strand full node binary.
//!
//! Opens the chain store, accepts and dials peers, and answers block and
//! transaction requests from the local chain.

use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use clap::Parser;
use strand_core::constants::NetworkType;
use strand_core::crypto::Sha256d;
use strand_node_lib::{Node, NodeConfig};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(
    name = "strand-node",
    version,
    about = "Strand full node with a RocksDB chain store"
)]
struct Args {
    /// Data directory for the chain store
    #[arg(long, default_value = None)]
    data_dir: Option<PathBuf>,

    /// P2P listen address
    #[arg(long, default_value = "0.0.0.0")]
    listen_addr: String,

    /// P2P listen port (defaults to the network's standard port)
    #[arg(long)]
    port: Option<u16>,

    /// Do not accept inbound connections
    #[arg(long)]
    no_listen: bool,

    /// Peers to dial on startup (comma-separated host:port)
    #[arg(long, value_delimiter = ',')]
    connect: Vec<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Log output format ("text" or "json")
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Use the test network.
    #[arg(long, conflicts_with = "regtest")]
    testnet: bool,

    /// Use a local regression-test network.
    #[arg(long, conflicts_with = "testnet")]
    regtest: bool,
}

impl Args {
    fn into_config(self) -> (NodeConfig, String) {
        let network_type = if self.regtest {
            NetworkType::Regtest
        } else if self.testnet {
            NetworkType::Testnet
        } else {
            NetworkType::Mainnet
        };

        let mut config = NodeConfig::for_network(network_type);
        if let Some(dir) = self.data_dir {
            config.data_dir = dir;
        }
        config.log_level = self.log_level;
        config.network.listen = !self.no_listen;
        config.network.listen_addr = self.listen_addr;
        if let Some(port) = self.port {
            config.network.listen_port = port;
        }
        config.network.connect_peers = self.connect;

        (config, self.log_format)
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let (config, log_format) = args.into_config();

    init_logging(&config.log_level, &log_format);

    info!("Strand node v{}", env!("CARGO_PKG_VERSION"));
    info!("network: {:?}", config.network.network);
    info!("data_dir: {:?}", config.data_dir);
    if config.network.listen {
        info!("p2p_listen: {}", config.network.listen_socket());
    }
    info!("connect: {:?}", config.network.connect_peers);

    let (node, events) = match Node::new(config, Arc::new(Sha256d)) {
        Ok(pair) => pair,
        Err(e) => {
            error!("failed to open node: {}", e);
            process::exit(1);
        }
    };

    info!("chain_height: {}", node.store().read().chain_height());

    if let Err(e) = node.start().await {
        error!("failed to start networking: {}", e);
        if let Err(e) = node.shutdown() {
            error!("failed to close store: {}", e);
        }
        process::exit(1);
    }

    info!("Strand node running (Ctrl+C to stop)");

    let shutdown_signal = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("received Ctrl+C, shutting down..."),
            Err(e) => error!("failed to listen for Ctrl+C: {}", e),
        }
    };

    tokio::select! {
        _ = node.run(events) => {
            info!("node event loop exited");
        }
        _ = shutdown_signal => {
            info!("shutdown signal received");
        }
    }

    if let Err(e) = node.shutdown() {
        error!("unclean shutdown: {}", e);
        process::exit(1);
    }
    info!("Strand node shutdown complete");
}

/// Initialize the tracing subscriber.
///
/// `format = "json"` selects structured JSON output; anything else is
/// human-readable text. `RUST_LOG` overrides `level_str` when set.
fn init_logging(level_str: &str, format: &str) {
    use tracing_subscriber::filter::EnvFilter;
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level_str));

    if format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_level(true))
            .init();
    }
}
