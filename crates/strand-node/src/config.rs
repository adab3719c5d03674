//! Node configuration for the Strand node.
//!
//! Provides [`NodeConfig`] with defaults for the data directory, chain store
//! tuning, and network settings.

use std::path::PathBuf;

use strand_core::constants::NetworkType;
use strand_network::NetworkConfig;

/// RocksDB tuning applied to each of the store's databases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreOptions {
    pub max_open_files: i32,
    /// Memtable size in bytes.
    pub write_buffer_size: usize,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            max_open_files: 50,
            write_buffer_size: 100 * 1024 * 1024,
        }
    }
}

/// Configuration for a node instance.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Root directory for all persistent data.
    pub data_dir: PathBuf,
    /// P2P network configuration.
    pub network: NetworkConfig,
    pub store: StoreOptions,
    /// Log level filter string (e.g. "info", "debug", "strand_network=trace").
    pub log_level: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self::for_network(NetworkType::Mainnet)
    }
}

impl NodeConfig {
    /// Defaults for `network`, with the data directory under `<data_dir>/strand/<network>`.
    pub fn for_network(network: NetworkType) -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("strand")
            .join(network.data_dir_suffix());
        let network = match network {
            NetworkType::Mainnet => NetworkConfig::mainnet(),
            NetworkType::Testnet => NetworkConfig::testnet(),
            NetworkType::Regtest => NetworkConfig::regtest(),
        };
        Self {
            data_dir,
            network,
            store: StoreOptions::default(),
            log_level: "info".to_string(),
        }
    }

    /// Directory holding the chain store's databases.
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("chaindata")
    }
}
