//! Network configuration for the Strand P2P layer.

use strand_core::constants::{
    CHECKSUM_VERSION, DEFAULT_MAX_RECEIVE_BUFFER, NetworkType, PROTOCOL_VERSION,
};

/// Configuration for peer sessions and the TCP listener.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Selects magic bytes and the default port.
    pub network: NetworkType,
    /// Protocol version advertised in our `version` message.
    pub protocol_version: u32,
    /// Version assumed for both directions until the handshake negotiates one.
    pub initial_version: u32,
    /// Service bits advertised in our `version` message.
    pub services: u64,
    /// Sub-version string advertised in our `version` message.
    pub user_agent: String,
    /// Receive buffer cap; a peer that exceeds it is disconnected.
    pub max_receive_buffer: usize,
    /// Accept inbound connections.
    pub listen: bool,
    /// IP address to listen on.
    pub listen_addr: String,
    /// TCP port to listen on.
    pub listen_port: u16,
    /// Peers (`host:port`) to dial on startup.
    pub connect_peers: Vec<String>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        let network = NetworkType::Mainnet;
        Self {
            network,
            protocol_version: PROTOCOL_VERSION,
            initial_version: CHECKSUM_VERSION,
            services: 1,
            user_agent: format!("/strand:{}/", env!("CARGO_PKG_VERSION")),
            max_receive_buffer: DEFAULT_MAX_RECEIVE_BUFFER,
            listen: true,
            listen_addr: "0.0.0.0".to_string(),
            listen_port: network.default_p2p_port(),
            connect_peers: Vec::new(),
        }
    }
}

impl NetworkConfig {
    /// Configuration preset for a given network with its default port.
    pub fn for_network(network: NetworkType) -> Self {
        Self {
            network,
            listen_port: network.default_p2p_port(),
            ..Self::default()
        }
    }

    pub fn mainnet() -> Self {
        Self::for_network(NetworkType::Mainnet)
    }

    pub fn testnet() -> Self {
        Self::for_network(NetworkType::Testnet)
    }

    /// Regtest preset: loopback only.
    pub fn regtest() -> Self {
        Self {
            listen_addr: "127.0.0.1".to_string(),
            ..Self::for_network(NetworkType::Regtest)
        }
    }

    pub fn magic(&self) -> [u8; 4] {
        self.network.magic_bytes()
    }

    /// `addr:port` string for the TCP listener.
    pub fn listen_socket(&self) -> String {
        format!("{}:{}", self.listen_addr, self.listen_port)
    }
}
