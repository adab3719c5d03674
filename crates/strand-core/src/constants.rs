//! Protocol and storage constants.

/// Network type: Mainnet, Testnet, or Regtest.
///
/// Controls magic bytes, default ports, and the data directory suffix.
///
/// # Examples
///
/// ```
/// use strand_core::constants::NetworkType;
/// let net = NetworkType::default();
/// assert_eq!(net, NetworkType::Mainnet);
/// assert_eq!(net.magic_bytes(), [0xF9, 0xBE, 0xB4, 0xD9]);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum NetworkType {
    /// Production network.
    #[default]
    Mainnet,
    /// Public test network.
    Testnet,
    /// Local regression-test network.
    Regtest,
}

impl NetworkType {
    /// Four-byte network identifier that starts every P2P message frame.
    ///
    /// # Examples
    ///
    /// ```
    /// use strand_core::constants::NetworkType;
    /// assert_eq!(NetworkType::Testnet.magic_bytes(), [0xFA, 0xBF, 0xB5, 0xDA]);
    /// ```
    pub fn magic_bytes(&self) -> [u8; 4] {
        match self {
            Self::Mainnet => [0xF9, 0xBE, 0xB4, 0xD9],
            Self::Testnet | Self::Regtest => [0xFA, 0xBF, 0xB5, 0xDA],
        }
    }

    /// Default TCP port for P2P connections.
    pub fn default_p2p_port(&self) -> u16 {
        match self {
            Self::Mainnet => 8333,
            Self::Testnet => 18333,
            Self::Regtest => 18444,
        }
    }

    /// Subdirectory name appended to the base data directory path.
    ///
    /// # Examples
    ///
    /// ```
    /// use strand_core::constants::NetworkType;
    /// assert_eq!(NetworkType::Regtest.data_dir_suffix(), "regtest");
    /// ```
    pub fn data_dir_suffix(&self) -> &'static str {
        match self {
            Self::Mainnet => "mainnet",
            Self::Testnet => "testnet",
            Self::Regtest => "regtest",
        }
    }
}

/// Protocol version this node speaks by default.
pub const PROTOCOL_VERSION: u32 = 60002;

/// First protocol version whose message headers carry a payload checksum.
pub const CHECKSUM_VERSION: u32 = 209;

/// First protocol version whose `ping` carries a nonce (BIP 31).
pub const BIP0031_VERSION: u32 = 60000;

/// Length of the frame header without checksum: magic + command + length.
pub const HEADER_LEN_NO_CHECKSUM: usize = 20;

/// Length of the frame header including the 4-byte checksum.
pub const HEADER_LEN: usize = 24;

/// Width of the NUL-padded command field.
pub const COMMAND_LEN: usize = 12;

/// Serialized block header size.
pub const BLOCK_HEADER_LEN: usize = 80;

/// Serialized size of a previous-output reference (hash + index).
pub const OUTPOINT_LEN: usize = 36;

/// Size of a network address record inside `version` (services + ip + port).
pub const VERSION_ADDR_LEN: usize = 26;

/// Addresses beyond this count in a single `addr` message are ignored.
pub const MAX_ADDR_PER_MESSAGE: usize = 1000;

/// Maximum block hashes returned for one `getblocks` request.
pub const MAX_INV_PER_GETBLOCKS: usize = 500;

/// Maximum headers returned for one `getheaders` request.
pub const MAX_HEADERS_PER_GETHEADERS: usize = 2000;

/// Inventory type for transactions.
pub const MSG_TX: u32 = 1;
/// Inventory type for blocks.
pub const MSG_BLOCK: u32 = 2;

/// Default receive buffer cap in bytes before a peer is disconnected.
pub const DEFAULT_MAX_RECEIVE_BUFFER: usize = 5000 * 1000;

/// Blocks re-derived after an unclean shutdown.
pub const CRASH_ROLLBACK_BLOCKS: u32 = 10;

/// Chain store schema version.
pub const DB_MAJOR_VERSION: u32 = 1;
pub const DB_MINOR_VERSION: u32 = 0;
