//! Shared fixtures for integration tests.

use std::sync::Arc;

use parking_lot::Mutex;
use strand_core::constants::CHECKSUM_VERSION;
use strand_core::crypto::{CryptoProvider, Sha256d};
use strand_core::error::NetworkError;
use strand_core::types::{Block, BlockHeader, Hash256, OutPoint, Transaction, TxIn, TxOut};
use strand_network::{ChainHead, NetworkConfig, PeerSession, SessionContext, Transport};

/// Frames written by a session, readable from outside it.
#[derive(Clone, Default)]
pub struct Wire {
    frames: Arc<Mutex<Vec<Vec<u8>>>>,
    closed: Arc<Mutex<bool>>,
}

impl Wire {
    /// Remove and return everything written so far, concatenated.
    pub fn take(&self) -> Vec<u8> {
        self.frames.lock().drain(..).flatten().collect()
    }

    /// Number of frames waiting to be taken.
    pub fn pending(&self) -> usize {
        self.frames.lock().len()
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.lock()
    }
}

impl Transport for Wire {
    fn send(&mut self, frame: Vec<u8>) -> Result<(), NetworkError> {
        if self.is_closed() {
            return Err(NetworkError::Closed);
        }
        self.frames.lock().push(frame);
        Ok(())
    }

    fn close(&mut self) {
        *self.closed.lock() = true;
    }
}

/// Chain head pinned at one height.
pub struct FixedHeight(pub u32);

impl ChainHead for FixedHeight {
    fn best_height(&self) -> u32 {
        self.0
    }
}

/// A regtest session context with a chosen nonce and advertised height.
pub fn context(nonce: [u8; 8], height: u32) -> Arc<SessionContext> {
    Arc::new(SessionContext {
        config: NetworkConfig::regtest(),
        nonce,
        crypto: Arc::new(Sha256d),
        chain: Arc::new(FixedHeight(height)),
    })
}

/// A session over a [`Wire`], returning the wire handle alongside it.
pub fn session(ctx: Arc<SessionContext>, inbound: bool) -> (PeerSession<Wire>, Wire) {
    let wire = Wire::default();
    let peer = if inbound { "127.0.0.1:50000" } else { "127.0.0.1:18444" };
    (PeerSession::new(ctx, peer, inbound, wire.clone()), wire)
}

/// Shuttle bytes between two sessions until neither has anything left to send.
///
/// Returns the number of rounds taken. Stops early if either side closes.
pub fn pump(a: &mut PeerSession<Wire>, a_wire: &Wire, b: &mut PeerSession<Wire>, b_wire: &Wire) -> usize {
    let mut rounds = 0;
    while a_wire.pending() > 0 || b_wire.pending() > 0 {
        rounds += 1;
        let to_b = a_wire.take();
        if !to_b.is_empty() && b.receive(&to_b).is_err() {
            break;
        }
        let to_a = b_wire.take();
        if !to_a.is_empty() && a.receive(&to_a).is_err() {
            break;
        }
        if rounds > 16 {
            break;
        }
    }
    rounds
}

/// Raw frame bytes, with or without the checksum field.
pub fn raw_frame(magic: [u8; 4], command: &str, payload: &[u8], with_checksum: bool) -> Vec<u8> {
    let version = if with_checksum { CHECKSUM_VERSION } else { CHECKSUM_VERSION - 1 };
    strand_network::frame::encode_frame(magic, command, payload, version, &Sha256d).unwrap()
}

/// Pay-to-pubkey-hash output script for `hash`.
pub fn p2pkh(hash: [u8; 20]) -> Vec<u8> {
    let mut script = vec![0x76, 0xA9, 0x14];
    script.extend_from_slice(&hash);
    script.extend_from_slice(&[0x88, 0xAC]);
    script
}

/// Coinbase paying to a seeded address; `height` makes each one unique.
pub fn coinbase(height: u32, payee: u8) -> Transaction {
    Transaction::new(
        1,
        vec![TxIn {
            outpoint: OutPoint::null(),
            script: height.to_le_bytes().to_vec(),
            sequence: u32::MAX,
        }],
        vec![TxOut::new(50_0000_0000, p2pkh([payee; 20]))],
        0,
    )
}

/// Transaction spending `outpoints` to a seeded address.
pub fn spend(outpoints: &[OutPoint], payee: u8) -> Transaction {
    Transaction::new(
        1,
        outpoints
            .iter()
            .map(|op| TxIn {
                outpoint: *op,
                script: vec![0x01, payee],
                sequence: u32::MAX,
            })
            .collect(),
        vec![TxOut::new(1_000, p2pkh([payee; 20]))],
        0,
    )
}

/// Block record at `height` linking to `prev`, indexing `txs`.
pub fn block(prev: Hash256, height: u32, active: bool, txs: &[Transaction]) -> Block {
    let crypto = Sha256d;
    Block {
        header: BlockHeader {
            version: 1,
            prev_hash: prev,
            merkle_root: Hash256([height as u8; 32]),
            timestamp: 1_300_000_000 + height,
            bits: 0x1d00_ffff,
            nonce: height,
        },
        height,
        size: 81,
        active,
        chain_work: vec![height as u8],
        txs: txs.iter().map(|tx| tx.hash(&crypto)).collect(),
    }
}

/// A linked chain of active blocks at heights `0..count`, one coinbase each.
pub fn chain(count: u32) -> Vec<(Block, Transaction)> {
    let crypto = Sha256d;
    let mut out: Vec<(Block, Transaction)> = Vec::new();
    let mut prev = Hash256::ZERO;
    for height in 0..count {
        let cb = coinbase(height, height as u8);
        let b = block(prev, height, true, std::slice::from_ref(&cb));
        prev = b.hash(&crypto);
        out.push((b, cb));
    }
    out
}

/// Shorthand for the default provider as a trait object.
pub fn crypto() -> Arc<dyn CryptoProvider> {
    Arc::new(Sha256d)
}
