//! Core chain types: hashes, transactions, block headers, and block records.
//!
//! Identity hashes are never stored on these types. They are derived on
//! demand through a [`CryptoProvider`] from the exact wire bytes.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::codec;
use crate::constants::{BLOCK_HEADER_LEN, OUTPOINT_LEN};
use crate::crypto::CryptoProvider;

/// A 32-byte hash value (block hashes, transaction hashes, merkle roots).
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    /// The zero hash. Used as the previous hash of coinbase inputs.
    pub const ZERO: Self = Self([0u8; 32]);

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Build from a slice, returning `None` unless it is exactly 32 bytes.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        <[u8; 32]>::try_from(bytes).ok().map(Self)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl From<[u8; 32]> for Hash256 {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Hash256 {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// A 20-byte address hash (RIPEMD-160 of SHA-256 of a public key).
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct AddressHash(pub [u8; 20]);

impl AddressHash {
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl fmt::Display for AddressHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// Reference to a prior transaction output: 32-byte tx hash + 4-byte LE index.
///
/// Kept in its raw wire form because it is used verbatim as the spend-index key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, bincode::Encode, bincode::Decode)]
pub struct OutPoint(pub [u8; OUTPOINT_LEN]);

impl OutPoint {
    pub fn new(txid: Hash256, index: u32) -> Self {
        let mut raw = [0u8; OUTPOINT_LEN];
        raw[..32].copy_from_slice(txid.as_bytes());
        raw[32..].copy_from_slice(&index.to_le_bytes());
        Self(raw)
    }

    /// The synthetic outpoint carried by a coinbase input.
    pub fn null() -> Self {
        Self::new(Hash256::ZERO, u32::MAX)
    }

    pub fn txid(&self) -> Hash256 {
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&self.0[..32]);
        Hash256(bytes)
    }

    pub fn index(&self) -> u32 {
        u32::from_le_bytes([self.0[32], self.0[33], self.0[34], self.0[35]])
    }

    pub fn is_null(&self) -> bool {
        self.txid().is_zero() && self.index() == u32::MAX
    }

    pub fn as_bytes(&self) -> &[u8; OUTPOINT_LEN] {
        &self.0
    }
}

impl fmt::Debug for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OutPoint({self})")
    }
}

impl fmt::Display for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.txid(), self.index())
    }
}

/// A transaction input.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxIn {
    pub outpoint: OutPoint,
    pub script: Vec<u8>,
    pub sequence: u32,
}

/// A transaction output. The amount is kept as its raw 8 wire bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxOut {
    pub value: [u8; 8],
    pub script: Vec<u8>,
}

impl TxOut {
    pub fn new(amount: u64, script: Vec<u8>) -> Self {
        Self {
            value: amount.to_le_bytes(),
            script,
        }
    }

    /// Output amount in base units.
    pub fn amount(&self) -> u64 {
        u64::from_le_bytes(self.value)
    }
}

/// A decoded transaction together with its exact serialized bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transaction {
    pub version: u32,
    pub ins: Vec<TxIn>,
    pub outs: Vec<TxOut>,
    pub lock_time: u32,
    /// The bytes this transaction was decoded from; its identity hash covers these.
    pub raw: Vec<u8>,
    /// Addresses this transaction touches, filled in by the caller before
    /// connecting it. Not part of the wire encoding.
    pub affects: Vec<AddressHash>,
}

impl Transaction {
    /// Build a transaction from its fields, serializing to obtain `raw`.
    pub fn new(version: u32, ins: Vec<TxIn>, outs: Vec<TxOut>, lock_time: u32) -> Self {
        let mut tx = Self {
            version,
            ins,
            outs,
            lock_time,
            raw: Vec::new(),
            affects: Vec::new(),
        };
        let mut raw = Vec::new();
        codec::write_transaction_fields(&mut raw, &tx);
        tx.raw = raw;
        tx
    }

    /// Identity hash: double hash of the canonical bytes.
    pub fn hash(&self, crypto: &dyn CryptoProvider) -> Hash256 {
        crypto.double_hash(&self.raw)
    }

    /// A coinbase has a single synthetic input that spends nothing.
    pub fn is_coinbase(&self) -> bool {
        self.ins.len() == 1 && self.ins[0].outpoint.is_null()
    }

    /// Outpoints spent by this transaction (empty for a coinbase).
    pub fn spent_outpoints(&self) -> Vec<OutPoint> {
        if self.is_coinbase() {
            return Vec::new();
        }
        self.ins.iter().map(|input| input.outpoint).collect()
    }
}

/// The fixed 80-byte block header.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct BlockHeader {
    pub version: u32,
    pub prev_hash: Hash256,
    pub merkle_root: Hash256,
    pub timestamp: u32,
    pub bits: u32,
    pub nonce: u32,
}

impl BlockHeader {
    /// Wire layout: version || prev_hash || merkle_root || timestamp || bits || nonce.
    pub fn to_bytes(&self) -> [u8; BLOCK_HEADER_LEN] {
        let mut out = [0u8; BLOCK_HEADER_LEN];
        out[0..4].copy_from_slice(&self.version.to_le_bytes());
        out[4..36].copy_from_slice(self.prev_hash.as_bytes());
        out[36..68].copy_from_slice(self.merkle_root.as_bytes());
        out[68..72].copy_from_slice(&self.timestamp.to_le_bytes());
        out[72..76].copy_from_slice(&self.bits.to_le_bytes());
        out[76..80].copy_from_slice(&self.nonce.to_le_bytes());
        out
    }

    pub fn hash(&self, crypto: &dyn CryptoProvider) -> Hash256 {
        crypto.double_hash(&self.to_bytes())
    }
}

/// A stored block: header plus chain placement and the hashes of its transactions.
///
/// `height` and `active` are assigned by the caller at save time and never
/// change afterwards.
#[derive(Clone, Debug, PartialEq, Eq, bincode::Encode, bincode::Decode)]
pub struct Block {
    pub header: BlockHeader,
    pub height: u32,
    /// Serialized size of the full block message.
    pub size: u32,
    /// Whether the block is on the canonical chain.
    pub active: bool,
    /// Accumulated proof-of-work as big-endian bytes.
    pub chain_work: Vec<u8>,
    pub txs: Vec<Hash256>,
}

impl Block {
    pub fn hash(&self, crypto: &dyn CryptoProvider) -> Hash256 {
        self.header.hash(crypto)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Sha256d;

    fn sample_header() -> BlockHeader {
        BlockHeader {
            version: 1,
            prev_hash: Hash256([0x11; 32]),
            merkle_root: Hash256([0x22; 32]),
            timestamp: 1_231_006_505,
            bits: 0x1d00_ffff,
            nonce: 2_083_236_893,
        }
    }

    #[test]
    fn hash256_from_slice_requires_32_bytes() {
        assert_eq!(Hash256::from_slice(&[7u8; 32]), Some(Hash256([7; 32])));
        assert_eq!(Hash256::from_slice(&[7u8; 31]), None);
    }

    #[test]
    fn hash256_display_hex() {
        let s = Hash256([0xAB; 32]).to_string();
        assert_eq!(s.len(), 64);
        assert_eq!(&s[..4], "abab");
    }

    #[test]
    fn outpoint_layout() {
        let op = OutPoint::new(Hash256([0x33; 32]), 0x0102_0304);
        assert_eq!(&op.as_bytes()[..32], &[0x33; 32]);
        assert_eq!(&op.as_bytes()[32..], &[0x04, 0x03, 0x02, 0x01]);
        assert_eq!(op.txid(), Hash256([0x33; 32]));
        assert_eq!(op.index(), 0x0102_0304);
        assert!(!op.is_null());
        assert!(OutPoint::null().is_null());
    }

    #[test]
    fn coinbase_detection() {
        let coinbase = Transaction::new(
            1,
            vec![TxIn { outpoint: OutPoint::null(), script: vec![4, 1, 2, 3, 4], sequence: u32::MAX }],
            vec![TxOut::new(50, vec![])],
            0,
        );
        assert!(coinbase.is_coinbase());
        assert!(coinbase.spent_outpoints().is_empty());

        let spend = Transaction::new(
            1,
            vec![TxIn { outpoint: OutPoint::new(Hash256([1; 32]), 0), script: vec![], sequence: 0 }],
            vec![TxOut::new(50, vec![])],
            0,
        );
        assert!(!spend.is_coinbase());
        assert_eq!(spend.spent_outpoints(), vec![OutPoint::new(Hash256([1; 32]), 0)]);
    }

    #[test]
    fn txout_amount_roundtrip() {
        let out = TxOut::new(5_000_000_000, vec![0x51]);
        assert_eq!(out.amount(), 5_000_000_000);
        assert_eq!(out.value, 5_000_000_000u64.to_le_bytes());
    }

    #[test]
    fn header_bytes_layout() {
        let bytes = sample_header().to_bytes();
        assert_eq!(bytes.len(), 80);
        assert_eq!(&bytes[0..4], &1u32.to_le_bytes());
        assert_eq!(&bytes[4..36], &[0x11; 32]);
        assert_eq!(&bytes[36..68], &[0x22; 32]);
        assert_eq!(&bytes[76..80], &2_083_236_893u32.to_le_bytes());
    }

    #[test]
    fn block_hash_is_header_hash() {
        let block = Block {
            header: sample_header(),
            height: 5,
            size: 285,
            active: true,
            chain_work: vec![0, 1],
            txs: vec![Hash256([9; 32])],
        };
        let crypto = Sha256d;
        assert_eq!(block.hash(&crypto), sample_header().hash(&crypto));
        assert_eq!(block.hash(&crypto), crypto.double_hash(&sample_header().to_bytes()));
    }

    #[test]
    fn transaction_hash_covers_raw_bytes() {
        let crypto = Sha256d;
        let tx = Transaction::new(1, vec![], vec![TxOut::new(1, vec![0x51])], 0);
        assert_eq!(tx.hash(&crypto), crypto.double_hash(&tx.raw));
    }
}
