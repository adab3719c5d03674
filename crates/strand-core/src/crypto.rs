//! Hashing capability consumed by the codec, session, and store.
//!
//! Nothing in Strand computes digests directly; every checksum and identity
//! hash goes through a [`CryptoProvider`]. [`Sha256d`] is the Bitcoin-compatible
//! default.

use ripemd::Ripemd160;
use sha2::{Digest, Sha256};

use crate::types::{AddressHash, Hash256};

/// Pluggable digest and address-derivation primitives.
pub trait CryptoProvider: Send + Sync {
    /// Deterministic 32-byte double hash of `data`.
    fn double_hash(&self, data: &[u8]) -> Hash256;

    /// Derive the 20-byte address hash for a public key.
    fn address_hash(&self, public_key: &[u8]) -> AddressHash;

    /// Message checksum: the first four bytes of the double hash.
    fn checksum(&self, data: &[u8]) -> [u8; 4] {
        let digest = self.double_hash(data);
        let mut out = [0u8; 4];
        out.copy_from_slice(&digest.as_bytes()[..4]);
        out
    }
}

/// Double SHA-256 digests and HASH160 addresses.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256d;

impl CryptoProvider for Sha256d {
    fn double_hash(&self, data: &[u8]) -> Hash256 {
        let first = Sha256::digest(data);
        Hash256(Sha256::digest(first).into())
    }

    fn address_hash(&self, public_key: &[u8]) -> AddressHash {
        let sha = Sha256::digest(public_key);
        AddressHash(Ripemd160::digest(sha).into())
    }
}
