//! Address extraction from standard script templates.
//!
//! Only recognises the forms needed to populate the address index:
//! pay-to-pubkey-hash and pay-to-pubkey outputs, and the trailing public key
//! pushed by a pay-to-pubkey-hash spend. Anything else contributes no address.

use crate::crypto::CryptoProvider;
use crate::types::{AddressHash, Transaction};

const OP_DUP: u8 = 0x76;
const OP_HASH160: u8 = 0xA9;
const OP_EQUALVERIFY: u8 = 0x88;
const OP_CHECKSIG: u8 = 0xAC;
const OP_PUSHDATA1: u8 = 0x4C;
const OP_PUSHDATA2: u8 = 0x4D;

fn is_pubkey(bytes: &[u8]) -> bool {
    matches!(
        (bytes.len(), bytes.first()),
        (33, Some(0x02 | 0x03)) | (65, Some(0x04))
    )
}

/// Address hash paid by an output script, if it follows a known template.
pub fn output_address(script: &[u8], crypto: &dyn CryptoProvider) -> Option<AddressHash> {
    match script {
        [OP_DUP, OP_HASH160, 0x14, hash @ .., OP_EQUALVERIFY, OP_CHECKSIG] if hash.len() == 20 => {
            let mut out = [0u8; 20];
            out.copy_from_slice(hash);
            Some(AddressHash(out))
        }
        [len, key @ .., OP_CHECKSIG] if usize::from(*len) == key.len() && is_pubkey(key) => {
            Some(crypto.address_hash(key))
        }
        _ => None,
    }
}

/// Split a script into its data pushes. Returns `None` on a non-push opcode
/// or a truncated push.
fn pushes(script: &[u8]) -> Option<Vec<&[u8]>> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < script.len() {
        let op = script[i];
        i += 1;
        let len = match op {
            0x01..=0x4B => usize::from(op),
            OP_PUSHDATA1 => {
                let n = usize::from(*script.get(i)?);
                i += 1;
                n
            }
            OP_PUSHDATA2 => {
                let n = u16::from_le_bytes([*script.get(i)?, *script.get(i + 1)?]);
                i += 2;
                usize::from(n)
            }
            _ => return None,
        };
        out.push(script.get(i..i + len)?);
        i += len;
    }
    Some(out)
}

/// Address of the key that signed an input, if its script is `<sig> <pubkey>`.
pub fn input_address(script: &[u8], crypto: &dyn CryptoProvider) -> Option<AddressHash> {
    let pushes = pushes(script)?;
    match pushes.as_slice() {
        [_sig, key] if is_pubkey(key) => Some(crypto.address_hash(key)),
        _ => None,
    }
}

/// Every distinct address a transaction pays to or spends from, in first-seen order.
pub fn affected_addresses(tx: &Transaction, crypto: &dyn CryptoProvider) -> Vec<AddressHash> {
    let mut found = Vec::new();
    let inputs = if tx.is_coinbase() { &tx.ins[..0] } else { &tx.ins[..] };
    let from_inputs = inputs.iter().filter_map(|i| input_address(&i.script, crypto));
    let from_outputs = tx.outs.iter().filter_map(|o| output_address(&o.script, crypto));
    for addr in from_inputs.chain(from_outputs) {
        if !found.contains(&addr) {
            found.push(addr);
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Sha256d;
    use crate::types::{Hash256, OutPoint, TxIn, TxOut};

    fn p2pkh(hash: [u8; 20]) -> Vec<u8> {
        let mut s = vec![OP_DUP, OP_HASH160, 0x14];
        s.extend_from_slice(&hash);
        s.extend_from_slice(&[OP_EQUALVERIFY, OP_CHECKSIG]);
        s
    }

    fn compressed_key(seed: u8) -> Vec<u8> {
        let mut k = vec![0x02];
        k.extend_from_slice(&[seed; 32]);
        k
    }

    #[test]
    fn p2pkh_output_yields_embedded_hash() {
        let addr = output_address(&p2pkh([7; 20]), &Sha256d).unwrap();
        assert_eq!(addr, AddressHash([7; 20]));
    }

    #[test]
    fn p2pk_output_hashes_key() {
        let key = compressed_key(9);
        let mut script = vec![33];
        script.extend_from_slice(&key);
        script.push(OP_CHECKSIG);
        assert_eq!(output_address(&script, &Sha256d), Some(Sha256d.address_hash(&key)));
    }

    #[test]
    fn unknown_output_template_ignored() {
        assert_eq!(output_address(&[0x6A, 0x04, 1, 2, 3, 4], &Sha256d), None);
        assert_eq!(output_address(&[], &Sha256d), None);
    }

    #[test]
    fn p2pkh_spend_yields_signer_address() {
        let key = compressed_key(5);
        let mut script = vec![71];
        script.extend_from_slice(&[0x30; 71]);
        script.push(33);
        script.extend_from_slice(&key);
        assert_eq!(input_address(&script, &Sha256d), Some(Sha256d.address_hash(&key)));
    }

    #[test]
    fn truncated_push_ignored() {
        assert_eq!(input_address(&[0x30, 1, 2], &Sha256d), None);
    }

    #[test]
    fn affected_addresses_dedupes_and_skips_coinbase_inputs() {
        let tx = Transaction::new(
            1,
            vec![TxIn { outpoint: OutPoint::new(Hash256([1; 32]), 0), script: vec![], sequence: 0 }],
            vec![TxOut::new(1, p2pkh([3; 20])), TxOut::new(2, p2pkh([3; 20])), TxOut::new(3, p2pkh([4; 20]))],
            0,
        );
        assert_eq!(
            affected_addresses(&tx, &Sha256d),
            vec![AddressHash([3; 20]), AddressHash([4; 20])]
        );

        let key = compressed_key(1);
        let mut sig_script = vec![2, 0xAA, 0xBB, 33];
        sig_script.extend_from_slice(&key);
        let coinbase = Transaction::new(
            1,
            vec![TxIn { outpoint: OutPoint::null(), script: sig_script, sequence: 0 }],
            vec![TxOut::new(50, p2pkh([8; 20]))],
            0,
        );
        assert_eq!(affected_addresses(&coinbase, &Sha256d), vec![AddressHash([8; 20])]);
    }
}
