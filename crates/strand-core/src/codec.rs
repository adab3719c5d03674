//! Wire encodings shared by several message types.
//!
//! - Varint: `0x00..=0xFC` literal, `0xFD` + u16, `0xFE` + u32, `0xFF` + u64 (all LE).
//! - Varstr: varint length followed by that many raw bytes.
//! - Transaction: version, inputs, outputs, lock time; the consumed byte range
//!   is kept as the transaction's canonical serialization.
//! - Block header: fixed 80 bytes.

use crate::constants::{BLOCK_HEADER_LEN, OUTPOINT_LEN};
use crate::cursor::Cursor;
use crate::error::ParseError;
use crate::types::{BlockHeader, Hash256, OutPoint, Transaction, TxIn, TxOut};

/// Smallest encoded input: outpoint + 1-byte script length + sequence.
const MIN_TXIN_LEN: usize = OUTPOINT_LEN + 1 + 4;
/// Smallest encoded output: value + 1-byte script length.
const MIN_TXOUT_LEN: usize = 8 + 1;

pub fn read_varint(c: &mut Cursor<'_>) -> Result<u64, ParseError> {
    match c.read_u8()? {
        0xFD => Ok(u64::from(c.read_u16_le()?)),
        0xFE => Ok(u64::from(c.read_u32_le()?)),
        0xFF => c.read_u64_le(),
        n => Ok(u64::from(n)),
    }
}

/// Read a varint that sizes something in memory.
pub fn read_len(c: &mut Cursor<'_>) -> Result<usize, ParseError> {
    let n = read_varint(c)?;
    usize::try_from(n).map_err(|_| ParseError::ValueTooLarge(n))
}

/// Read an element count and reject it early if `count` items of at least
/// `min_item_len` bytes cannot fit in what remains.
pub fn read_count(c: &mut Cursor<'_>, min_item_len: usize) -> Result<usize, ParseError> {
    let count = read_len(c)?;
    let needed = count
        .checked_mul(min_item_len)
        .ok_or(ParseError::ValueTooLarge(count as u64))?;
    if needed > c.remaining() {
        return Err(ParseError::OutOfBounds {
            needed,
            remaining: c.remaining(),
        });
    }
    Ok(count)
}

pub fn read_varstr<'a>(c: &mut Cursor<'a>) -> Result<&'a [u8], ParseError> {
    let len = read_len(c)?;
    c.read(len)
}

pub fn read_hash(c: &mut Cursor<'_>) -> Result<Hash256, ParseError> {
    Ok(Hash256(c.read_array()?))
}

pub fn write_varint(out: &mut Vec<u8>, n: u64) {
    match n {
        0..=0xFC => out.push(n as u8),
        0xFD..=0xFFFF => {
            out.push(0xFD);
            out.extend_from_slice(&(n as u16).to_le_bytes());
        }
        0x1_0000..=0xFFFF_FFFF => {
            out.push(0xFE);
            out.extend_from_slice(&(n as u32).to_le_bytes());
        }
        _ => {
            out.push(0xFF);
            out.extend_from_slice(&n.to_le_bytes());
        }
    }
}

pub fn write_varstr(out: &mut Vec<u8>, bytes: &[u8]) {
    write_varint(out, bytes.len() as u64);
    out.extend_from_slice(bytes);
}

fn read_txin(c: &mut Cursor<'_>) -> Result<TxIn, ParseError> {
    let outpoint = OutPoint(c.read_array()?);
    let script = read_varstr(c)?.to_vec();
    let sequence = c.read_u32_le()?;
    Ok(TxIn {
        outpoint,
        script,
        sequence,
    })
}

fn read_txout(c: &mut Cursor<'_>) -> Result<TxOut, ParseError> {
    let value = c.read_array()?;
    let script = read_varstr(c)?.to_vec();
    Ok(TxOut { value, script })
}

/// Decode one transaction, retaining the exact bytes consumed.
pub fn read_transaction(c: &mut Cursor<'_>) -> Result<Transaction, ParseError> {
    let start = c.position();

    let version = c.read_u32_le()?;

    let in_count = read_count(c, MIN_TXIN_LEN)?;
    let mut ins = Vec::with_capacity(in_count);
    for _ in 0..in_count {
        ins.push(read_txin(c)?);
    }

    let out_count = read_count(c, MIN_TXOUT_LEN)?;
    let mut outs = Vec::with_capacity(out_count);
    for _ in 0..out_count {
        outs.push(read_txout(c)?);
    }

    let lock_time = c.read_u32_le()?;
    let raw = c.buffer()[start..c.position()].to_vec();

    Ok(Transaction {
        version,
        ins,
        outs,
        lock_time,
        raw,
        affects: Vec::new(),
    })
}

/// Decode a transaction that must span the whole buffer.
pub fn decode_transaction(bytes: &[u8]) -> Result<Transaction, ParseError> {
    read_transaction(&mut Cursor::new(bytes))
}

/// Serialize a transaction from its structured fields (ignores `raw`).
pub fn write_transaction_fields(out: &mut Vec<u8>, tx: &Transaction) {
    out.extend_from_slice(&tx.version.to_le_bytes());
    write_varint(out, tx.ins.len() as u64);
    for input in &tx.ins {
        out.extend_from_slice(input.outpoint.as_bytes());
        write_varstr(out, &input.script);
        out.extend_from_slice(&input.sequence.to_le_bytes());
    }
    write_varint(out, tx.outs.len() as u64);
    for output in &tx.outs {
        out.extend_from_slice(&output.value);
        write_varstr(out, &output.script);
    }
    out.extend_from_slice(&tx.lock_time.to_le_bytes());
}

pub fn read_block_header(c: &mut Cursor<'_>) -> Result<BlockHeader, ParseError> {
    Ok(BlockHeader {
        version: c.read_u32_le()?,
        prev_hash: read_hash(c)?,
        merkle_root: read_hash(c)?,
        timestamp: c.read_u32_le()?,
        bits: c.read_u32_le()?,
        nonce: c.read_u32_le()?,
    })
}

pub fn decode_block_header(bytes: &[u8]) -> Result<BlockHeader, ParseError> {
    if bytes.len() < BLOCK_HEADER_LEN {
        return Err(ParseError::OutOfBounds {
            needed: BLOCK_HEADER_LEN,
            remaining: bytes.len(),
        });
    }
    read_block_header(&mut Cursor::new(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn varint_bytes(n: u64) -> Vec<u8> {
        let mut out = Vec::new();
        write_varint(&mut out, n);
        out
    }

    fn sample_tx() -> Transaction {
        Transaction::new(
            1,
            vec![
                TxIn {
                    outpoint: OutPoint::new(Hash256([0xAA; 32]), 3),
                    script: vec![0x48; 72],
                    sequence: u32::MAX,
                },
                TxIn {
                    outpoint: OutPoint::new(Hash256([0xBB; 32]), 0),
                    script: vec![],
                    sequence: 7,
                },
            ],
            vec![
                TxOut::new(50_000, vec![0x76, 0xA9, 0x14]),
                TxOut::new(1, vec![0x51; 300]),
            ],
            500_000,
        )
    }

    #[test]
    fn varint_boundaries_use_minimal_prefix() {
        assert_eq!(varint_bytes(0), vec![0x00]);
        assert_eq!(varint_bytes(0xFC), vec![0xFC]);
        assert_eq!(varint_bytes(0xFD), vec![0xFD, 0xFD, 0x00]);
        assert_eq!(varint_bytes(0xFFFF), vec![0xFD, 0xFF, 0xFF]);
        assert_eq!(varint_bytes(0x1_0000), vec![0xFE, 0x00, 0x00, 0x01, 0x00]);
        assert_eq!(varint_bytes(0xFFFF_FFFF).len(), 5);
        assert_eq!(varint_bytes(0x1_0000_0000).len(), 9);
        assert_eq!(varint_bytes(u64::MAX)[0], 0xFF);
    }

    #[test]
    fn varint_truncated_fails() {
        let mut c = Cursor::new(&[0xFE, 0x01, 0x02]);
        assert!(matches!(read_varint(&mut c), Err(ParseError::OutOfBounds { .. })));
    }

    #[test]
    fn varstr_reads_length_prefixed_bytes() {
        let mut out = Vec::new();
        write_varstr(&mut out, b"/Satoshi:0.7.2/");
        let mut c = Cursor::new(&out);
        assert_eq!(read_varstr(&mut c).unwrap(), b"/Satoshi:0.7.2/");
        assert!(c.at_end());
    }

    #[test]
    fn varstr_length_beyond_buffer_fails() {
        let mut c = Cursor::new(&[0x05, b'a', b'b']);
        assert!(read_varstr(&mut c).is_err());
    }

    #[test]
    fn huge_count_rejected_before_allocation() {
        let mut bytes = 1u32.to_le_bytes().to_vec();
        bytes.push(0xFF);
        bytes.extend_from_slice(&u64::MAX.to_le_bytes());
        let err = decode_transaction(&bytes).unwrap_err();
        assert!(matches!(err, ParseError::ValueTooLarge(_) | ParseError::OutOfBounds { .. }));
    }

    #[test]
    fn transaction_roundtrip_preserves_raw() {
        let tx = sample_tx();
        let decoded = decode_transaction(&tx.raw).unwrap();
        assert_eq!(decoded, tx);
        assert_eq!(decoded.raw, tx.raw);
    }

    #[test]
    fn transaction_raw_is_exact_consumed_range() {
        let tx = sample_tx();
        let mut stream = vec![0xEE, 0xEE];
        stream.extend_from_slice(&tx.raw);
        stream.extend_from_slice(&[0xDD; 5]);

        let mut c = Cursor::new(&stream);
        c.read(2).unwrap();
        let decoded = read_transaction(&mut c).unwrap();
        assert_eq!(decoded.raw, tx.raw);
        assert_eq!(c.remaining(), 5);
    }

    #[test]
    fn block_header_roundtrip() {
        let header = BlockHeader {
            version: 2,
            prev_hash: Hash256([1; 32]),
            merkle_root: Hash256([2; 32]),
            timestamp: 1_350_000_000,
            bits: 0x1a05_db8b,
            nonce: 42,
        };
        assert_eq!(decode_block_header(&header.to_bytes()).unwrap(), header);
        assert!(decode_block_header(&header.to_bytes()[..79]).is_err());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(256))]

        #[test]
        fn varint_roundtrip(n in prop_oneof![
            0u64..=252,
            253u64..=0xFFFF,
            0x1_0000u64..=0xFFFF_FFFF,
            0x1_0000_0000u64..=u64::MAX,
        ]) {
            let bytes = varint_bytes(n);
            let expected_len = match n {
                0..=0xFC => 1,
                0xFD..=0xFFFF => 3,
                0x1_0000..=0xFFFF_FFFF => 5,
                _ => 9,
            };
            prop_assert_eq!(bytes.len(), expected_len);
            let mut c = Cursor::new(&bytes);
            prop_assert_eq!(read_varint(&mut c).unwrap(), n);
            prop_assert!(c.at_end());
        }

        #[test]
        fn transaction_fields_roundtrip(
            version in any::<u32>(),
            lock_time in any::<u32>(),
            ins in prop::collection::vec(
                (any::<[u8; 32]>(), any::<u32>(), prop::collection::vec(any::<u8>(), 0..300), any::<u32>()),
                0..4,
            ),
            outs in prop::collection::vec(
                (any::<u64>(), prop::collection::vec(any::<u8>(), 0..300)),
                0..4,
            ),
        ) {
            let ins = ins
                .into_iter()
                .map(|(h, i, script, sequence)| TxIn { outpoint: OutPoint::new(Hash256(h), i), script, sequence })
                .collect();
            let outs = outs.into_iter().map(|(v, s)| TxOut::new(v, s)).collect();
            let tx = Transaction::new(version, ins, outs, lock_time);
            let decoded = decode_transaction(&tx.raw).unwrap();
            prop_assert_eq!(&decoded, &tx);
        }
    }
}
