//! Typed P2P messages and their payload encodings.
//!
//! Each known command maps to one [`Message`] variant. Inbound payloads for
//! commands without a decoder come back as [`Message::Unknown`], which the
//! session discards.

use strand_core::codec::{
    read_block_header, read_count, read_hash, read_transaction, read_varint, read_varstr,
    write_varint, write_varstr,
};
use strand_core::constants::{BIP0031_VERSION, BLOCK_HEADER_LEN, MAX_ADDR_PER_MESSAGE, MSG_BLOCK, MSG_TX, VERSION_ADDR_LEN};
use strand_core::cursor::Cursor;
use strand_core::error::{NetworkError, ParseError};
use strand_core::types::{BlockHeader, Hash256, Transaction};

/// Payload of a `version` message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionMessage {
    pub version: u32,
    pub services: u64,
    pub timestamp: u64,
    pub addr_me: [u8; VERSION_ADDR_LEN],
    pub addr_you: [u8; VERSION_ADDR_LEN],
    pub nonce: [u8; 8],
    pub subversion: Vec<u8>,
    pub start_height: u32,
}

/// One inventory vector entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvItem {
    pub kind: u32,
    pub hash: Hash256,
}

impl InvItem {
    pub fn tx(hash: Hash256) -> Self {
        Self { kind: MSG_TX, hash }
    }

    pub fn block(hash: Hash256) -> Self {
        Self { kind: MSG_BLOCK, hash }
    }
}

/// Payload of `getblocks` / `getheaders`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockLocator {
    pub version: u32,
    pub starts: Vec<Hash256>,
    pub stop: Hash256,
}

/// One `addr` entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddrEntry {
    pub time: u32,
    pub services: u64,
    pub ip: [u8; 16],
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertMessage {
    pub payload: Vec<u8>,
    pub signature: Vec<u8>,
}

/// Payload of a `block` message: header, full transactions, and payload size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockMessage {
    pub header: BlockHeader,
    pub txs: Vec<Transaction>,
    pub size: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Version(VersionMessage),
    Verack,
    GetAddr,
    /// Nonce is present only when the negotiated version is above BIP 31.
    Ping(Option<[u8; 8]>),
    /// Outbound only; inbound `pong` has no decoder.
    Pong([u8; 8]),
    Inv(Vec<InvItem>),
    GetData(Vec<InvItem>),
    GetBlocks(BlockLocator),
    GetHeaders(BlockLocator),
    /// Outbound only; inbound `headers` has no decoder.
    Headers(Vec<BlockHeader>),
    Addr(Vec<AddrEntry>),
    Alert(AlertMessage),
    Block(BlockMessage),
    Tx(Transaction),
    /// A command with no decoder. Callers discard it.
    Unknown { command: String },
}

impl Message {
    /// Wire command name.
    pub fn command(&self) -> &str {
        match self {
            Message::Version(_) => "version",
            Message::Verack => "verack",
            Message::GetAddr => "getaddr",
            Message::Ping(_) => "ping",
            Message::Pong(_) => "pong",
            Message::Inv(_) => "inv",
            Message::GetData(_) => "getdata",
            Message::GetBlocks(_) => "getblocks",
            Message::GetHeaders(_) => "getheaders",
            Message::Headers(_) => "headers",
            Message::Addr(_) => "addr",
            Message::Alert(_) => "alert",
            Message::Block(_) => "block",
            Message::Tx(_) => "tx",
            Message::Unknown { command } => command,
        }
    }

    /// Decode a payload for `command`, interpreting it at `recv_version`.
    pub fn decode(command: &str, payload: &[u8], recv_version: u32) -> Result<Self, NetworkError> {
        Self::decode_payload(command, payload, recv_version)
            .map_err(|e| NetworkError::malformed(command, e))
    }

    fn decode_payload(command: &str, payload: &[u8], recv_version: u32) -> Result<Self, ParseError> {
        let mut c = Cursor::new(payload);
        let msg = match command {
            "version" => Message::Version(VersionMessage {
                version: c.read_u32_le()?,
                services: c.read_u64_le()?,
                timestamp: c.read_u64_le()?,
                addr_me: c.read_array()?,
                addr_you: c.read_array()?,
                nonce: c.read_array()?,
                subversion: read_varstr(&mut c)?.to_vec(),
                start_height: c.read_u32_le()?,
            }),
            "verack" => Message::Verack,
            "getaddr" => Message::GetAddr,
            "ping" => {
                if recv_version > BIP0031_VERSION {
                    Message::Ping(Some(c.read_array()?))
                } else {
                    Message::Ping(None)
                }
            }
            "inv" => Message::Inv(read_inv(&mut c)?),
            "getdata" => Message::GetData(read_inv(&mut c)?),
            "getblocks" => Message::GetBlocks(read_locator(&mut c)?),
            "getheaders" => Message::GetHeaders(read_locator(&mut c)?),
            "addr" => Message::Addr(read_addr(&mut c)?),
            "alert" => Message::Alert(AlertMessage {
                payload: read_varstr(&mut c)?.to_vec(),
                signature: read_varstr(&mut c)?.to_vec(),
            }),
            "block" => {
                let header = read_block_header(&mut c)?;
                let count = read_count(&mut c, 10)?;
                let mut txs = Vec::with_capacity(count);
                for _ in 0..count {
                    txs.push(read_transaction(&mut c)?);
                }
                Message::Block(BlockMessage {
                    header,
                    txs,
                    size: payload.len(),
                })
            }
            "tx" => Message::Tx(read_transaction(&mut c)?),
            other => Message::Unknown {
                command: other.to_string(),
            },
        };
        Ok(msg)
    }

    /// Serialize the payload. Framing and checksums are added by the caller.
    pub fn encode_payload(&self) -> Vec<u8> {
        let mut out = Vec::new();
        match self {
            Message::Version(v) => {
                out.extend_from_slice(&v.version.to_le_bytes());
                out.extend_from_slice(&v.services.to_le_bytes());
                out.extend_from_slice(&v.timestamp.to_le_bytes());
                out.extend_from_slice(&v.addr_me);
                out.extend_from_slice(&v.addr_you);
                out.extend_from_slice(&v.nonce);
                write_varstr(&mut out, &v.subversion);
                out.extend_from_slice(&v.start_height.to_le_bytes());
            }
            Message::Verack | Message::GetAddr | Message::Unknown { .. } => {}
            Message::Ping(nonce) => {
                if let Some(nonce) = nonce {
                    out.extend_from_slice(nonce);
                }
            }
            Message::Pong(nonce) => out.extend_from_slice(nonce),
            Message::Inv(items) | Message::GetData(items) => {
                write_varint(&mut out, items.len() as u64);
                for item in items {
                    out.extend_from_slice(&item.kind.to_le_bytes());
                    out.extend_from_slice(item.hash.as_bytes());
                }
            }
            Message::GetBlocks(locator) | Message::GetHeaders(locator) => {
                out.extend_from_slice(&locator.version.to_le_bytes());
                write_varint(&mut out, locator.starts.len() as u64);
                for hash in &locator.starts {
                    out.extend_from_slice(hash.as_bytes());
                }
                out.extend_from_slice(locator.stop.as_bytes());
            }
            Message::Headers(headers) => {
                write_varint(&mut out, headers.len() as u64);
                for header in headers {
                    out.extend_from_slice(&header.to_bytes());
                    // no transactions follow a bare header
                    out.push(0);
                }
            }
            Message::Addr(entries) => {
                write_varint(&mut out, entries.len() as u64);
                for entry in entries {
                    out.extend_from_slice(&entry.time.to_le_bytes());
                    out.extend_from_slice(&entry.services.to_le_bytes());
                    out.extend_from_slice(&entry.ip);
                    out.extend_from_slice(&entry.port.to_be_bytes());
                }
            }
            Message::Alert(alert) => {
                write_varstr(&mut out, &alert.payload);
                write_varstr(&mut out, &alert.signature);
            }
            Message::Block(block) => {
                out.extend_from_slice(&block.header.to_bytes());
                write_varint(&mut out, block.txs.len() as u64);
                for tx in &block.txs {
                    out.extend_from_slice(&tx.raw);
                }
            }
            Message::Tx(tx) => out.extend_from_slice(&tx.raw),
        }
        out
    }
}

fn read_inv(c: &mut Cursor<'_>) -> Result<Vec<InvItem>, ParseError> {
    let count = read_count(c, 36)?;
    let mut items = Vec::with_capacity(count);
    for _ in 0..count {
        items.push(InvItem {
            kind: c.read_u32_le()?,
            hash: read_hash(c)?,
        });
    }
    Ok(items)
}

fn read_locator(c: &mut Cursor<'_>) -> Result<BlockLocator, ParseError> {
    let version = c.read_u32_le()?;
    let count = read_count(c, 32)?;
    let mut starts = Vec::with_capacity(count);
    for _ in 0..count {
        starts.push(read_hash(c)?);
    }
    let stop = read_hash(c)?;
    Ok(BlockLocator {
        version,
        starts,
        stop,
    })
}

fn read_addr(c: &mut Cursor<'_>) -> Result<Vec<AddrEntry>, ParseError> {
    // Entries past the cap are left unread rather than rejected.
    let count = usize::try_from(read_varint(c)?)
        .unwrap_or(usize::MAX)
        .min(MAX_ADDR_PER_MESSAGE);
    let mut entries = Vec::with_capacity(count.min(c.remaining() / 30));
    for _ in 0..count {
        entries.push(AddrEntry {
            time: c.read_u32_le()?,
            services: c.read_u64_le()?,
            ip: c.read_array()?,
            port: c.read_u16_be()?,
        });
    }
    Ok(entries)
}

/// Serialized size of a header as carried by `headers`.
pub const HEADERS_ENTRY_LEN: usize = BLOCK_HEADER_LEN + 1;

#[cfg(test)]
mod tests {
    use super::*;
    use strand_core::constants::PROTOCOL_VERSION;
    use strand_core::types::{OutPoint, TxIn, TxOut};

    fn sample_version() -> VersionMessage {
        VersionMessage {
            version: 60002,
            services: 1,
            timestamp: 1_355_000_000,
            addr_me: [0; 26],
            addr_you: [1; 26],
            nonce: [9, 8, 7, 6, 5, 4, 3, 2],
            subversion: b"/Satoshi:0.7.2/".to_vec(),
            start_height: 212_000,
        }
    }

    fn sample_tx(seed: u8) -> Transaction {
        Transaction::new(
            1,
            vec![TxIn {
                outpoint: OutPoint::new(Hash256([seed; 32]), 1),
                script: vec![seed; 10],
                sequence: u32::MAX,
            }],
            vec![TxOut::new(1000, vec![0x51])],
            0,
        )
    }

    fn roundtrip(msg: &Message) -> Message {
        Message::decode(msg.command(), &msg.encode_payload(), PROTOCOL_VERSION).unwrap()
    }

    #[test]
    fn version_payload_layout() {
        let payload = Message::Version(sample_version()).encode_payload();
        assert_eq!(&payload[0..4], &60002u32.to_le_bytes());
        assert_eq!(&payload[72..80], &[9, 8, 7, 6, 5, 4, 3, 2]);
        assert_eq!(payload[80] as usize, b"/Satoshi:0.7.2/".len());
        assert_eq!(roundtrip(&Message::Version(sample_version())), Message::Version(sample_version()));
    }

    #[test]
    fn truncated_version_is_malformed() {
        let payload = Message::Version(sample_version()).encode_payload();
        let err = Message::decode("version", &payload[..50], PROTOCOL_VERSION).unwrap_err();
        assert!(matches!(err, NetworkError::MalformedMessage { ref command, .. } if command == "version"));
    }

    #[test]
    fn empty_commands() {
        assert_eq!(Message::decode("verack", &[], 0).unwrap(), Message::Verack);
        assert_eq!(Message::decode("getaddr", &[], 0).unwrap(), Message::GetAddr);
        assert!(Message::Verack.encode_payload().is_empty());
    }

    #[test]
    fn ping_nonce_depends_on_version() {
        let nonce = [1, 2, 3, 4, 5, 6, 7, 8];
        assert_eq!(Message::decode("ping", &nonce, 60001).unwrap(), Message::Ping(Some(nonce)));
        assert_eq!(Message::decode("ping", &nonce, 60000).unwrap(), Message::Ping(None));
        assert_eq!(Message::decode("ping", &[], 209).unwrap(), Message::Ping(None));
        assert!(Message::decode("ping", &[], 60001).is_err());
    }

    #[test]
    fn inv_and_getdata() {
        let items = vec![InvItem::tx(Hash256([1; 32])), InvItem::block(Hash256([2; 32]))];
        let payload = Message::Inv(items.clone()).encode_payload();
        assert_eq!(payload.len(), 1 + 2 * 36);
        assert_eq!(roundtrip(&Message::Inv(items.clone())), Message::Inv(items.clone()));
        assert_eq!(roundtrip(&Message::GetData(items.clone())), Message::GetData(items));
    }

    #[test]
    fn inv_count_larger_than_payload_rejected() {
        let payload = [0xFD, 0xFF, 0xFF, 0, 0, 0, 0];
        assert!(Message::decode("inv", &payload, PROTOCOL_VERSION).is_err());
    }

    #[test]
    fn getblocks_locator() {
        let locator = BlockLocator {
            version: 60002,
            starts: vec![Hash256([3; 32]), Hash256([4; 32])],
            stop: Hash256::ZERO,
        };
        let payload = Message::GetBlocks(locator.clone()).encode_payload();
        assert_eq!(payload.len(), 4 + 1 + 64 + 32);
        assert_eq!(roundtrip(&Message::GetBlocks(locator.clone())), Message::GetBlocks(locator.clone()));
        assert_eq!(roundtrip(&Message::GetHeaders(locator.clone())), Message::GetHeaders(locator));
    }

    #[test]
    fn addr_port_is_big_endian() {
        let entry = AddrEntry {
            time: 1_355_000_000,
            services: 1,
            ip: [0xAB; 16],
            port: 8333,
        };
        let payload = Message::Addr(vec![entry]).encode_payload();
        assert_eq!(&payload[payload.len() - 2..], &8333u16.to_be_bytes());
        assert_eq!(roundtrip(&Message::Addr(vec![entry])), Message::Addr(vec![entry]));
    }

    #[test]
    fn addr_caps_entries_at_limit() {
        let entry = AddrEntry { time: 1, services: 1, ip: [1; 16], port: 1 };
        let entries = vec![entry; MAX_ADDR_PER_MESSAGE + 5];
        let payload = Message::Addr(entries).encode_payload();
        match Message::decode("addr", &payload, PROTOCOL_VERSION).unwrap() {
            Message::Addr(decoded) => assert_eq!(decoded.len(), MAX_ADDR_PER_MESSAGE),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn alert_varstrs() {
        let alert = AlertMessage { payload: vec![1, 2, 3], signature: vec![4; 70] };
        assert_eq!(roundtrip(&Message::Alert(alert.clone())), Message::Alert(alert));
    }

    #[test]
    fn block_carries_transactions_and_size() {
        let header = BlockHeader {
            version: 1,
            prev_hash: Hash256([5; 32]),
            merkle_root: Hash256([6; 32]),
            timestamp: 1_300_000_000,
            bits: 0x1d00_ffff,
            nonce: 77,
        };
        let txs = vec![sample_tx(1), sample_tx(2)];
        let msg = Message::Block(BlockMessage { header: header.clone(), txs: txs.clone(), size: 0 });
        let payload = msg.encode_payload();
        match Message::decode("block", &payload, PROTOCOL_VERSION).unwrap() {
            Message::Block(block) => {
                assert_eq!(block.header, header);
                assert_eq!(block.txs, txs);
                assert_eq!(block.size, payload.len());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn tx_payload_is_raw_bytes() {
        let tx = sample_tx(3);
        assert_eq!(Message::Tx(tx.clone()).encode_payload(), tx.raw);
        assert_eq!(roundtrip(&Message::Tx(tx.clone())), Message::Tx(tx));
    }

    #[test]
    fn headers_entries_have_zero_tx_count() {
        let header = BlockHeader {
            version: 1,
            prev_hash: Hash256::ZERO,
            merkle_root: Hash256::ZERO,
            timestamp: 0,
            bits: 0,
            nonce: 0,
        };
        let payload = Message::Headers(vec![header.clone(), header]).encode_payload();
        assert_eq!(payload.len(), 1 + 2 * HEADERS_ENTRY_LEN);
        assert_eq!(payload[HEADERS_ENTRY_LEN], 0);
    }

    #[test]
    fn unknown_and_outbound_only_commands_have_no_decoder() {
        for command in ["pong", "headers", "mempool", "sendheaders"] {
            assert_eq!(
                Message::decode(command, &[1, 2, 3], PROTOCOL_VERSION).unwrap(),
                Message::Unknown { command: command.to_string() }
            );
        }
    }
}
