//! End-to-end tests over framing and the peer handshake.
//!
//! Sessions talk to each other through in-memory wires, so every byte that
//! crosses between them goes through the real frame encoder and assembler.

use strand_core::constants::{CHECKSUM_VERSION, NetworkType, PROTOCOL_VERSION};
use strand_core::crypto::Sha256d;
use strand_core::error::NetworkError;
use strand_core::types::Hash256;
use strand_network::frame::FrameAssembler;
use strand_network::{InvItem, Message, SessionState, VersionMessage};
use strand_tests::helpers::*;

const MAGIC: [u8; 4] = [0xFA, 0xBF, 0xB5, 0xDA];

fn version_payload(version: u32, nonce: [u8; 8], height: u32) -> Vec<u8> {
    Message::Version(VersionMessage {
        version,
        services: 1,
        timestamp: 1_300_000_000,
        addr_me: [0; 26],
        addr_you: [0; 26],
        nonce,
        subversion: b"/legacy:0.1/".to_vec(),
        start_height: height,
    })
    .encode_payload()
}

// ---------------------------------------------------------------------------
// Framing
// ---------------------------------------------------------------------------

#[test]
fn regtest_magic_matches_network() {
    assert_eq!(NetworkType::Regtest.magic_bytes(), MAGIC);
}

#[test]
fn pre_checksum_verack_leaves_nothing_buffered() {
    let mut asm = FrameAssembler::new(MAGIC, 1_000);
    let bytes = raw_frame(MAGIC, "verack", &[], false);
    assert_eq!(bytes.len(), 20);
    asm.extend(&bytes).unwrap();

    let frame = asm.next_frame(CHECKSUM_VERSION - 1, &Sha256d).unwrap().unwrap();
    assert_eq!(frame.command, "verack");
    assert!(frame.payload.is_empty());
    assert_eq!(asm.buffered(), 0);
    assert!(asm.next_frame(CHECKSUM_VERSION - 1, &Sha256d).is_none());

    let message = Message::decode(&frame.command, &frame.payload, CHECKSUM_VERSION - 1).unwrap();
    assert_eq!(message, Message::Verack);
}

#[test]
fn garbage_before_magic_is_discarded_exactly() {
    for k in [1usize, 3, 4, 17, 200] {
        let mut asm = FrameAssembler::new(MAGIC, 10_000);
        let mut bytes = vec![0x11; k];
        bytes.extend(raw_frame(MAGIC, "getaddr", &[], true));
        // Start of a following frame, not yet complete.
        let tail = &MAGIC[..2];
        bytes.extend_from_slice(tail);
        asm.extend(&bytes).unwrap();

        let frame = asm.next_frame(PROTOCOL_VERSION, &Sha256d).unwrap().unwrap();
        assert_eq!(frame.command, "getaddr", "k = {k}");
        assert_eq!(asm.buffered(), tail.len(), "k = {k}");
    }
}

#[test]
fn garbage_only_keeps_a_possible_magic_prefix() {
    let mut asm = FrameAssembler::new(MAGIC, 1_000);
    let mut bytes = vec![0x22; 40];
    bytes.extend_from_slice(&MAGIC[..3]);
    asm.extend(&bytes).unwrap();
    assert!(asm.next_frame(PROTOCOL_VERSION, &Sha256d).is_none());
    assert_eq!(asm.buffered(), 3);

    // The rest of the frame arrives and completes the straddled magic.
    let frame = raw_frame(MAGIC, "verack", &[], true);
    asm.extend(&frame[3..]).unwrap();
    let frame = asm.next_frame(PROTOCOL_VERSION, &Sha256d).unwrap().unwrap();
    assert_eq!(frame.command, "verack");
    assert_eq!(asm.buffered(), 0);
}

#[test]
fn several_messages_in_one_read_all_surface() {
    let ctx = context([1; 8], 0);
    let (mut s, _wire) = session(ctx, true);
    let mut bytes = raw_frame(MAGIC, "getaddr", &[], true);
    bytes.extend(raw_frame(MAGIC, "getaddr", &[], true));
    bytes.extend(raw_frame(MAGIC, "getaddr", &[], true));
    let messages = s.receive(&bytes).unwrap();
    assert_eq!(messages, vec![Message::GetAddr; 3]);
    assert_eq!(s.buffered(), 0);
}

#[test]
fn checksum_mismatch_drops_only_that_message() {
    let ctx = context([1; 8], 0);
    let (mut s, wire) = session(ctx, true);

    let item = InvItem::block(Hash256([7; 32]));
    let payload = Message::Inv(vec![item]).encode_payload();
    let mut bad = raw_frame(MAGIC, "inv", &payload, true);
    bad[20] ^= 0xFF;
    let mut bytes = bad;
    bytes.extend(raw_frame(MAGIC, "getaddr", &[], true));

    let messages = s.receive(&bytes).unwrap();
    assert_eq!(messages, vec![Message::GetAddr]);
    assert_ne!(s.state(), SessionState::Closed);
    assert!(!wire.is_closed());
}

#[test]
fn malformed_payload_does_not_end_session() {
    let ctx = context([1; 8], 0);
    let (mut s, _wire) = session(ctx, true);

    // Claims two inventory entries but carries one.
    let mut payload = vec![2];
    payload.extend_from_slice(&1u32.to_le_bytes());
    payload.extend_from_slice(&[9; 32]);
    let mut bytes = raw_frame(MAGIC, "inv", &payload, true);
    bytes.extend(raw_frame(MAGIC, "getaddr", &[], true));

    let messages = s.receive(&bytes).unwrap();
    assert_eq!(messages, vec![Message::GetAddr]);
    assert!(s.receive(&raw_frame(MAGIC, "getaddr", &[], true)).is_ok());
}

#[test]
fn unknown_command_is_silently_skipped() {
    let ctx = context([1; 8], 0);
    let (mut s, wire) = session(ctx, true);
    let mut bytes = raw_frame(MAGIC, "mempool", &[], true);
    bytes.extend(raw_frame(MAGIC, "getaddr", &[], true));
    let messages = s.receive(&bytes).unwrap();
    assert_eq!(messages, vec![Message::GetAddr]);
    assert_eq!(wire.pending(), 0);
}

#[test]
fn oversized_declared_length_disconnects() {
    let ctx = context([1; 8], 0);
    let (mut s, wire) = session(ctx, true);
    let mut bytes = raw_frame(MAGIC, "block", &[], true);
    bytes[16..20].copy_from_slice(&u32::MAX.to_le_bytes());
    let err = s.receive(&bytes).unwrap_err();
    assert!(matches!(err, NetworkError::BufferOverflow { .. }));
    assert_eq!(s.state(), SessionState::Closed);
    assert!(wire.is_closed());
}

// ---------------------------------------------------------------------------
// Handshake
// ---------------------------------------------------------------------------

#[test]
fn two_sessions_complete_handshake() {
    let (mut out, out_wire) = session(context([1; 8], 100), false);
    let (mut inb, in_wire) = session(context([2; 8], 250), true);

    out.on_connect();
    inb.on_connect();
    assert_eq!(out_wire.pending(), 1);
    assert_eq!(in_wire.pending(), 0);

    pump(&mut out, &out_wire, &mut inb, &in_wire);

    assert!(out.is_active());
    assert!(inb.is_active());
    assert_eq!(out.best_height(), 250);
    assert_eq!(inb.best_height(), 100);
    assert_eq!(out.send_version_number(), PROTOCOL_VERSION);
    assert_eq!(out.recv_version(), PROTOCOL_VERSION);
    assert_eq!(inb.recv_version(), PROTOCOL_VERSION);
}

#[test]
fn handshake_then_ping_pong() {
    let (mut out, out_wire) = session(context([1; 8], 0), false);
    let (mut inb, in_wire) = session(context([2; 8], 0), true);
    out.on_connect();
    pump(&mut out, &out_wire, &mut inb, &in_wire);

    out.send_ping();
    let received = inb.receive(&out_wire.take()).unwrap();
    let Message::Ping(Some(nonce)) = &received[0] else {
        panic!("expected ping with nonce, got {:?}", received);
    };
    // Pong is outbound-only; the wire carries it with the echoed nonce.
    let pong = in_wire.take();
    assert_eq!(&pong[4..8], b"pong");
    assert_eq!(&pong[24..32], &nonce[..]);
}

#[test]
fn self_connection_terminates_before_further_processing() {
    let nonce = [9; 8];
    let (mut out, out_wire) = session(context(nonce, 0), false);
    let (mut inb, in_wire) = session(context(nonce, 0), true);

    out.on_connect();
    let mut bytes = out_wire.take();
    bytes.extend(raw_frame(MAGIC, "getaddr", &[], true));

    let err = inb.receive(&bytes).unwrap_err();
    assert!(matches!(err, NetworkError::SelfConnection));
    assert_eq!(inb.state(), SessionState::Closed);
    assert!(in_wire.is_closed());
    assert_eq!(in_wire.pending(), 0);
    assert!(matches!(inb.receive(&[]), Err(NetworkError::Closed)));
}

#[test]
fn legacy_peer_switches_to_short_headers_at_once() {
    let (mut inb, wire) = session(context([2; 8], 7), true);

    // The legacy version itself arrives with a checksum (initial version 209),
    // everything after it without.
    let mut bytes = raw_frame(MAGIC, "version", &version_payload(106, [3; 8], 5), true);
    bytes.extend(raw_frame(MAGIC, "verack", &[], false));

    let messages = inb.receive(&bytes).unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1], Message::Verack);
    assert_eq!(inb.buffered(), 0);
    assert_eq!(inb.recv_version(), 106);
    assert_eq!(inb.send_version_number(), 106);
    assert!(inb.is_active());

    // Only our version went out: no verack for a legacy peer.
    assert_eq!(wire.pending(), 1);
    let sent = wire.take();
    assert_eq!(&sent[4..11], b"version");
}

#[test]
fn modern_peer_defers_receive_version_until_verack() {
    let (mut inb, wire) = session(context([2; 8], 7), true);

    let version = raw_frame(MAGIC, "version", &version_payload(PROTOCOL_VERSION, [3; 8], 5), true);
    inb.receive(&version).unwrap();
    assert_eq!(inb.state(), SessionState::Handshaking);
    assert_eq!(inb.recv_version(), CHECKSUM_VERSION);
    assert_eq!(inb.send_version_number(), PROTOCOL_VERSION);
    assert_eq!(wire.pending(), 2);

    inb.receive(&raw_frame(MAGIC, "verack", &[], true)).unwrap();
    assert!(inb.is_active());
    assert_eq!(inb.recv_version(), PROTOCOL_VERSION);
}

#[test]
fn handshake_survives_byte_at_a_time_delivery() {
    let (mut out, out_wire) = session(context([1; 8], 3), false);
    let (mut inb, in_wire) = session(context([2; 8], 4), true);
    out.on_connect();

    for byte in out_wire.take() {
        inb.receive(&[byte]).unwrap();
    }
    for byte in in_wire.take() {
        out.receive(&[byte]).unwrap();
    }
    for byte in out_wire.take() {
        inb.receive(&[byte]).unwrap();
    }
    assert!(out.is_active());
    assert!(inb.is_active());
}

mod props {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn any_garbage_without_magic_resyncs(garbage in proptest::collection::vec(0u8..0xF0, 0..300)) {
            let mut asm = FrameAssembler::new(MAGIC, 10_000);
            let frame = raw_frame(MAGIC, "verack", &[], true);
            let mut bytes = garbage;
            bytes.extend(&frame);
            asm.extend(&bytes).unwrap();
            let got = asm.next_frame(PROTOCOL_VERSION, &Sha256d).unwrap().unwrap();
            prop_assert_eq!(got.command, "verack");
            prop_assert_eq!(asm.buffered(), 0);
        }
    }
}
