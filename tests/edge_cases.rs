#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
//! Boundary conditions of the packet layer and malformed input on a live link

use bytes::{BufMut, Bytes, BytesMut};
use dominion_bridge::config::ConnectionConfig;
use dominion_bridge::core::codec::{concat, demux};
use dominion_bridge::core::packet::{Packet, HEADER_SIZE, MAX_PAYLOAD_SIZE};
use dominion_bridge::protocol::codes::{room_class, MsgCode};
use dominion_bridge::transport::loopback::LoopbackNetwork;
use dominion_bridge::transport::PeerId;
use dominion_bridge::{BridgeError, MasterHandler};
use std::time::Duration;
use tokio::runtime::Handle;

// ============================================================================
// PACKET EDGE CASES
// ============================================================================

#[test]
fn empty_payload_round_trips() {
    let bytes = Packet::query(0x0F, 0x0A01).to_bytes();
    assert_eq!(bytes.len(), HEADER_SIZE);
    let decoded = Packet::decode(&bytes, 0).unwrap();
    assert!(decoded.payload.is_empty());
    assert!(decoded.get_byte().is_err());
    assert_eq!(decoded.get_string(), "");
}

#[test]
fn oversized_payload_is_truncated_to_header_limit() {
    let packet = Packet::new(0x10, 0x0301, vec![b'a'; 400]);
    assert_eq!(packet.payload.len(), MAX_PAYLOAD_SIZE);
    assert_eq!(packet.to_bytes()[4], u8::MAX);
}

#[test]
fn decode_at_offset_inside_larger_buffer() {
    let buffer = concat([
        Packet::query(0x10, 0x0301),
        Packet::decimal(0x11, 0x1802, -3.25),
    ]);
    let second = Packet::decode(&buffer, HEADER_SIZE).unwrap();
    assert_eq!(second.msg_class, 0x11);
    assert_eq!(second.get_decimal().unwrap(), -3.25);

    match Packet::decode(&buffer, buffer.len() - 2) {
        Err(BridgeError::Framing { available, .. }) => assert_eq!(available, 2),
        other => panic!("expected framing error, got {other:?}"),
    }
}

#[test]
fn decimal_saturates_at_wire_range() {
    let hot = Packet::decimal(0x10, 0x1810, 1_000.0);
    assert_eq!(hot.get_decimal().unwrap(), i16::MAX as f64 / 100.0);
    let cold = Packet::decimal(0x10, 0x1810, -1_000.0);
    assert_eq!(cold.get_decimal().unwrap(), i16::MIN as f64 / 100.0);
}

#[test]
fn string_without_terminator_uses_whole_payload() {
    let packet = Packet::new(0x10, 0x0301, Bytes::from_static(b"Loft"));
    assert_eq!(packet.get_string(), "Loft");
}

#[test]
fn short_tail_is_discarded_without_error() {
    let mut read = BytesMut::from(&Packet::query(0x10, 0x0301).to_bytes()[..]);
    read.put_slice(&[0x10, 0x00, 0x01]);

    let out = demux(&read);
    assert_eq!(out.packets.len(), 1);
    assert!(out.malformed.is_none());
    assert_eq!(out.discarded, 3);
}

#[test]
fn overlong_declaration_stops_the_read() {
    let mut read = BytesMut::from(&concat([Packet::query(0x10, 0x0301)])[..]);
    // Header declaring 200 bytes with only 4 present, followed by a valid packet
    read.put_slice(&[0x11, 0x00, 0x02, 0x18, 200, 1, 2, 3, 4]);
    read.put_slice(&Packet::query(0x12, 0x0301).to_bytes());

    let out = demux(&read);
    assert_eq!(out.packets.len(), 1);
    assert!(matches!(
        out.malformed,
        Some(BridgeError::Framing { offset: 5, declared: 205, .. })
    ));
    assert_eq!(out.discarded, read.len() - HEADER_SIZE);
}

// ============================================================================
// MALFORMED INPUT ON A LIVE LINK
// ============================================================================

async fn settle() {
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test(start_paused = true)]
async fn malformed_read_keeps_link_and_earlier_packets() {
    let network = LoopbackNetwork::new(PeerId::from_bytes([5; 32]));
    let config = ConnectionConfig {
        rendezvous: vec!["127.0.0.1:443".to_string()],
        watchdog_interval: Duration::from_secs(3600),
        ..ConnectionConfig::default()
    };
    let master = MasterHandler::new(network.clone(), config, Handle::current());
    master.scan_rooms(&PeerId::from_bytes([6; 32]).to_hex());
    settle().await;
    let channel = network.latest().unwrap();

    let mut read = BytesMut::new();
    read.put_slice(&Packet::new(room_class(0), MsgCode::RoomName.as_u16(), &b"Porch\0"[..]).to_bytes());
    read.put_slice(&[0x10, 0x00, 0x02, 0x18, 0xFF, 0x01]);
    channel.deliver(read.freeze());
    settle().await;

    assert_eq!(master.room_by_name("Porch").unwrap().room_number(), 0);
    assert_eq!(master.connector().metrics().snapshot().malformed_reads, 1);
    assert!(!channel.is_closed());

    // Next read starts a fresh frame boundary
    channel.deliver(
        Packet::decimal(room_class(0), MsgCode::RoomTemperature.as_u16(), 18.0).to_bytes(),
    );
    settle().await;
    assert_eq!(master.room_by_number(0).unwrap().snapshot().temperature, 18.0);
    assert_eq!(master.connector().metrics().snapshot().packets_received, 2);
}
