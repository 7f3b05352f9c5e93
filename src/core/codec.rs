//! Framing for Dominion packets.
//!
//! The secure channel may hand over several application messages merged into
//! a single read (the controller does this with its initial state dump).
//! [`demux`] splits such a read into packets. Each read is an independent
//! frame boundary: a packet whose declared length runs past the end of the
//! read is malformed and the rest of the read is dropped.

use bytes::{Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::core::packet::{Packet, HEADER_SIZE};
use crate::error::{BridgeError, Result};

/// Tokio codec for Dominion packets
#[derive(Debug, Default, Clone, Copy)]
pub struct PacketCodec;

impl Decoder for PacketCodec {
    type Item = Packet;
    type Error = BridgeError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Packet>> {
        if src.len() < HEADER_SIZE {
            return Ok(None);
        }

        let declared = HEADER_SIZE + src[4] as usize;
        if src.len() < declared {
            return Ok(None);
        }

        // Split off exactly one frame; the remainder stays for the next call
        let frame = src.split_to(declared).freeze();
        Ok(Some(Packet {
            msg_class: u16::from_le_bytes([frame[0], frame[1]]),
            msg_code: u16::from_le_bytes([frame[2], frame[3]]),
            payload: frame.slice(HEADER_SIZE..),
        }))
    }
}

impl Encoder<Packet> for PacketCodec {
    type Error = BridgeError;

    fn encode(&mut self, item: Packet, dst: &mut BytesMut) -> Result<()> {
        item.encode_into(dst);
        Ok(())
    }
}

/// Result of splitting one read into packets
#[derive(Debug, Default)]
pub struct Demuxed {
    /// Packets decoded before any framing problem, in arrival order
    pub packets: Vec<Packet>,
    /// Framing error that stopped processing, if any
    pub malformed: Option<BridgeError>,
    /// Bytes dropped at the end of the read
    pub discarded: usize,
}

/// Split a single read into packets.
pub fn demux(read: &[u8]) -> Demuxed {
    let mut codec = PacketCodec;
    let mut buf = BytesMut::from(read);
    let mut out = Demuxed::default();
    let mut offset = 0;

    while buf.len() >= HEADER_SIZE {
        match codec.decode(&mut buf) {
            Ok(Some(packet)) => {
                offset += packet.length();
                out.packets.push(packet);
            }
            Ok(None) => {
                out.malformed = Some(BridgeError::Framing {
                    offset,
                    declared: HEADER_SIZE + buf[4] as usize,
                    available: buf.len(),
                });
                break;
            }
            Err(e) => {
                out.malformed = Some(e);
                break;
            }
        }
    }

    out.discarded = buf.len();
    out
}

/// Concatenate packets into a single buffer, as the controller does
pub fn concat(packets: impl IntoIterator<Item = Packet>) -> Bytes {
    let mut codec = PacketCodec;
    let mut buf = BytesMut::new();
    for packet in packets {
        // Encoding into a BytesMut cannot fail
        let _ = codec.encode(packet, &mut buf);
    }
    buf.freeze()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn decoder_waits_for_complete_frame() {
        let mut codec = PacketCodec;
        let bytes = Packet::decimal(0x10, 0x1802, 20.0).to_bytes();

        let mut partial = BytesMut::from(&bytes[..HEADER_SIZE]);
        assert!(codec.decode(&mut partial).unwrap().is_none());
        assert_eq!(partial.len(), HEADER_SIZE);

        let mut full = BytesMut::from(&bytes[..]);
        let pkt = codec.decode(&mut full).unwrap().unwrap();
        assert_eq!(pkt.get_decimal().unwrap(), 20.0);
        assert!(full.is_empty());
    }

    #[test]
    fn demux_splits_merged_read() {
        let read = concat([
            Packet::decimal(0x10, 0x1802, 21.0),
            Packet::new(0x10, 0x0301, &b"Bath"[..]),
            Packet::query(0x0F, 0x0A01),
        ]);
        let out = demux(&read);
        assert_eq!(out.packets.len(), 3);
        assert!(out.malformed.is_none());
        assert_eq!(out.discarded, 0);
        assert_eq!(out.packets[1].get_string(), "Bath");
    }

    #[test]
    fn demux_keeps_packets_before_malformed_one() {
        let mut read = concat([
            Packet::decimal(0x10, 0x1802, 21.0),
            Packet::decimal(0x11, 0x1802, 19.5),
        ])
        .to_vec();
        let good_len = read.len();
        // Claims 200 payload bytes, carries 3
        read.extend_from_slice(&[0x12, 0x00, 0x02, 0x18, 200, 1, 2, 3]);

        let out = demux(&read);
        assert_eq!(out.packets.len(), 2);
        assert_eq!(out.discarded, read.len() - good_len);
        match out.malformed {
            Some(BridgeError::Framing {
                offset, declared, ..
            }) => {
                assert_eq!(offset, good_len);
                assert_eq!(declared, HEADER_SIZE + 200);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn demux_ignores_short_tail() {
        let mut read = Packet::query(0x10, 0x0301).to_bytes().to_vec();
        read.push(0);
        let out = demux(&read);
        assert_eq!(out.packets.len(), 1);
        assert!(out.malformed.is_none());
        assert_eq!(out.discarded, 1);
    }
}
