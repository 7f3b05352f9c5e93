//! Dominion packet format and typed payload accessors.
//!
//! ```text
//! [Class(2, LE)] [Code(2, LE)] [Length(1)] [Payload(N)]
//! ```
//!
//! A packet with an empty payload is a query; the controller answers it with a
//! packet carrying the current value of the addressed field.

use bytes::{BufMut, Bytes, BytesMut};
use chrono::{DateTime, TimeZone, Utc};
use std::fmt;
use tracing::warn;

use crate::error::{BridgeError, Result};

/// Size of the fixed packet header in bytes
pub const HEADER_SIZE: usize = 5;

/// Largest payload a single packet can declare
pub const MAX_PAYLOAD_SIZE: usize = u8::MAX as usize;

/// Scale applied to fixed-point decimals (two fractional digits)
pub const DECIMAL_SCALE: f64 = 100.0;

/// Dates are carried as seconds since 2000-01-01T00:00:00Z
pub const DOMINION_EPOCH_OFFSET: i64 = 946_684_800;

/// Two-part firmware/hardware version
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Version {
    pub major: u8,
    pub minor: u8,
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// A single Dominion packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Slot the packet addresses: a global class or `ROOM_FIRST + room`
    pub msg_class: u16,
    /// Field identifier within the slot
    pub msg_code: u16,
    /// Raw payload; interpretation depends on `msg_code`
    pub payload: Bytes,
}

impl Packet {
    /// Build a packet from its parts.
    ///
    /// Payloads longer than [`MAX_PAYLOAD_SIZE`] are truncated, with a warning,
    /// since the header cannot describe them. Use [`try_new`](Self::try_new) to
    /// refuse them instead.
    pub fn new(msg_class: u16, msg_code: u16, payload: impl Into<Bytes>) -> Self {
        let mut payload: Bytes = payload.into();
        if payload.len() > MAX_PAYLOAD_SIZE {
            warn!(
                class = msg_class,
                code = msg_code,
                len = payload.len(),
                max = MAX_PAYLOAD_SIZE,
                "Truncating oversized payload"
            );
            payload.truncate(MAX_PAYLOAD_SIZE);
        }
        Self {
            msg_class,
            msg_code,
            payload,
        }
    }

    /// Build a packet, failing when the payload does not fit the length byte
    pub fn try_new(msg_class: u16, msg_code: u16, payload: impl Into<Bytes>) -> Result<Self> {
        let payload: Bytes = payload.into();
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(BridgeError::PayloadTooLarge {
                len: payload.len(),
                max: MAX_PAYLOAD_SIZE,
            });
        }
        Ok(Self {
            msg_class,
            msg_code,
            payload,
        })
    }

    /// Zero-payload query packet
    pub fn query(msg_class: u16, msg_code: u16) -> Self {
        Self::new(msg_class, msg_code, Bytes::new())
    }

    /// Command packet carrying a fixed-point decimal.
    ///
    /// The value is rounded to two places and saturates at the `i16` range;
    /// NaN encodes as zero, so callers reject non-finite values first.
    pub fn decimal(msg_class: u16, msg_code: u16, value: f64) -> Self {
        let scaled = (value * DECIMAL_SCALE)
            .round()
            .clamp(i16::MIN as f64, i16::MAX as f64) as i16;
        Self::new(
            msg_class,
            msg_code,
            Bytes::copy_from_slice(&scaled.to_le_bytes()),
        )
    }

    /// Decode one packet starting at `offset` in `buffer`.
    ///
    /// Fails with [`BridgeError::Framing`] when the header is incomplete or the
    /// declared length runs past the end of the buffer.
    pub fn decode(buffer: &[u8], offset: usize) -> Result<Self> {
        let available = buffer.len().saturating_sub(offset);
        if available < HEADER_SIZE {
            return Err(BridgeError::Framing {
                offset,
                declared: HEADER_SIZE,
                available,
            });
        }

        let header = &buffer[offset..offset + HEADER_SIZE];
        let msg_class = u16::from_le_bytes([header[0], header[1]]);
        let msg_code = u16::from_le_bytes([header[2], header[3]]);
        let declared = HEADER_SIZE + header[4] as usize;

        if declared > available {
            return Err(BridgeError::Framing {
                offset,
                declared,
                available,
            });
        }

        Ok(Self {
            msg_class,
            msg_code,
            payload: Bytes::copy_from_slice(&buffer[offset + HEADER_SIZE..offset + declared]),
        })
    }

    /// Header plus payload size
    pub fn length(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }

    /// Append the wire form of this packet to `dst`
    pub fn encode_into(&self, dst: &mut BytesMut) {
        dst.reserve(self.length());
        dst.put_u16_le(self.msg_class);
        dst.put_u16_le(self.msg_code);
        dst.put_u8(self.payload.len() as u8);
        dst.extend_from_slice(&self.payload);
    }

    /// Wire form of this packet
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.length());
        self.encode_into(&mut buf);
        buf.freeze()
    }

    fn field<const N: usize>(&self, offset: usize) -> Result<[u8; N]> {
        self.payload
            .get(offset..offset + N)
            .and_then(|bytes| bytes.try_into().ok())
            .ok_or(BridgeError::ShortPayload {
                code: self.msg_code,
                needed: offset + N,
                available: self.payload.len(),
            })
    }

    /// Fixed-point decimal (temperatures and setpoints)
    pub fn get_decimal(&self) -> Result<f64> {
        let raw = i16::from_le_bytes(self.field::<2>(0)?);
        Ok(f64::from(raw) / DECIMAL_SCALE)
    }

    pub fn get_byte(&self) -> Result<u8> {
        Ok(self.field::<1>(0)?[0])
    }

    pub fn get_boolean(&self) -> Result<bool> {
        Ok(self.get_byte()? != 0)
    }

    pub fn get_short(&self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.field::<2>(0)?))
    }

    pub fn get_int(&self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.field::<4>(0)?))
    }

    /// Version stored as `[minor, major]`
    pub fn get_version(&self) -> Result<Version> {
        let [minor, major] = self.field::<2>(0)?;
        Ok(Version { major, minor })
    }

    /// Date stored at `offset` as seconds since the Dominion epoch
    pub fn get_date(&self, offset: usize) -> Result<DateTime<Utc>> {
        let seconds = u32::from_le_bytes(self.field::<4>(offset)?);
        Utc.timestamp_opt(DOMINION_EPOCH_OFFSET + i64::from(seconds), 0)
            .single()
            .ok_or(BridgeError::ShortPayload {
                code: self.msg_code,
                needed: offset + 4,
                available: self.payload.len(),
            })
    }

    /// String terminated by NUL or by the end of the payload
    pub fn get_string(&self) -> String {
        let end = self
            .payload
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(self.payload.len());
        String::from_utf8_lossy(&self.payload[..end]).into_owned()
    }
}
