//! On-wire frame format for the heat-pump bus.
//!
//! Device-side frames (pump to gateway):
//!
//! ```text
//! +------+---------+---------+-----+-----+--------------+----------+
//! | 0x5C | ADDR_HI | ADDR_LO | CMD | LEN | PAYLOAD[LEN] | CHECKSUM |
//! +------+---------+---------+-----+-----+--------------+----------+
//! ```
//!
//! Master-side frames (gateway to pump) carry no address pair:
//!
//! ```text
//! +------+-----+-----+--------------+----------+
//! | 0xC0 | CMD | LEN | PAYLOAD[LEN] | CHECKSUM |
//! +------+-----+-----+--------------+----------+
//! ```
//!
//! A literal `0x5C` inside the payload is doubled on the wire and LEN counts
//! the doubled form. CHECKSUM is an XOR accumulation over the transmitted
//! (post-doubling) bytes up to the last payload byte; device frames exclude
//! the start marker from the accumulation, master frames include it. A
//! checksum byte equal to `0x5C` is itself doubled.

use crate::error::ProtocolError;
use crate::{FRAME_START_DEVICE, FRAME_START_MASTER, MAX_WIRE_PAYLOAD};
use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

/// Addressing family of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FrameAddress {
    /// Gateway-originated frame; the wire form has no address pair.
    Master,
    /// Pump-side frame addressed by a two-byte module address.
    Device(u16),
}

/// A frame in logical form: addressing family, command byte, and the
/// unescaped payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub address: FrameAddress,
    pub command: u8,
    pub payload: Bytes,
}

/// XOR accumulation over `bytes`.
pub fn xor_checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0, |acc, b| acc ^ b)
}

/// Appends `payload` to `out`, doubling every occurrence of the start marker.
fn escape_into(payload: &[u8], out: &mut BytesMut) {
    for &b in payload {
        out.put_u8(b);
        if b == FRAME_START_DEVICE {
            out.put_u8(b);
        }
    }
}

/// Collapses doubled start markers within an exact wire window. An unpaired
/// marker means the window boundary cuts through an escape sequence.
fn unescape(window: &[u8]) -> Result<Bytes, ProtocolError> {
    let mut out = BytesMut::with_capacity(window.len());
    let mut i = 0;
    while i < window.len() {
        let b = window[i];
        if b == FRAME_START_DEVICE {
            if window.get(i + 1) != Some(&FRAME_START_DEVICE) {
                return Err(ProtocolError::InvalidEscape { offset: i });
            }
            i += 1;
        }
        out.put_u8(b);
        i += 1;
    }
    Ok(out.freeze())
}

impl Frame {
    /// Creates a frame from its logical parts.
    pub fn new(address: FrameAddress, command: u8, payload: Bytes) -> Self {
        Self {
            address,
            command,
            payload,
        }
    }

    /// Encodes the frame into wire bytes.
    ///
    /// Fails only with [`ProtocolError::FrameTooLarge`] when the escaped
    /// payload does not fit the one-byte length field's legal range.
    pub fn encode(&self) -> Result<BytesMut, ProtocolError> {
        let mut escaped = BytesMut::with_capacity(self.payload.len() + 2);
        escape_into(&self.payload, &mut escaped);
        if escaped.len() > MAX_WIRE_PAYLOAD {
            return Err(ProtocolError::FrameTooLarge {
                size: escaped.len(),
                max: MAX_WIRE_PAYLOAD,
            });
        }

        let mut buf = BytesMut::with_capacity(escaped.len() + 8);

        // Header
        match self.address {
            FrameAddress::Master => {
                buf.put_u8(FRAME_START_MASTER);
            }
            FrameAddress::Device(addr) => {
                buf.put_u8(FRAME_START_DEVICE);
                buf.put_u16(addr);
            }
        }
        buf.put_u8(self.command);
        buf.put_u8(escaped.len() as u8);

        // Payload, already escaped
        buf.put_slice(&escaped);

        // Checksum; device frames exclude the start marker from the domain
        let from = match self.address {
            FrameAddress::Master => 0,
            FrameAddress::Device(_) => 1,
        };
        let checksum = xor_checksum(&buf[from..]);
        if checksum == FRAME_START_DEVICE {
            buf.put_u8(checksum);
        }
        buf.put_u8(checksum);

        Ok(buf)
    }

    /// Parses one frame from the start of `buf`, returning it and the number
    /// of wire bytes consumed.
    ///
    /// The checksum is validated over the as-received (still escaped) bytes
    /// before the payload window is unescaped, so any corruption of the
    /// address, command, or payload surfaces as
    /// [`ProtocolError::ChecksumMismatch`].
    pub fn parse(buf: &[u8]) -> Result<(Self, usize), ProtocolError> {
        let start = *buf
            .first()
            .ok_or(ProtocolError::TruncatedFrame { needed: 1 })?;
        let header_len = match start {
            FRAME_START_DEVICE => 5,
            FRAME_START_MASTER => 3,
            other => return Err(ProtocolError::InvalidStartByte(other)),
        };
        if buf.len() < header_len {
            return Err(ProtocolError::TruncatedFrame {
                needed: header_len - buf.len(),
            });
        }

        let len = buf[header_len - 1] as usize;
        if len > MAX_WIRE_PAYLOAD {
            return Err(ProtocolError::LengthOutOfRange {
                len,
                max: MAX_WIRE_PAYLOAD,
            });
        }

        let checksum_at = header_len + len;
        if buf.len() < checksum_at + 1 {
            return Err(ProtocolError::TruncatedFrame {
                needed: checksum_at + 1 - buf.len(),
            });
        }

        // A 0x5C checksum is transmitted doubled.
        let received = buf[checksum_at];
        let mut consumed = checksum_at + 1;
        if received == FRAME_START_DEVICE {
            match buf.get(checksum_at + 1) {
                None => return Err(ProtocolError::TruncatedFrame { needed: 1 }),
                Some(&FRAME_START_DEVICE) => consumed += 1,
                Some(_) => return Err(ProtocolError::InvalidEscape { offset: len }),
            }
        }

        let from = if start == FRAME_START_DEVICE { 1 } else { 0 };
        let computed = xor_checksum(&buf[from..checksum_at]);
        if computed != received {
            return Err(ProtocolError::ChecksumMismatch {
                expected: received,
                actual: computed,
            });
        }

        let payload = unescape(&buf[header_len..checksum_at])?;
        let address = match start {
            FRAME_START_DEVICE => FrameAddress::Device(u16::from_be_bytes([buf[1], buf[2]])),
            _ => FrameAddress::Master,
        };

        Ok((
            Self {
                address,
                command: buf[header_len - 2],
                payload,
            },
            consumed,
        ))
    }
}
