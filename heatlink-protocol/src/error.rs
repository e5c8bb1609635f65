//! Protocol error types.

use thiserror::Error;

/// Protocol-level errors raised during framing, decoding, and message building.
///
/// Frame-level failures never cross into the caller's logic: the reader
/// absorbs them as a NAK plus resynchronization. Only the encode path
/// ([`ProtocolError::FrameTooLarge`], [`ProtocolError::MissingField`]) fails
/// synchronously to the caller.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid start byte: {0:#04x}")]
    InvalidStartByte(u8),

    #[error("truncated frame: need {needed} more bytes")]
    TruncatedFrame { needed: usize },

    #[error("declared payload length {len} exceeds legal maximum {max}")]
    LengthOutOfRange { len: usize, max: usize },

    #[error("checksum mismatch: expected {expected:#04x}, got {actual:#04x}")]
    ChecksumMismatch { expected: u8, actual: u8 },

    #[error("unpaired escape byte at payload offset {offset}")]
    InvalidEscape { offset: usize },

    #[error("frame too large: {size} escaped payload bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    #[error("{remaining} trailing bytes after frame")]
    TrailingBytes { remaining: usize },

    #[error("missing required field: {0}")]
    MissingField(&'static str),
}

impl ProtocolError {
    /// Whether the reader recovers from this error by discarding one byte and
    /// sending a NAK, as opposed to waiting for more input.
    pub fn is_frame_local(&self) -> bool {
        !matches!(self, ProtocolError::TruncatedFrame { .. })
    }
}
