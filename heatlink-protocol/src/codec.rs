//! Pure boundary codec: logical messages to wire bytes and back.

use crate::error::ProtocolError;
use crate::factory;
use crate::frame::Frame;
use crate::message::Message;
use bytes::BytesMut;

/// Encodes a message into its on-wire byte form.
///
/// Deterministic and free of I/O. Fails only on caller misuse, when the
/// escaped payload exceeds the length field's legal range.
pub fn encode(message: &Message) -> Result<BytesMut, ProtocolError> {
    message.to_frame().encode()
}

/// Decodes exactly one frame from `buf` into a message.
///
/// The slice must hold one complete frame and nothing else; streaming input
/// belongs to [`crate::reader::BusReader`]. Never mutates shared state.
pub fn decode(buf: &[u8]) -> Result<Message, ProtocolError> {
    let (frame, consumed) = Frame::parse(buf)?;
    if consumed < buf.len() {
        return Err(ProtocolError::TrailingBytes {
            remaining: buf.len() - consumed,
        });
    }
    Ok(factory::resolve(frame))
}
