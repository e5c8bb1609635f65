//! Total dispatch from a decoded frame to a message variant.
//!
//! Dispatch keys on the (address, command) pair, not the command byte alone:
//! the room unit family reuses command byte values of the modbus module for
//! its own telegrams, so a flat command lookup would collide. Anything
//! outside the known pairs, and any known pair whose payload does not fit
//! the variant's fixed layout, resolves to a raw passthrough. A frame that
//! reaches this point already passed checksum validation and is always
//! acknowledged, understood or not.

use crate::frame::{Frame, FrameAddress};
use crate::message::{
    DataReadOut, Message, RawPassthrough, ReadRequest, ReadResponse, WriteRequest, WriteResponse,
    ADDR_MODBUS_MODULE, CMD_DATA_READ_OUT, CMD_READ_REQUEST, CMD_READ_RESPONSE, CMD_WRITE_REQUEST,
    CMD_WRITE_RESPONSE,
};

/// Maps a checksum-valid frame to its message variant. Never fails.
pub fn resolve(frame: Frame) -> Message {
    let known = match (frame.address, frame.command) {
        (FrameAddress::Master, CMD_READ_REQUEST) => {
            ReadRequest::from_payload(&frame.payload).map(Message::ReadRequest)
        }
        (FrameAddress::Master, CMD_WRITE_REQUEST) => {
            WriteRequest::from_payload(&frame.payload).map(Message::WriteRequest)
        }
        (FrameAddress::Device(ADDR_MODBUS_MODULE), CMD_READ_RESPONSE) => {
            ReadResponse::from_payload(&frame.payload).map(Message::ReadResponse)
        }
        (FrameAddress::Device(ADDR_MODBUS_MODULE), CMD_WRITE_RESPONSE) => {
            WriteResponse::from_payload(&frame.payload).map(Message::WriteResponse)
        }
        (FrameAddress::Device(ADDR_MODBUS_MODULE), CMD_DATA_READ_OUT) => {
            DataReadOut::from_payload(&frame.payload).map(Message::DataReadOut)
        }
        _ => None,
    };

    known.unwrap_or_else(|| {
        Message::RawPassthrough(RawPassthrough {
            address: frame.address,
            command: frame.command,
            payload: frame.payload.to_vec(),
        })
    })
}
