//! # heatlink-protocol
//!
//! Wire protocol implementation for the serial/TCP bus between a heat-pump
//! controller and the heatlink home-automation gateway.
//!
//! This crate provides:
//! - Binary framing with byte-stuffing and XOR checksum validation
//! - Typed message variants for each known frame kind
//! - Total (address, command) dispatch with raw passthrough for unknown telegrams
//! - A partial-read tolerant reader state machine driving ACK/NAK responses

pub mod codec;
pub mod error;
pub mod factory;
pub mod frame;
pub mod message;
pub mod reader;

pub use codec::{decode, encode};
pub use error::ProtocolError;
pub use frame::{Frame, FrameAddress};
pub use message::{
    DataReadOut, Message, ModbusValue, RawPassthrough, ReadRequest, ReadResponse, WriteRequest,
    WriteResponse,
};
pub use reader::{BusEvent, BusReader, ReaderStats};

/// Start marker for frames originating from the heat-pump side of the bus.
pub const FRAME_START_DEVICE: u8 = 0x5C;

/// Start marker for frames originating from the gateway (bus master).
pub const FRAME_START_MASTER: u8 = 0xC0;

/// Single-byte positive acknowledgment written to the bus after a valid frame.
pub const ACK_BYTE: u8 = 0x06;

/// Single-byte negative acknowledgment written to the bus after a corrupt frame.
pub const NAK_BYTE: u8 = 0x15;

/// Maximum legal on-wire (escaped) payload length. Twice the largest known
/// telegram, the 80-byte bulk data read-out.
pub const MAX_WIRE_PAYLOAD: usize = 160;
