//! Typed message variants for each known frame kind.
//!
//! Payload integers are little-endian and fixed width. Messages are
//! immutable once built; encode and decode construct fresh values.

use crate::error::ProtocolError;
use crate::frame::{Frame, FrameAddress};
use bytes::{Buf, BufMut, BytesMut};
use serde::{Deserialize, Serialize};

/// Device address of the heat pump's modbus module.
pub const ADDR_MODBUS_MODULE: u16 = 0x0020;

/// Device address of the auxiliary room unit. It reuses command byte values
/// of the modbus module family for its own status telegrams, which this
/// crate passes through raw.
pub const ADDR_ROOM_UNIT: u16 = 0x0019;

/// Command byte: bulk telemetry read-out broadcast by the pump.
pub const CMD_DATA_READ_OUT: u8 = 0x68;
/// Command byte: register read request (master to pump).
pub const CMD_READ_REQUEST: u8 = 0x69;
/// Command byte: register read response.
pub const CMD_READ_RESPONSE: u8 = 0x6A;
/// Command byte: register write request (master to pump).
pub const CMD_WRITE_REQUEST: u8 = 0x6B;
/// Command byte: register write acknowledgment.
pub const CMD_WRITE_RESPONSE: u8 = 0x6C;

/// One (register, value) pair from a bulk read-out. Wire order is preserved
/// and duplicate registers are allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModbusValue {
    pub register: u16,
    pub value: i16,
}

/// Request to read one register or coil.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadRequest {
    pub address: u16,
}

impl ReadRequest {
    pub fn new(address: u16) -> Self {
        Self { address }
    }

    pub fn builder() -> ReadRequestBuilder {
        ReadRequestBuilder::default()
    }

    pub(crate) fn from_payload(payload: &[u8]) -> Option<Self> {
        if payload.len() != 2 {
            return None;
        }
        Some(Self {
            address: u16::from_le_bytes([payload[0], payload[1]]),
        })
    }

    fn write_payload(&self, buf: &mut BytesMut) {
        buf.put_u16_le(self.address);
    }
}

/// Response carrying the value of one register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadResponse {
    pub address: u16,
    pub value: i32,
}

impl ReadResponse {
    pub fn new(address: u16, value: i32) -> Self {
        Self { address, value }
    }

    pub(crate) fn from_payload(payload: &[u8]) -> Option<Self> {
        if payload.len() != 6 {
            return None;
        }
        let mut buf = payload;
        Some(Self {
            address: buf.get_u16_le(),
            value: buf.get_i32_le(),
        })
    }

    fn write_payload(&self, buf: &mut BytesMut) {
        buf.put_u16_le(self.address);
        buf.put_i32_le(self.value);
    }
}

/// Request to write one register or coil.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteRequest {
    pub address: u16,
    pub value: i32,
}

impl WriteRequest {
    pub fn new(address: u16, value: i32) -> Self {
        Self { address, value }
    }

    pub fn builder() -> WriteRequestBuilder {
        WriteRequestBuilder::default()
    }

    pub(crate) fn from_payload(payload: &[u8]) -> Option<Self> {
        if payload.len() != 6 {
            return None;
        }
        let mut buf = payload;
        Some(Self {
            address: buf.get_u16_le(),
            value: buf.get_i32_le(),
        })
    }

    fn write_payload(&self, buf: &mut BytesMut) {
        buf.put_u16_le(self.address);
        buf.put_i32_le(self.value);
    }
}

/// Write acknowledgment from the pump.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteResponse {
    pub success: bool,
}

impl WriteResponse {
    pub fn new(success: bool) -> Self {
        Self { success }
    }

    pub(crate) fn from_payload(payload: &[u8]) -> Option<Self> {
        if payload.len() != 1 {
            return None;
        }
        Some(Self {
            success: payload[0] != 0,
        })
    }

    fn write_payload(&self, buf: &mut BytesMut) {
        buf.put_u8(u8::from(self.success));
    }
}

/// Bulk telemetry read-out broadcast periodically by the pump.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataReadOut {
    pub values: Vec<ModbusValue>,
}

impl DataReadOut {
    pub fn new(values: Vec<ModbusValue>) -> Self {
        Self { values }
    }

    pub(crate) fn from_payload(payload: &[u8]) -> Option<Self> {
        if payload.len() % 4 != 0 {
            return None;
        }
        let mut buf = payload;
        let mut values = Vec::with_capacity(payload.len() / 4);
        while buf.has_remaining() {
            values.push(ModbusValue {
                register: buf.get_u16_le(),
                value: buf.get_i16_le(),
            });
        }
        Some(Self { values })
    }

    fn write_payload(&self, buf: &mut BytesMut) {
        for v in &self.values {
            buf.put_u16_le(v.register);
            buf.put_i16_le(v.value);
        }
    }
}

/// A checksum-valid frame outside the known command space, preserved as
/// opaque logical bytes. Still acknowledged on the bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawPassthrough {
    pub address: FrameAddress,
    pub command: u8,
    pub payload: Vec<u8>,
}

/// A decoded logical protocol unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Message {
    ReadRequest(ReadRequest),
    ReadResponse(ReadResponse),
    WriteRequest(WriteRequest),
    WriteResponse(WriteResponse),
    DataReadOut(DataReadOut),
    RawPassthrough(RawPassthrough),
}

impl Message {
    /// Addressing family this message occupies on the wire.
    pub fn address(&self) -> FrameAddress {
        match self {
            Message::ReadRequest(_) | Message::WriteRequest(_) => FrameAddress::Master,
            Message::RawPassthrough(raw) => raw.address,
            _ => FrameAddress::Device(ADDR_MODBUS_MODULE),
        }
    }

    /// Command byte for this message.
    pub fn command(&self) -> u8 {
        match self {
            Message::ReadRequest(_) => CMD_READ_REQUEST,
            Message::ReadResponse(_) => CMD_READ_RESPONSE,
            Message::WriteRequest(_) => CMD_WRITE_REQUEST,
            Message::WriteResponse(_) => CMD_WRITE_RESPONSE,
            Message::DataReadOut(_) => CMD_DATA_READ_OUT,
            Message::RawPassthrough(raw) => raw.command,
        }
    }

    /// Whether this is a master-side request, i.e. a frame the gateway put
    /// on the bus that may come back as an acceptance echo.
    pub fn is_request(&self) -> bool {
        matches!(self, Message::ReadRequest(_) | Message::WriteRequest(_))
    }

    /// Serializes the logical payload and wraps it in a frame.
    pub(crate) fn to_frame(&self) -> Frame {
        let mut payload = BytesMut::new();
        match self {
            Message::ReadRequest(m) => m.write_payload(&mut payload),
            Message::ReadResponse(m) => m.write_payload(&mut payload),
            Message::WriteRequest(m) => m.write_payload(&mut payload),
            Message::WriteResponse(m) => m.write_payload(&mut payload),
            Message::DataReadOut(m) => m.write_payload(&mut payload),
            Message::RawPassthrough(raw) => payload.put_slice(&raw.payload),
        }
        Frame::new(self.address(), self.command(), payload.freeze())
    }
}

/// Incremental builder for [`ReadRequest`]. The frame length and checksum
/// depend on the complete payload, so the request is only finalized by
/// [`ReadRequestBuilder::build`].
#[derive(Debug, Default)]
pub struct ReadRequestBuilder {
    address: Option<u16>,
}

impl ReadRequestBuilder {
    pub fn address(mut self, address: u16) -> Self {
        self.address = Some(address);
        self
    }

    pub fn build(self) -> Result<ReadRequest, ProtocolError> {
        Ok(ReadRequest {
            address: self
                .address
                .ok_or(ProtocolError::MissingField("address"))?,
        })
    }
}

/// Incremental builder for [`WriteRequest`].
#[derive(Debug, Default)]
pub struct WriteRequestBuilder {
    address: Option<u16>,
    value: Option<i32>,
}

impl WriteRequestBuilder {
    pub fn address(mut self, address: u16) -> Self {
        self.address = Some(address);
        self
    }

    pub fn value(mut self, value: i32) -> Self {
        self.value = Some(value);
        self
    }

    pub fn build(self) -> Result<WriteRequest, ProtocolError> {
        Ok(WriteRequest {
            address: self
                .address
                .ok_or(ProtocolError::MissingField("address"))?,
            value: self.value.ok_or(ProtocolError::MissingField("value"))?,
        })
    }
}
