//! Receiver state machine for the bus byte stream.
//!
//! The reader owns an append-only buffer fed by whichever thread runs the
//! transport's read loop. Each [`BusReader::process`] call drains every
//! complete frame, yielding the bus responses (ACK/NAK) the caller must
//! write plus the decoded traffic. Per frame the cycle is: seek a start
//! marker, read the header, read the declared payload, validate, emit.
//! Two recovery rules keep a noisy bus from wedging the stream:
//!
//! - a frame that fails validation costs a NAK and advances the cursor one
//!   byte past its start marker, so a single corrupt byte cannot swallow
//!   the frames behind it;
//! - a frame whose tail has not arrived leaves the buffer untouched until
//!   the next call, so byte-at-a-time feeding is safe.
//!
//! The reader performs no I/O and never blocks; it holds the only mutable
//! state in the protocol core.

use crate::error::ProtocolError;
use crate::factory;
use crate::frame::Frame;
use crate::message::{Message, CMD_READ_REQUEST, CMD_WRITE_REQUEST};
use crate::{FRAME_START_DEVICE, FRAME_START_MASTER};
use bytes::{Buf, BytesMut};

/// Bus responses and decoded traffic produced by the reader. The caller
/// owns the transport and performs the actual byte writes.
#[derive(Debug, Clone, PartialEq)]
pub enum BusEvent {
    /// Write [`crate::ACK_BYTE`] to the bus.
    Ack,
    /// Write [`crate::NAK_BYTE`] to the bus.
    Nak,
    /// An outstanding request of ours came back on the bus: the pump
    /// accepted it.
    RequestAccepted(Message),
    /// Any other valid frame, raw passthrough included.
    MessageReceived(Message),
}

impl BusEvent {
    /// The single byte to write on the bus for this event, if any.
    pub fn response_byte(&self) -> Option<u8> {
        match self {
            BusEvent::Ack => Some(crate::ACK_BYTE),
            BusEvent::Nak => Some(crate::NAK_BYTE),
            _ => None,
        }
    }
}

/// Diagnostic counters. Frames counted as dropped were NAKed and skipped;
/// the caller never sees them as messages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReaderStats {
    /// Frames decoded and acknowledged.
    pub frames_decoded: u64,
    /// Frames dropped after a checksum or format failure.
    pub frames_dropped: u64,
    /// Noise bytes discarded while seeking a start marker.
    pub noise_bytes: u64,
}

/// Incremental frame reader over a noisy byte stream.
#[derive(Debug)]
pub struct BusReader {
    buf: BytesMut,
    outstanding: Vec<Message>,
    stats: ReaderStats,
}

impl BusReader {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(512),
            outstanding: Vec::new(),
            stats: ReaderStats::default(),
        }
    }

    /// Registers a request we put on the bus, so its echo is reported as
    /// [`BusEvent::RequestAccepted`] rather than ordinary traffic.
    pub fn expect_request(&mut self, request: Message) {
        self.outstanding.push(request);
    }

    /// Appends `data` and drains every complete frame currently buffered.
    pub fn process(&mut self, data: &[u8]) -> Vec<BusEvent> {
        self.buf.extend_from_slice(data);
        let mut events = Vec::new();
        loop {
            if !self.seek_start() {
                break;
            }
            match Frame::parse(&self.buf) {
                Ok((frame, consumed)) => {
                    tracing::trace!(
                        "frame: cmd {:#04x}, wire {}",
                        frame.command,
                        hex::encode(&self.buf[..consumed])
                    );
                    self.buf.advance(consumed);
                    self.stats.frames_decoded += 1;
                    events.push(BusEvent::Ack);
                    events.push(self.classify(factory::resolve(frame)));
                }
                Err(ProtocolError::TruncatedFrame { .. }) => break,
                Err(err) => {
                    tracing::warn!("dropping frame: {}", err);
                    self.stats.frames_dropped += 1;
                    self.buf.advance(1);
                    events.push(BusEvent::Nak);
                }
            }
        }
        events
    }

    /// Discards noise until the buffer begins with a plausible frame start.
    /// Returns false once the whole buffer has been scanned without one.
    fn seek_start(&mut self) -> bool {
        let mut skipped = 0;
        let found = loop {
            match self.buf.get(skipped) {
                None => break false,
                Some(&FRAME_START_DEVICE) => break true,
                Some(&FRAME_START_MASTER) => {
                    // Only the master's own command space opens a frame
                    // here; any other follower is bus noise.
                    match self.buf.get(skipped + 1) {
                        None => break true,
                        Some(&CMD_READ_REQUEST) | Some(&CMD_WRITE_REQUEST) => break true,
                        Some(_) => skipped += 1,
                    }
                }
                Some(_) => skipped += 1,
            }
        };
        if skipped > 0 {
            tracing::debug!("discarded {} noise bytes", skipped);
            self.stats.noise_bytes += skipped as u64;
            self.buf.advance(skipped);
        }
        found
    }

    fn classify(&mut self, message: Message) -> BusEvent {
        if message.is_request() {
            if let Some(at) = self.outstanding.iter().position(|m| *m == message) {
                self.outstanding.remove(at);
                return BusEvent::RequestAccepted(message);
            }
        }
        BusEvent::MessageReceived(message)
    }

    /// Bytes buffered awaiting the remainder of a frame.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    pub fn stats(&self) -> ReaderStats {
        self.stats
    }
}

impl Default for BusReader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::encode;
    use crate::frame::FrameAddress;
    use crate::message::{
        DataReadOut, ModbusValue, RawPassthrough, ReadRequest, ReadResponse, WriteRequest,
        WriteResponse, ADDR_ROOM_UNIT, CMD_DATA_READ_OUT,
    };

    fn readout(pairs: &[(u16, i16)]) -> Message {
        Message::DataReadOut(DataReadOut::new(
            pairs
                .iter()
                .map(|&(register, value)| ModbusValue { register, value })
                .collect(),
        ))
    }

    fn wire(msg: &Message) -> Vec<u8> {
        encode(msg).unwrap().to_vec()
    }

    /// Flips one bit of the first payload byte.
    fn corrupt(frame: &mut [u8]) {
        let payload_at = match frame[0] {
            0xC0 => 3,
            _ => 5,
        };
        frame[payload_at] ^= 0x01;
    }

    fn messages(events: &[BusEvent]) -> Vec<Message> {
        events
            .iter()
            .filter_map(|e| match e {
                BusEvent::MessageReceived(m) | BusEvent::RequestAccepted(m) => Some(m.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_single_frame() {
        let msg = Message::WriteResponse(WriteResponse::new(true));
        let mut reader = BusReader::new();
        let events = reader.process(&wire(&msg));

        assert_eq!(
            events,
            vec![BusEvent::Ack, BusEvent::MessageReceived(msg)]
        );
        assert_eq!(reader.buffered(), 0);
        assert_eq!(reader.stats().frames_decoded, 1);
    }

    #[test]
    fn test_byte_at_a_time_feeding() {
        let m1 = readout(&[(0x1234, 100), (0x1235, -7)]);
        let m2 = Message::ReadResponse(ReadResponse::new(513, 99));
        let mut stream = wire(&m1);
        stream.extend(wire(&m2));

        let mut reader = BusReader::new();
        let mut events = Vec::new();
        for &b in &stream {
            events.extend(reader.process(&[b]));
        }

        assert_eq!(messages(&events), vec![m1, m2]);
        assert_eq!(events.iter().filter(|e| **e == BusEvent::Ack).count(), 2);
        assert_eq!(reader.buffered(), 0);
    }

    #[test]
    fn test_noise_between_frames_is_ignored() {
        let m1 = readout(&[(40004, 215)]);
        let m2 = Message::WriteResponse(WriteResponse::new(false));

        let mut clean = wire(&m1);
        clean.extend(wire(&m2));
        let mut noisy = vec![0x00, 0xFF, 0x13];
        noisy.extend(wire(&m1));
        noisy.extend([0x80, 0x81, 0x01]);
        noisy.extend(wire(&m2));
        noisy.extend([0x42]);

        let mut clean_reader = BusReader::new();
        let mut noisy_reader = BusReader::new();
        let clean_events = clean_reader.process(&clean);
        let noisy_events = noisy_reader.process(&noisy);

        assert_eq!(messages(&noisy_events), messages(&clean_events));
        assert_eq!(noisy_reader.stats().noise_bytes, 7);
        assert_eq!(noisy_reader.stats().frames_dropped, 0);
    }

    #[test]
    fn test_corrupt_frame_resyncs_with_one_nak() {
        let m1 = readout(&[(0x0102, 0x0304)]);
        let m2 = Message::ReadResponse(ReadResponse::new(0x0102, 0x03040506));
        let m3 = Message::WriteResponse(WriteResponse::new(true));

        let mut stream = wire(&m1);
        let mut bad = wire(&m2);
        corrupt(&mut bad);
        stream.extend(bad);
        stream.extend(wire(&m3));

        let mut reader = BusReader::new();
        let events = reader.process(&stream);

        assert_eq!(
            events.iter().filter(|e| **e == BusEvent::Nak).count(),
            1
        );
        assert_eq!(messages(&events), vec![m1, m3]);
        assert_eq!(reader.stats().frames_dropped, 1);
        assert_eq!(reader.stats().frames_decoded, 2);
    }

    #[test]
    fn test_oversized_length_resyncs_like_checksum_failure() {
        let mut stream = vec![0x5C, 0x00, 0x20, 0x68, 0xFF];
        let next = Message::WriteResponse(WriteResponse::new(true));
        stream.extend(wire(&next));

        let mut reader = BusReader::new();
        let events = reader.process(&stream);

        assert_eq!(events.iter().filter(|e| **e == BusEvent::Nak).count(), 1);
        assert_eq!(messages(&events), vec![next]);
    }

    #[test]
    fn test_request_echo_is_accepted() {
        let read = Message::ReadRequest(ReadRequest::new(12345));
        let write = Message::WriteRequest(WriteRequest::new(43005, -10));

        let mut reader = BusReader::new();
        reader.expect_request(read.clone());
        reader.expect_request(write.clone());

        let mut stream = wire(&read);
        stream.extend(wire(&write));
        let events = reader.process(&stream);

        assert_eq!(
            events,
            vec![
                BusEvent::Ack,
                BusEvent::RequestAccepted(read),
                BusEvent::Ack,
                BusEvent::RequestAccepted(write),
            ]
        );
    }

    #[test]
    fn test_foreign_request_is_ordinary_traffic() {
        let echo = Message::ReadRequest(ReadRequest::new(7));
        let mut reader = BusReader::new();
        reader.expect_request(Message::ReadRequest(ReadRequest::new(8)));

        let events = reader.process(&wire(&echo));
        assert_eq!(
            events,
            vec![BusEvent::Ack, BusEvent::MessageReceived(echo)]
        );
    }

    #[test]
    fn test_response_bytes() {
        assert_eq!(BusEvent::Ack.response_byte(), Some(crate::ACK_BYTE));
        assert_eq!(BusEvent::Nak.response_byte(), Some(crate::NAK_BYTE));
        assert_eq!(
            BusEvent::MessageReceived(Message::WriteResponse(WriteResponse::new(true)))
                .response_byte(),
            None
        );
    }

    #[test]
    fn test_mixed_stream_end_to_end() {
        let telemetry_a = readout(&[(0x0102, 0x0304), (0x0106, 0x0708)]);
        let telemetry_b = readout(&[(40004, 215)]);
        let telemetry_c = readout(&[(0x0110, -40), (0x0111, 17), (0x0112, 0)]);
        let read = Message::ReadRequest(ReadRequest::new(12345));
        let write = Message::WriteRequest(WriteRequest::new(43005, 1));
        let response = Message::ReadResponse(ReadResponse::new(12345, 99));
        let unknown = Message::RawPassthrough(RawPassthrough {
            address: FrameAddress::Device(ADDR_ROOM_UNIT),
            command: CMD_DATA_READ_OUT,
            payload: vec![0x01, 0x02, 0x03],
        });

        let mut corrupt_a = wire(&telemetry_a);
        corrupt(&mut corrupt_a);
        let mut corrupt_b = wire(&response);
        corrupt(&mut corrupt_b);

        // Nine frames, two of them corrupted, with stray garbage between
        // (including a bare 0xC0 that must not open a phantom frame).
        let mut stream = Vec::new();
        stream.extend([0x00, 0x13]);
        stream.extend(wire(&telemetry_a));
        stream.extend(corrupt_a);
        stream.extend([0xC0, 0x55]);
        stream.extend(wire(&read));
        stream.extend(wire(&response));
        stream.extend([0xFF]);
        stream.extend(corrupt_b);
        stream.extend(wire(&write));
        stream.extend(wire(&telemetry_b));
        stream.extend([0x21, 0x22]);
        stream.extend(wire(&unknown));
        stream.extend(wire(&telemetry_c));

        let mut reader = BusReader::new();
        reader.expect_request(read.clone());
        reader.expect_request(write.clone());
        let events = reader.process(&stream);

        let acks = events.iter().filter(|e| **e == BusEvent::Ack).count();
        let naks = events.iter().filter(|e| **e == BusEvent::Nak).count();
        let accepted: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                BusEvent::RequestAccepted(m) => Some(m.clone()),
                _ => None,
            })
            .collect();
        let received: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                BusEvent::MessageReceived(m) => Some(m.clone()),
                _ => None,
            })
            .collect();

        assert_eq!(acks, 7);
        assert_eq!(naks, 2);
        assert_eq!(accepted, vec![read, write]);
        assert_eq!(
            received,
            vec![telemetry_a, response, telemetry_b, unknown, telemetry_c]
        );

        let stats = reader.stats();
        assert_eq!(stats.frames_decoded, 7);
        assert_eq!(stats.frames_dropped, 2);
    }

    #[test]
    fn test_partial_master_frame_waits() {
        let msg = Message::ReadRequest(ReadRequest::new(1));
        let stream = wire(&msg);

        let mut reader = BusReader::new();
        assert!(reader.process(&stream[..1]).is_empty());
        assert_eq!(reader.buffered(), 1);

        let events = reader.process(&stream[1..]);
        assert_eq!(messages(&events), vec![msg]);
        assert_eq!(reader.buffered(), 0);
    }
}
