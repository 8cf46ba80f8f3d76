//! Outer packet framing: `type:1 || length:3 big-endian || payload:length`.
//! `length` is a 24-bit unsigned integer, so the implementation-configured
//! maximum can never exceed `0xFF_FFFF`.

use crate::error::{CherryError, ErrorCode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketType {
    Handshake = 1,
    HandshakeAck = 2,
    Heartbeat = 3,
    Data = 4,
    Kick = 5,
}

impl PacketType {
    fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(PacketType::Handshake),
            2 => Some(PacketType::HandshakeAck),
            3 => Some(PacketType::Heartbeat),
            4 => Some(PacketType::Data),
            5 => Some(PacketType::Kick),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub packet_type: PacketType,
    pub payload: Vec<u8>,
}

impl Packet {
    pub fn new(packet_type: PacketType, payload: Vec<u8>) -> Self {
        Self { packet_type, payload }
    }
}

/// Serializes one packet to its on-wire frame.
pub fn encode_packet(packet: &Packet) -> Vec<u8> {
    let len = packet.payload.len() as u32;
    let mut out = Vec::with_capacity(4 + packet.payload.len());
    out.push(packet.packet_type as u8);
    out.extend_from_slice(&len.to_be_bytes()[1..4]);
    out.extend_from_slice(&packet.payload);
    out
}

/// Result of attempting to decode one frame from the front of a buffer.
#[derive(Debug)]
pub enum DecodeOutcome {
    /// `buf` does not yet hold a complete frame; read more and retry.
    NeedMoreData,
    /// A complete frame with an unrecognized type byte was skipped: a
    /// malformed frame is logged and dropped rather than closing the
    /// connection. Carries the number of bytes consumed.
    Skipped(usize),
    /// A complete, recognized frame, plus bytes consumed.
    Decoded(Packet, usize),
}

/// Attempts to decode one framed packet from the front of `buf`. A
/// declared `length` exceeding `max_length` is a fatal framing error,
/// returned as `Err` — distinct from an unrecognized type byte, which is
/// merely skipped.
pub fn try_decode_packet(buf: &[u8], max_length: usize) -> Result<DecodeOutcome, CherryError> {
    if buf.len() < 4 {
        return Ok(DecodeOutcome::NeedMoreData);
    }

    let length = u32::from_be_bytes([0, buf[1], buf[2], buf[3]]) as usize;
    if length > max_length {
        return Err(CherryError::new(ErrorCode::RouteDecodeError));
    }

    let total = 4 + length;
    if buf.len() < total {
        return Ok(DecodeOutcome::NeedMoreData);
    }

    match PacketType::from_u8(buf[0]) {
        Some(packet_type) => {
            let payload = buf[4..total].to_vec();
            Ok(DecodeOutcome::Decoded(Packet::new(packet_type, payload), total))
        }
        None => Ok(DecodeOutcome::Skipped(total)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expect_decoded(outcome: DecodeOutcome) -> (Packet, usize) {
        match outcome {
            DecodeOutcome::Decoded(packet, consumed) => (packet, consumed),
            _ => panic!("expected a decoded packet"),
        }
    }

    #[test]
    fn round_trips_a_data_packet() {
        let packet = Packet::new(PacketType::Data, vec![1, 2, 3, 4, 5]);
        let encoded = encode_packet(&packet);
        let (decoded, consumed) = expect_decoded(try_decode_packet(&encoded, 1024).unwrap());
        assert_eq!(decoded, packet);
        assert_eq!(consumed, encoded.len());
    }

    #[test]
    fn round_trips_an_empty_payload() {
        let packet = Packet::new(PacketType::Heartbeat, vec![]);
        let encoded = encode_packet(&packet);
        assert_eq!(encoded, vec![3, 0, 0, 0]);
        let (decoded, _) = expect_decoded(try_decode_packet(&encoded, 1024).unwrap());
        assert_eq!(decoded, packet);
    }

    #[test]
    fn incomplete_frame_asks_for_more_bytes() {
        let packet = Packet::new(PacketType::Data, vec![9; 10]);
        let encoded = encode_packet(&packet);
        assert!(matches!(try_decode_packet(&encoded[..6], 1024).unwrap(), DecodeOutcome::NeedMoreData));
    }

    #[test]
    fn oversize_length_is_a_fatal_error() {
        let mut frame = vec![PacketType::Data as u8];
        frame.extend_from_slice(&1000u32.to_be_bytes()[1..4]);
        let err = try_decode_packet(&frame, 100).unwrap_err();
        assert_eq!(err.code(), ErrorCode::RouteDecodeError);
    }

    #[test]
    fn unknown_type_byte_is_skipped_not_fatal() {
        match try_decode_packet(&[0xFF, 0, 0, 0], 1024).unwrap() {
            DecodeOutcome::Skipped(consumed) => assert_eq!(consumed, 4),
            _ => panic!("expected a skipped frame"),
        }
    }

    #[test]
    fn leftover_bytes_after_one_frame_are_preserved_for_the_next_call() {
        let first = Packet::new(PacketType::Heartbeat, vec![]);
        let second = Packet::new(PacketType::Data, vec![7, 8]);
        let mut buf = encode_packet(&first);
        buf.extend_from_slice(&encode_packet(&second));

        let (decoded_first, consumed) = expect_decoded(try_decode_packet(&buf, 1024).unwrap());
        assert_eq!(decoded_first, first);
        let (decoded_second, _) = expect_decoded(try_decode_packet(&buf[consumed..], 1024).unwrap());
        assert_eq!(decoded_second, second);
    }
}
