//! UNPI frame: wire format, identity, and the pure encode/decode functions (C1).
//!
//! Wire format (little-endian, all single bytes):
//!
//! ```text
//! +------+------+-------------+------+--------- ... ---------+------+
//! | 0xFE |  LEN | TYPE|SUBSYS | CMD  |     PAYLOAD (LEN B)    | FCS  |
//! +------+------+-------------+------+--------- ... ---------+------+
//! ```
//!
//! `FCS` is the XOR of every byte from `LEN` through the last payload byte —
//! the leading `0xFE` is never included in the checksum.

use crate::error::UnpiError;

/// Start-of-frame marker byte.
pub const START_OF_FRAME: u8 = 0xFE;

/// Minimum valid frame size: SOF, LEN, TYPE|SUBSYS, CMD, FCS with empty payload.
pub const MINIMUM_FRAME_SIZE: usize = 5;

/// The 3-bit message type packed into the high bits of byte 2.
///
/// Kept as a newtype over `u8` rather than a closed enum: the wire format only
/// guarantees `message_type <= 7` (the invariant from spec §3), and a decoder
/// must round-trip any value satisfying that invariant, not just the four
/// named ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageType(pub u8);

impl MessageType {
    pub const POLL: MessageType = MessageType(0x00);
    pub const SREQ: MessageType = MessageType(0x01);
    pub const AREQ: MessageType = MessageType(0x02);
    pub const SRSP: MessageType = MessageType(0x03);

    /// `true` if this value fits in the 3-bit wire field.
    pub fn is_valid(self) -> bool {
        self.0 <= 0x07
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match *self {
            MessageType::POLL => "POLL",
            MessageType::SREQ => "SREQ",
            MessageType::AREQ => "AREQ",
            MessageType::SRSP => "SRSP",
            _ => return write!(f, "MessageType({:#x})", self.0),
        };
        f.write_str(name)
    }
}

/// The 5-bit subsystem enumeration packed into the low bits of byte 2.
///
/// A newtype over `u8` for the same reason as [`MessageType`]: the original
/// `shimmeringbee/unpi` source defines these as a plain `byte` type with named
/// constants, not a closed set, and `0x0f` is deliberately aliased by two names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Subsystem(pub u8);

impl Subsystem {
    pub const RES0: Subsystem = Subsystem(0x00);
    pub const SYS: Subsystem = Subsystem(0x01);
    pub const MAC: Subsystem = Subsystem(0x02);
    pub const NWK: Subsystem = Subsystem(0x03);
    pub const AF: Subsystem = Subsystem(0x04);
    pub const ZDO: Subsystem = Subsystem(0x05);
    pub const SAPI: Subsystem = Subsystem(0x06);
    pub const UTIL: Subsystem = Subsystem(0x07);
    pub const DBG: Subsystem = Subsystem(0x08);
    pub const APP: Subsystem = Subsystem(0x09);
    pub const RCAF: Subsystem = Subsystem(0x0a);
    pub const RCN: Subsystem = Subsystem(0x0b);
    pub const RCN_CLIENT: Subsystem = Subsystem(0x0c);
    pub const BOOT: Subsystem = Subsystem(0x0d);
    pub const ZIPTEST: Subsystem = Subsystem(0x0e);
    /// Aliases `DEBUG` — both occupy `0x0f` on the wire.
    pub const APP_CNF: Subsystem = Subsystem(0x0f);
    /// Aliases `APP_CNF` — both occupy `0x0f` on the wire.
    pub const DEBUG: Subsystem = Subsystem(0x0f);
    pub const PERIPHERALS: Subsystem = Subsystem(0x10);
    pub const NFC: Subsystem = Subsystem(0x11);
    pub const PB_NWK_MGR: Subsystem = Subsystem(0x12);
    pub const PB_GW: Subsystem = Subsystem(0x13);
    pub const PB_OTA_MGR: Subsystem = Subsystem(0x14);
    pub const BLE_SPNP: Subsystem = Subsystem(0x15);
    pub const BLE_HCI: Subsystem = Subsystem(0x16);
    pub const SRV_CTR: Subsystem = Subsystem(0x1f);

    /// `true` if this value fits in the 5-bit wire field.
    pub fn is_valid(self) -> bool {
        self.0 <= 0x1f
    }
}

/// The `(message_type, subsystem, command_id)` triple used as the dispatch key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identity {
    pub message_type: MessageType,
    pub subsystem: Subsystem,
    pub command_id: u8,
}

impl Identity {
    pub fn new(message_type: MessageType, subsystem: Subsystem, command_id: u8) -> Self {
        Self { message_type, subsystem, command_id }
    }
}

/// A single UNPI frame: identity triple plus payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub message_type: MessageType,
    pub subsystem: Subsystem,
    pub command_id: u8,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(message_type: MessageType, subsystem: Subsystem, command_id: u8, payload: Vec<u8>) -> Self {
        Self { message_type, subsystem, command_id, payload }
    }

    /// Like [`Frame::new`], but fails if `payload` is too long to fit in the
    /// one-byte `LEN` field (§9: callers encoding larger structures must fail
    /// at encode time rather than produce a frame with a wrapped, wire-corrupting
    /// length byte).
    pub fn try_new(
        message_type: MessageType,
        subsystem: Subsystem,
        command_id: u8,
        payload: Vec<u8>,
    ) -> Result<Self, UnpiError> {
        if payload.len() > u8::MAX as usize {
            return Err(UnpiError::PayloadTooLarge(payload.len()));
        }
        Ok(Self::new(message_type, subsystem, command_id, payload))
    }

    /// This frame's dispatch identity.
    pub fn identity(&self) -> Identity {
        Identity::new(self.message_type, self.subsystem, self.command_id)
    }

    /// Encode into wire bytes. Total, deterministic — empty and absent
    /// payload produce identical output (`LEN = 0`, no payload bytes).
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(MINIMUM_FRAME_SIZE + self.payload.len());
        buf.push(START_OF_FRAME);
        buf.push(self.payload.len() as u8);
        buf.push((self.message_type.0 << 5) | (self.subsystem.0 & 0x1f));
        buf.push(self.command_id);
        buf.extend_from_slice(&self.payload);
        let checksum = xor_checksum(&buf[1..]);
        buf.push(checksum);
        buf
    }

    /// Decode a frame from a complete byte buffer (SOF through FCS inclusive).
    pub fn decode(data: &[u8]) -> Result<Frame, UnpiError> {
        if data.len() < MINIMUM_FRAME_SIZE {
            return Err(UnpiError::FrameTooShort);
        }
        if data[0] != START_OF_FRAME {
            return Err(UnpiError::FrameMissingStartOfFrame);
        }

        let payload_len = data[1] as usize;
        if data.len() < MINIMUM_FRAME_SIZE + payload_len {
            return Err(UnpiError::FrameTooShort);
        }

        let total_len = data.len();
        let checksum = xor_checksum(&data[1..total_len - 1]);
        if checksum != data[total_len - 1] {
            return Err(UnpiError::FrameChecksumFailed);
        }

        let message_type = MessageType(data[2] >> 5);
        let subsystem = Subsystem(data[2] & 0x1f);
        let command_id = data[3];
        let payload = data[4..total_len - 1].to_vec();

        Ok(Frame { message_type, subsystem, command_id, payload })
    }
}

fn xor_checksum(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |acc, b| acc ^ b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_empty_payload_sreq_zdo() {
        let frame = Frame::new(MessageType::SREQ, Subsystem::ZDO, 0x37, vec![]);
        assert_eq!(frame.encode(), vec![0xFE, 0x00, 0x25, 0x37, 0x12]);
    }

    #[test]
    fn encode_with_payload_sreq_zdo() {
        let frame = Frame::new(MessageType::SREQ, Subsystem::ZDO, 0x37, vec![0x55, 0xDD]);
        assert_eq!(frame.encode(), vec![0xFE, 0x02, 0x25, 0x37, 0x55, 0xDD, 0x98]);
    }

    #[test]
    fn encode_type_subsystem_packing() {
        let frame = Frame::new(MessageType::AREQ, Subsystem::SYS, 0x20, vec![]);
        let encoded = frame.encode();
        assert_eq!(encoded[2], 0x41);
    }

    #[test]
    fn decode_round_trip_empty_payload() {
        let frame = Frame::new(MessageType::SREQ, Subsystem::ZDO, 0x37, vec![]);
        let encoded = frame.encode();
        assert_eq!(Frame::decode(&encoded).unwrap(), frame);
    }

    #[test]
    fn decode_round_trip_with_payload() {
        let frame = Frame::new(MessageType::AREQ, Subsystem::SYS, 0x20, vec![1, 2, 3, 4, 5]);
        let encoded = frame.encode();
        assert_eq!(Frame::decode(&encoded).unwrap(), frame);
    }

    #[test]
    fn decode_round_trip_max_payload() {
        let frame = Frame::new(MessageType::SRSP, Subsystem::MAC, 0x01, vec![0xAB; 255]);
        let encoded = frame.encode();
        assert_eq!(Frame::decode(&encoded).unwrap(), frame);
    }

    #[test]
    fn decode_too_short_absolute() {
        assert!(matches!(Frame::decode(&[0xFE, 0x00, 0x00, 0x00]), Err(UnpiError::FrameTooShort)));
    }

    #[test]
    fn decode_too_short_for_declared_len() {
        // LEN says 5 bytes of payload but only 1 is present.
        let buf = [0xFE, 0x05, 0x00, 0x00, 0xAA, 0x00];
        assert!(matches!(Frame::decode(&buf), Err(UnpiError::FrameTooShort)));
    }

    #[test]
    fn decode_missing_start_of_frame() {
        let mut encoded = Frame::new(MessageType::SREQ, Subsystem::ZDO, 0x37, vec![]).encode();
        encoded[0] = 0x00;
        assert!(matches!(Frame::decode(&encoded), Err(UnpiError::FrameMissingStartOfFrame)));
    }

    #[test]
    fn decode_checksum_failure() {
        let mut encoded = Frame::new(MessageType::SREQ, Subsystem::ZDO, 0x37, vec![0x55, 0xDD]).encode();
        let last = encoded.len() - 1;
        encoded[last] ^= 0xFF;
        assert!(matches!(Frame::decode(&encoded), Err(UnpiError::FrameChecksumFailed)));
    }

    #[test]
    fn try_new_accepts_max_payload() {
        assert!(Frame::try_new(MessageType::SRSP, Subsystem::MAC, 0x01, vec![0xAB; 255]).is_ok());
    }

    #[test]
    fn try_new_rejects_oversized_payload() {
        let err = Frame::try_new(MessageType::SRSP, Subsystem::MAC, 0x01, vec![0xAB; 256]).unwrap_err();
        assert!(matches!(err, UnpiError::PayloadTooLarge(256)));
    }

    #[test]
    fn subsystem_0x0f_aliases_app_cnf_and_debug() {
        assert_eq!(Subsystem::APP_CNF, Subsystem::DEBUG);
        assert_eq!(Subsystem::APP_CNF.0, 0x0f);
    }

    /// P2: flipping any single bit (other than the SOF byte) must either fail
    /// to decode, or fail with a frame-level error — it must never silently
    /// decode into some other valid-looking frame.
    #[test]
    fn single_bit_flips_never_produce_a_different_valid_frame() {
        let frame = Frame::new(MessageType::AREQ, Subsystem::NWK, 0x12, vec![0x01, 0x02, 0x03]);
        let encoded = frame.encode();

        for byte_index in 1..encoded.len() {
            for bit in 0..8u8 {
                let mut mutated = encoded.clone();
                mutated[byte_index] ^= 1 << bit;

                match Frame::decode(&mutated) {
                    Err(_) => {}
                    Ok(decoded) => assert_eq!(decoded, frame, "bit flip at byte {byte_index} bit {bit} silently decoded"),
                }
            }
        }
    }
}
