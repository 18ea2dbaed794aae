//! Binary frame codec
//!
//! Frames are laid out as `[address:1][command:1][length:1][payload:length]`.
//! The same layout is used on the device bus and for binary answers sent back
//! to clients.

use thiserror::Error;

use crate::Address;

/// Size of the fixed frame header (address, command, length)
pub const HEADER_LEN: usize = 3;

/// Largest payload a single length byte can describe
pub const MAX_PAYLOAD_LEN: usize = u8::MAX as usize;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("Frame too short: {0} bytes")]
    TooShort(usize),
    #[error("Length mismatch: header declares {declared} payload bytes, got {actual}")]
    LengthMismatch { declared: usize, actual: usize },
    #[error("Payload too long: {0} bytes (max {MAX_PAYLOAD_LEN})")]
    PayloadTooLong(usize),
}

/// A single addressed frame
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Frame {
    pub address: Address,
    pub command: u8,
    pub payload: Vec<u8>,
}

impl Frame {
    /// Create a frame with a payload
    pub fn new(address: Address, command: u8, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            address,
            command,
            payload: payload.into(),
        }
    }

    /// Create a frame with an empty payload, as used for parameter reads
    pub fn request(address: Address, command: u8) -> Self {
        Self::new(address, command, Vec::new())
    }

    /// Encode to wire bytes
    pub fn encode(&self) -> Result<Vec<u8>, FrameError> {
        let len = self.payload.len();
        if len > MAX_PAYLOAD_LEN {
            return Err(FrameError::PayloadTooLong(len));
        }

        let mut bytes = Vec::with_capacity(HEADER_LEN + len);
        bytes.push(self.address);
        bytes.push(self.command);
        bytes.push(len as u8);
        bytes.extend_from_slice(&self.payload);
        Ok(bytes)
    }

    /// Decode a buffer that must hold exactly one frame
    pub fn decode(data: &[u8]) -> Result<Self, FrameError> {
        if data.len() < HEADER_LEN {
            return Err(FrameError::TooShort(data.len()));
        }

        let declared = data[2] as usize;
        let actual = data.len() - HEADER_LEN;
        if declared != actual {
            return Err(FrameError::LengthMismatch { declared, actual });
        }

        Ok(Self::new(data[0], data[1], &data[HEADER_LEN..]))
    }

    /// Payload length announced by a header
    pub fn payload_len(header: &[u8; HEADER_LEN]) -> usize {
        header[2] as usize
    }

    /// Check whether `other` answers this request (same address and command)
    pub fn is_answered_by(&self, other: &Frame) -> bool {
        self.address == other.address && self.command == other.command
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_answer_frame() {
        let frame = Frame::new(0x01, 0x02, b"AB".to_vec());
        assert_eq!(frame.encode().unwrap(), vec![0x01, 0x02, 0x02, 0x41, 0x42]);
    }

    #[test]
    fn test_decode_answer_frame() {
        let frame = Frame::decode(&[0x01, 0x02, 0x02, 0x41, 0x42]).unwrap();
        assert_eq!(frame.address, 0x01);
        assert_eq!(frame.command, 0x02);
        assert_eq!(frame.payload, b"AB");
    }

    #[test]
    fn test_empty_payload() {
        let frame = Frame::request(0x10, 0x06);
        let bytes = frame.encode().unwrap();
        assert_eq!(bytes, vec![0x10, 0x06, 0x00]);
        assert_eq!(Frame::decode(&bytes).unwrap(), frame);
    }

    #[test]
    fn test_decode_rejects_bad_length() {
        assert_eq!(Frame::decode(&[0x01]), Err(FrameError::TooShort(1)));
        assert_eq!(
            Frame::decode(&[0x01, 0x02, 0x03, 0x41]),
            Err(FrameError::LengthMismatch {
                declared: 3,
                actual: 1
            })
        );
    }

    #[test]
    fn test_text_does_not_decode_as_frame() {
        assert!(Frame::decode(b"SYST:DEVL?\r\n").is_err());
    }

    #[test]
    fn test_encode_rejects_long_payload() {
        let frame = Frame::new(0x01, 0x01, vec![0u8; 256]);
        assert_eq!(frame.encode(), Err(FrameError::PayloadTooLong(256)));
    }

    #[test]
    fn test_is_answered_by() {
        let request = Frame::request(0x05, 0x06);
        assert!(request.is_answered_by(&Frame::new(0x05, 0x06, vec![1, 2])));
        assert!(!request.is_answered_by(&Frame::new(0x04, 0x06, vec![1, 2])));
        assert!(!request.is_answered_by(&Frame::new(0x05, 0x01, vec![1, 2])));
    }
}
