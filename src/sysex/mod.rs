//! DX7 system-exclusive messages
//!
//! Parses the sysex envelope written by a DX7 bulk dump and decodes the
//! 4096-byte voice bank it carries.

mod bulkdump;

pub use bulkdump::*;

use std::io::Read;

use serde::Serialize;
use thiserror::Error;

/// Yamaha's MIDI manufacturer id.
pub const MANUFACTURER_ID: u8 = 0x43;

/// Status byte that opens every sysex message.
pub const SYSEX_STATUS: u8 = 0xF0;

/// Status byte that closes every sysex message.
pub const SYSEX_END: u8 = 0xF7;

const HEADER_LENGTH: usize = 6;

/// Errors produced while decoding sysex data
#[derive(Debug, Error)]
pub enum FormatError {
    /// The bulk dump is not the size of a DX7 voice bank
    #[error("bulk dump must be {expected} bytes in length, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    /// The message ended before the declared number of bytes
    #[error("sysex data truncated: expected {expected} bytes, got {actual}")]
    TruncatedData { expected: usize, actual: usize },

    /// The message was not written by a Yamaha instrument
    #[error("manufacturer is not Yamaha: {0:#04X}")]
    UnrecognizedManufacturer(u8),

    /// Reading the message failed
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A MIDI system-exclusive message from a DX7
#[derive(Debug, Clone, Serialize)]
pub struct Sysex {
    pub substatus: u8,
    pub channel: u8,
    pub format_number: u8,
    pub byte_count: usize,
    #[serde(skip)]
    data: Vec<u8>,
    #[serde(skip)]
    checksum: Option<u8>,
}

impl Sysex {
    /// Parse a sysex message from a byte slice
    pub fn parse(bytes: &[u8]) -> Result<Self, FormatError> {
        if bytes.len() < HEADER_LENGTH {
            return Err(FormatError::TruncatedData {
                expected: HEADER_LENGTH,
                actual: bytes.len(),
            });
        }
        let hdr = &bytes[..HEADER_LENGTH];
        if hdr[1] != MANUFACTURER_ID {
            return Err(FormatError::UnrecognizedManufacturer(hdr[1]));
        }

        let byte_count = byte_count(hdr[4], hdr[5]);
        if byte_count != BULK_DUMP_LENGTH {
            return Err(FormatError::InvalidLength {
                expected: BULK_DUMP_LENGTH,
                actual: byte_count,
            });
        }

        let body = &bytes[HEADER_LENGTH..];
        if body.len() < byte_count {
            return Err(FormatError::TruncatedData {
                expected: byte_count,
                actual: body.len(),
            });
        }

        let syx = Self {
            substatus: substatus(hdr[2]),
            channel: channel(hdr[2]),
            format_number: midi_mask(hdr[3]),
            byte_count,
            data: body[..byte_count].to_vec(),
            checksum: body.get(byte_count).copied().filter(|&b| b != SYSEX_END),
        };
        syx.verify_checksum();
        Ok(syx)
    }

    /// Read a whole sysex message from a reader and parse it
    pub fn read<R: Read>(mut reader: R) -> Result<Self, FormatError> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        Self::parse(&bytes)
    }

    /// Raw bulk dump bytes
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Decode the first voice of the bank
    pub fn bulk_dump(&self) -> Result<BulkDump, FormatError> {
        BulkDump::parse(&self.data)
    }

    /// Decode all 32 voices of the bank
    pub fn bank(&self) -> Result<Vec<BulkDump>, FormatError> {
        BulkDump::parse_bank(&self.data)
    }

    // A bad checksum is common in files passed around online, so it only warns.
    fn verify_checksum(&self) {
        if let Some(expected) = self.checksum {
            let actual = checksum(&self.data);
            if actual != expected {
                log::warn!(
                    "sysex checksum mismatch: expected {:#04X}, computed {:#04X}",
                    expected,
                    actual
                );
            }
        }
    }
}

/// Substatus from the third header byte, laid out as 0sssnnnn.
pub fn substatus(b: u8) -> u8 {
    (b & 0x70) >> 4
}

/// MIDI channel from the third header byte.
pub fn channel(b: u8) -> u8 {
    b & 0x0F
}

/// MIDI data bytes never have the high bit set.
pub fn midi_mask(b: u8) -> u8 {
    b & 0x7F
}

/// Number of data bytes, sent as two 7-bit MIDI bytes (most significant first).
pub fn byte_count(ms: u8, ls: u8) -> usize {
    ((midi_mask(ms) as usize) << 7) | midi_mask(ls) as usize
}

/// Two's complement of the 7-bit sum of the data bytes.
pub fn checksum(data: &[u8]) -> u8 {
    let sum = data.iter().fold(0u8, |acc, &b| acc.wrapping_add(b));
    sum.wrapping_neg() & 0x7F
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(byte_count: (u8, u8), data_len: usize) -> Vec<u8> {
        let (ms, ls) = byte_count;
        let mut bytes = vec![SYSEX_STATUS, MANUFACTURER_ID, 0x00, 0x09, ms, ls];
        bytes.extend(std::iter::repeat(0u8).take(data_len));
        bytes
    }

    #[test]
    fn test_substatus() {
        for (input, output) in [
            (0x02, 0), (0x08, 0), (0x10, 1), (0x1A, 1), (0x20, 2), (0x2B, 2),
            (0x30, 3), (0x3C, 3), (0x40, 4), (0x4C, 4), (0x50, 5), (0x5C, 5),
            (0x60, 6), (0x6C, 6), (0x70, 7), (0x7C, 7), (0x8D, 0), (0xA0, 2),
            (0xB1, 3), (0xC2, 4), (0xD3, 5), (0xE4, 6), (0xF5, 7),
        ] {
            assert_eq!(substatus(input), output, "substatus({:#04X})", input);
        }
    }

    #[test]
    fn test_channel() {
        for (input, output) in [
            (0x02, 2), (0x08, 8), (0x10, 0), (0x1A, 10), (0x2B, 11), (0x3C, 12),
            (0x8D, 13), (0xA0, 0), (0xB1, 1), (0xC2, 2), (0xD3, 3), (0xE4, 4), (0xF5, 5),
        ] {
            assert_eq!(channel(input), output, "channel({:#04X})", input);
        }
    }

    #[test]
    fn test_byte_count() {
        assert_eq!(byte_count(0x20, 0x00), 4096);
        assert_eq!(byte_count(0x01, 0x00), 128);
        assert_eq!(byte_count(0x00, 0x7F), 127);
        assert_eq!(byte_count(0x01, 0x1B), 155);
    }

    #[test]
    fn test_checksum() {
        assert_eq!(checksum(&[]), 0);
        assert_eq!(checksum(&[0x01]), 0x7F);
        assert_eq!(checksum(&[0x40, 0x40]), 0x00);
        let data = [0x12, 0x34, 0x56];
        let total = data.iter().map(|&b| b as u32).sum::<u32>() + checksum(&data) as u32;
        assert_eq!(total & 0x7F, 0);
    }

    #[test]
    fn test_parse_valid_message() {
        let mut bytes = message((0x20, 0x00), BULK_DUMP_LENGTH);
        bytes[2] = 0x15;
        let syx = Sysex::parse(&bytes).unwrap();

        assert_eq!(syx.substatus, 1);
        assert_eq!(syx.channel, 5);
        assert_eq!(syx.format_number, 9);
        assert_eq!(syx.byte_count, 4096);
        assert_eq!(syx.data().len(), 4096);
        assert_eq!(syx.bulk_dump().unwrap().ops.len(), 6);
    }

    #[test]
    fn test_parse_ignores_trailer() {
        let mut bytes = message((0x20, 0x00), BULK_DUMP_LENGTH);
        bytes.push(0x00);
        bytes.push(SYSEX_END);
        let syx = Sysex::parse(&bytes).unwrap();
        assert_eq!(syx.data().len(), 4096);
        assert_eq!(syx.checksum, Some(0x00));
    }

    #[test]
    fn test_parse_wrong_declared_length() {
        let bytes = message((0x01, 0x1B), 155);
        match Sysex::parse(&bytes) {
            Err(FormatError::InvalidLength { expected, actual }) => {
                assert_eq!(expected, 4096);
                assert_eq!(actual, 155);
            }
            other => panic!("expected InvalidLength, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_truncated_data() {
        let bytes = message((0x20, 0x00), 1000);
        assert!(matches!(
            Sysex::parse(&bytes),
            Err(FormatError::TruncatedData { expected: 4096, actual: 1000 })
        ));
    }

    #[test]
    fn test_parse_truncated_header() {
        assert!(matches!(
            Sysex::parse(&[SYSEX_STATUS, MANUFACTURER_ID]),
            Err(FormatError::TruncatedData { expected: 6, actual: 2 })
        ));
    }

    #[test]
    fn test_parse_wrong_manufacturer() {
        let mut bytes = message((0x20, 0x00), BULK_DUMP_LENGTH);
        bytes[1] = 0x41;
        assert!(matches!(
            Sysex::parse(&bytes),
            Err(FormatError::UnrecognizedManufacturer(0x41))
        ));
    }

    #[test]
    fn test_read_from_reader() {
        let bytes = message((0x20, 0x00), BULK_DUMP_LENGTH);
        let syx = Sysex::read(std::io::Cursor::new(bytes)).unwrap();
        assert_eq!(syx.bank().unwrap().len(), 32);
    }
}
