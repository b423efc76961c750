//! Decoding of single Intel HEX record lines.
//!
//! A record line has the form `:LLAAAATT[DD...]CC`: a declared payload
//! length, a big-endian 16-bit address, a type byte, the payload and a
//! checksum byte chosen so that the byte sum of the whole record is 0 mod
//! 256. Only 16-bit addressing is supported here, which matches the FX2's
//! memory map; the extended record types are recognized but carry no meaning
//! for this loader.

use crate::error::ParseError;

/// The record types defined by the 16-bit Intel HEX format.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum RecordKind {
    /// Bytes to be placed at the record's address.
    Data,

    /// Terminates the record stream.
    EndOfFile,

    /// Recognized but not interpreted (32-bit addressing is out of scope).
    ExtendedSegmentAddress,

    /// Recognized but not interpreted.
    StartSegmentAddress,

    /// Recognized but not interpreted.
    ExtendedLinearAddress,

    /// Recognized but not interpreted.
    StartLinearAddress,
}

impl RecordKind {
    fn from_type_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(RecordKind::Data),
            0x01 => Some(RecordKind::EndOfFile),
            0x02 => Some(RecordKind::ExtendedSegmentAddress),
            0x03 => Some(RecordKind::StartSegmentAddress),
            0x04 => Some(RecordKind::ExtendedLinearAddress),
            0x05 => Some(RecordKind::StartLinearAddress),
            _ => None,
        }
    }
}

/// A single validated Intel HEX record.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Record {
    /// Target address of the first payload byte.
    pub address: u16,

    /// Record type.
    pub kind: RecordKind,

    /// Payload bytes. Empty for every kind except `Data` in practice, but
    /// the decoder keeps whatever the record declared.
    pub payload: Vec<u8>,
}

impl Record {
    /// Decodes one record line. Leading and trailing whitespace is ignored.
    ///
    /// The decode is pure: no state, no side effects. A record which fails
    /// any structural or checksum test is rejected as a whole; there is no
    /// partial decode.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use fx2load::{Record, RecordKind};
    ///
    /// let record = Record::parse(":0300300002337A1E")?;
    /// assert_eq!(record.address, 0x0030);
    /// assert_eq!(record.kind, RecordKind::Data);
    /// assert_eq!(record.payload, [0x02, 0x33, 0x7A]);
    /// # Ok::<(), fx2load::ParseError>(())
    /// ```
    pub fn parse(line: &str) -> Result<Record, ParseError> {
        let digits = line
            .trim()
            .strip_prefix(':')
            .ok_or(ParseError::MalformedLine)?;
        // from_str_radix alone is too lax here: it accepts a leading sign,
        // and a sign-bearing pair can still checksum, so a corrupted line
        // could pass for a real record. Only bare hex digits are a record.
        if !digits.bytes().all(|byte| byte.is_ascii_hexdigit()) {
            return Err(ParseError::MalformedLine);
        }
        if digits.len() % 2 != 0 {
            return Err(ParseError::OddHexLength);
        }

        let mut bytes = Vec::with_capacity(digits.len() / 2);
        for i in (0..digits.len()).step_by(2) {
            let byte = u8::from_str_radix(&digits[i..i + 2], 16)
                .map_err(|_| ParseError::MalformedLine)?;
            bytes.push(byte);
        }

        // Overhead: length, address hi/lo, type and checksum bytes.
        let declared = bytes.first().copied().unwrap_or(0) as usize;
        if bytes.len() != declared + 5 {
            return Err(ParseError::LengthMismatch {
                declared,
                actual: bytes.len().saturating_sub(5),
            });
        }

        let address = u16::from_be_bytes([bytes[1], bytes[2]]);
        let kind = RecordKind::from_type_byte(bytes[3])
            .ok_or(ParseError::UnknownRecordType(bytes[3]))?;

        // Two's-complement checksum: the sum of every record byte, the
        // checksum byte included, must come out to 0 mod 256.
        let sum = bytes.iter().fold(0u8, |sum, byte| sum.wrapping_add(*byte));
        if sum != 0 {
            return Err(ParseError::ChecksumMismatch);
        }

        Ok(Record {
            address,
            kind,
            payload: bytes[4..4 + declared].to_vec(),
        })
    }
}
