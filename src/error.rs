use std::result::Result as StdResult;
use thiserror::Error;

/// Errors which can occur while decoding a single Intel HEX record line.
#[derive(Error, Debug, Copy, Clone, Eq, PartialEq)]
pub enum ParseError {
    /// The line does not start with `:` or contains non-hex characters.
    #[error("malformed record line")]
    MalformedLine,

    /// The line contains an odd number of hex digits, so it cannot be a
    /// sequence of whole bytes.
    #[error("odd number of hex digits")]
    OddHexLength,

    /// The record's declared payload length does not match the number of
    /// bytes actually present.
    #[error("declared length {declared} does not match {actual} payload bytes")]
    LengthMismatch { declared: usize, actual: usize },

    /// The record's byte sum (including the checksum byte) is not 0 mod 256.
    #[error("record checksum mismatch")]
    ChecksumMismatch,

    /// The record type byte is outside the range known to the format.
    #[error("unknown record type 0x{0:02x}")]
    UnknownRecordType(u8),
}

/// Errors which can occur during device setup and communication.
#[derive(Error, Debug)]
pub enum Error {
    /// A firmware image could not be decoded.
    #[error("hex record error: {0}")]
    Parse(#[from] ParseError),

    /// A control transfer moved fewer bytes than requested. Fatal during a
    /// firmware load; a partially written image must not be started.
    #[error("short transfer at 0x{address:04x}: wrote {wrote} of {expected} bytes")]
    Transfer {
        address: u16,
        expected: usize,
        wrote: usize,
    },

    /// The CPU halt or run request did not complete. The device may be left
    /// halted; the caller has to issue another reset.
    #[error("CPU reset request did not complete")]
    CpuReset,

    /// No USB device matched the requested VID:PID or bus address.
    #[error("no matching USB device found")]
    DeviceNotFound,

    /// An error occurred during the raw USB communication.
    #[error("USB error: {0}")]
    Usb(#[from] rusb::Error),

    /// An error occurred while reading a firmware image.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Shorthand for a Result with the crate's own Error type.
pub type Result<T> = StdResult<T, Error>;
