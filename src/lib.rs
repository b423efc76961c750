//! This crate programs Cypress EZ-USB FX2 microcontrollers over USB: it
//! loads firmware supplied as an Intel HEX image into the device's internal
//! RAM and, through the bundled bootstrap firmware, reads and writes the
//! small configuration EEPROM.
//!
//! # Example: Loading firmware
//! ```rust, no_run
//! use fx2load::Fx2;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Open an unconfigured FX2LP by its default VID:PID
//! let mut device = Fx2::open_with_vid_pid(0x04b4, 0x8613)?;
//!
//! // Halt the CPU, write the image, start the CPU
//! let written = device.load_firmware_file("firmware.hex")?;
//! println!("loaded {} bytes", written);
//!
//! // The EEPROM is reachable once firmware services the vendor commands;
//! // a bootstrap image is installed automatically when needed.
//! let data = device.read_eeprom(8)?;
//! println!("EEPROM: {:02x?}", data);
//! # Ok(())
//! # }
//! ```
//!
//! A load is strictly all-or-nothing: the CPU is halted first, every
//! contiguous segment of the image is written in bounded chunks, and the
//! CPU is released only after the last chunk succeeded. The first failed
//! transfer aborts the load with no retry and no rollback, since a
//! half-written instruction stream is unsafe to start.
//!
//! Handles are single-threaded and exclusively owned; every transfer blocks
//! until the device answers or [`TIMEOUT`] expires.

mod device;
mod error;
mod loader;
mod record;
mod segment;
mod transport;

pub use device::Fx2;
pub use error::{Error, ParseError, Result};
pub use loader::{Load, Operation};
pub use record::{Record, RecordKind};
pub use segment::{read_segments, Segment, SegmentAccumulator, MAX_SEGMENT_SIZE};
pub use transport::{
    Transport, UsbTransport, CPU_CONTROL_ADDRESS, MAX_CTRL_LEN, REQ_RW_EEPROM, REQ_RW_INTERNAL,
};

/// Timeout for all usb transactions.
pub const TIMEOUT: std::time::Duration = std::time::Duration::from_millis(500);
