//! Vendor control-transfer transport.
//!
//! The loader core only needs a blocking write/read pair for vendor
//! requests; [`Transport`] captures exactly that, and [`UsbTransport`] is
//! the rusb binding used against real hardware. Nothing outside this module
//! and device discovery touches rusb types.

use rusb::{DeviceHandle, UsbContext};

use crate::error::Result;
use crate::TIMEOUT;

/// Vendor request for reading or writing internal RAM ("Firmware Load").
pub const REQ_RW_INTERNAL: u8 = 0xA0;

/// Vendor request for reading or writing the EEPROM, serviced by the
/// bootstrap firmware.
pub const REQ_RW_EEPROM: u8 = 0xA2;

/// Address of the CPUCS register controlling the 8051 core.
pub const CPU_CONTROL_ADDRESS: u16 = 0xE600;

/// CPUCS value placing the CPU in reset.
pub const CPU_HALT: u8 = 1;

/// CPUCS value releasing the CPU from reset.
pub const CPU_RUN: u8 = 0;

/// Maximum payload of a single control transfer. libusb cannot reliably
/// move more than this in one request, so larger writes must be chunked.
pub const MAX_CTRL_LEN: usize = 4096;

/// Blocking vendor control-transfer capability of an FX2 device.
///
/// Both calls return the number of bytes actually moved, which may be less
/// than requested; the caller decides whether a short transfer is fatal.
pub trait Transport {
    /// Issues a vendor OUT transfer carrying `data`.
    fn write(&mut self, request: u8, address: u16, index: u16, data: &[u8]) -> Result<usize>;

    /// Issues a vendor IN transfer filling `buffer`.
    fn read(&mut self, request: u8, address: u16, index: u16, buffer: &mut [u8]) -> Result<usize>;
}

/// [`Transport`] implementation on top of a rusb device handle.
pub struct UsbTransport<C: UsbContext> {
    handle: DeviceHandle<C>,
    timeout: std::time::Duration,
}

impl<C: UsbContext> UsbTransport<C> {
    /// Wraps an open device handle, using the crate-wide transfer timeout.
    pub fn new(handle: DeviceHandle<C>) -> Self {
        Self {
            handle,
            timeout: TIMEOUT,
        }
    }

    /// Wraps an open device handle with a custom transfer timeout.
    pub fn with_timeout(handle: DeviceHandle<C>, timeout: std::time::Duration) -> Self {
        Self { handle, timeout }
    }
}

impl<C: UsbContext> Transport for UsbTransport<C> {
    fn write(&mut self, request: u8, address: u16, index: u16, data: &[u8]) -> Result<usize> {
        Ok(self.handle.write_control(
            rusb::request_type(
                rusb::Direction::Out,
                rusb::RequestType::Vendor,
                rusb::Recipient::Device,
            ),
            request,
            address,
            index,
            data,
            self.timeout,
        )?)
    }

    fn read(&mut self, request: u8, address: u16, index: u16, buffer: &mut [u8]) -> Result<usize> {
        Ok(self.handle.read_control(
            rusb::request_type(
                rusb::Direction::In,
                rusb::RequestType::Vendor,
                rusb::Recipient::Device,
            ),
            request,
            address,
            index,
            buffer,
            self.timeout,
        )?)
    }
}
