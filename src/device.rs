//! FX2 device handle, discovery and the EEPROM command surface.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use rusb::GlobalContext;

use crate::error::{Error, Result};
use crate::loader::{cpu_control, Load, Operation};
use crate::segment::read_segments;
use crate::transport::{Transport, UsbTransport, CPU_HALT, CPU_RUN, REQ_RW_EEPROM};

/// Bootstrap firmware giving a blank device the vendor EEPROM commands.
const BOOTSTRAP_HEX: &str = include_str!("../firmware/vend_ax.hex");

/// An exclusively owned FX2 device.
///
/// The handle carries the one piece of session state this protocol has:
/// whether the bundled bootstrap firmware is known to be running. The flag
/// starts out unset when the handle is constructed and dies with it; it is
/// never shared between handles or processes.
pub struct Fx2<T: Transport> {
    pub(crate) transport: T,
    bootstrap_loaded: bool,
}

impl Fx2<UsbTransport<GlobalContext>> {
    /// Opens the first device matching a USB vendor and product ID.
    pub fn open_with_vid_pid(vid: u16, pid: u16) -> Result<Self> {
        for device in rusb::devices()?.iter() {
            let Ok(descriptor) = device.device_descriptor() else {
                continue;
            };
            if descriptor.vendor_id() == vid && descriptor.product_id() == pid {
                return Ok(Self::new(UsbTransport::new(device.open()?)));
            }
        }
        Err(Error::DeviceNotFound)
    }

    /// Opens the device at a USB bus number and bus address.
    pub fn open_with_bus_address(bus: u8, address: u8) -> Result<Self> {
        for device in rusb::devices()?.iter() {
            if device.bus_number() == bus && device.address() == address {
                return Ok(Self::new(UsbTransport::new(device.open()?)));
            }
        }
        Err(Error::DeviceNotFound)
    }
}

impl<T: Transport> Fx2<T> {
    /// Wraps an already opened transport.
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            bootstrap_loaded: false,
        }
    }

    /// Puts the CPU into reset or releases it.
    pub fn reset(&mut self, run: bool) -> Result<()> {
        if run {
            log::debug!("starting CPU");
            cpu_control(&mut self.transport, CPU_RUN)
        } else {
            log::debug!("stopping CPU");
            cpu_control(&mut self.transport, CPU_HALT)
        }
    }

    /// Loads an Intel HEX firmware image and starts it.
    ///
    /// The CPU is halted, every contiguous segment of the image is written
    /// to internal RAM, and the CPU is released again. Returns the total
    /// number of firmware bytes written. The load is all-or-nothing: the
    /// first failed transfer aborts it, and nothing is rolled back.
    pub fn load_firmware<R: BufRead>(&mut self, reader: R) -> Result<usize> {
        // Whatever was running is gone after this, the bootstrap included.
        self.bootstrap_loaded = false;
        let segments = read_segments(reader)?;
        Load::new(&mut self.transport, segments).execute()
    }

    /// Loads an Intel HEX firmware image from a file path.
    pub fn load_firmware_file<P: AsRef<Path>>(&mut self, path: P) -> Result<usize> {
        self.load_firmware(BufReader::new(File::open(path)?))
    }

    /// Reads up to `length` bytes from the device's EEPROM.
    ///
    /// The returned buffer holds whatever the device supplied and may be
    /// shorter than requested; short reads are not an error.
    pub fn read_eeprom(&mut self, length: usize) -> Result<Vec<u8>> {
        self.ensure_bootstrap()?;
        let mut buffer = vec![0u8; length];
        let supplied = self.transport.read(REQ_RW_EEPROM, 0, 0, &mut buffer)?;
        buffer.truncate(supplied);
        Ok(buffer)
    }

    /// Writes `data` to the device's EEPROM.
    ///
    /// Returns the number of bytes the device accepted. Unlike a firmware
    /// load, a short EEPROM write is not fatal to the running image, so it
    /// is surfaced as a smaller count for the caller to check.
    pub fn write_eeprom(&mut self, data: &[u8]) -> Result<usize> {
        self.ensure_bootstrap()?;
        self.transport.write(REQ_RW_EEPROM, 0, 0, data)
    }

    /// Makes sure the bundled bootstrap firmware is running. Loaded at most
    /// once per handle; a later explicit firmware load clears the flag.
    fn ensure_bootstrap(&mut self) -> Result<()> {
        if !self.bootstrap_loaded {
            log::debug!("loading bootstrap firmware for EEPROM access");
            self.load_firmware(BOOTSTRAP_HEX.as_bytes())?;
            self.bootstrap_loaded = true;
        }
        Ok(())
    }
}
