//! Linux `/dev/port` accessor.
//!
//! `/dev/port` maps the I/O port space onto file offsets: a one-byte
//! positional write at offset `address` is an `outb` to that port. The
//! data register sits at the base address, the control register two
//! ports above it.

use flipper_common::consts::CONTROL_REGISTER_OFFSET;
use flipper_common::error::DriverError;
use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::FileExt;
use std::path::Path;
use tracing::{error, info};

use super::RawPort;

/// Character device exposing the I/O port space.
pub const DEV_PORT_PATH: &str = "/dev/port";

/// Parallel port reached through `/dev/port`.
#[derive(Debug)]
pub struct DevPort {
    file: File,
    data_offset: u64,
    control_offset: u64,
    io_errors: u64,
    last_sample: u8,
}

impl DevPort {
    /// Open the port at `address`.
    ///
    /// # Errors
    ///
    /// Returns `DriverError::HardwareUnavailable` if `/dev/port` is absent
    /// or the process lacks the privilege to open it.
    pub fn open(address: u16) -> Result<Self, DriverError> {
        Self::open_at(Path::new(DEV_PORT_PATH), address)
    }

    /// Open `address` on an arbitrary port-space file.
    pub fn open_at(path: &Path, address: u16) -> Result<Self, DriverError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| DriverError::HardwareUnavailable {
                address,
                reason: format!("{}: {}", path.display(), e),
            })?;

        info!("Opened parallel port at {:#06x} via {}", address, path.display());
        Ok(Self {
            file,
            data_offset: u64::from(address),
            control_offset: u64::from(address) + u64::from(CONTROL_REGISTER_OFFSET),
            io_errors: 0,
            last_sample: 0,
        })
    }

    /// Number of primitive operations that failed since opening.
    pub fn io_errors(&self) -> u64 {
        self.io_errors
    }

    /// Count and log a failed transfer. Returns whether `result` moved one byte.
    fn record(&mut self, op: &str, result: io::Result<usize>) -> bool {
        let failure = match result {
            Ok(1) => return true,
            Ok(n) => format!("transferred {n} bytes"),
            Err(e) => e.to_string(),
        };
        self.io_errors += 1;
        if self.io_errors <= 10 || self.io_errors % 1000 == 0 {
            error!("Port {} failed (#{}): {}", op, self.io_errors, failure);
        }
        false
    }
}

impl RawPort for DevPort {
    fn write_data(&mut self, value: u8) {
        let result = self.file.write_at(&[value], self.data_offset);
        self.record("data write", result);
    }

    fn write_control(&mut self, value: u8) {
        let result = self.file.write_at(&[value], self.control_offset);
        self.record("control write", result);
    }

    /// A failed read repeats the last good sample, so the lost read
    /// cannot show up as switch edges.
    fn read_data(&mut self) -> u8 {
        let mut buf = [0u8; 1];
        let result = self.file.read_at(&mut buf, self.data_offset);
        if self.record("data read", result) {
            self.last_sample = buf[0];
        }
        self.last_sample
    }
}
