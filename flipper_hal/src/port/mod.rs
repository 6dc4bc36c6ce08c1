//! Raw byte-level access to the parallel port.
//!
//! A [`RawPort`] knows nothing about registers; it only moves bytes over
//! the data and control lines. [`crate::protocol::ProtocolPort`] builds the
//! register handshake on top of it.

pub mod dev_port;
pub mod simulated;

pub use dev_port::DevPort;
pub use simulated::{PortOp, SimulatedPort, SimulatorHandle};

/// Primitive port operations.
pub trait RawPort: Send {
    /// Drive the eight data lines.
    fn write_data(&mut self, value: u8);

    /// Drive the control lines.
    fn write_control(&mut self, value: u8);

    /// Sample the eight data lines.
    fn read_data(&mut self) -> u8;
}

impl<P: RawPort + ?Sized> RawPort for Box<P> {
    fn write_data(&mut self, value: u8) {
        (**self).write_data(value);
    }

    fn write_control(&mut self, value: u8) {
        (**self).write_control(value);
    }

    fn read_data(&mut self) -> u8 {
        (**self).read_data()
    }
}
