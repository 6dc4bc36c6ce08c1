//! Register access over the parallel port.
//!
//! Every register access starts by latching the register id into the
//! board's index register. A write then strobes the value through the
//! decode output; a read turns the bus around, samples one byte and
//! releases the control lines again before returning.
//!
//! ```text
//! write(r, v):  data=r  ctl=LATCH  ctl=0  data=v  ctl=DECODE  ctl=0
//! read(r):      data=r  ctl=LATCH  ctl=0  ctl=DECODE|BUF|PRN  read  ctl=0
//! ```

use flipper_common::bits::ControlLines;
use flipper_common::registers::Register;
use std::collections::{HashMap, VecDeque};
use tracing::trace;

use crate::port::RawPort;

/// Logical register access, the seam every driver is written against.
///
/// Implementations are synchronous and have exactly one owner; callers
/// serialize access structurally.
pub trait RegisterBus: Send {
    /// Store `value` into `register`.
    fn write(&mut self, register: Register, value: u8);

    /// Sample the current value of `register`.
    fn read(&mut self, register: Register) -> u8;
}

impl<B: RegisterBus + ?Sized> RegisterBus for Box<B> {
    fn write(&mut self, register: Register, value: u8) {
        (**self).write(register, value);
    }

    fn read(&mut self, register: Register) -> u8 {
        (**self).read(register)
    }
}

// ─── ProtocolPort ───────────────────────────────────────────────────

/// Three-phase register handshake on top of a [`RawPort`].
#[derive(Debug)]
pub struct ProtocolPort<P: RawPort> {
    port: P,
}

impl<P: RawPort> ProtocolPort<P> {
    /// Wrap an opened raw port.
    pub fn new(port: P) -> Self {
        Self { port }
    }

    /// Release the raw port.
    pub fn into_inner(self) -> P {
        self.port
    }

    fn select(&mut self, register: Register) {
        self.port.write_data(register.id());
        self.port.write_control(ControlLines::LATCH_CLOCK.bits());
        self.port.write_control(ControlLines::IDLE.bits());
    }
}

impl<P: RawPort> RegisterBus for ProtocolPort<P> {
    fn write(&mut self, register: Register, value: u8) {
        trace!(%register, value, "bus write");
        self.select(register);
        self.port.write_data(value);
        self.port.write_control(ControlLines::DECODE_OUTPUT.bits());
        self.port.write_control(ControlLines::IDLE.bits());
    }

    fn read(&mut self, register: Register) -> u8 {
        self.select(register);
        self.port.write_control(ControlLines::READ_PHASE.bits());
        let value = self.port.read_data();
        // The bus is released before the caller sees the value, so
        // whatever it triggers may start a new access right away.
        self.port.write_control(ControlLines::IDLE.bits());
        trace!(%register, value, "bus read");
        value
    }
}

// ─── RecordingBus ───────────────────────────────────────────────────

/// One logical bus access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusOp {
    /// `write(register, value)`.
    Write(Register, u8),
    /// `read(register)` that returned the value.
    Read(Register, u8),
}

/// In-memory bus recording every access and serving scripted reads.
///
/// Reads of a register pop its script; once the script is empty the
/// last served value repeats (0 if nothing was ever scripted).
#[derive(Debug, Default)]
pub struct RecordingBus {
    ops: Vec<BusOp>,
    scripts: HashMap<Register, VecDeque<u8>>,
    last_read: HashMap<Register, u8>,
}

impl RecordingBus {
    /// Empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `value` for the next unscripted read of `register`.
    pub fn push_read(&mut self, register: Register, value: u8) {
        self.scripts.entry(register).or_default().push_back(value);
    }

    /// All accesses, oldest first.
    pub fn ops(&self) -> &[BusOp] {
        &self.ops
    }

    /// Writes only, oldest first.
    pub fn writes(&self) -> Vec<(Register, u8)> {
        self.ops
            .iter()
            .filter_map(|op| match *op {
                BusOp::Write(register, value) => Some((register, value)),
                BusOp::Read(..) => None,
            })
            .collect()
    }

    /// Values written to `register`, oldest first.
    pub fn writes_to(&self, register: Register) -> Vec<u8> {
        self.writes()
            .into_iter()
            .filter(|(r, _)| *r == register)
            .map(|(_, v)| v)
            .collect()
    }

    /// Forget recorded accesses; scripts are kept.
    pub fn clear(&mut self) {
        self.ops.clear();
    }
}

impl RegisterBus for RecordingBus {
    fn write(&mut self, register: Register, value: u8) {
        self.ops.push(BusOp::Write(register, value));
    }

    fn read(&mut self, register: Register) -> u8 {
        let scripted = self.scripts.get_mut(&register).and_then(VecDeque::pop_front);
        let value = match scripted {
            Some(value) => {
                self.last_read.insert(register, value);
                value
            }
            None => self.last_read.get(&register).copied().unwrap_or(0),
        };
        self.ops.push(BusOp::Read(register, value));
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::{PortOp, SimulatedPort};

    #[test]
    fn write_handshake_is_bit_exact() {
        let port = SimulatedPort::new();
        let handle = port.handle();
        let mut bus = ProtocolPort::new(port);

        bus.write(Register::SOLENOID_GROUP_A, 0b0001_0000);

        assert_eq!(
            handle.ops(),
            vec![
                PortOp::Data(11),
                PortOp::Control(0b0000_0100),
                PortOp::Control(0),
                PortOp::Data(0b0001_0000),
                PortOp::Control(0b0000_0001),
                PortOp::Control(0),
            ]
        );
        assert_eq!(handle.register(Register::SOLENOID_GROUP_A), 0b0001_0000);
    }

    #[test]
    fn read_handshake_releases_before_returning() {
        let port = SimulatedPort::new();
        let handle = port.handle();
        handle.set_input(Register::SWITCH_CABINET_FLIPPER, 0b0011_0000);
        let mut bus = ProtocolPort::new(port);

        let value = bus.read(Register::SWITCH_CABINET_FLIPPER);

        assert_eq!(value, 0b0011_0000);
        assert_eq!(
            handle.ops(),
            vec![
                PortOp::Data(1),
                PortOp::Control(0b0000_0100),
                PortOp::Control(0),
                PortOp::Control(0b0010_1001),
                PortOp::Read(0b0011_0000),
                PortOp::Control(0),
            ]
        );
        assert_eq!(handle.control(), 0);
    }

    #[test]
    fn recording_bus_scripts_then_repeats() {
        let mut bus = RecordingBus::new();
        assert_eq!(bus.read(Register(1)), 0);

        bus.push_read(Register(1), 0b101);
        bus.push_read(Register(1), 0b100);
        assert_eq!(bus.read(Register(1)), 0b101);
        assert_eq!(bus.read(Register(1)), 0b100);
        assert_eq!(bus.read(Register(1)), 0b100);

        bus.write(Register(8), 1);
        assert_eq!(bus.writes(), vec![(Register(8), 1)]);
        assert_eq!(bus.ops().len(), 5);
    }
}
