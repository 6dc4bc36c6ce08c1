//! In-memory emulation of the driver board's register file.
//!
//! The emulation decodes the same control-line handshake as the board:
//! a rising latch clock selects the register on the data lines, a rising
//! decode output stores the data byte into it, and the read phase turns
//! the data lines around so the selected input register can be sampled.
//! The switch-row register answers from an 8×8 switch matrix, using the
//! column mask last written to the switch-column register.
//!
//! State lives behind `Arc<Mutex<..>>`; a [`SimulatorHandle`] stays with
//! the test or the simulation front-end while the port itself is moved
//! into the protocol layer.

use flipper_common::bits::ControlLines;
use flipper_common::consts::{MATRIX_COLUMNS, MATRIX_ROWS};
use flipper_common::descriptors::SwitchDescriptor;
use flipper_common::registers::Register;
use parking_lot::Mutex;
use std::sync::Arc;

use super::RawPort;

/// One primitive port operation, as seen on the wires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortOp {
    /// Byte driven on the data lines.
    Data(u8),
    /// Byte driven on the control lines.
    Control(u8),
    /// Byte sampled from the data lines.
    Read(u8),
}

#[derive(Debug)]
struct Board {
    data: u8,
    control: ControlLines,
    selected: Option<Register>,
    registers: [u8; 256],
    switch_matrix: [u8; MATRIX_COLUMNS],
    recording: bool,
    ops: Vec<PortOp>,
    writes: Vec<(Register, u8)>,
}

impl Board {
    fn new() -> Self {
        Self {
            data: 0,
            control: ControlLines::IDLE,
            selected: None,
            registers: [0; 256],
            switch_matrix: [0; MATRIX_COLUMNS],
            recording: true,
            ops: Vec::new(),
            writes: Vec::new(),
        }
    }

    fn log(&mut self, op: PortOp) {
        if self.recording {
            self.ops.push(op);
        }
    }

    fn register_value(&self, register: Register) -> u8 {
        if register == Register::SWITCH_ROW {
            let columns = self.registers[Register::SWITCH_COLUMN.id() as usize];
            return self
                .switch_matrix
                .iter()
                .enumerate()
                .filter(|(column, _)| columns & (1 << column) != 0)
                .fold(0, |row, (_, bits)| row | bits);
        }
        self.registers[register.id() as usize]
    }
}

/// Simulated parallel port wired to an emulated driver board.
#[derive(Debug)]
pub struct SimulatedPort {
    board: Arc<Mutex<Board>>,
}

/// Inspection and stimulus handle for a [`SimulatedPort`].
#[derive(Debug, Clone)]
pub struct SimulatorHandle {
    board: Arc<Mutex<Board>>,
}

impl Default for SimulatedPort {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedPort {
    /// Board with all registers zero and operation recording enabled.
    pub fn new() -> Self {
        Self {
            board: Arc::new(Mutex::new(Board::new())),
        }
    }

    /// Handle sharing this port's board.
    pub fn handle(&self) -> SimulatorHandle {
        SimulatorHandle {
            board: Arc::clone(&self.board),
        }
    }
}

impl RawPort for SimulatedPort {
    fn write_data(&mut self, value: u8) {
        let mut board = self.board.lock();
        board.data = value;
        board.log(PortOp::Data(value));
    }

    fn write_control(&mut self, value: u8) {
        let mut board = self.board.lock();
        let next = ControlLines::from_bits_retain(value);
        let rising = next.difference(board.control);

        if rising.contains(ControlLines::LATCH_CLOCK) {
            board.selected = Some(Register(board.data));
        }
        let reading = next.contains(ControlLines::PRINTER_DIRECTION);
        if rising.contains(ControlLines::DECODE_OUTPUT) && !reading {
            if let Some(register) = board.selected {
                let data = board.data;
                board.registers[register.id() as usize] = data;
                if board.recording {
                    board.writes.push((register, data));
                }
            }
        }

        board.control = next;
        board.log(PortOp::Control(value));
    }

    fn read_data(&mut self) -> u8 {
        let mut board = self.board.lock();
        let value = match board.selected {
            Some(register) if board.control.contains(ControlLines::PRINTER_DIRECTION) => {
                board.register_value(register)
            }
            _ => board.data,
        };
        board.log(PortOp::Read(value));
        value
    }
}

impl SimulatorHandle {
    /// Set the byte served when `register` is read.
    pub fn set_input(&self, register: Register, value: u8) {
        self.board.lock().registers[register.id() as usize] = value;
    }

    /// Close or open one switch of the switch matrix.
    pub fn set_matrix_switch(&self, column: u8, row: u8, closed: bool) {
        let column = column as usize % MATRIX_COLUMNS;
        let mask = 1u8 << (row as usize % MATRIX_ROWS);
        let mut board = self.board.lock();
        if closed {
            board.switch_matrix[column] |= mask;
        } else {
            board.switch_matrix[column] &= !mask;
        }
    }

    /// Close or open the switch at `descriptor`.
    pub fn set_switch(&self, descriptor: &SwitchDescriptor, closed: bool) {
        match *descriptor {
            SwitchDescriptor::Matrix { column, row } => {
                self.set_matrix_switch(column, row, closed);
            }
            SwitchDescriptor::Register { register, .. } => {
                let mask = descriptor.mask();
                let mut board = self.board.lock();
                let cell = &mut board.registers[register.id() as usize];
                if closed {
                    *cell |= mask;
                } else {
                    *cell &= !mask;
                }
            }
        }
    }

    /// Last value stored into `register`.
    pub fn register(&self, register: Register) -> u8 {
        self.board.lock().registers[register.id() as usize]
    }

    /// Current control lines.
    pub fn control(&self) -> u8 {
        self.board.lock().control.bits()
    }

    /// Decoded register writes, oldest first.
    pub fn writes(&self) -> Vec<(Register, u8)> {
        self.board.lock().writes.clone()
    }

    /// Decoded writes to one register, oldest first.
    pub fn writes_to(&self, register: Register) -> Vec<u8> {
        self.board
            .lock()
            .writes
            .iter()
            .filter(|(r, _)| *r == register)
            .map(|(_, v)| *v)
            .collect()
    }

    /// Primitive operations, oldest first.
    pub fn ops(&self) -> Vec<PortOp> {
        self.board.lock().ops.clone()
    }

    /// Forget all recorded operations and writes.
    pub fn clear_log(&self) {
        let mut board = self.board.lock();
        board.ops.clear();
        board.writes.clear();
    }

    /// Turn operation recording on or off. Long simulations run without it.
    pub fn set_recording(&self, recording: bool) {
        let mut board = self.board.lock();
        board.recording = recording;
        if !recording {
            board.ops = Vec::new();
            board.writes = Vec::new();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn select(port: &mut SimulatedPort, register: Register) {
        port.write_data(register.id());
        port.write_control(ControlLines::LATCH_CLOCK.bits());
        port.write_control(ControlLines::IDLE.bits());
    }

    #[test]
    fn decode_pulse_stores_data() {
        let mut port = SimulatedPort::new();
        let handle = port.handle();

        select(&mut port, Register::LAMP_ROW_A);
        port.write_data(0x5A);
        port.write_control(ControlLines::DECODE_OUTPUT.bits());
        port.write_control(ControlLines::IDLE.bits());

        assert_eq!(handle.register(Register::LAMP_ROW_A), 0x5A);
        assert_eq!(handle.writes(), vec![(Register::LAMP_ROW_A, 0x5A)]);
        assert_eq!(handle.ops().len(), 6);
    }

    #[test]
    fn read_phase_serves_input() {
        let mut port = SimulatedPort::new();
        let handle = port.handle();
        handle.set_input(Register::SWITCH_PLAY_FIELD, 0b1001);

        select(&mut port, Register::SWITCH_PLAY_FIELD);
        port.write_control(ControlLines::READ_PHASE.bits());
        assert_eq!(port.read_data(), 0b1001);
        port.write_control(ControlLines::IDLE.bits());

        // the read phase's decode pulse must not store anything
        assert!(handle.writes().is_empty());
    }

    #[test]
    fn switch_row_follows_column_select() {
        let mut port = SimulatedPort::new();
        let handle = port.handle();
        handle.set_matrix_switch(2, 6, true);

        for (column_mask, expected) in [(0b0000_0100u8, 0b0100_0000u8), (0b0000_1000, 0)] {
            select(&mut port, Register::SWITCH_COLUMN);
            port.write_data(column_mask);
            port.write_control(ControlLines::DECODE_OUTPUT.bits());
            port.write_control(ControlLines::IDLE.bits());

            select(&mut port, Register::SWITCH_ROW);
            port.write_control(ControlLines::READ_PHASE.bits());
            assert_eq!(port.read_data(), expected);
            port.write_control(ControlLines::IDLE.bits());
        }
    }

    #[test]
    fn recording_can_be_disabled() {
        let mut port = SimulatedPort::new();
        let handle = port.handle();
        handle.set_recording(false);
        select(&mut port, Register::LAMP_COLUMN);
        assert!(handle.ops().is_empty());
    }
}
