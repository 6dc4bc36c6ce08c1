//! Lamp matrix multiplexing.
//!
//! Lamp state lives in two byte maps, one per row-select register,
//! indexed by column. Logical lamp operations only change those bytes;
//! the hardware sees them one column per tick, with the column register
//! cleared between columns so at most one column is ever driven.

use flipper_common::bits::{BitOp, DATA_LOW, bit_mask};
use flipper_common::consts::MATRIX_COLUMNS;
use flipper_common::descriptors::{DescriptorTable, LampDescriptor, LampMatrix};
use flipper_common::error::{DeviceKind, DriverError, StateError};
use flipper_common::registers::Register;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::protocol::RegisterBus;
use crate::scheduler::{IntervalScheduler, TickStats};
use crate::state::StateStore;

const COMPONENT: &str = "lamp multiplexer";

/// Periodic driver of the two lamp matrices.
#[derive(Debug)]
pub struct LampMultiplexer {
    scheduler: IntervalScheduler,
    lamps: HashMap<String, LampDescriptor>,
    bytes: [[u8; MATRIX_COLUMNS]; LampMatrix::COUNT],
    cursor: usize,
}

impl LampMultiplexer {
    /// Build the byte maps and darken the matrix.
    pub fn new(table: &DescriptorTable, interval: Duration, bus: &mut dyn RegisterBus) -> Self {
        bus.write(Register::LAMP_COLUMN, DATA_LOW);
        info!(
            "Lamp multiplexer built: {} lamps, interval {}us",
            table.lamps.len(),
            interval.as_micros()
        );
        Self {
            scheduler: IntervalScheduler::new(COMPONENT, interval),
            lamps: table.lamps.iter().map(|(k, v)| (k.clone(), *v)).collect(),
            bytes: [[DATA_LOW; MATRIX_COLUMNS]; LampMatrix::COUNT],
            cursor: 0,
        }
    }

    /// Request lamp `name` on.
    pub fn enable(&mut self, name: &str, store: &mut StateStore) -> Result<bool, DriverError> {
        self.apply(name, BitOp::Enable, store)
    }

    /// Request lamp `name` off.
    pub fn disable(&mut self, name: &str, store: &mut StateStore) -> Result<bool, DriverError> {
        self.apply(name, BitOp::Disable, store)
    }

    /// Flip lamp `name`.
    pub fn toggle(&mut self, name: &str, store: &mut StateStore) -> Result<bool, DriverError> {
        self.apply(name, BitOp::Toggle, store)
    }

    /// Apply `op` to the lamp's bit and report the resulting state.
    ///
    /// Nothing is written to the bus; the next tick for the lamp's column
    /// carries the change.
    fn apply(&mut self, name: &str, op: BitOp, store: &mut StateStore) -> Result<bool, DriverError> {
        let lamp = self
            .lamps
            .get(name)
            .ok_or_else(|| DriverError::unknown(DeviceKind::Lamp, name))?;
        let mask = lamp.mask();
        let byte = &mut self.bytes[lamp.matrix.index()][lamp.column as usize];
        *byte = op.apply(*byte, mask);
        let lit = *byte & mask != 0;
        debug!(lamp = name, lit, "lamp {:?}", op);
        store.update_lamp(name, lit)?;
        Ok(lit)
    }

    /// Requested state of lamp `name`, independent of multiplexing.
    pub fn is_lit(&self, name: &str) -> Option<bool> {
        self.lamps.get(name).map(|lamp| {
            self.bytes[lamp.matrix.index()][lamp.column as usize] & lamp.mask() != 0
        })
    }

    /// Row byte of `matrix` at `column`.
    pub fn row_byte(&self, matrix: LampMatrix, column: u8) -> u8 {
        self.bytes[matrix.index()][column as usize % MATRIX_COLUMNS]
    }

    /// Column driven by the next tick.
    pub fn cursor(&self) -> u8 {
        self.cursor as u8
    }

    /// Begin multiplexing.
    pub fn start(&mut self, now: Instant) -> Result<(), StateError> {
        self.scheduler.start(now)?;
        info!("Lamp multiplexer started");
        Ok(())
    }

    /// Stop multiplexing and darken the matrix. Lamp requests are kept.
    pub fn stop(&mut self, bus: &mut dyn RegisterBus) -> Result<(), StateError> {
        self.scheduler.stop()?;
        bus.write(Register::LAMP_COLUMN, DATA_LOW);
        info!("Lamp multiplexer stopped");
        Ok(())
    }

    /// Whether multiplexing is active.
    pub fn is_running(&self) -> bool {
        self.scheduler.is_running()
    }

    /// Drive one column if a tick is due at `now`.
    pub fn poll(&mut self, now: Instant, bus: &mut dyn RegisterBus) -> bool {
        if !self.scheduler.poll(now) {
            return false;
        }
        self.tick(bus);
        true
    }

    /// Drive the column under the cursor and advance it.
    pub fn tick(&mut self, bus: &mut dyn RegisterBus) {
        let column = self.cursor;
        bus.write(Register::LAMP_COLUMN, DATA_LOW);
        for matrix in LampMatrix::ALL {
            bus.write(matrix.register(), self.bytes[matrix.index()][column]);
        }
        bus.write(Register::LAMP_COLUMN, bit_mask(column as u8));
        self.cursor = (column + 1) % MATRIX_COLUMNS;
    }

    /// Scheduler timing statistics.
    pub fn stats(&self) -> TickStats {
        self.scheduler.stats()
    }
}
