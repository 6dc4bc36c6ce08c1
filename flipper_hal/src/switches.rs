//! Switch scanning.
//!
//! Switches are grouped once at build time into one scan action per
//! switch register and one per matrix column. Each tick runs every
//! register action in ascending register order, then every matrix action
//! in ascending column order. An action reads one byte, compares it with
//! the byte it read last time and reports each changed, named bit to the
//! state store, lowest bit first.

use flipper_common::bits::{bit_mask, set_bits};
use flipper_common::consts::{BYTE_BITS, MATRIX_COLUMNS};
use flipper_common::descriptors::{DescriptorTable, SwitchDescriptor};
use flipper_common::error::{DriverError, StateError};
use flipper_common::registers::Register;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::protocol::RegisterBus;
use crate::scheduler::{IntervalScheduler, TickStats};
use crate::state::StateStore;

const COMPONENT: &str = "switch scanner";

/// Names of one byte's bits plus the byte last read.
#[derive(Debug, Default)]
struct ScanCell {
    names: [Option<String>; BYTE_BITS as usize],
    previous: u8,
}

impl ScanCell {
    fn apply(&mut self, value: u8, store: &mut StateStore) {
        let diff = self.previous ^ value;
        for bit in set_bits(diff) {
            if let Some(name) = &self.names[bit as usize] {
                let level = value & bit_mask(bit);
                debug!(switch = %name, closed = level != 0, "switch edge");
                if let Err(e) = store.update_switch(name, level) {
                    warn!("Dropped switch edge: {}", e);
                }
            }
        }
        self.previous = value;
    }
}

#[derive(Debug)]
struct RegisterScan {
    register: Register,
    cell: ScanCell,
}

#[derive(Debug)]
struct MatrixScan {
    column: u8,
    cell: ScanCell,
}

/// Periodic scanner over switch registers and the switch matrix.
#[derive(Debug)]
pub struct SwitchScanner {
    scheduler: IntervalScheduler,
    registers: Vec<RegisterScan>,
    matrix: heapless::Vec<MatrixScan, MATRIX_COLUMNS>,
}

impl SwitchScanner {
    /// Group the switches of `table` into scan actions.
    ///
    /// # Errors
    ///
    /// Returns `DriverError::Configuration` if a descriptor addresses a
    /// bit or column outside the byte.
    pub fn new(table: &DescriptorTable, interval: Duration) -> Result<Self, DriverError> {
        let mut registers: BTreeMap<Register, ScanCell> = BTreeMap::new();
        let mut columns: BTreeMap<u8, ScanCell> = BTreeMap::new();

        for (name, descriptor) in &table.switches {
            let (cell, bit) = match *descriptor {
                SwitchDescriptor::Register { register, bit } => {
                    (registers.entry(register).or_default(), bit)
                }
                SwitchDescriptor::Matrix { column, row } => {
                    (columns.entry(column).or_default(), row)
                }
            };
            let slot = cell.names.get_mut(bit as usize).ok_or_else(|| {
                DriverError::Configuration(format!("switch '{name}' addresses bit {bit}"))
            })?;
            *slot = Some(name.clone());
        }

        let mut matrix = heapless::Vec::new();
        for (column, cell) in columns {
            if column as usize >= MATRIX_COLUMNS {
                return Err(DriverError::Configuration(format!(
                    "switch matrix has no column {column}"
                )));
            }
            matrix
                .push(MatrixScan { column, cell })
                .map_err(|_| DriverError::Configuration("too many switch columns".to_string()))?;
        }
        let registers: Vec<RegisterScan> = registers
            .into_iter()
            .map(|(register, cell)| RegisterScan { register, cell })
            .collect();

        info!(
            "Switch scanner built: {} register scans, {} matrix columns, interval {}us",
            registers.len(),
            matrix.len(),
            interval.as_micros()
        );

        Ok(Self {
            scheduler: IntervalScheduler::new(COMPONENT, interval),
            registers,
            matrix,
        })
    }

    /// Begin periodic scanning.
    pub fn start(&mut self, now: Instant) -> Result<(), StateError> {
        self.scheduler.start(now)?;
        info!("Switch scanner started");
        Ok(())
    }

    /// Stop periodic scanning. Last read bytes are kept.
    pub fn stop(&mut self) -> Result<(), StateError> {
        self.scheduler.stop()?;
        info!("Switch scanner stopped");
        Ok(())
    }

    /// Whether periodic scanning is active.
    pub fn is_running(&self) -> bool {
        self.scheduler.is_running()
    }

    /// Scan once if a tick is due at `now`. Returns whether it scanned.
    pub fn poll(&mut self, now: Instant, bus: &mut dyn RegisterBus, store: &mut StateStore) -> bool {
        if !self.scheduler.poll(now) {
            return false;
        }
        self.scan(bus, store);
        true
    }

    /// Run every scan action once.
    pub fn scan(&mut self, bus: &mut dyn RegisterBus, store: &mut StateStore) {
        for scan in self.registers.iter_mut() {
            let value = bus.read(scan.register);
            scan.cell.apply(value, store);
        }
        for scan in self.matrix.iter_mut() {
            bus.write(Register::SWITCH_COLUMN, bit_mask(scan.column));
            let value = bus.read(Register::SWITCH_ROW);
            scan.cell.apply(value, store);
        }
    }

    /// Scheduler timing statistics.
    pub fn stats(&self) -> TickStats {
        self.scheduler.stats()
    }
}
