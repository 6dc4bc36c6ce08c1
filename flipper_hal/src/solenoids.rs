//! Solenoid control with energize limits.
//!
//! Each solenoid is one bit of a solenoid register. The controller keeps
//! one byte per register as the only record of what is driven and writes
//! the full byte on every change. A solenoid with a cutoff carries a
//! deadline while energized; [`SolenoidController::poll`] runs the
//! disable path for every deadline that has passed.
//!
//! The health LED and the power relay are two more bits on solenoid
//! group D. They are switched together by `start` and `stop` and cannot
//! be addressed by name from outside.

use flipper_common::bits::{BitOp, DATA_LOW};
use flipper_common::consts::{HEALTH_LED, POWER_RELAY_CONTROL};
use flipper_common::descriptors::{DescriptorTable, SolenoidDescriptor};
use flipper_common::error::{DeviceKind, DriverError, StateError};
use flipper_common::registers::Register;
use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::protocol::RegisterBus;
use crate::state::StateStore;

const COMPONENT: &str = "solenoid power";

#[derive(Debug)]
struct Coil {
    name: String,
    register: Register,
    mask: u8,
    cutoff: Option<Duration>,
    deadline: Option<Instant>,
    relay: bool,
}

/// Driver for all solenoid registers.
#[derive(Debug)]
pub struct SolenoidController {
    coils: Vec<Coil>,
    index: HashMap<String, usize>,
    bytes: BTreeMap<Register, u8>,
    powered: bool,
}

impl SolenoidController {
    /// Clear every solenoid register and build the coil table.
    ///
    /// All solenoid registers are written low, configured or not.
    ///
    /// # Errors
    ///
    /// Returns `DriverError::Configuration` if a user solenoid is named
    /// like a built-in relay.
    pub fn new(table: &DescriptorTable, bus: &mut dyn RegisterBus) -> Result<Self, DriverError> {
        for register in Register::SOLENOID_REGISTERS {
            bus.write(register, DATA_LOW);
        }

        let mut coils = Vec::with_capacity(table.solenoids.len() + 2);
        for (name, descriptor) in &table.solenoids {
            if name == HEALTH_LED || name == POWER_RELAY_CONTROL {
                return Err(DriverError::Configuration(format!(
                    "Solenoid name '{name}' is reserved for the power relay"
                )));
            }
            coils.push(Coil::new(name, descriptor, false));
        }
        for (name, descriptor) in SolenoidDescriptor::relays() {
            coils.push(Coil::new(name, &descriptor, true));
        }

        let index = coils
            .iter()
            .enumerate()
            .map(|(i, coil)| (coil.name.clone(), i))
            .collect();
        let bytes = coils.iter().map(|coil| (coil.register, DATA_LOW)).collect();

        info!(
            "Solenoid controller built: {} solenoids, all solenoid registers cleared",
            table.solenoids.len()
        );
        Ok(Self {
            coils,
            index,
            bytes,
            powered: false,
        })
    }

    fn user_coil(&self, name: &str) -> Result<usize, DriverError> {
        match self.index.get(name) {
            Some(&i) if !self.coils[i].relay => Ok(i),
            _ => Err(DriverError::unknown(DeviceKind::Solenoid, name)),
        }
    }

    /// Energize solenoid `name`.
    ///
    /// Does nothing if it is already energized, so a running cutoff is
    /// never extended. Returns whether the call energized the solenoid.
    pub fn enable(
        &mut self,
        name: &str,
        now: Instant,
        bus: &mut dyn RegisterBus,
        store: &mut StateStore,
    ) -> Result<bool, DriverError> {
        let i = self.user_coil(name)?;
        self.energize(i, now, bus, store)
    }

    /// De-energize solenoid `name` and cancel its cutoff.
    pub fn disable(
        &mut self,
        name: &str,
        bus: &mut dyn RegisterBus,
        store: &mut StateStore,
    ) -> Result<(), DriverError> {
        let i = self.user_coil(name)?;
        self.release(i, bus, store)
    }

    fn energize(
        &mut self,
        i: usize,
        now: Instant,
        bus: &mut dyn RegisterBus,
        store: &mut StateStore,
    ) -> Result<bool, DriverError> {
        let coil = &self.coils[i];
        let byte = self.bytes.get(&coil.register).copied().unwrap_or(DATA_LOW);
        if byte & coil.mask != 0 {
            return Ok(false);
        }
        self.drive(i, BitOp::Enable, bus, store)?;
        let coil = &mut self.coils[i];
        coil.deadline = coil.cutoff.map(|cutoff| now + cutoff);
        Ok(true)
    }

    fn release(
        &mut self,
        i: usize,
        bus: &mut dyn RegisterBus,
        store: &mut StateStore,
    ) -> Result<(), DriverError> {
        self.coils[i].deadline = None;
        self.drive(i, BitOp::Disable, bus, store)
    }

    /// Apply `op` to the coil's bit, write the register and record the state.
    fn drive(
        &mut self,
        i: usize,
        op: BitOp,
        bus: &mut dyn RegisterBus,
        store: &mut StateStore,
    ) -> Result<(), DriverError> {
        let coil = &self.coils[i];
        let byte = self.bytes.entry(coil.register).or_insert(DATA_LOW);
        *byte = op.apply(*byte, coil.mask);
        bus.write(coil.register, *byte);
        let active = *byte & coil.mask != 0;
        debug!(solenoid = %coil.name, active, "solenoid {:?}", op);
        store.update_solenoid(&coil.name, active)
    }

    /// Release every solenoid whose cutoff has passed, earliest first.
    ///
    /// Returns the number of solenoids released.
    pub fn poll(&mut self, now: Instant, bus: &mut dyn RegisterBus, store: &mut StateStore) -> usize {
        let mut released = 0;
        while let Some(i) = self.next_expired(now) {
            if let Err(e) = self.release(i, bus, store) {
                warn!("Cutoff of '{}' not recorded: {}", self.coils[i].name, e);
            }
            debug!(solenoid = %self.coils[i].name, "solenoid cutoff");
            released += 1;
        }
        released
    }

    fn next_expired(&self, now: Instant) -> Option<usize> {
        self.coils
            .iter()
            .enumerate()
            .filter_map(|(i, coil)| coil.deadline.filter(|d| *d <= now).map(|d| (d, i)))
            .min()
            .map(|(_, i)| i)
    }

    /// Earliest pending cutoff.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.coils.iter().filter_map(|coil| coil.deadline).min()
    }

    /// Power the solenoid bank: health LED and power relay on.
    pub fn start(
        &mut self,
        now: Instant,
        bus: &mut dyn RegisterBus,
        store: &mut StateStore,
    ) -> Result<(), DriverError> {
        if self.powered {
            return Err(StateError::AlreadyRunning(COMPONENT).into());
        }
        for relay in self.relays() {
            if let Err(e) = self.energize(relay, now, bus, store) {
                for energized in self.relays() {
                    self.coils[energized].deadline = None;
                    let coil = &self.coils[energized];
                    let byte = self.bytes.entry(coil.register).or_insert(DATA_LOW);
                    *byte = BitOp::Disable.apply(*byte, coil.mask);
                    bus.write(coil.register, *byte);
                }
                return Err(e);
            }
        }
        self.powered = true;
        info!("Solenoid power on");
        Ok(())
    }

    /// Unpower the solenoid bank: health LED and power relay off.
    pub fn stop(&mut self, bus: &mut dyn RegisterBus, store: &mut StateStore) -> Result<(), DriverError> {
        if !self.powered {
            return Err(StateError::NotRunning(COMPONENT).into());
        }
        for relay in self.relays() {
            self.release(relay, bus, store)?;
        }
        self.powered = false;
        info!("Solenoid power off");
        Ok(())
    }

    fn relays(&self) -> [usize; 2] {
        let first = self.coils.len() - 2;
        [first, first + 1]
    }

    /// Whether the solenoid bank is powered.
    pub fn is_powered(&self) -> bool {
        self.powered
    }

    /// Whether solenoid `name` is energized.
    pub fn is_active(&self, name: &str) -> Option<bool> {
        self.index.get(name).map(|&i| {
            let coil = &self.coils[i];
            self.bytes.get(&coil.register).copied().unwrap_or(DATA_LOW) & coil.mask != 0
        })
    }

    /// Pending cutoff of solenoid `name`.
    pub fn deadline(&self, name: &str) -> Option<Instant> {
        self.index.get(name).and_then(|&i| self.coils[i].deadline)
    }

    /// Byte last written to `register`.
    pub fn register_byte(&self, register: Register) -> u8 {
        self.bytes.get(&register).copied().unwrap_or(DATA_LOW)
    }
}

impl Coil {
    fn new(name: &str, descriptor: &SolenoidDescriptor, relay: bool) -> Self {
        Self {
            name: name.to_string(),
            register: descriptor.register,
            mask: descriptor.mask(),
            cutoff: descriptor.cutoff,
            deadline: None,
            relay,
        }
    }
}
