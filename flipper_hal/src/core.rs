//! FlipperCore: the assembled control core and its cooperative loop.
//!
//! The core owns the register bus, the state store, the clock and the
//! three drivers. Everything runs on the thread that calls [`FlipperCore::poll`]
//! or [`FlipperCore::run`]; other threads reach the drivers through the
//! [`Command`] channel.

use flipper_common::config::{Intervals, MachineConfig};
use flipper_common::descriptors::DescriptorTable;
use flipper_common::error::{DriverError, StateError};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::clock::{Clock, MonotonicClock};
use crate::lamps::LampMultiplexer;
use crate::port::{DevPort, SimulatedPort, SimulatorHandle};
use crate::protocol::{ProtocolPort, RegisterBus};
use crate::rt::detect_rt_mode;
use crate::scheduler::TickStats;
use crate::solenoids::SolenoidController;
use crate::state::{StateSnapshot, StateStore};
use crate::switches::SwitchScanner;

const COMPONENT: &str = "flipper core";

/// Interval between loop statistics lines in [`FlipperCore::run`].
const STATS_LOG_INTERVAL: Duration = Duration::from_secs(10);

/// Request queued for the control thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Turn a lamp on.
    LampOn(String),
    /// Turn a lamp off.
    LampOff(String),
    /// Flip a lamp.
    LampToggle(String),
    /// Energize a solenoid.
    Fire(String),
    /// De-energize a solenoid.
    Release(String),
}

/// Sending half of the command queue.
pub type CommandSender = Sender<Command>;

/// Loop statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoreStats {
    /// Switch scanner timing.
    pub switches: TickStats,
    /// Lamp multiplexer timing.
    pub lamps: TickStats,
    /// Solenoids released by their cutoff.
    pub cutoffs: u64,
    /// Commands applied from the queue.
    pub commands: u64,
    /// Commands that named an unknown device.
    pub rejected_commands: u64,
}

/// Collects the collaborators of a [`FlipperCore`].
pub struct FlipperCoreBuilder {
    table: DescriptorTable,
    intervals: Intervals,
    bus: Option<Box<dyn RegisterBus>>,
    store: Option<StateStore>,
    clock: Option<Box<dyn Clock>>,
}

impl FlipperCoreBuilder {
    /// Register bus the drivers talk through. Required.
    pub fn bind_bus(mut self, bus: impl RegisterBus + 'static) -> Self {
        self.bus = Some(Box::new(bus));
        self
    }

    /// State store receiving every state change. Required.
    pub fn bind_store(mut self, store: StateStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Time source. Defaults to [`MonotonicClock`].
    pub fn bind_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Some(Box::new(clock));
        self
    }

    /// Validate the table and build the drivers.
    ///
    /// Building writes the power-on state to the bus: lamp columns dark
    /// and every solenoid register cleared.
    ///
    /// # Errors
    ///
    /// - `DriverError::Configuration` if the table is inconsistent
    /// - `DriverError::Dependency` if the bus or store is missing, or the
    ///   store does not know every configured name
    pub fn build(self) -> Result<FlipperCore, DriverError> {
        self.table.validate()?;
        let mut bus = self
            .bus
            .ok_or_else(|| DriverError::Dependency("RegisterBus".to_string()))?;
        let store = self
            .store
            .ok_or_else(|| DriverError::Dependency("StateStore".to_string()))?;
        store.ensure_covers(&self.table)?;
        let clock = self.clock.unwrap_or_else(|| Box::new(MonotonicClock));

        let scanner = SwitchScanner::new(&self.table, self.intervals.switches)?;
        let lamps = LampMultiplexer::new(&self.table, self.intervals.lamps, bus.as_mut());
        let solenoids = SolenoidController::new(&self.table, bus.as_mut())?;
        let (commands_tx, commands_rx) = mpsc::channel();

        info!(
            "FlipperCore built: {} switches, {} lamps, {} solenoids",
            self.table.switches.len(),
            self.table.lamps.len(),
            self.table.solenoids.len()
        );

        Ok(FlipperCore {
            bus,
            store,
            clock,
            scanner,
            lamps,
            solenoids,
            commands_tx,
            commands_rx,
            running: false,
            cutoffs: 0,
            commands: 0,
            rejected_commands: 0,
        })
    }
}

/// Assembled control core.
pub struct FlipperCore {
    bus: Box<dyn RegisterBus>,
    store: StateStore,
    clock: Box<dyn Clock>,
    scanner: SwitchScanner,
    lamps: LampMultiplexer,
    solenoids: SolenoidController,
    commands_tx: Sender<Command>,
    commands_rx: Receiver<Command>,
    running: bool,
    cutoffs: u64,
    commands: u64,
    rejected_commands: u64,
}

impl FlipperCore {
    /// Start assembling a core for `table`.
    pub fn builder(table: DescriptorTable, intervals: Intervals) -> FlipperCoreBuilder {
        FlipperCoreBuilder {
            table,
            intervals,
            bus: None,
            store: None,
            clock: None,
        }
    }

    /// Open the board at the configured address and build the core.
    ///
    /// # Errors
    ///
    /// Returns `DriverError::HardwareUnavailable` if the port cannot be
    /// opened, or any error of [`FlipperCoreBuilder::build`].
    pub fn open(config: &MachineConfig) -> Result<Self, DriverError> {
        info!("Opening driver board at {:#06x}", config.port_address);
        let port = DevPort::open(config.port_address)?;
        Self::builder(config.table.clone(), config.intervals)
            .bind_bus(ProtocolPort::new(port))
            .bind_store(StateStore::new(&config.table))
            .build()
    }

    /// Build the core over an emulated board.
    ///
    /// The returned handle sets switch inputs and inspects register writes.
    pub fn simulated(config: &MachineConfig) -> Result<(Self, SimulatorHandle), DriverError> {
        let port = SimulatedPort::new();
        let handle = port.handle();
        let core = Self::builder(config.table.clone(), config.intervals)
            .bind_bus(ProtocolPort::new(port))
            .bind_store(StateStore::new(&config.table))
            .build()?;
        Ok((core, handle))
    }

    /// Start scanning, power the solenoids and start multiplexing.
    ///
    /// # Errors
    ///
    /// Returns `StateError::AlreadyRunning` if already started.
    pub fn start(&mut self) -> Result<(), DriverError> {
        if self.running {
            return Err(StateError::AlreadyRunning(COMPONENT).into());
        }
        let now = self.clock.now();
        self.scanner.start(now)?;
        if let Err(e) = self.solenoids.start(now, self.bus.as_mut(), &mut self.store) {
            self.rollback_start(false);
            return Err(e);
        }
        if let Err(e) = self.lamps.start(now) {
            self.rollback_start(true);
            return Err(e.into());
        }
        self.running = true;
        info!("FlipperCore started");
        Ok(())
    }

    /// Undo the steps of a start that failed part way.
    fn rollback_start(&mut self, powered: bool) {
        if let Err(e) = self.scanner.stop() {
            warn!("Start rollback: {}", e);
        }
        if powered {
            if let Err(e) = self.solenoids.stop(self.bus.as_mut(), &mut self.store) {
                warn!("Start rollback: {}", e);
            }
        }
    }

    /// Stop scanning, unpower the solenoids and darken the lamps.
    ///
    /// Requested lamp and solenoid state is kept.
    ///
    /// # Errors
    ///
    /// Returns `StateError::NotRunning` if not started.
    pub fn stop(&mut self) -> Result<(), DriverError> {
        if !self.running {
            return Err(StateError::NotRunning(COMPONENT).into());
        }
        self.running = false;
        self.scanner.stop()?;
        self.solenoids.stop(self.bus.as_mut(), &mut self.store)?;
        self.lamps.stop(self.bus.as_mut())?;
        info!("FlipperCore stopped");
        Ok(())
    }

    /// Whether the core has been started.
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Turn lamp `name` on.
    pub fn lamp_on(&mut self, name: &str) -> Result<bool, DriverError> {
        self.lamps.enable(name, &mut self.store)
    }

    /// Turn lamp `name` off.
    pub fn lamp_off(&mut self, name: &str) -> Result<bool, DriverError> {
        self.lamps.disable(name, &mut self.store)
    }

    /// Flip lamp `name`. Returns the new state.
    pub fn lamp_toggle(&mut self, name: &str) -> Result<bool, DriverError> {
        self.lamps.toggle(name, &mut self.store)
    }

    /// Energize solenoid `name`. Returns `false` if it was already energized.
    pub fn fire(&mut self, name: &str) -> Result<bool, DriverError> {
        let now = self.clock.now();
        self.solenoids
            .enable(name, now, self.bus.as_mut(), &mut self.store)
    }

    /// De-energize solenoid `name`.
    pub fn release(&mut self, name: &str) -> Result<(), DriverError> {
        self.solenoids
            .disable(name, self.bus.as_mut(), &mut self.store)
    }

    /// Run everything that is due now.
    ///
    /// Cutoffs go first, then the switch scan and the lamp tick, then the
    /// queued commands. Returns whether any work was done.
    pub fn poll(&mut self) -> bool {
        let now = self.clock.now();

        let cutoffs = self.solenoids.poll(now, self.bus.as_mut(), &mut self.store);
        self.cutoffs += cutoffs as u64;
        let scanned = self
            .scanner
            .poll(now, self.bus.as_mut(), &mut self.store);
        let ticked = self.lamps.poll(now, self.bus.as_mut());
        let drained = self.drain_commands(now);

        cutoffs > 0 || scanned || ticked || drained > 0
    }

    fn drain_commands(&mut self, now: Instant) -> usize {
        let mut drained = 0;
        while let Ok(command) = self.commands_rx.try_recv() {
            drained += 1;
            let result = match &command {
                Command::LampOn(name) => self.lamps.enable(name, &mut self.store).map(drop),
                Command::LampOff(name) => self.lamps.disable(name, &mut self.store).map(drop),
                Command::LampToggle(name) => self.lamps.toggle(name, &mut self.store).map(drop),
                Command::Fire(name) => self
                    .solenoids
                    .enable(name, now, self.bus.as_mut(), &mut self.store)
                    .map(drop),
                Command::Release(name) => {
                    self.solenoids
                        .disable(name, self.bus.as_mut(), &mut self.store)
                }
            };
            match result {
                Ok(()) => self.commands += 1,
                Err(e) => {
                    self.rejected_commands += 1;
                    warn!("Rejected {:?}: {}", command, e);
                }
            }
        }
        drained
    }

    /// Sender for queueing commands from listeners or other threads.
    pub fn command_sender(&self) -> CommandSender {
        self.commands_tx.clone()
    }

    /// Start if needed and poll until `running` clears, then stop.
    ///
    /// # Errors
    ///
    /// Returns start or stop failures.
    pub fn run(&mut self, running: Arc<AtomicBool>) -> Result<(), DriverError> {
        if detect_rt_mode() {
            info!("Running in real-time mode");
        } else {
            info!("Running in standard (non-RT) mode");
        }
        if !self.running {
            self.start()?;
        }

        let mut polls: u64 = 0;
        let mut last_report = self.clock.now();
        while running.load(Ordering::SeqCst) {
            if !self.poll() {
                std::thread::yield_now();
            }
            polls += 1;

            let now = self.clock.now();
            if now.duration_since(last_report) >= STATS_LOG_INTERVAL {
                last_report = now;
                let stats = self.stats();
                debug!(
                    "Loop: {} polls, switch ticks={} (late {}), lamp ticks={} (late {}), cutoffs={}",
                    polls,
                    stats.switches.ticks,
                    stats.switches.late_ticks,
                    stats.lamps.ticks,
                    stats.lamps.late_ticks,
                    stats.cutoffs
                );
            }
        }

        let stats = self.stats();
        info!(
            "FlipperCore loop stopped after {} polls (late switch ticks: {}, late lamp ticks: {})",
            polls, stats.switches.late_ticks, stats.lamps.late_ticks
        );
        if self.running {
            self.stop()?;
        }
        Ok(())
    }

    /// Loop statistics.
    pub fn stats(&self) -> CoreStats {
        CoreStats {
            switches: self.scanner.stats(),
            lamps: self.lamps.stats(),
            cutoffs: self.cutoffs,
            commands: self.commands,
            rejected_commands: self.rejected_commands,
        }
    }

    /// State store, for reads and listener registration.
    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// Mutable state store, for listener registration.
    pub fn store_mut(&mut self) -> &mut StateStore {
        &mut self.store
    }

    /// Copy of the current logical state.
    pub fn snapshot(&self) -> StateSnapshot {
        self.store.snapshot()
    }

    /// Lamp multiplexer.
    pub fn lamps(&self) -> &LampMultiplexer {
        &self.lamps
    }

    /// Solenoid controller.
    pub fn solenoids(&self) -> &SolenoidController {
        &self.solenoids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::protocol::RecordingBus;
    use flipper_common::descriptors::{LampDescriptor, LampMatrix, SolenoidDescriptor, SwitchDescriptor};
    use flipper_common::registers::Register;

    fn table() -> DescriptorTable {
        DescriptorTable::new()
            .with_switch("StartButton", SwitchDescriptor::register(Register(1), 0).unwrap())
            .with_lamp("StartLamp", LampDescriptor::new(LampMatrix::RowA, 0, 0).unwrap())
            .with_solenoid("Knocker", SolenoidDescriptor::new(Register(2), 0, 30).unwrap())
    }

    fn build(clock: &ManualClock) -> FlipperCore {
        let table = table();
        FlipperCore::builder(table.clone(), Intervals::default())
            .bind_bus(RecordingBus::new())
            .bind_store(StateStore::new(&table))
            .bind_clock(clock.clone())
            .build()
            .expect("core builds")
    }

    #[test]
    fn missing_collaborators_are_dependency_errors() {
        let table = table();
        let err = FlipperCore::builder(table.clone(), Intervals::default())
            .bind_store(StateStore::new(&table))
            .build()
            .err()
            .expect("bus missing");
        assert!(matches!(err, DriverError::Dependency(ref what) if what == "RegisterBus"));

        let err = FlipperCore::builder(table, Intervals::default())
            .bind_bus(RecordingBus::new())
            .build()
            .err()
            .expect("store missing");
        assert!(matches!(err, DriverError::Dependency(ref what) if what == "StateStore"));
    }

    #[test]
    fn store_must_know_every_name() {
        let err = FlipperCore::builder(table(), Intervals::default())
            .bind_bus(RecordingBus::new())
            .bind_store(StateStore::new(&DescriptorTable::new()))
            .build()
            .err()
            .expect("store too small");
        assert!(matches!(err, DriverError::Dependency(_)));
    }

    #[test]
    fn start_stop_lifecycle() {
        let clock = ManualClock::new();
        let mut core = build(&clock);

        assert!(matches!(
            core.stop(),
            Err(DriverError::State(StateError::NotRunning("flipper core")))
        ));
        core.start().unwrap();
        assert!(core.is_running());
        assert_eq!(core.store().solenoid("PowerRelayControl"), Some(true));
        assert!(matches!(
            core.start(),
            Err(DriverError::State(StateError::AlreadyRunning("flipper core")))
        ));

        core.lamp_on("StartLamp").unwrap();
        core.stop().unwrap();
        assert_eq!(core.store().solenoid("PowerRelayControl"), Some(false));
        assert_eq!(core.store().lamp("StartLamp"), Some(true));
    }

    #[test]
    fn failed_start_leaves_nothing_running() {
        let table = table();
        let clock = ManualClock::new();
        let intervals = Intervals {
            switches: Duration::from_millis(1),
            lamps: Duration::MAX,
        };
        let mut core = FlipperCore::builder(table.clone(), intervals)
            .bind_bus(RecordingBus::new())
            .bind_store(StateStore::new(&table))
            .bind_clock(clock.clone())
            .build()
            .expect("core builds");

        for _ in 0..2 {
            assert!(matches!(
                core.start(),
                Err(DriverError::State(StateError::ScheduleOverflow("lamp multiplexer")))
            ));
            assert!(!core.is_running());
            assert!(!core.scanner.is_running());
            assert!(!core.solenoids().is_powered());
            assert_eq!(core.store().solenoid("PowerRelayControl"), Some(false));
        }
    }

    #[test]
    fn oversized_scan_interval_fails_start() {
        let table = table();
        let intervals = Intervals {
            switches: Duration::MAX,
            lamps: Duration::from_micros(500),
        };
        let mut core = FlipperCore::builder(table.clone(), intervals)
            .bind_bus(RecordingBus::new())
            .bind_store(StateStore::new(&table))
            .build()
            .expect("core builds");

        assert!(matches!(
            core.start(),
            Err(DriverError::State(StateError::ScheduleOverflow("switch scanner")))
        ));
        assert!(!core.is_running());
    }

    #[test]
    fn poll_runs_cutoffs_and_ticks() {
        let clock = ManualClock::new();
        let mut core = build(&clock);
        core.start().unwrap();

        assert!(core.fire("Knocker").unwrap());
        assert!(!core.fire("Knocker").unwrap());
        for _ in 0..30 {
            clock.advance(Duration::from_millis(1));
            core.poll();
        }

        let stats = core.stats();
        assert_eq!(stats.cutoffs, 1);
        assert_eq!(stats.switches.ticks, 30);
        assert_eq!(stats.lamps.ticks, 30);
        assert_eq!(core.store().solenoid("Knocker"), Some(false));
    }

    #[test]
    fn queued_commands_apply_on_poll() {
        let clock = ManualClock::new();
        let mut core = build(&clock);
        let sender = core.command_sender();

        sender.send(Command::LampToggle("StartLamp".to_string())).unwrap();
        sender.send(Command::Fire("Knocker".to_string())).unwrap();
        sender.send(Command::Fire("Nope".to_string())).unwrap();
        assert_eq!(core.store().lamp("StartLamp"), Some(false));

        assert!(core.poll());

        assert_eq!(core.store().lamp("StartLamp"), Some(true));
        assert_eq!(core.store().solenoid("Knocker"), Some(true));
        let stats = core.stats();
        assert_eq!(stats.commands, 2);
        assert_eq!(stats.rejected_commands, 1);
    }

    #[test]
    fn run_stops_when_flag_clears() {
        let clock = ManualClock::new();
        let mut core = build(&clock);
        let running = Arc::new(AtomicBool::new(false));

        core.run(Arc::clone(&running)).unwrap();

        assert!(!core.is_running());
    }
}
