//! End-to-end driver tests against the emulated board.
//!
//! Every test drives a full FlipperCore through the register handshake
//! into a SimulatedPort, with time supplied by a ManualClock.

use flipper_common::config::{ConfigLoader, FlipperConfig, Intervals};
use flipper_common::consts::{HEALTH_LED, POWER_RELAY_CONTROL};
use flipper_common::descriptors::{
    DescriptorTable, LampDescriptor, LampMatrix, SolenoidDescriptor, SwitchDescriptor,
};
use flipper_common::registers::Register;
use flipper_hal::port::{SimulatedPort, SimulatorHandle};
use flipper_hal::protocol::RecordingBus;
use flipper_hal::switches::SwitchScanner;
use flipper_hal::{Command, FlipperCore, ManualClock, ProtocolPort, StateStore, SwitchEvent};
use parking_lot::Mutex;
use proptest::prelude::*;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

const MS: Duration = Duration::from_millis(1);

fn table() -> DescriptorTable {
    DescriptorTable::new()
        .with_switch("Start", SwitchDescriptor::matrix(0, 2).unwrap())
        .with_switch("SlamTilt", SwitchDescriptor::register(Register::SWITCH_PLAY_FIELD, 6).unwrap())
        .with_lamp("StartButton", LampDescriptor::new(LampMatrix::RowA, 0, 2).unwrap())
        .with_lamp("TicketsLow", LampDescriptor::new(LampMatrix::RowB, 5, 7).unwrap())
        .with_solenoid(
            "TroughEject",
            SolenoidDescriptor::new(Register::SOLENOID_GROUP_B, 0, 20).unwrap(),
        )
        .with_solenoid(
            "LeftFlipperHold",
            SolenoidDescriptor::new(Register::SOLENOID_FLIPPER, 3, -1).unwrap(),
        )
}

fn simulated_core(table: DescriptorTable) -> (FlipperCore, SimulatorHandle, ManualClock) {
    let port = SimulatedPort::new();
    let board = port.handle();
    let clock = ManualClock::new();
    let store = StateStore::new(&table);
    let core = FlipperCore::builder(table, Intervals::default())
        .bind_bus(ProtocolPort::new(port))
        .bind_store(store)
        .bind_clock(clock.clone())
        .build()
        .expect("core builds");
    (core, board, clock)
}

fn step(core: &mut FlipperCore, clock: &ManualClock, ticks: u32, every: Duration) {
    for _ in 0..ticks {
        clock.advance(every);
        core.poll();
    }
}

fn record(core: &mut FlipperCore, name: &str) -> Arc<Mutex<Vec<bool>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    core.store_mut()
        .add_listener(name, move |event: &Arc<SwitchEvent>| sink.lock().push(event.state))
        .expect("listener registered");
    seen
}

// ─── Build ──────────────────────────────────────────────────────────

#[test]
fn build_writes_power_on_state() {
    let (_core, board, _clock) = simulated_core(table());

    let writes = board.writes();
    assert_eq!(writes.first(), Some(&(Register::LAMP_COLUMN, 0)));
    for register in Register::SOLENOID_REGISTERS {
        assert!(writes.contains(&(register, 0)), "{register} not cleared");
    }
}

// ─── Switches ───────────────────────────────────────────────────────

#[test]
fn matrix_switch_edges_reach_listener() {
    let (mut core, board, clock) = simulated_core(table());
    let seen = record(&mut core, "Start");
    core.start().unwrap();

    step(&mut core, &clock, 2, MS);
    assert!(seen.lock().is_empty());

    board.set_switch(&SwitchDescriptor::matrix(0, 2).unwrap(), true);
    step(&mut core, &clock, 3, MS);
    assert_eq!(*seen.lock(), vec![true]);
    assert_eq!(core.store().switch("Start"), Some(true));

    board.set_switch(&SwitchDescriptor::matrix(0, 2).unwrap(), false);
    step(&mut core, &clock, 1, MS);
    assert_eq!(*seen.lock(), vec![true, false]);
}

#[test]
fn register_switch_edges_reach_listener() {
    let (mut core, board, clock) = simulated_core(table());
    let seen = record(&mut core, "SlamTilt");
    core.start().unwrap();

    board.set_input(Register::SWITCH_PLAY_FIELD, 0b0100_0000);
    step(&mut core, &clock, 1, MS);
    // other bits of the register are unnamed
    board.set_input(Register::SWITCH_PLAY_FIELD, 0b0111_1111);
    step(&mut core, &clock, 1, MS);

    assert_eq!(*seen.lock(), vec![true]);
}

#[test]
fn no_scan_while_stopped() {
    let (mut core, board, clock) = simulated_core(table());
    let seen = record(&mut core, "Start");

    board.set_matrix_switch(0, 2, true);
    step(&mut core, &clock, 5, MS);

    assert!(seen.lock().is_empty());
    assert_eq!(core.stats().switches.ticks, 0);
}

// ─── Lamps ──────────────────────────────────────────────────────────

#[test]
fn lamps_multiplex_one_column_at_a_time() {
    let (mut core, board, clock) = simulated_core(table());
    core.lamp_on("StartButton").unwrap();
    core.lamp_on("TicketsLow").unwrap();
    core.start().unwrap();
    board.clear_log();

    // one full pass over the eight columns
    step(&mut core, &clock, 8, MS / 2);

    let columns = board.writes_to(Register::LAMP_COLUMN);
    assert_eq!(columns.len(), 16);
    assert!(columns.iter().all(|c| c.count_ones() <= 1));
    let selected: Vec<u8> = columns.into_iter().filter(|c| *c != 0).collect();
    assert_eq!(selected, (0..8).map(|c| 1u8 << c).collect::<Vec<_>>());

    let row_a = board.writes_to(Register::LAMP_ROW_A);
    let row_b = board.writes_to(Register::LAMP_ROW_B);
    assert_eq!(row_a[0], 0b0000_0100);
    assert_eq!(row_b[5], 0b1000_0000);
    assert_eq!(row_a.iter().filter(|v| **v != 0).count(), 1);
    assert_eq!(row_b.iter().filter(|v| **v != 0).count(), 1);
}

#[test]
fn stop_leaves_lamps_dark_and_requests_kept() {
    let (mut core, board, clock) = simulated_core(table());
    core.lamp_on("StartButton").unwrap();
    core.start().unwrap();
    step(&mut core, &clock, 3, MS / 2);

    core.stop().unwrap();

    assert_eq!(board.register(Register::LAMP_COLUMN), 0);
    assert_eq!(core.store().lamp("StartButton"), Some(true));
    assert_eq!(core.lamps().is_lit("StartButton"), Some(true));
}

// ─── Solenoids ──────────────────────────────────────────────────────

#[test]
fn power_relays_follow_core_lifecycle() {
    let (mut core, board, _clock) = simulated_core(table());

    core.start().unwrap();
    assert_eq!(board.register(Register::SOLENOID_GROUP_D), 0b0011_0000);
    assert_eq!(core.store().solenoid(HEALTH_LED), Some(true));

    core.stop().unwrap();
    assert_eq!(board.register(Register::SOLENOID_GROUP_D), 0);
    assert_eq!(core.store().solenoid(POWER_RELAY_CONTROL), Some(false));
}

#[test]
fn pulse_coil_released_after_cutoff() {
    let (mut core, board, clock) = simulated_core(table());
    core.start().unwrap();
    board.clear_log();

    assert!(core.fire("TroughEject").unwrap());
    assert_eq!(board.register(Register::SOLENOID_GROUP_B), 0b0000_0001);

    step(&mut core, &clock, 19, MS);
    assert_eq!(board.register(Register::SOLENOID_GROUP_B), 0b0000_0001);
    step(&mut core, &clock, 1, MS);
    assert_eq!(board.register(Register::SOLENOID_GROUP_B), 0);

    assert_eq!(board.writes_to(Register::SOLENOID_GROUP_B), vec![0b0000_0001, 0]);
    assert_eq!(core.stats().cutoffs, 1);
}

#[test]
fn refire_during_pulse_does_not_extend_it() {
    let (mut core, board, clock) = simulated_core(table());
    core.fire("TroughEject").unwrap();
    step(&mut core, &clock, 10, MS);

    assert!(!core.fire("TroughEject").unwrap());
    step(&mut core, &clock, 10, MS);

    assert_eq!(board.register(Register::SOLENOID_GROUP_B), 0);
}

#[test]
fn hold_coil_stays_until_released() {
    let (mut core, board, clock) = simulated_core(table());
    core.fire("LeftFlipperHold").unwrap();

    step(&mut core, &clock, 500, MS);
    assert_eq!(board.register(Register::SOLENOID_FLIPPER), 0b0000_1000);

    core.release("LeftFlipperHold").unwrap();
    assert_eq!(board.register(Register::SOLENOID_FLIPPER), 0);
    assert_eq!(core.stats().cutoffs, 0);
}

// ─── Commands ───────────────────────────────────────────────────────

#[test]
fn listener_fires_solenoid_through_command_queue() {
    let (mut core, board, clock) = simulated_core(table());
    let commands = core.command_sender();
    core.store_mut()
        .add_listener("Start", move |event: &Arc<SwitchEvent>| {
            if event.state {
                let _ = commands.send(Command::Fire("TroughEject".to_string()));
                let _ = commands.send(Command::LampToggle("StartButton".to_string()));
            }
        })
        .unwrap();
    core.start().unwrap();

    board.set_matrix_switch(0, 2, true);
    step(&mut core, &clock, 1, MS);

    assert_eq!(board.register(Register::SOLENOID_GROUP_B), 0b0000_0001);
    assert_eq!(core.store().lamp("StartButton"), Some(true));
    assert_eq!(core.stats().commands, 2);
}

// ─── Configuration ──────────────────────────────────────────────────

#[test]
fn sample_machine_runs_in_simulation() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../config/flipper.toml");
    let machine = FlipperConfig::load(&path)
        .expect("sample config loads")
        .validate()
        .expect("sample config is valid");

    let (mut core, board) = FlipperCore::simulated(&machine).expect("core builds");
    board.set_recording(false);
    core.start().unwrap();
    for _ in 0..50 {
        core.poll();
    }
    core.stop().unwrap();

    let snapshot = core.snapshot();
    assert_eq!(snapshot.switches.len(), machine.table.switches.len());
    assert_eq!(snapshot.lamps.len(), machine.table.lamps.len());
    assert_eq!(snapshot.solenoids.len(), machine.table.solenoids.len() + 2);
    let json = serde_json::to_string(&snapshot).unwrap();
    assert!(json.contains("PowerRelayControl"));
}

// ─── Edge property ──────────────────────────────────────────────────

proptest! {
    /// One event per changed named bit, and the store ends on the last value.
    #[test]
    fn scanner_reports_exactly_the_changes(values in proptest::collection::vec(any::<u8>(), 1..40)) {
        let mut table = DescriptorTable::new();
        for bit in 0..8u8 {
            table = table.with_switch(
                &format!("bit{bit}"),
                SwitchDescriptor::register(Register::SWITCH_SYSTEM, bit).unwrap(),
            );
        }
        let mut store = StateStore::new(&table);
        let edges = Arc::new(Mutex::new(0usize));
        for bit in 0..8u8 {
            let sink = Arc::clone(&edges);
            store
                .add_listener(&format!("bit{bit}"), move |_: &Arc<SwitchEvent>| *sink.lock() += 1)
                .unwrap();
        }
        let mut scanner = SwitchScanner::new(&table, MS).unwrap();
        let mut bus = RecordingBus::new();
        for value in &values {
            bus.push_read(Register::SWITCH_SYSTEM, *value);
        }

        for _ in &values {
            scanner.scan(&mut bus, &mut store);
        }

        let mut previous = 0u8;
        let mut expected = 0usize;
        for value in &values {
            expected += (previous ^ value).count_ones() as usize;
            previous = *value;
        }
        prop_assert_eq!(*edges.lock(), expected);
        for bit in 0..8u8 {
            prop_assert_eq!(
                store.switch(&format!("bit{bit}")),
                Some(previous & (1 << bit) != 0)
            );
        }
    }
}
