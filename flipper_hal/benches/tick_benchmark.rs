//! Tick body benchmarks.
//!
//! Measures one switch scan and one lamp multiplex tick through the full
//! register handshake into the board emulator (recording off).

use criterion::{Criterion, criterion_group, criterion_main};
use flipper_common::descriptors::{DescriptorTable, LampDescriptor, LampMatrix, SwitchDescriptor};
use flipper_common::registers::Register;
use flipper_hal::lamps::LampMultiplexer;
use flipper_hal::port::SimulatedPort;
use flipper_hal::switches::SwitchScanner;
use flipper_hal::{ProtocolPort, StateStore};
use std::hint::black_box;
use std::time::Duration;

fn machine() -> DescriptorTable {
    let mut table = DescriptorTable::new();
    for column in 0..8u8 {
        for row in 0..8u8 {
            table = table
                .with_switch(
                    &format!("m{column}{row}"),
                    SwitchDescriptor::matrix(column, row).expect("matrix switch"),
                )
                .with_lamp(
                    &format!("a{column}{row}"),
                    LampDescriptor::new(LampMatrix::RowA, column, row).expect("lamp"),
                );
        }
    }
    for bit in 0..8u8 {
        table = table.with_switch(
            &format!("sys{bit}"),
            SwitchDescriptor::register(Register::SWITCH_SYSTEM, bit).expect("register switch"),
        );
    }
    table
}

fn bus() -> (ProtocolPort<SimulatedPort>, flipper_hal::port::SimulatorHandle) {
    let port = SimulatedPort::new();
    let handle = port.handle();
    handle.set_recording(false);
    (ProtocolPort::new(port), handle)
}

fn bench_switch_scan(c: &mut Criterion) {
    let table = machine();
    let mut store = StateStore::new(&table);
    let mut scanner = SwitchScanner::new(&table, Duration::from_millis(1)).expect("scanner");
    let (mut bus, board) = bus();
    let mut closed = false;

    c.bench_function("switch_scan_9_reads", |b| {
        b.iter(|| {
            // flip one switch per scan so edges are part of the cost
            closed = !closed;
            board.set_matrix_switch(3, 3, closed);
            scanner.scan(black_box(&mut bus), &mut store);
        });
    });
}

fn bench_lamp_tick(c: &mut Criterion) {
    let table = machine();
    let mut store = StateStore::new(&table);
    let (mut bus, _board) = bus();
    let mut lamps = LampMultiplexer::new(&table, Duration::from_micros(500), &mut bus);
    for name in table.lamps.keys().step_by(3) {
        lamps.enable(name, &mut store).expect("lamp on");
    }

    c.bench_function("lamp_tick_4_writes", |b| {
        b.iter(|| {
            lamps.tick(black_box(&mut bus));
        });
    });
}

criterion_group!(benches, bench_switch_scan, bench_lamp_tick);
criterion_main!(benches);
