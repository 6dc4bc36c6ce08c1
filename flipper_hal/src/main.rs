//! # Flipper HAL Binary
//!
//! Runs the flipper control core until SIGINT/SIGTERM.
//!
//! # Usage
//!
//! ```bash
//! # Drive the board at the configured address (needs /dev/port access)
//! flipper_hal --config /etc/flipper/flipper.toml
//!
//! # Run against the board emulator
//! flipper_hal --config config/flipper.toml --simulate -v
//!
//! # Pin to CPU 3 with SCHED_FIFO 80 (build with --features rt)
//! flipper_hal --rt-cpu 3 --rt-priority 80
//! ```

use clap::Parser;
use flipper_common::config::{ConfigError, ConfigLoader, FlipperConfig, LogLevel};
use flipper_common::consts::DEFAULT_CONFIG_PATH;
use flipper_hal::rt::rt_setup;
use flipper_hal::{FlipperCore, SwitchEvent};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Flipper HAL - switch scanning, lamp multiplexing and solenoid control
#[derive(Parser, Debug)]
#[command(name = "flipper_hal")]
#[command(version)]
#[command(about = "Control core for the flipper driver board")]
#[command(long_about = None)]
struct Args {
    /// Path to the machine configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Run against the board emulator instead of /dev/port
    #[arg(short = 's', long)]
    simulate: bool,

    /// Override the port address (hex, e.g. 0xEC00)
    #[arg(long, value_parser = parse_address)]
    address: Option<u16>,

    /// Pin the control thread to this CPU and apply RT setup
    #[arg(long)]
    rt_cpu: Option<usize>,

    /// SCHED_FIFO priority used with --rt-cpu
    #[arg(long, default_value_t = 80)]
    rt_priority: i32,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long)]
    json: bool,
}

fn parse_address(raw: &str) -> Result<u16, String> {
    let digits = raw
        .strip_prefix("0x")
        .or_else(|| raw.strip_prefix("0X"))
        .unwrap_or(raw);
    u16::from_str_radix(digits, 16).map_err(|e| format!("invalid port address '{raw}': {e}"))
}

fn main() {
    if let Err(e) = run() {
        error!("Flipper HAL failed: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match FlipperConfig::load(&args.config) {
        Ok(config) => config,
        Err(ConfigError::FileNotFound) if args.simulate => {
            // emulator runs fine with an empty machine
            FlipperConfig::default()
        }
        Err(e) => {
            setup_tracing(&args, LogLevel::default());
            return Err(format!("{}: {e}", args.config.display()).into());
        }
    };
    setup_tracing(&args, config.shared.log_level);
    info!("Flipper HAL v{} starting...", env!("CARGO_PKG_VERSION"));

    if let Some(address) = args.address {
        config.port.address = address;
    }
    let machine = config.validate()?;
    info!(
        "Loaded {}: {} switches, {} lamps, {} solenoids",
        args.config.display(),
        machine.table.switches.len(),
        machine.table.lamps.len(),
        machine.table.solenoids.len()
    );

    let mut core = if args.simulate {
        info!("Simulation mode enabled");
        let (core, simulator) = FlipperCore::simulated(&machine)?;
        simulator.set_recording(false);
        core
    } else {
        FlipperCore::open(&machine)?
    };

    for name in machine.table.switches.keys() {
        core.store_mut()
            .add_listener(name, |event: &Arc<SwitchEvent>| {
                info!(switch = %event.name, closed = event.state, "switch edge");
            })?;
    }

    let running = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&running);
    ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        flag.store(false, Ordering::SeqCst);
    })?;

    if let Some(cpu) = args.rt_cpu {
        rt_setup(cpu, args.rt_priority)?;
    }

    if let Err(e) = core.run(running) {
        error!("Control loop error: {}", e);
    }

    let snapshot = serde_json::to_string(&core.snapshot())?;
    info!("Final state: {}", snapshot);
    info!("Flipper HAL shutdown complete");
    Ok(())
}

/// Setup tracing subscriber from CLI flags and the configured level.
fn setup_tracing(args: &Args, level: LogLevel) {
    let level = if args.verbose { "debug" } else { level.as_filter() };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
