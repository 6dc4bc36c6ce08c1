//! # Flipper HAL Library
//!
//! Control core for the flipper driver board behind a parallel port.
//!
//! # Module Structure
//!
//! - [`port`] - Raw port access: `/dev/port` and the board emulator
//! - [`protocol`] - Register handshake over the raw port
//! - [`clock`] - Time sources
//! - [`scheduler`] - Drift-corrected interval ticks
//! - [`state`] - Logical switch, lamp and solenoid state with edge events
//! - [`switches`] - Switch register and matrix scanning
//! - [`lamps`] - Lamp matrix multiplexing
//! - [`solenoids`] - Solenoid control with energize limits
//! - [`core`] - FlipperCore assembly and cooperative loop
//! - [`rt`] - Real-time thread setup
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                        FlipperCore                             │
//! │  ┌──────────────┐  ┌────────────────┐  ┌───────────────────┐   │
//! │  │SwitchScanner │  │LampMultiplexer │  │SolenoidController │   │
//! │  └──────┬───────┘  └───────┬────────┘  └─────────┬─────────┘   │
//! │         │ edges            │ ticks               │ cutoffs     │
//! │         ▼                  ▼                     ▼             │
//! │  ┌────────────┐    ┌───────────────────────────────────────┐   │
//! │  │ StateStore │    │ RegisterBus (ProtocolPort<RawPort>)   │   │
//! │  └────────────┘    └───────────────────────────────────────┘   │
//! └────────────────────────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]

pub mod clock;
pub mod core;
pub mod lamps;
pub mod port;
pub mod protocol;
pub mod rt;
pub mod scheduler;
pub mod solenoids;
pub mod state;
pub mod switches;

pub use crate::clock::{Clock, ManualClock, MonotonicClock};
pub use crate::core::{Command, CommandSender, CoreStats, FlipperCore, FlipperCoreBuilder};
pub use crate::protocol::{ProtocolPort, RecordingBus, RegisterBus};
pub use crate::state::{ListenerId, StateSnapshot, StateStore, SwitchEvent};
