//! Prelude module for common re-exports.
//!
//! ```rust
//! use flipper_common::prelude::*;
//! ```

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{
    ConfigError, ConfigLoader, FlipperConfig, Intervals, LogLevel, MachineConfig, SharedConfig,
};

// ─── Board ──────────────────────────────────────────────────────────
pub use crate::bits::{BitOp, ControlLines, bit_mask};
pub use crate::registers::Register;

// ─── Descriptors ────────────────────────────────────────────────────
pub use crate::descriptors::{
    DescriptorTable, LampDescriptor, LampMatrix, SolenoidDescriptor, SwitchDescriptor,
};

// ─── Errors ─────────────────────────────────────────────────────────
pub use crate::error::{DeviceKind, DriverError, StateError};

// ─── System Constants ───────────────────────────────────────────────
pub use crate::consts::{HEALTH_LED, POWER_RELAY_CONTROL};
