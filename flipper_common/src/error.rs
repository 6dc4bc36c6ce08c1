//! Error types shared by the flipper drivers.
//!
//! Configuration, dependency and hardware errors are raised while the
//! system is being built and stop it from coming up. State errors are
//! usage errors raised at the call site.

use std::fmt;
use thiserror::Error;

use crate::config::ConfigError;

/// Lifecycle misuse of a scheduler or driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StateError {
    /// `start()` called while already running.
    #[error("The {0} is already running")]
    AlreadyRunning(&'static str),

    /// `stop()` called while not running.
    #[error("The {0} is not running")]
    NotRunning(&'static str),

    /// The next tick target does not fit the monotonic clock.
    #[error("The {0} cannot schedule its next tick")]
    ScheduleOverflow(&'static str),
}

/// Domain of a named device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceKind {
    /// Switch (input).
    Switch,
    /// Lamp in one of the lamp matrices.
    Lamp,
    /// Solenoid, flasher or relay.
    Solenoid,
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Switch => "switch",
            Self::Lamp => "lamp",
            Self::Solenoid => "solenoid",
        };
        f.write_str(name)
    }
}

/// Error types for the flipper control core.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DriverError {
    /// A descriptor is missing fields or has an invalid shape.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A builder was invoked without a required collaborator bound.
    #[error("The required dependency was not bound: {0}")]
    Dependency(String),

    /// The raw port could not be opened.
    #[error("Parallel port could not be accessed at address {address:#06x}: {reason}")]
    HardwareUnavailable {
        /// I/O base address of the port.
        address: u16,
        /// Reason reported by the operating system.
        reason: String,
    },

    /// Lifecycle misuse.
    #[error(transparent)]
    State(#[from] StateError),

    /// A runtime call named a device that is not configured.
    #[error("Unknown {kind}: {name}")]
    UnknownName {
        /// Domain searched.
        kind: DeviceKind,
        /// Name that was not found.
        name: String,
    },
}

impl DriverError {
    /// Shorthand for [`DriverError::UnknownName`].
    pub fn unknown(kind: DeviceKind, name: &str) -> Self {
        Self::UnknownName {
            kind,
            name: name.to_string(),
        }
    }
}

impl From<ConfigError> for DriverError {
    fn from(e: ConfigError) -> Self {
        Self::Configuration(e.to_string())
    }
}
