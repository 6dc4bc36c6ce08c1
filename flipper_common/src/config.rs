//! Configuration loading traits and types.
//!
//! The machine is described by one TOML file: port address, scheduler
//! intervals and the named switches, lamps and solenoids. Loading only
//! parses; [`FlipperConfig::validate`] turns the raw tables into checked
//! descriptors before any driver is built.
//!
//! # Usage
//!
//! ```rust,no_run
//! use flipper_common::config::{ConfigError, ConfigLoader, FlipperConfig};
//! use std::path::Path;
//!
//! fn main() -> Result<(), ConfigError> {
//!     let config = FlipperConfig::load(Path::new("flipper.toml"))?;
//!     let machine = config.validate()?;
//!     println!("{} lamps", machine.table.lamps.len());
//!     Ok(())
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::consts::{
    DEFAULT_LAMP_INTERVAL_MS, DEFAULT_PORT_ADDRESS, DEFAULT_SWITCH_INTERVAL_MS, HAL_SERVICE_NAME,
    MAX_INTERVAL_MS,
};
use crate::descriptors::{
    DescriptorTable, LampDescriptor, LampMatrix, SolenoidDescriptor, SwitchDescriptor,
};
use crate::registers::Register;

/// Error type for configuration loading operations.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Configuration file not found at specified path.
    #[error("Configuration file not found")]
    FileNotFound,

    /// TOML parsing failed.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Semantic validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

/// Log level for application logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Most verbose, detailed tracing information.
    Trace,
    /// Debug information useful during development.
    Debug,
    /// General information about application operation.
    #[default]
    Info,
    /// Warning messages for potentially problematic situations.
    Warn,
    /// Error messages for serious problems.
    Error,
}

impl LogLevel {
    /// Directive string understood by `tracing_subscriber::EnvFilter`.
    pub const fn as_filter(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Common configuration fields.
///
/// # TOML Example
///
/// ```toml
/// [shared]
/// log_level = "debug"
/// service_name = "flipper-cabinet-01"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedConfig {
    /// Logging verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Application instance identifier.
    pub service_name: String,
}

impl Default for SharedConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::default(),
            service_name: HAL_SERVICE_NAME.to_string(),
        }
    }
}

impl SharedConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if `service_name` is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_name.is_empty() {
            return Err(ConfigError::ValidationError(
                "service_name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Trait for loading configuration from TOML files.
///
/// # Contract
///
/// - Returns `ConfigError::FileNotFound` if the file does not exist
/// - Returns `ConfigError::ParseError` if TOML syntax is invalid
pub trait ConfigLoader: Sized + serde::de::DeserializeOwned {
    /// Load configuration from a TOML file.
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound
            } else {
                ConfigError::ParseError(e.to_string())
            }
        })?;

        Self::parse(&content)
    }

    /// Parse configuration from TOML text.
    fn parse(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

impl<T: serde::de::DeserializeOwned> ConfigLoader for T {}

// ─── Intervals ──────────────────────────────────────────────────────

/// Convert a millisecond interval into a [`Duration`].
///
/// Whole seconds and the sub-second remainder are converted separately,
/// so sub-millisecond values such as `0.5` keep nanosecond precision.
///
/// # Errors
///
/// Returns `ConfigError::ValidationError` if `millis` is not finite,
/// not positive, or above [`MAX_INTERVAL_MS`].
pub fn interval_from_millis(millis: f64) -> Result<Duration, ConfigError> {
    if !millis.is_finite() || millis <= 0.0 {
        return Err(ConfigError::ValidationError(format!(
            "interval must be a positive number of milliseconds, got {millis}"
        )));
    }
    if millis > MAX_INTERVAL_MS {
        return Err(ConfigError::ValidationError(format!(
            "interval of {millis} ms exceeds the {MAX_INTERVAL_MS} ms limit"
        )));
    }
    let seconds = (millis / 1000.0).floor();
    let nanos = ((millis - seconds * 1000.0) * 1_000_000.0).round();
    Duration::from_secs(seconds as u64)
        .checked_add(Duration::from_nanos(nanos as u64))
        .filter(|d| !d.is_zero())
        .ok_or_else(|| {
            ConfigError::ValidationError(format!("interval of {millis} ms cannot be represented"))
        })
}

/// Scheduler intervals in milliseconds, as written in the file.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IntervalConfig {
    /// Switch scan interval.
    pub switches: f64,
    /// Lamp multiplexing interval.
    pub lamps: f64,
}

impl Default for IntervalConfig {
    fn default() -> Self {
        Self {
            switches: DEFAULT_SWITCH_INTERVAL_MS,
            lamps: DEFAULT_LAMP_INTERVAL_MS,
        }
    }
}

/// Validated scheduler intervals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Intervals {
    /// Switch scan interval.
    pub switches: Duration,
    /// Lamp multiplexing interval.
    pub lamps: Duration,
}

impl Default for Intervals {
    fn default() -> Self {
        Self {
            switches: Duration::from_millis(1),
            lamps: Duration::from_micros(500),
        }
    }
}

impl IntervalConfig {
    /// Convert both intervals.
    pub fn validate(&self) -> Result<Intervals, ConfigError> {
        Ok(Intervals {
            switches: interval_from_millis(self.switches)?,
            lamps: interval_from_millis(self.lamps)?,
        })
    }
}

// ─── Port ───────────────────────────────────────────────────────────

/// Parallel port settings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PortConfig {
    /// I/O base address of the data register.
    pub address: u16,
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_PORT_ADDRESS,
        }
    }
}

// ─── Devices ────────────────────────────────────────────────────────

/// Register reference: numeric id or snake_case name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RegisterRef {
    /// Raw register id.
    Id(u8),
    /// Named register, e.g. `"solenoid_group_a"`.
    Name(String),
}

impl RegisterRef {
    fn resolve(&self, device: &str) -> Result<Register, ConfigError> {
        match self {
            Self::Id(id) => Ok(Register(*id)),
            Self::Name(name) => Register::from_name(name).ok_or_else(|| {
                ConfigError::ValidationError(format!(
                    "'{device}' refers to unknown register '{name}'"
                ))
            }),
        }
    }
}

/// Switch entry: either `register` + `index` or `column` + `row`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SwitchEntry {
    /// Register of a register-addressed switch.
    pub register: Option<RegisterRef>,
    /// Bit index of a register-addressed switch.
    pub index: Option<u8>,
    /// Column of a matrix switch.
    pub column: Option<u8>,
    /// Row of a matrix switch.
    pub row: Option<u8>,
}

impl SwitchEntry {
    fn to_descriptor(&self, name: &str) -> Result<SwitchDescriptor, ConfigError> {
        match (&self.register, self.index, self.column, self.row) {
            (Some(register), Some(index), None, None) => {
                SwitchDescriptor::register(register.resolve(name)?, index)
            }
            (None, None, Some(column), Some(row)) => SwitchDescriptor::matrix(column, row),
            _ => Err(ConfigError::ValidationError(format!(
                "switch '{name}' needs either register and index or column and row"
            ))),
        }
    }
}

/// Lamp entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LampEntry {
    /// Row-select register of the lamp.
    pub matrix: Option<LampMatrix>,
    /// Column within the matrix.
    pub column: Option<u8>,
    /// Row bit within the matrix.
    pub row: Option<u8>,
}

impl LampEntry {
    fn to_descriptor(&self, name: &str) -> Result<LampDescriptor, ConfigError> {
        match (self.matrix, self.column, self.row) {
            (Some(matrix), Some(column), Some(row)) => LampDescriptor::new(matrix, column, row),
            _ => Err(ConfigError::ValidationError(format!(
                "lamp '{name}' needs matrix, column and row"
            ))),
        }
    }
}

/// Solenoid entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SolenoidEntry {
    /// Register holding the solenoid bit.
    pub register: Option<RegisterRef>,
    /// Bit index within the register.
    pub index: Option<u8>,
    /// Maximum energize time in milliseconds; `<= 0` disables the cutoff.
    pub duration: Option<i64>,
}

impl SolenoidEntry {
    fn to_descriptor(&self, name: &str) -> Result<SolenoidDescriptor, ConfigError> {
        match (&self.register, self.index, self.duration) {
            (Some(register), Some(index), Some(duration)) => {
                SolenoidDescriptor::new(register.resolve(name)?, index, duration)
            }
            _ => Err(ConfigError::ValidationError(format!(
                "solenoid '{name}' needs register, index and duration"
            ))),
        }
    }
}

// ─── Machine ────────────────────────────────────────────────────────

/// Root of the machine configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FlipperConfig {
    /// Logging and instance name.
    #[serde(default)]
    pub shared: SharedConfig,
    /// Parallel port settings.
    #[serde(default)]
    pub port: PortConfig,
    /// Scheduler intervals.
    #[serde(default)]
    pub intervals: IntervalConfig,
    /// Switches by name.
    #[serde(default)]
    pub switches: BTreeMap<String, SwitchEntry>,
    /// Lamps by name.
    #[serde(default)]
    pub lamps: BTreeMap<String, LampEntry>,
    /// Solenoids by name.
    #[serde(default)]
    pub solenoids: BTreeMap<String, SolenoidEntry>,
}

/// Output of [`FlipperConfig::validate`].
#[derive(Debug, Clone, PartialEq)]
pub struct MachineConfig {
    /// I/O base address of the port.
    pub port_address: u16,
    /// Scheduler intervals.
    pub intervals: Intervals,
    /// Checked device descriptors.
    pub table: DescriptorTable,
}

impl FlipperConfig {
    /// Validate every section and build the descriptor table.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` on the first entry that is
    /// incomplete, out of range, names an unknown register, collides with
    /// another entry or with a built-in relay.
    pub fn validate(&self) -> Result<MachineConfig, ConfigError> {
        self.shared.validate()?;
        let intervals = self.intervals.validate()?;

        let mut table = DescriptorTable::new();
        for (name, entry) in &self.switches {
            table.switches.insert(name.clone(), entry.to_descriptor(name)?);
        }
        for (name, entry) in &self.lamps {
            table.lamps.insert(name.clone(), entry.to_descriptor(name)?);
        }
        for (name, entry) in &self.solenoids {
            table.solenoids.insert(name.clone(), entry.to_descriptor(name)?);
        }
        table.validate()?;
        debug!(
            switches = table.switches.len(),
            lamps = table.lamps.len(),
            solenoids = table.solenoids.len(),
            "Configuration validated"
        );

        Ok(MachineConfig {
            port_address: self.port.address,
            intervals,
            table,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_default() {
        assert_eq!(LogLevel::default(), LogLevel::Info);
        assert_eq!(LogLevel::Warn.as_filter(), "warn");
    }

    #[test]
    fn test_interval_split() {
        assert_eq!(interval_from_millis(1.0).unwrap(), Duration::from_millis(1));
        assert_eq!(interval_from_millis(0.5).unwrap(), Duration::from_micros(500));
        assert_eq!(
            interval_from_millis(1500.25).unwrap(),
            Duration::new(1, 500_250_000)
        );
    }

    #[test]
    fn test_interval_rejects_non_positive() {
        assert!(interval_from_millis(0.0).is_err());
        assert!(interval_from_millis(-1.0).is_err());
        assert!(interval_from_millis(f64::NAN).is_err());
        assert!(interval_from_millis(f64::INFINITY).is_err());
    }

    #[test]
    fn test_interval_rejects_oversized() {
        assert_eq!(
            interval_from_millis(MAX_INTERVAL_MS).unwrap(),
            Duration::from_secs(60)
        );
        assert!(interval_from_millis(MAX_INTERVAL_MS + 1.0).is_err());
        assert!(interval_from_millis(1e22).is_err());

        let config = FlipperConfig::parse("[intervals]\nswitches = 1e22\nlamps = 0.5\n").unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(msg)) if msg.contains("limit")
        ));
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = FlipperConfig::parse("").unwrap();
        let machine = config.validate().unwrap();
        assert_eq!(machine.port_address, DEFAULT_PORT_ADDRESS);
        assert_eq!(machine.intervals, Intervals::default());
        assert!(machine.table.switches.is_empty());
    }

    #[test]
    fn test_register_by_name_and_id() {
        let config = FlipperConfig::parse(
            r#"
            [solenoids.Outhole]
            register = "solenoid_group_a"
            index = 0
            duration = 40

            [solenoids.Knocker]
            register = 11
            index = 1
            duration = 20
            "#,
        )
        .unwrap();
        let machine = config.validate().unwrap();
        assert_eq!(
            machine.table.solenoids["Outhole"].register,
            Register::SOLENOID_GROUP_A
        );
        assert_eq!(
            machine.table.solenoids["Knocker"].register,
            Register::SOLENOID_GROUP_A
        );
    }

    #[test]
    fn test_unknown_register_name() {
        let config = FlipperConfig::parse(
            r#"
            [switches.Tilt]
            register = "switch_nowhere"
            index = 0
            "#,
        )
        .unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("switch_nowhere"));
    }

    #[test]
    fn test_mixed_switch_shape_rejected() {
        let config = FlipperConfig::parse(
            r#"
            [switches.Odd]
            register = 1
            row = 2
            "#,
        )
        .unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_unknown_field_is_parse_error() {
        let result = FlipperConfig::parse(
            r#"
            [lamps.Shoot]
            matrix = "row_a"
            column = 0
            row = 0
            colour = "red"
            "#,
        );
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }
}
