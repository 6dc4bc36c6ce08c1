//! Validated descriptor records for switches, lamps and solenoids.
//!
//! Descriptors are built once from configuration and never mutated.
//! Every constructor checks its ranges, so a descriptor that exists is
//! always addressable on the board.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use crate::bits::bit_mask;
use crate::config::ConfigError;
use crate::consts::{BYTE_BITS, HEALTH_LED, MATRIX_COLUMNS, MATRIX_ROWS, POWER_RELAY_CONTROL};
use crate::registers::Register;

fn check_range(what: &str, value: u8, limit: usize) -> Result<u8, ConfigError> {
    if (value as usize) < limit {
        Ok(value)
    } else {
        Err(ConfigError::ValidationError(format!(
            "{what} must be in 0..{limit}, got {value}"
        )))
    }
}

// ─── Switches ───────────────────────────────────────────────────────

/// Location of one switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SwitchDescriptor {
    /// Directly readable bit of a switch register.
    Register {
        /// Register read each scan.
        register: Register,
        /// Bit index within the register.
        bit: u8,
    },
    /// Crossing of the switch matrix, read one column at a time.
    Matrix {
        /// Column selected through [`Register::SWITCH_COLUMN`].
        column: u8,
        /// Bit index within [`Register::SWITCH_ROW`].
        row: u8,
    },
}

impl SwitchDescriptor {
    /// Register-addressed switch.
    pub fn register(register: Register, bit: u8) -> Result<Self, ConfigError> {
        Ok(Self::Register {
            register,
            bit: check_range("switch index", bit, BYTE_BITS as usize)?,
        })
    }

    /// Matrix-addressed switch.
    pub fn matrix(column: u8, row: u8) -> Result<Self, ConfigError> {
        Ok(Self::Matrix {
            column: check_range("switch column", column, MATRIX_COLUMNS)?,
            row: check_range("switch row", row, MATRIX_ROWS)?,
        })
    }

    /// Mask of this switch's bit in the byte it is read from.
    pub fn mask(&self) -> u8 {
        match *self {
            Self::Register { bit, .. } => bit_mask(bit),
            Self::Matrix { row, .. } => bit_mask(row),
        }
    }
}

// ─── Lamps ──────────────────────────────────────────────────────────

/// Row-select of the two lamp matrices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LampMatrix {
    /// Matrix driven through [`Register::LAMP_ROW_A`].
    RowA,
    /// Matrix driven through [`Register::LAMP_ROW_B`].
    RowB,
}

impl LampMatrix {
    /// Number of lamp matrices.
    pub const COUNT: usize = 2;

    /// Both matrices, in the order their rows are written each tick.
    pub const ALL: [Self; Self::COUNT] = [Self::RowA, Self::RowB];

    /// Row register of this matrix.
    pub const fn register(self) -> Register {
        match self {
            Self::RowA => Register::LAMP_ROW_A,
            Self::RowB => Register::LAMP_ROW_B,
        }
    }

    /// Index into per-matrix arrays.
    pub const fn index(self) -> usize {
        match self {
            Self::RowA => 0,
            Self::RowB => 1,
        }
    }
}

/// Location of one lamp in the lamp matrices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LampDescriptor {
    /// Matrix (row-select register).
    pub matrix: LampMatrix,
    /// Column, multiplexed through [`Register::LAMP_COLUMN`].
    pub column: u8,
    /// Bit index within the row byte.
    pub row: u8,
}

impl LampDescriptor {
    /// Validated lamp location.
    pub fn new(matrix: LampMatrix, column: u8, row: u8) -> Result<Self, ConfigError> {
        Ok(Self {
            matrix,
            column: check_range("lamp column", column, MATRIX_COLUMNS)?,
            row: check_range("lamp row", row, MATRIX_ROWS)?,
        })
    }

    /// Mask of this lamp's bit in its row byte.
    pub fn mask(&self) -> u8 {
        bit_mask(self.row)
    }
}

// ─── Solenoids ──────────────────────────────────────────────────────

/// Location and energize limit of one solenoid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SolenoidDescriptor {
    /// Register holding the solenoid's bit.
    pub register: Register,
    /// Bit index within the register.
    pub bit: u8,
    /// Maximum energized time; `None` for hold coils and relays.
    pub cutoff: Option<Duration>,
}

impl SolenoidDescriptor {
    /// Status indicator lit while the solenoid bank is powered.
    pub const HEALTH_LED: Self = Self {
        register: Register::SOLENOID_GROUP_D,
        bit: 4,
        cutoff: None,
    };

    /// Master power relay for the whole solenoid bank.
    pub const POWER_RELAY_CONTROL: Self = Self {
        register: Register::SOLENOID_GROUP_D,
        bit: 5,
        cutoff: None,
    };

    /// Validated solenoid.
    ///
    /// `duration_ms <= 0` marks a permanently driven coil without
    /// automatic cutoff; zero and negative values are treated alike.
    pub fn new(register: Register, bit: u8, duration_ms: i64) -> Result<Self, ConfigError> {
        let cutoff = if duration_ms > 0 {
            Some(Duration::from_millis(duration_ms as u64))
        } else {
            None
        };
        Ok(Self {
            register,
            bit: check_range("solenoid index", bit, BYTE_BITS as usize)?,
            cutoff,
        })
    }

    /// Mask of this solenoid's bit in its register.
    pub fn mask(&self) -> u8 {
        bit_mask(self.bit)
    }

    /// Built-in relay entries, always present and not user-configurable.
    pub fn relays() -> [(&'static str, Self); 2] {
        [
            (HEALTH_LED, Self::HEALTH_LED),
            (POWER_RELAY_CONTROL, Self::POWER_RELAY_CONTROL),
        ]
    }
}

// ─── Table ──────────────────────────────────────────────────────────

/// All descriptors of one machine, keyed by unique name per domain.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DescriptorTable {
    /// Switches by name.
    pub switches: BTreeMap<String, SwitchDescriptor>,
    /// Lamps by name.
    pub lamps: BTreeMap<String, LampDescriptor>,
    /// User solenoids by name (relays excluded).
    pub solenoids: BTreeMap<String, SolenoidDescriptor>,
}

impl DescriptorTable {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a switch.
    pub fn with_switch(mut self, name: &str, descriptor: SwitchDescriptor) -> Self {
        self.switches.insert(name.to_string(), descriptor);
        self
    }

    /// Add a lamp.
    pub fn with_lamp(mut self, name: &str, descriptor: LampDescriptor) -> Self {
        self.lamps.insert(name.to_string(), descriptor);
        self
    }

    /// Add a solenoid.
    pub fn with_solenoid(mut self, name: &str, descriptor: SolenoidDescriptor) -> Self {
        self.solenoids.insert(name.to_string(), descriptor);
        self
    }

    /// Check cross-descriptor invariants.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if:
    /// - a name is empty
    /// - two devices of one domain share a physical position
    /// - a user solenoid uses a relay name or relay bit
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashMap::new();
        for (name, descriptor) in &self.switches {
            check_name("switch", name)?;
            if let Some(other) = seen.insert(*descriptor, name) {
                return Err(collision("switches", other, name));
            }
        }

        let mut seen = HashMap::new();
        for (name, descriptor) in &self.lamps {
            check_name("lamp", name)?;
            if let Some(other) = seen.insert(*descriptor, name) {
                return Err(collision("lamps", other, name));
            }
        }

        let mut seen: HashMap<(Register, u8), &str> = SolenoidDescriptor::relays()
            .into_iter()
            .map(|(name, d)| ((d.register, d.bit), name))
            .collect();
        for (name, descriptor) in &self.solenoids {
            check_name("solenoid", name)?;
            if name == HEALTH_LED || name == POWER_RELAY_CONTROL {
                return Err(ConfigError::ValidationError(format!(
                    "Solenoid name '{name}' is reserved for the power relay"
                )));
            }
            if let Some(other) = seen.insert((descriptor.register, descriptor.bit), name) {
                return Err(collision("solenoids", other, name));
            }
        }
        Ok(())
    }
}

fn check_name(kind: &str, name: &str) -> Result<(), ConfigError> {
    if name.is_empty() {
        return Err(ConfigError::ValidationError(format!(
            "{kind} name cannot be empty"
        )));
    }
    Ok(())
}

fn collision(kind: &str, first: &str, second: &str) -> ConfigError {
    ConfigError::ValidationError(format!(
        "The {kind} '{first}' and '{second}' share one position"
    ))
}
