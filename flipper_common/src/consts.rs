//! System-wide constants.

use static_assertions::const_assert;

/// Canonical service name (used for logging).
pub const HAL_SERVICE_NAME: &str = "flipper_hal";

/// Number of bits in one bus register.
pub const BYTE_BITS: u8 = 8;

/// Number of columns in the switch and lamp matrices.
pub const MATRIX_COLUMNS: usize = 8;

/// Number of rows in the switch and lamp matrices.
pub const MATRIX_ROWS: usize = 8;

// Columns and rows are addressed as single bits of one register.
const_assert!(MATRIX_COLUMNS <= BYTE_BITS as usize);
const_assert!(MATRIX_ROWS <= BYTE_BITS as usize);

/// Default I/O base address of the parallel port card.
pub const DEFAULT_PORT_ADDRESS: u16 = 0xEC00;

/// Offset of the control register from the port base address.
pub const CONTROL_REGISTER_OFFSET: u16 = 2;

/// Default switch scan interval in milliseconds.
pub const DEFAULT_SWITCH_INTERVAL_MS: f64 = 1.0;

/// Default lamp multiplexing interval in milliseconds.
pub const DEFAULT_LAMP_INTERVAL_MS: f64 = 0.5;

/// Longest accepted scheduler interval in milliseconds (one minute).
pub const MAX_INTERVAL_MS: f64 = 60_000.0;

/// Default configuration file path.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/flipper/flipper.toml";

/// Name of the status indicator driven together with the solenoid power relay.
pub const HEALTH_LED: &str = "HealthLed";

/// Name of the master power relay for the whole solenoid bank.
pub const POWER_RELAY_CONTROL: &str = "PowerRelayControl";
