//! Register ids of the driver board.
//!
//! A register is one addressable byte on the bus. The direction (read or
//! write) is fixed per id by the board; the id itself is just a small
//! integer, so configurations may also address registers outside the
//! named set.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One addressable byte on the driver board bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Register(pub u8);

impl Register {
    // ── read side ──
    /// Coin slot switches.
    pub const SWITCH_COIN_SLOT: Self = Self(0);
    /// Cabinet and flipper button switches.
    pub const SWITCH_CABINET_FLIPPER: Self = Self(1);
    /// DIP switches.
    pub const SWITCH_DIP: Self = Self(2);
    /// Play-field switches (service buttons, end-of-stroke).
    pub const SWITCH_PLAY_FIELD: Self = Self(3);
    /// Row of the switch matrix selected by [`Register::SWITCH_COLUMN`].
    pub const SWITCH_ROW: Self = Self(4);
    /// System switches.
    pub const SWITCH_SYSTEM: Self = Self(15);
    /// Lamp test readback, matrix A.
    pub const LAMP_TEST_A: Self = Self(16);
    /// Lamp test readback, matrix B.
    pub const LAMP_TEST_B: Self = Self(17);
    /// Lamp fuse readback, matrix A.
    pub const LAMP_FUSE_A: Self = Self(18);
    /// Lamp fuse readback, matrix B.
    pub const LAMP_FUSE_B: Self = Self(19);

    // ── write side ──
    /// Column select of the switch matrix.
    pub const SWITCH_COLUMN: Self = Self(5);
    /// Row byte of lamp matrix A.
    pub const LAMP_ROW_A: Self = Self(6);
    /// Row byte of lamp matrix B.
    pub const LAMP_ROW_B: Self = Self(7);
    /// Column select shared by both lamp matrices.
    pub const LAMP_COLUMN: Self = Self(8);
    /// Solenoid group C.
    pub const SOLENOID_GROUP_C: Self = Self(9);
    /// Solenoid group B.
    pub const SOLENOID_GROUP_B: Self = Self(10);
    /// Solenoid group A.
    pub const SOLENOID_GROUP_A: Self = Self(11);
    /// Flipper power and hold coils.
    pub const SOLENOID_FLIPPER: Self = Self(12);
    /// Solenoid group D (also carries the health LED and power relay).
    pub const SOLENOID_GROUP_D: Self = Self(13);
    /// Logic solenoids.
    pub const SOLENOID_LOGIC: Self = Self(14);

    /// Every register that can energize a coil.
    ///
    /// All of them are cleared when the solenoid controller is built,
    /// whether or not a solenoid is configured on them.
    pub const SOLENOID_REGISTERS: [Self; 6] = [
        Self::SOLENOID_GROUP_A,
        Self::SOLENOID_GROUP_B,
        Self::SOLENOID_GROUP_C,
        Self::SOLENOID_GROUP_D,
        Self::SOLENOID_FLIPPER,
        Self::SOLENOID_LOGIC,
    ];

    const NAMED: [(&'static str, Self); 20] = [
        ("switch_coin_slot", Self::SWITCH_COIN_SLOT),
        ("switch_cabinet_flipper", Self::SWITCH_CABINET_FLIPPER),
        ("switch_dip", Self::SWITCH_DIP),
        ("switch_play_field", Self::SWITCH_PLAY_FIELD),
        ("switch_row", Self::SWITCH_ROW),
        ("switch_system", Self::SWITCH_SYSTEM),
        ("lamp_test_a", Self::LAMP_TEST_A),
        ("lamp_test_b", Self::LAMP_TEST_B),
        ("lamp_fuse_a", Self::LAMP_FUSE_A),
        ("lamp_fuse_b", Self::LAMP_FUSE_B),
        ("switch_column", Self::SWITCH_COLUMN),
        ("lamp_row_a", Self::LAMP_ROW_A),
        ("lamp_row_b", Self::LAMP_ROW_B),
        ("lamp_column", Self::LAMP_COLUMN),
        ("solenoid_group_c", Self::SOLENOID_GROUP_C),
        ("solenoid_group_b", Self::SOLENOID_GROUP_B),
        ("solenoid_group_a", Self::SOLENOID_GROUP_A),
        ("solenoid_flipper", Self::SOLENOID_FLIPPER),
        ("solenoid_group_d", Self::SOLENOID_GROUP_D),
        ("solenoid_logic", Self::SOLENOID_LOGIC),
    ];

    /// Raw id written to the bus when selecting this register.
    #[inline]
    pub const fn id(self) -> u8 {
        self.0
    }

    /// Look up a register by its snake_case name (e.g. `"solenoid_group_a"`).
    pub fn from_name(name: &str) -> Option<Self> {
        Self::NAMED
            .iter()
            .find(|(candidate, _)| *candidate == name)
            .map(|(_, register)| *register)
    }

    /// Snake_case name of a known register.
    pub fn name(self) -> Option<&'static str> {
        Self::NAMED
            .iter()
            .find(|(_, register)| *register == self)
            .map(|(name, _)| *name)
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{}({})", name, self.0),
            None => write!(f, "register({})", self.0),
        }
    }
}
