//! Control line layout and single-bit operations on register bytes.

use bitflags::bitflags;
use static_assertions::const_assert_eq;

bitflags! {
    /// Lines of the parallel port control register.
    ///
    /// The layout must match the existing driver board.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ControlLines: u8 {
        /// Index register decode output: strobes a data byte into the selected register.
        const DECODE_OUTPUT = 1 << 0;
        /// Index register latch clock: latches the register id from the data lines.
        const LATCH_CLOCK = 1 << 2;
        /// Buffer direction control: turns the board's bus buffer towards the port.
        const BUFFER_DIRECTION = 1 << 3;
        /// Printer direction: switches the port's data lines to input.
        const PRINTER_DIRECTION = 1 << 5;
    }
}

impl ControlLines {
    /// Control value held while a register is read back.
    pub const READ_PHASE: Self = Self::DECODE_OUTPUT
        .union(Self::BUFFER_DIRECTION)
        .union(Self::PRINTER_DIRECTION);

    /// All lines released.
    pub const IDLE: Self = Self::empty();
}

const_assert_eq!(ControlLines::READ_PHASE.bits(), 0b0010_1001);

/// All data lines low.
pub const DATA_LOW: u8 = 0x00;

/// All data lines high.
pub const DATA_HIGH: u8 = 0xFF;

/// Single-bit mask for a bit index in `0..8`.
///
/// Indices are validated when descriptors are built; larger values wrap
/// into the byte instead of overflowing.
#[inline]
pub const fn bit_mask(index: u8) -> u8 {
    1 << (index & 0x07)
}

/// Operation applied to one bit of a register byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitOp {
    /// Set the bit.
    Enable,
    /// Clear the bit.
    Disable,
    /// Flip the bit.
    Toggle,
}

impl BitOp {
    /// Apply the operation to `value` for the bits in `mask`.
    #[inline]
    pub const fn apply(self, value: u8, mask: u8) -> u8 {
        match self {
            Self::Enable => value | mask,
            Self::Disable => value & !mask,
            Self::Toggle => value ^ mask,
        }
    }
}

/// Iterate over the indices of the set bits of `value`, lowest first.
pub fn set_bits(value: u8) -> impl Iterator<Item = u8> {
    (0..8u8).filter(move |bit| value & bit_mask(*bit) != 0)
}
