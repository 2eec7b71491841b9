//! Field accessors for raw Gekko instruction encodings.
//!
//! Power-ISA numbers bits from the most significant end, so the primary opcode
//! (`OPCD`, bits 0-5) lives in the top six bits of the word and the link bit (`LK`,
//! bit 31) is the least significant bit.

use std::fmt;

/// `ori r0, r0, 0`, the canonical no-op.
pub const NOP_INSTRUCTION: u32 = 0x6000_0000;

/// `blr`, branch unconditionally to the link register.
pub const BLR_INSTRUCTION: u32 = 0x4e80_0020;

/// A raw 32-bit instruction word.
///
/// Only the fields the branch family uses are exposed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Instruction(pub u32);

impl Instruction {
    /// Primary opcode, `OPCD` (bits 0-5).
    #[must_use]
    pub const fn opcd(self) -> u32 {
        self.0 >> 26
    }

    /// Extended opcode of the XL-form, `SUBOP10` (bits 21-30).
    #[must_use]
    pub const fn subop10(self) -> u32 {
        (self.0 >> 1) & 0x3ff
    }

    /// Branch options, `BO` (bits 6-10).
    #[must_use]
    pub const fn bo(self) -> u32 {
        (self.0 >> 21) & 0x1f
    }

    /// Condition register bit to test, `BI` (bits 11-15).
    #[must_use]
    pub const fn bi(self) -> u32 {
        (self.0 >> 16) & 0x1f
    }

    /// Link bit, `LK` (bit 31). Every branch form keeps it in the same position.
    #[must_use]
    pub const fn lk(self) -> bool {
        self.0 & 1 != 0
    }

    /// Absolute-address bit, `AA` (bit 30), for the I- and B-forms.
    #[must_use]
    pub const fn aa(self) -> bool {
        self.0 & 2 != 0
    }

    /// `true` if `BO` matches `1z1zz`, i.e. neither the CTR nor the condition is tested.
    #[must_use]
    pub const fn is_branch_always(self) -> bool {
        self.bo() & 0b10100 == 0b10100
    }

    /// `true` if this encoding belongs to the branch family the classifier understands.
    #[must_use]
    pub const fn is_branch(self) -> bool {
        match self.opcd() {
            16 | 18 => true,
            19 => matches!(self.subop10(), 16 | 528),
            _ => false,
        }
    }
}

impl From<u32> for Instruction {
    fn from(raw: u32) -> Self {
        Instruction(raw)
    }
}

impl From<Instruction> for u32 {
    fn from(inst: Instruction) -> Self {
        inst.0
    }
}

impl fmt::LowerHex for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}
