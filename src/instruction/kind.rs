//! Branch variant classification.
//!
//! Maps a raw branch encoding to one of twelve [`BranchKind`] values using the primary
//! opcode, the XL-form extended opcode, the `BO` "branch always" pattern and the link bit.
//!
//! | OPCD | SUBOP10 | BO `1z1zz` | LK=0 | LK=1 |
//! |------|---------|------------|------|------|
//! | 18   | -       | -          | `b`      | `bl`     |
//! | 16   | -       | -          | `bc`     | `bcl`    |
//! | 19   | 16      | yes        | `blr`    | `blrl`   |
//! | 19   | 16      | no         | `bclr`   | `bclrl`  |
//! | 19   | 528     | yes        | `bctr`   | `bctrl`  |
//! | 19   | 528     | no         | `bcctr`  | `bcctrl` |

use strum::{Display, EnumCount, EnumIter, IntoStaticStr};

use crate::{instruction::Instruction, Error, Result};

/// The twelve mutually exclusive branch forms tracked by the search tool.
///
/// `Display` yields the assembler mnemonic (`"bcctrl"` etc.).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumIter, EnumCount,
    IntoStaticStr,
)]
#[strum(serialize_all = "lowercase")]
pub enum BranchKind {
    /// Branch
    B,
    /// Branch (LR saved)
    Bl,
    /// Branch Conditional
    Bc,
    /// Branch Conditional (LR saved)
    Bcl,
    /// Branch to Link Register
    Blr,
    /// Branch to Link Register (LR saved)
    Blrl,
    /// Branch Conditional to Link Register
    Bclr,
    /// Branch Conditional to Link Register (LR saved)
    Bclrl,
    /// Branch to Count Register
    Bctr,
    /// Branch to Count Register (LR saved)
    Bctrl,
    /// Branch Conditional to Count Register
    Bcctr,
    /// Branch Conditional to Count Register (LR saved)
    Bcctrl,
}

impl BranchKind {
    /// Assembler mnemonic of this branch form.
    #[must_use]
    pub fn mnemonic(self) -> &'static str {
        self.into()
    }

    /// Human readable description, as shown next to the filter toggle.
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            BranchKind::B => "Branch",
            BranchKind::Bl => "Branch (LR saved)",
            BranchKind::Bc => "Branch Conditional",
            BranchKind::Bcl => "Branch Conditional (LR saved)",
            BranchKind::Blr => "Branch to Link Register",
            BranchKind::Blrl => "Branch to Link Register (LR saved)",
            BranchKind::Bclr => "Branch Conditional to Link Register",
            BranchKind::Bclrl => "Branch Conditional to Link Register (LR saved)",
            BranchKind::Bctr => "Branch to Count Register",
            BranchKind::Bctrl => "Branch to Count Register (LR saved)",
            BranchKind::Bcctr => "Branch Conditional to Count Register",
            BranchKind::Bcctrl => "Branch Conditional to Count Register (LR saved)",
        }
    }

    /// `true` for the `*l` forms that write the return address into LR.
    #[must_use]
    pub const fn saves_lr(self) -> bool {
        matches!(
            self,
            BranchKind::Bl
                | BranchKind::Bcl
                | BranchKind::Blrl
                | BranchKind::Bclrl
                | BranchKind::Bctrl
                | BranchKind::Bcctrl
        )
    }

    /// `true` for the forms that may fall through, i.e. everything but `b*` and the
    /// branch-always register forms.
    #[must_use]
    pub const fn is_conditional(self) -> bool {
        matches!(
            self,
            BranchKind::Bc
                | BranchKind::Bcl
                | BranchKind::Bclr
                | BranchKind::Bclrl
                | BranchKind::Bcctr
                | BranchKind::Bcctrl
        )
    }

    fn pick(lr_saved: bool, plain: BranchKind, linked: BranchKind) -> BranchKind {
        if lr_saved {
            linked
        } else {
            plain
        }
    }
}

impl TryFrom<Instruction> for BranchKind {
    type Error = Error;

    fn try_from(inst: Instruction) -> Result<Self> {
        let lr_saved = inst.lk();
        match inst.opcd() {
            18 => Ok(Self::pick(lr_saved, BranchKind::B, BranchKind::Bl)),
            16 => Ok(Self::pick(lr_saved, BranchKind::Bc, BranchKind::Bcl)),
            19 => match inst.subop10() {
                16 if inst.is_branch_always() => {
                    Ok(Self::pick(lr_saved, BranchKind::Blr, BranchKind::Blrl))
                }
                16 => Ok(Self::pick(lr_saved, BranchKind::Bclr, BranchKind::Bclrl)),
                528 if inst.is_branch_always() => {
                    Ok(Self::pick(lr_saved, BranchKind::Bctr, BranchKind::Bctrl))
                }
                528 => Ok(Self::pick(lr_saved, BranchKind::Bcctr, BranchKind::Bcctrl)),
                _ => Err(Error::UnrecognizedInstruction(inst.0)),
            },
            _ => Err(Error::UnrecognizedInstruction(inst.0)),
        }
    }
}

/// Classify a raw encoding, returning `None` for anything outside the branch family.
///
/// # Arguments
/// * `raw` - The instruction word as recorded by the recording engine
#[must_use]
pub fn classify(raw: u32) -> Option<BranchKind> {
    BranchKind::try_from(Instruction(raw)).ok()
}

/// Whether the branch writes its return address into LR.
///
/// This is just the `LK` bit, which every branch form keeps in the same position. Calling
/// this on a non-branch is a contract violation caught in debug builds.
#[must_use]
pub fn branch_saves_lr(raw: u32) -> bool {
    let inst = Instruction(raw);
    debug_assert!(inst.is_branch(), "not a branch instruction: {raw:#010x}");
    inst.lk()
}
