//! Power-ISA branch instruction classification.
//!
//! This module decodes the handful of Gekko instruction fields needed to tell the branch
//! family apart, and maps a raw 32-bit encoding to one of the twelve [`BranchKind`]
//! variants the filter engine can toggle. Decoding of anything outside the branch
//! family is intentionally not provided.
//!
//! # Key Types
//! - [`Instruction`] - A raw encoding with typed field accessors
//! - [`BranchKind`] - The twelve mutually exclusive branch forms
//!
//! # Main Functions
//! - [`classify`] - Raw encoding to branch kind, or `None` for anything else
//! - [`branch_saves_lr`] - Whether a branch writes the return address into LR
//!
//! # Example
//! ```rust
//! use branchwatch::instruction::{classify, branch_saves_lr, BranchKind};
//!
//! // bl +0x1234
//! let raw = 0x4800_1235;
//! assert_eq!(classify(raw), Some(BranchKind::Bl));
//! assert!(branch_saves_lr(raw));
//! ```

mod encoding;
mod kind;

pub use encoding::{Instruction, BLR_INSTRUCTION, NOP_INSTRUCTION};
pub use kind::{branch_saves_lr, classify, BranchKind};
