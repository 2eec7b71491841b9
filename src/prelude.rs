//! # branchwatch Prelude
//!
//! This module provides a convenient prelude for the most commonly used types and traits
//! from the branchwatch library.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all branchwatch operations
pub use crate::Error;

/// The result type used throughout branchwatch
pub use crate::Result;

/// Session configuration
pub use crate::WatchConfig;

// ================================================================================================
// Instructions
// ================================================================================================

/// Branch classification
pub use crate::instruction::{
    branch_saves_lr, classify, BranchKind, Instruction, BLR_INSTRUCTION, NOP_INSTRUCTION,
};

// ================================================================================================
// Candidates
// ================================================================================================

/// Candidate records, the recording store and the search lifecycle
pub use crate::watch::{BranchWatch, CandidateKey, CandidateRecord, CandidateStore, Phase, Reduction};

// ================================================================================================
// Filtering and Patching
// ================================================================================================

/// The filter configuration and the filtered view
pub use crate::filter::{
    AddressBound, BranchKinds, Column, FilterConfig, FilterEngine, SortOrder, SymbolField,
};

/// Memory patches
pub use crate::patch::{AddressColumn, PatchActions};

// ================================================================================================
// Host and Session
// ================================================================================================

/// The emulated system
pub use crate::host::{CpuThreadGuard, DebugInterface, EmulatedSystem, ExecutionState, SymbolCache};

/// Session control
pub use crate::session::{PollSchedule, WatchSession};
