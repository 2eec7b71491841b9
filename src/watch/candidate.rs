//! Candidate value types.

use std::fmt;

use crate::instruction::{classify, BranchKind};

/// Identity of a branch site.
///
/// Two hits with the same key are the same logical candidate. The recording store
/// enforces uniqueness; nothing else relies on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CandidateKey {
    /// Address of the branch instruction itself
    pub origin_address: u32,
    /// Address the branch transferred control to
    pub destination_address: u32,
    /// The instruction word at the origin when the hit was recorded
    pub raw_instruction: u32,
}

impl CandidateKey {
    /// Create a new key.
    #[must_use]
    pub const fn new(origin_address: u32, destination_address: u32, raw_instruction: u32) -> Self {
        CandidateKey {
            origin_address,
            destination_address,
            raw_instruction,
        }
    }
}

impl fmt::Display for CandidateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:08x} -> {:08x} ({:08x})",
            self.origin_address, self.destination_address, self.raw_instruction
        )
    }
}

/// One observed branch site with its hit statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateRecord {
    /// Identity of this candidate, never changes after creation
    pub key: CandidateKey,
    /// Whether the last evaluated condition was satisfied. Always `true` for
    /// unconditional branches.
    pub condition_taken: bool,
    /// Lifetime hit count
    pub hits_total: u64,
    /// Hits since the last explicit wipe
    pub hits_recent: u32,
    /// Set once a patch action was applied to this candidate
    pub inspected: bool,
    /// Resolved name of the symbol containing the origin
    pub origin_symbol: Option<String>,
    /// Resolved name of the symbol containing the destination
    pub destination_symbol: Option<String>,
}

impl CandidateRecord {
    /// Create a record with no hits and no resolved symbols.
    #[must_use]
    pub fn new(key: CandidateKey, condition_taken: bool) -> Self {
        CandidateRecord {
            key,
            condition_taken,
            hits_total: 0,
            hits_recent: 0,
            inspected: false,
            origin_symbol: None,
            destination_symbol: None,
        }
    }

    /// The branch form of the recorded instruction, if it is one.
    #[must_use]
    pub fn branch_kind(&self) -> Option<BranchKind> {
        classify(self.key.raw_instruction)
    }

    /// Count one more hit, remembering the condition it was taken with.
    pub(crate) fn hit(&mut self, condition_taken: bool) {
        self.hits_total = self.hits_total.saturating_add(1);
        self.hits_recent = self.hits_recent.saturating_add(1);
        self.condition_taken = condition_taken;
    }
}
