//! Candidate storage and the blacklist/reduction lifecycle.
//!
//! The recording engine that observes CPU execution owns the candidates. This module
//! defines the narrow [`BranchWatch`] interface the filtering and patching core consumes
//! from it, together with [`CandidateStore`], an in-memory implementation that also
//! serves as the producer-side hit recorder.
//!
//! # Lifecycle
//!
//! ```text
//!              CodePathWasTaken (first)
//!  Blacklist ───────────────────────────▶ Reduction
//!      ▲                                      │
//!      └──────────────── clear ───────────────┘
//! ```
//!
//! In the blacklist phase every reduction step other than the first "was taken" adds
//! candidates to an exclusion set. Once in the reduction phase the steps narrow the
//! selection, which never regains removed entries.
//!
//! # Rows
//!
//! Consumers address candidates by *row*: in the blacklist phase the rows are all
//! candidates that are not excluded, in the reduction phase they are the selection.
//! Row indices are only valid until the next change of [`BranchWatch::revision`].

mod candidate;
mod phase;
mod snapshot;
mod store;

use std::io::{BufRead, Write};

pub use candidate::{CandidateKey, CandidateRecord};
pub use phase::{Phase, Reduction};
pub use store::CandidateStore;

use crate::{host::DebugInterface, Result};

/// Interface of the recording engine, as consumed by the filter and patch core.
///
/// Every method is expected to be called while holding the exclusive-access guard of
/// the emulated system (see [`crate::host::EmulatedSystem::guard`]).
pub trait BranchWatch {
    /// Current search stage.
    fn phase(&self) -> Phase;

    /// Number of distinct candidates ever recorded since the last clear.
    fn collection_size(&self) -> usize;

    /// Number of candidates excluded during the blacklist phase.
    fn blacklist_size(&self) -> usize;

    /// Number of rows in the current candidate view.
    fn row_count(&self) -> usize;

    /// Candidate at `row` of the current view.
    fn row(&self, row: usize) -> Option<&CandidateRecord>;

    /// Monotonic counter that changes whenever rows, or anything a filter can observe on
    /// them, change.
    fn revision(&self) -> u64;

    /// Whether hits are currently being recorded.
    fn is_recording(&self) -> bool;

    /// Resume recording hits.
    fn start(&mut self);

    /// Stop recording hits until [`BranchWatch::start`] is called.
    fn pause(&mut self);

    /// Whether there is anything worth saving.
    fn can_persist(&self) -> bool;

    /// Discard all candidates, the blacklist and the selection, and return to the
    /// blacklist phase.
    fn clear(&mut self);

    /// Apply one reduction step.
    ///
    /// ## Arguments
    /// * `action` - Which runtime test to apply
    /// * `memory` - Used to read back origin instructions for the overwrite tests
    fn reduce(&mut self, action: Reduction, memory: &dyn DebugInterface);

    /// Remove rows from the candidates. Blacklists them in the blacklist phase, drops
    /// them from the selection in the reduction phase.
    ///
    /// # Errors
    /// Returns [`crate::Error::RowOutOfBounds`] without changing anything if any row is invalid.
    fn delete_rows(&mut self, rows: &[usize]) -> Result<()>;

    /// Mark the candidate at `row` as inspected.
    ///
    /// # Errors
    /// Returns [`crate::Error::RowOutOfBounds`] if `row` is invalid.
    fn set_inspected(&mut self, row: usize) -> Result<()>;

    /// Clear the inspected mark of every candidate.
    fn wipe_inspection(&mut self);

    /// Reset the recent hit counter of every candidate.
    fn wipe_recent_hits(&mut self);

    /// Store resolved symbol names for the candidate at `row`.
    ///
    /// # Errors
    /// Returns [`crate::Error::RowOutOfBounds`] if `row` is invalid.
    fn set_symbols(
        &mut self,
        row: usize,
        origin: Option<String>,
        destination: Option<String>,
    ) -> Result<()>;

    /// Write a snapshot of the candidate state.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] if writing fails.
    fn save(&self, writer: &mut dyn Write) -> Result<()>;

    /// Replace the candidate state with a previously saved snapshot.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] or [`crate::Error::FileError`], leaving the
    /// current state untouched.
    fn load(&mut self, reader: &mut dyn BufRead) -> Result<()>;
}
