//! In-memory recording store.

use std::{
    collections::{hash_map::Entry as MapEntry, HashMap},
    io::{BufRead, Write},
};

use tracing::{debug, trace};

use crate::{
    host::DebugInterface,
    watch::{snapshot, BranchWatch, CandidateKey, CandidateRecord, Phase, Reduction},
    Error, Result,
};

/// One collected candidate plus the bookkeeping the reduction tests need.
#[derive(Debug, Clone)]
pub(crate) struct Entry {
    pub(crate) record: CandidateRecord,
    /// `hits_total` as of the last reduction step
    pub(crate) hits_snapshot: u64,
    pub(crate) blacklisted: bool,
}

impl Entry {
    fn hit_since_check(&self) -> bool {
        self.record.hits_total > self.hits_snapshot
    }

    fn overwritten(&self, memory: &dyn DebugInterface) -> bool {
        memory.read_instruction(self.record.key.origin_address)
            != Some(self.record.key.raw_instruction)
    }

    /// Evaluate the runtime test behind `action`.
    fn passes(&self, action: Reduction, memory: &dyn DebugInterface) -> bool {
        match action {
            Reduction::CodePathWasTaken => self.hit_since_check(),
            Reduction::CodePathNotTaken => !self.hit_since_check(),
            Reduction::BranchWasOverwritten => self.overwritten(memory),
            Reduction::BranchNotOverwritten => !self.overwritten(memory),
        }
    }

    fn check(&mut self) {
        self.hits_snapshot = self.record.hits_total;
    }
}

/// The candidate collection of a branch watch, with its blacklist and selection.
///
/// Hits are fed in by the producer through [`CandidateStore::record_hit`]; the search
/// lifecycle is driven through the [`BranchWatch`] trait.
///
/// # Examples
///
/// ```rust
/// use branchwatch::watch::{BranchWatch, CandidateKey, CandidateStore, Phase};
///
/// let mut store = CandidateStore::new();
/// store.start();
/// store.record_hit(CandidateKey::new(0x8000_1234, 0x8000_2000, 0x4800_0dcd), true);
///
/// assert_eq!(store.phase(), Phase::Blacklist);
/// assert_eq!(store.row_count(), 1);
/// ```
#[derive(Debug, Default)]
pub struct CandidateStore {
    pub(crate) entries: Vec<Entry>,
    pub(crate) lookup: HashMap<CandidateKey, usize>,
    /// Entry indices forming the current view
    pub(crate) rows: Vec<usize>,
    pub(crate) phase: Phase,
    pub(crate) blacklist_size: usize,
    recording: bool,
    revision: u64,
}

impl CandidateStore {
    /// Create an empty, paused store in the blacklist phase.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one execution of a branch.
    ///
    /// Ignored while paused. A key seen for the first time during the reduction phase
    /// is collected but does not enter the selection.
    ///
    /// ## Arguments
    /// * `key`             - The branch site that executed
    /// * `condition_taken` - Whether its condition was satisfied
    pub fn record_hit(&mut self, key: CandidateKey, condition_taken: bool) {
        if !self.recording {
            return;
        }

        let index = match self.lookup.entry(key) {
            MapEntry::Occupied(occupied) => *occupied.get(),
            MapEntry::Vacant(vacant) => {
                let index = self.entries.len();
                self.entries.push(Entry {
                    record: CandidateRecord::new(key, condition_taken),
                    hits_snapshot: 0,
                    blacklisted: false,
                });
                vacant.insert(index);
                if self.phase == Phase::Blacklist {
                    self.rows.push(index);
                }
                trace!(%key, "new branch watch candidate");
                index
            }
        };

        self.entries[index].record.hit(condition_taken);
        self.bump();
    }

    /// The candidate with the given key, whether or not it is part of the current view.
    #[must_use]
    pub fn get(&self, key: &CandidateKey) -> Option<&CandidateRecord> {
        self.lookup.get(key).map(|&index| &self.entries[index].record)
    }

    /// Iterate over the rows of the current view.
    pub fn rows(&self) -> impl Iterator<Item = &CandidateRecord> + '_ {
        self.rows.iter().map(|&index| &self.entries[index].record)
    }

    fn bump(&mut self) {
        self.revision = self.revision.wrapping_add(1);
    }

    fn entry_index(&self, row: usize) -> Result<usize> {
        self.rows.get(row).copied().ok_or(Error::RowOutOfBounds(row))
    }

    fn rebuild_blacklist_rows(&mut self) {
        self.rows = (0..self.entries.len())
            .filter(|&index| !self.entries[index].blacklisted)
            .collect();
        self.blacklist_size = self.entries.iter().filter(|e| e.blacklisted).count();
    }

    /// Replace the full state, used by the snapshot loader.
    ///
    /// The revision keeps counting up from the replaced state.
    pub(crate) fn replace_with(&mut self, other: CandidateStore) {
        let recording = self.recording;
        let revision = self.revision;
        *self = other;
        self.recording = recording;
        self.revision = revision;
        self.bump();
    }
}

impl BranchWatch for CandidateStore {
    fn phase(&self) -> Phase {
        self.phase
    }

    fn collection_size(&self) -> usize {
        self.entries.len()
    }

    fn blacklist_size(&self) -> usize {
        self.blacklist_size
    }

    fn row_count(&self) -> usize {
        self.rows.len()
    }

    fn row(&self, row: usize) -> Option<&CandidateRecord> {
        self.rows.get(row).map(|&index| &self.entries[index].record)
    }

    fn revision(&self) -> u64 {
        self.revision
    }

    fn is_recording(&self) -> bool {
        self.recording
    }

    fn start(&mut self) {
        self.recording = true;
    }

    fn pause(&mut self) {
        self.recording = false;
    }

    fn can_persist(&self) -> bool {
        !self.entries.is_empty()
    }

    fn clear(&mut self) {
        debug!(
            candidates = self.entries.len(),
            phase = %self.phase,
            "clearing branch watch"
        );
        self.entries.clear();
        self.lookup.clear();
        self.rows.clear();
        self.blacklist_size = 0;
        self.phase = Phase::Blacklist;
        self.bump();
    }

    fn reduce(&mut self, action: Reduction, memory: &dyn DebugInterface) {
        let before = self.rows.len();

        match (self.phase, action) {
            (Phase::Blacklist, Reduction::CodePathWasTaken) => {
                // Every candidate that survived the blacklist becomes the selection.
                for &index in &self.rows {
                    self.entries[index].check();
                }
                self.phase = Phase::Reduction;
                debug!(selection = self.rows.len(), "branch watch entered reduction phase");
            }
            (Phase::Blacklist, _) => {
                for entry in self.entries.iter_mut().filter(|e| !e.blacklisted) {
                    if !entry.passes(action, memory) {
                        entry.blacklisted = true;
                    }
                }
                for entry in &mut self.entries {
                    entry.check();
                }
                self.rebuild_blacklist_rows();
            }
            (Phase::Reduction, _) => {
                let entries = &mut self.entries;
                self.rows.retain(|&index| entries[index].passes(action, memory));
                for &index in &self.rows {
                    entries[index].check();
                }
            }
        }

        debug!(
            %action,
            phase = %self.phase,
            before,
            after = self.rows.len(),
            blacklisted = self.blacklist_size,
            "applied branch watch reduction"
        );
        self.bump();
    }

    fn delete_rows(&mut self, rows: &[usize]) -> Result<()> {
        let mut indices = rows
            .iter()
            .map(|&row| self.entry_index(row))
            .collect::<Result<Vec<_>>>()?;
        indices.sort_unstable();
        indices.dedup();

        match self.phase {
            Phase::Blacklist => {
                for &index in &indices {
                    self.entries[index].blacklisted = true;
                }
                self.rebuild_blacklist_rows();
            }
            Phase::Reduction => {
                self.rows.retain(|index| indices.binary_search(index).is_err());
            }
        }

        debug!(deleted = indices.len(), remaining = self.rows.len(), "deleted rows");
        self.bump();
        Ok(())
    }

    fn set_inspected(&mut self, row: usize) -> Result<()> {
        let index = self.entry_index(row)?;
        self.entries[index].record.inspected = true;
        self.bump();
        Ok(())
    }

    fn wipe_inspection(&mut self) {
        for entry in &mut self.entries {
            entry.record.inspected = false;
        }
        self.bump();
    }

    fn wipe_recent_hits(&mut self) {
        for entry in &mut self.entries {
            entry.record.hits_recent = 0;
        }
        self.bump();
    }

    fn set_symbols(
        &mut self,
        row: usize,
        origin: Option<String>,
        destination: Option<String>,
    ) -> Result<()> {
        let index = self.entry_index(row)?;
        let record = &mut self.entries[index].record;
        if record.origin_symbol != origin || record.destination_symbol != destination {
            record.origin_symbol = origin;
            record.destination_symbol = destination;
            self.bump();
        }
        Ok(())
    }

    fn save(&self, writer: &mut dyn Write) -> Result<()> {
        snapshot::write(self, writer)
    }

    fn load(&mut self, reader: &mut dyn BufRead) -> Result<()> {
        let loaded = snapshot::read(reader)?;
        debug!(
            candidates = loaded.entries.len(),
            phase = %loaded.phase,
            "loaded branch watch snapshot"
        );
        self.replace_with(loaded);
        Ok(())
    }
}
