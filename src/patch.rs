//! Memory patches applied to selected candidates.
//!
//! Patches replace instructions in emulated memory to confirm that a candidate is the
//! branch being looked for: overwrite the branch itself with a no-op, or make its target
//! return to the caller immediately. Every patched candidate is marked inspected.
//!
//! Rows passed to these actions are indices into the watch's current rows, as produced
//! by [`crate::filter::FilterEngine::visible_rows`]. A batch first checks its
//! precondition under one guard acquisition, then writes under one acquisition per
//! record so the producer is never paused for a whole batch.
//!
//! # Examples
//!
//! ```rust,ignore
//! use branchwatch::patch::{AddressColumn, PatchActions};
//!
//! let rows = engine.visible_rows(&*system.guard()?.watch).to_vec();
//! let actions = PatchActions::new(&system);
//! if actions.can_set_return_to_caller(&rows) {
//!     actions.set_return_to_caller(&rows)?;
//! }
//! let clipboard = actions.copy_addresses(&rows, AddressColumn::Destination)?;
//! ```

use std::fmt::Write as _;

use strum::{Display, EnumIter};
use tracing::{debug, warn};

use crate::{
    filter::SymbolField,
    host::{DebugInterface, EmulatedSystem},
    instruction::{classify, BranchKind, BLR_INSTRUCTION, NOP_INSTRUCTION},
    watch::{BranchWatch, CandidateRecord},
    Error, Result,
};

/// Which address of a candidate to copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum AddressColumn {
    /// Address of the branch instruction
    Origin,
    /// Address the branch jumped to
    Destination,
}

impl AddressColumn {
    /// The address this column shows for `record`.
    #[must_use]
    pub fn address(self, record: &CandidateRecord) -> u32 {
        match self {
            AddressColumn::Origin => record.key.origin_address,
            AddressColumn::Destination => record.key.destination_address,
        }
    }
}

/// Render addresses for the clipboard: lowercase hex without padding, one per line.
///
/// # Examples
///
/// ```rust
/// use branchwatch::patch::{copy_addresses, AddressColumn};
/// use branchwatch::watch::{CandidateKey, CandidateRecord};
///
/// let records: Vec<_> = [0x8000_1000, 0x8000_1010, 0x8000_1020]
///     .into_iter()
///     .map(|dest| CandidateRecord::new(CandidateKey::new(0x8000_0000, dest, 0x4800_0001), true))
///     .collect();
///
/// let text = copy_addresses(&records, AddressColumn::Destination);
/// assert_eq!(text, "80001000\n80001010\n80001020");
/// ```
pub fn copy_addresses<'a, I>(records: I, column: AddressColumn) -> String
where
    I: IntoIterator<Item = &'a CandidateRecord>,
{
    let mut text = String::new();
    for (i, record) in records.into_iter().enumerate() {
        if i > 0 {
            text.push('\n');
        }
        // Writing into a String cannot fail
        let _ = write!(text, "{:x}", column.address(record));
    }
    text
}

/// Whether the branch recorded in `record` can be undone by returning from its target.
fn saves_lr(record: &CandidateRecord) -> bool {
    classify(record.key.raw_instruction).is_some_and(BranchKind::saves_lr)
}

/// Patch actions on the candidates of an [`EmulatedSystem`].
pub struct PatchActions<'a, W, D> {
    system: &'a EmulatedSystem<W, D>,
}

impl<'a, W: BranchWatch, D: DebugInterface> PatchActions<'a, W, D> {
    /// Create the actions for `system`.
    pub fn new(system: &'a EmulatedSystem<W, D>) -> Self {
        PatchActions { system }
    }

    fn require_initialized(&self, action: &str) -> Result<()> {
        let state = self.system.state();
        if state.is_initialized() {
            Ok(())
        } else {
            warn!(action, %state, "refusing patch while the core is uninitialized");
            Err(Error::UninitializedExecutionContext)
        }
    }

    /// `true` if memory can be patched at all.
    #[must_use]
    pub fn can_patch(&self) -> bool {
        self.system.state().is_initialized()
    }

    /// `true` if [`PatchActions::set_return_to_caller`] would be accepted for `rows`.
    #[must_use]
    pub fn can_set_return_to_caller(&self, rows: &[usize]) -> bool {
        self.can_patch() && self.return_to_caller_targets(rows).is_ok()
    }

    /// `true` if [`PatchActions::set_return_at_symbol_start`] would be accepted for `rows`.
    #[must_use]
    pub fn can_set_return_at_symbol_start(&self, rows: &[usize], field: SymbolField) -> bool {
        self.can_patch() && self.symbol_start_targets(rows, field).is_ok()
    }

    /// Replace each selected branch with a no-op.
    ///
    /// Returns the number of patched candidates.
    ///
    /// # Errors
    /// - [`Error::UninitializedExecutionContext`] if the core is not running
    /// - [`Error::RowOutOfBounds`] if any row is invalid, nothing is written
    /// - [`Error::MemoryWrite`] if a write fails; earlier records stay patched
    pub fn set_nop(&self, rows: &[usize]) -> Result<usize> {
        self.require_initialized("nop")?;

        let mut targets = Vec::with_capacity(rows.len());
        {
            let guard = self.system.guard()?;
            for &row in rows {
                let record = guard.watch.row(row).ok_or(Error::RowOutOfBounds(row))?;
                targets.push((row, record.key.origin_address));
            }
        }

        self.apply(&targets, NOP_INSTRUCTION)
    }

    /// Make each selected branch target return to its caller immediately.
    ///
    /// Only valid for branches that save the return address. The check covers the whole
    /// batch: if any row fails it, nothing is written.
    ///
    /// # Errors
    /// - [`Error::UninitializedExecutionContext`] if the core is not running
    /// - [`Error::IllegalPatchPrecondition`] for the first row whose branch does not save LR
    /// - [`Error::RowOutOfBounds`] if any row is invalid
    /// - [`Error::MemoryWrite`] if a write fails; earlier records stay patched
    pub fn set_return_to_caller(&self, rows: &[usize]) -> Result<usize> {
        self.require_initialized("blr")?;

        let targets = self.return_to_caller_targets(rows).inspect_err(|error| {
            warn!(%error, rows = rows.len(), "refusing return-to-caller patch");
        })?;
        self.apply(&targets, BLR_INSTRUCTION)
    }

    /// Make the function containing each selected origin or destination return at its
    /// first instruction.
    ///
    /// # Errors
    /// - [`Error::UninitializedExecutionContext`] if the core is not running
    /// - [`Error::UnresolvedSymbol`] for the first row without a known symbol, nothing is written
    /// - [`Error::RowOutOfBounds`] if any row is invalid
    /// - [`Error::MemoryWrite`] if a write fails; earlier records stay patched
    pub fn set_return_at_symbol_start(&self, rows: &[usize], field: SymbolField) -> Result<usize> {
        self.require_initialized("blr at symbol start")?;

        let targets = self.symbol_start_targets(rows, field).inspect_err(|error| {
            warn!(%error, %field, "refusing symbol start patch");
        })?;
        self.apply(&targets, BLR_INSTRUCTION)
    }

    /// Addresses of `rows` in the given column, formatted by [`copy_addresses`].
    ///
    /// # Errors
    /// Returns [`Error::RowOutOfBounds`] if any row is invalid.
    pub fn copy_addresses(&self, rows: &[usize], column: AddressColumn) -> Result<String> {
        let guard = self.system.guard()?;
        let records = rows
            .iter()
            .map(|&row| guard.watch.row(row).ok_or(Error::RowOutOfBounds(row)))
            .collect::<Result<Vec<_>>>()?;
        let text = copy_addresses(records, column);
        Ok(text)
    }

    /// Remove `rows` from the candidates. Does not touch emulated memory.
    ///
    /// # Errors
    /// Returns [`Error::RowOutOfBounds`] without changing anything if any row is invalid.
    pub fn delete_rows(&self, rows: &[usize]) -> Result<()> {
        self.system.guard()?.watch.delete_rows(rows)
    }

    fn return_to_caller_targets(&self, rows: &[usize]) -> Result<Vec<(usize, u32)>> {
        let guard = self.system.guard()?;
        let targets = rows
            .iter()
            .map(|&row| {
                let record = guard.watch.row(row).ok_or(Error::RowOutOfBounds(row))?;
                if saves_lr(record) {
                    Ok((row, record.key.destination_address))
                } else {
                    Err(Error::IllegalPatchPrecondition {
                        row,
                        instruction: record.key.raw_instruction,
                    })
                }
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(targets)
    }

    fn symbol_start_targets(
        &self,
        rows: &[usize],
        field: SymbolField,
    ) -> Result<Vec<(usize, u32)>> {
        let guard = self.system.guard()?;
        let targets = rows
            .iter()
            .map(|&row| {
                let record = guard.watch.row(row).ok_or(Error::RowOutOfBounds(row))?;
                let address = match field {
                    SymbolField::Origin => record.key.origin_address,
                    SymbolField::Destination => record.key.destination_address,
                };
                guard
                    .debug
                    .symbol_start(address)
                    .map(|start| (row, start))
                    .ok_or(Error::UnresolvedSymbol { row })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(targets)
    }

    /// Write `encoding` at every target, one guard per record.
    fn apply(&self, targets: &[(usize, u32)], encoding: u32) -> Result<usize> {
        for &(row, address) in targets {
            let mut guard = self.system.guard()?;
            guard.debug.write_instruction(address, encoding)?;
            guard.watch.set_inspected(row)?;
            debug!(row, "patched {address:08x} with {encoding:08x}");
        }
        Ok(targets.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        host::ExecutionState,
        test::{MockMemory, BCTRL, BEQ, BL, BLR},
        watch::{CandidateKey, CandidateStore},
    };

    type System = EmulatedSystem<CandidateStore, MockMemory>;

    fn system_with(keys: &[(u32, u32, u32)]) -> System {
        let mut store = CandidateStore::new();
        store.start();
        for &(origin, destination, instruction) in keys {
            store.record_hit(CandidateKey::new(origin, destination, instruction), true);
        }
        let system = EmulatedSystem::new(store, MockMemory::default());
        system.set_state(ExecutionState::Running);
        system
    }

    fn writes(system: &System) -> Vec<(u32, u32)> {
        system.guard().unwrap().debug.writes.clone()
    }

    fn inspected(system: &System) -> Vec<bool> {
        system.guard().unwrap().watch.rows().map(|r| r.inspected).collect()
    }

    #[test]
    fn nop_patches_origins() {
        let system = system_with(&[(0x8000_0000, 0x8000_1000, BL), (0x8000_0010, 0x8000_2000, BEQ)]);
        let actions = PatchActions::new(&system);

        assert_eq!(actions.set_nop(&[1]).unwrap(), 1);
        assert_eq!(writes(&system), [(0x8000_0010, NOP_INSTRUCTION)]);
        assert_eq!(inspected(&system), [false, true]);
    }

    #[test]
    fn uninitialized_refuses_everything() {
        let system = system_with(&[(0x8000_0000, 0x8000_1000, BL)]);
        system.set_state(ExecutionState::Uninitialized);
        let actions = PatchActions::new(&system);

        assert!(!actions.can_patch());
        assert!(!actions.can_set_return_to_caller(&[0]));
        assert!(matches!(actions.set_nop(&[0]), Err(Error::UninitializedExecutionContext)));
        assert!(matches!(
            actions.set_return_to_caller(&[0]),
            Err(Error::UninitializedExecutionContext)
        ));
        assert!(matches!(
            actions.set_return_at_symbol_start(&[0], SymbolField::Origin),
            Err(Error::UninitializedExecutionContext)
        ));
        assert!(writes(&system).is_empty());
        assert_eq!(inspected(&system), [false]);
    }

    #[test]
    fn return_to_caller_is_batch_atomic() {
        let system = system_with(&[
            (0x8000_0000, 0x8000_1000, BL),
            (0x8000_0004, 0x8000_2000, BCTRL),
            (0x8000_0008, 0x8000_3000, BLR),
        ]);
        let actions = PatchActions::new(&system);

        assert!(!actions.can_set_return_to_caller(&[0, 1, 2]));
        assert!(matches!(
            actions.set_return_to_caller(&[0, 1, 2]),
            Err(Error::IllegalPatchPrecondition { row: 2, instruction: BLR })
        ));
        assert!(writes(&system).is_empty());
        assert_eq!(inspected(&system), [false, false, false]);

        assert!(actions.can_set_return_to_caller(&[0, 1]));
        assert_eq!(actions.set_return_to_caller(&[0, 1]).unwrap(), 2);
        assert_eq!(
            writes(&system),
            [(0x8000_1000, BLR_INSTRUCTION), (0x8000_2000, BLR_INSTRUCTION)]
        );
        assert_eq!(inspected(&system), [true, true, false]);
    }

    #[test]
    fn unrecognized_instruction_fails_lr_check() {
        let system = system_with(&[(0x8000_0000, 0x8000_1000, 0x7c08_02a7)]);
        let actions = PatchActions::new(&system);
        assert!(matches!(
            actions.set_return_to_caller(&[0]),
            Err(Error::IllegalPatchPrecondition { row: 0, .. })
        ));
    }

    #[test]
    fn symbol_start_requires_every_symbol() {
        let system = system_with(&[(0x8000_0010, 0x8000_1010, BL), (0x8000_0020, 0x9000_0000, BL)]);
        system
            .guard()
            .unwrap()
            .debug
            .add_symbol("callee", 0x8000_1000, 0x100);
        let actions = PatchActions::new(&system);

        assert!(actions.can_set_return_at_symbol_start(&[0], SymbolField::Destination));
        assert!(!actions.can_set_return_at_symbol_start(&[0, 1], SymbolField::Destination));
        assert!(!actions.can_set_return_at_symbol_start(&[0], SymbolField::Origin));
        assert!(matches!(
            actions.set_return_at_symbol_start(&[0, 1], SymbolField::Destination),
            Err(Error::UnresolvedSymbol { row: 1 })
        ));
        assert!(writes(&system).is_empty());

        actions
            .set_return_at_symbol_start(&[0], SymbolField::Destination)
            .unwrap();
        assert_eq!(writes(&system), [(0x8000_1000, BLR_INSTRUCTION)]);
        assert_eq!(inspected(&system), [true, false]);
    }

    #[test]
    fn invalid_rows_write_nothing() {
        let system = system_with(&[(0x8000_0000, 0x8000_1000, BL)]);
        let actions = PatchActions::new(&system);
        assert!(matches!(actions.set_nop(&[0, 7]), Err(Error::RowOutOfBounds(7))));
        assert!(writes(&system).is_empty());
    }

    #[test]
    fn write_failure_stops_the_batch() {
        let system = system_with(&[(0x8000_0000, 0x8000_1000, BL), (0x8000_0004, 0x8000_1000, BL)]);
        system.guard().unwrap().debug.read_only.push(0x8000_0004);
        let actions = PatchActions::new(&system);

        assert!(matches!(
            actions.set_nop(&[0, 1]),
            Err(Error::MemoryWrite(0x8000_0004))
        ));
        assert_eq!(writes(&system), [(0x8000_0000, NOP_INSTRUCTION)]);
        assert_eq!(inspected(&system), [true, false]);
    }

    #[test]
    fn copy_addresses_in_selection_order() {
        let system = system_with(&[
            (0x8000_0000, 0x8000_1020, BL),
            (0x0000_0004, 0x8000_1000, BL),
            (0x8000_0008, 0x8000_1010, BL),
        ]);
        let actions = PatchActions::new(&system);

        assert_eq!(
            actions.copy_addresses(&[1, 2, 0], AddressColumn::Destination).unwrap(),
            "80001000\n80001010\n80001020"
        );
        assert_eq!(
            actions.copy_addresses(&[1, 0], AddressColumn::Origin).unwrap(),
            "4\n80000000"
        );
        assert_eq!(actions.copy_addresses(&[], AddressColumn::Origin).unwrap(), "");
        assert!(writes(&system).is_empty());
    }

    #[test]
    fn delete_rows_without_running_core() {
        let system = system_with(&[(0x8000_0000, 0x8000_1000, BL), (0x8000_0004, 0x8000_1000, BL)]);
        system.set_state(ExecutionState::Uninitialized);
        PatchActions::new(&system).delete_rows(&[0]).unwrap();

        let guard = system.guard().unwrap();
        assert_eq!(guard.watch.row_count(), 1);
        assert_eq!(guard.watch.blacklist_size(), 1);
    }
}
