//! The cached, sorted filtered view over the current rows.

use std::cmp::Ordering;

use rayon::prelude::*;
use strum::{Display, EnumCount, EnumIter};
use tracing::{trace, warn};

use crate::{
    config::DEFAULT_PARALLEL_FILTER_THRESHOLD,
    filter::{AddressBound, FilterConfig, SymbolField},
    instruction::BranchKind,
    watch::{BranchWatch, CandidateRecord},
};

/// A column of the candidate table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumIter, EnumCount)]
pub enum Column {
    /// Raw instruction encoding
    Instruction,
    /// Last condition result
    Condition,
    /// Origin address
    #[default]
    Origin,
    /// Destination address
    Destination,
    /// Hits since the last reduction step or wipe
    #[strum(serialize = "Recent Hits")]
    RecentHits,
    /// Hits since the candidate was collected
    #[strum(serialize = "Total Hits")]
    TotalHits,
    /// Symbol containing the origin
    #[strum(serialize = "Origin Symbol")]
    OriginSymbol,
    /// Symbol containing the destination
    #[strum(serialize = "Destination Symbol")]
    DestinationSymbol,
}

impl Column {
    /// Order two records by this column.
    #[must_use]
    pub fn compare(self, lhs: &CandidateRecord, rhs: &CandidateRecord) -> Ordering {
        match self {
            Column::Instruction => lhs.key.raw_instruction.cmp(&rhs.key.raw_instruction),
            Column::Condition => lhs.condition_taken.cmp(&rhs.condition_taken),
            Column::Origin => lhs.key.origin_address.cmp(&rhs.key.origin_address),
            Column::Destination => lhs.key.destination_address.cmp(&rhs.key.destination_address),
            Column::RecentHits => lhs.hits_recent.cmp(&rhs.hits_recent),
            Column::TotalHits => lhs.hits_total.cmp(&rhs.hits_total),
            Column::OriginSymbol => lhs.origin_symbol.cmp(&rhs.origin_symbol),
            Column::DestinationSymbol => lhs.destination_symbol.cmp(&rhs.destination_symbol),
        }
    }
}

/// Column and direction of the visible rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SortOrder {
    /// Sort key
    pub column: Column,
    /// Direction
    pub ascending: bool,
}

impl Default for SortOrder {
    fn default() -> Self {
        SortOrder {
            column: Column::Origin,
            ascending: true,
        }
    }
}

/// Filtered and sorted projection of a [`BranchWatch`]'s rows.
///
/// The engine caches the visible row indices and recomputes them lazily: whenever the
/// configuration or sort order changes, and whenever the watch reports a new revision.
/// Visible rows are indices into the watch's current rows, so they stay meaningful to
/// the patch actions and to [`BranchWatch::delete_rows`].
///
/// # Examples
///
/// ```rust
/// use branchwatch::filter::FilterEngine;
/// use branchwatch::instruction::BranchKind;
/// use branchwatch::watch::{BranchWatch, CandidateKey, CandidateStore};
///
/// let mut store = CandidateStore::new();
/// store.start();
/// store.record_hit(CandidateKey::new(0x8000_0000, 0x8000_1000, 0x4800_1001), true); // bl
/// store.record_hit(CandidateKey::new(0x8000_0004, 0x8000_0100, 0x4800_00fc), true); // b
///
/// let mut engine = FilterEngine::new();
/// engine.set_branch_kind(BranchKind::B, false);
/// assert_eq!(engine.visible_rows(&store), &[0]);
/// ```
#[derive(Debug, Clone)]
pub struct FilterEngine {
    config: FilterConfig,
    sort: SortOrder,
    visible: Vec<usize>,
    seen_revision: Option<u64>,
    stale: bool,
    parallel_threshold: usize,
}

impl Default for FilterEngine {
    fn default() -> Self {
        FilterEngine {
            config: FilterConfig::default(),
            sort: SortOrder::default(),
            visible: Vec::new(),
            seen_revision: None,
            stale: true,
            parallel_threshold: DEFAULT_PARALLEL_FILTER_THRESHOLD,
        }
    }
}

impl FilterEngine {
    /// Create an engine that shows every recognized branch sorted by origin.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluate rows on the rayon pool once there are at least `rows` of them.
    #[must_use]
    pub fn with_parallel_threshold(mut self, rows: usize) -> Self {
        self.parallel_threshold = rows;
        self
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    /// Replace the configuration, e.g. with one cloned earlier.
    pub fn restore(&mut self, config: FilterConfig) {
        if self.config != config {
            self.config = config;
            self.invalidate();
        }
    }

    /// See [`FilterConfig::matches`].
    #[must_use]
    pub fn matches(&self, record: &CandidateRecord) -> bool {
        self.config.matches(record)
    }

    /// See [`FilterConfig::set_branch_kind`].
    pub fn set_branch_kind(&mut self, kind: BranchKind, enabled: bool) {
        self.config.set_branch_kind(kind, enabled);
        self.invalidate();
    }

    /// See [`FilterConfig::set_condition`].
    pub fn set_condition(&mut self, condition: bool, enabled: bool) {
        self.config.set_condition(condition, enabled);
        self.invalidate();
    }

    /// See [`FilterConfig::set_address_bound`].
    pub fn set_address_bound(&mut self, bound: AddressBound, text: &str) {
        self.config.set_address_bound(bound, text);
        self.invalidate();
    }

    /// See [`FilterConfig::set_address_bound_value`].
    pub fn set_address_bound_value(&mut self, bound: AddressBound, value: Option<u32>) {
        self.config.set_address_bound_value(bound, value);
        self.invalidate();
    }

    /// See [`FilterConfig::set_symbol_pattern`].
    pub fn set_symbol_pattern(&mut self, field: SymbolField, text: &str) {
        self.config.set_symbol_pattern(field, text);
        self.invalidate();
    }

    /// The current sort order.
    #[must_use]
    pub fn sort_order(&self) -> SortOrder {
        self.sort
    }

    /// Change the sort order of the visible rows.
    pub fn set_sort_order(&mut self, order: SortOrder) {
        if self.sort != order {
            self.sort = order;
            self.invalidate();
        }
    }

    /// Force a recomputation on the next access.
    pub fn invalidate(&mut self) {
        self.stale = true;
    }

    /// `true` if the next access recomputes the visible rows for `watch`.
    #[must_use]
    pub fn is_stale<W: BranchWatch + ?Sized>(&self, watch: &W) -> bool {
        self.stale || self.seen_revision != Some(watch.revision())
    }

    /// Recompute the visible rows if needed. Returns whether anything was recomputed.
    pub fn refresh<W: BranchWatch + Sync + ?Sized>(&mut self, watch: &W) -> bool {
        if !self.is_stale(watch) {
            return false;
        }

        let row_count = watch.row_count();
        let config = &self.config;
        let keep = |&row: &usize| watch.row(row).is_some_and(|record| config.matches(record));

        let mut visible: Vec<usize> = if row_count >= self.parallel_threshold {
            (0..row_count).into_par_iter().filter(keep).collect()
        } else {
            (0..row_count).filter(keep).collect()
        };

        if let Some(record) = (0..row_count)
            .filter_map(|row| watch.row(row))
            .find(|record| record.branch_kind().is_none())
        {
            warn!(
                "excluding {:08x}: {:08x} is not a branch instruction",
                record.key.origin_address, record.key.raw_instruction
            );
        }

        let SortOrder { column, ascending } = self.sort;
        visible.sort_by(|&a, &b| {
            let ordering = match (watch.row(a), watch.row(b)) {
                (Some(lhs), Some(rhs)) => column.compare(lhs, rhs),
                _ => Ordering::Equal,
            };
            let ordering = if ascending { ordering } else { ordering.reverse() };
            ordering.then(a.cmp(&b))
        });

        trace!(
            rows = row_count,
            visible = visible.len(),
            %column,
            ascending,
            "refreshed branch watch filter"
        );

        self.visible = visible;
        self.seen_revision = Some(watch.revision());
        self.stale = false;
        true
    }

    /// The visible rows of `watch`, filtered and sorted.
    pub fn visible_rows<W: BranchWatch + Sync + ?Sized>(&mut self, watch: &W) -> &[usize] {
        self.refresh(watch);
        &self.visible
    }

    /// Number of rows of `watch` passing the filter.
    pub fn count_visible<W: BranchWatch + Sync + ?Sized>(&mut self, watch: &W) -> usize {
        self.visible_rows(watch).len()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use strum::IntoEnumIterator;

    use super::*;
    use crate::{
        test::{MockMemory, B, BEQ, BL, BLR, MFLR},
        watch::{CandidateKey, CandidateStore, Reduction},
    };

    fn store_with(keys: &[(u32, u32, u32, bool)]) -> CandidateStore {
        let mut store = CandidateStore::new();
        store.start();
        for &(origin, destination, instruction, condition) in keys {
            store.record_hit(CandidateKey::new(origin, destination, instruction), condition);
        }
        store
    }

    fn sample() -> CandidateStore {
        store_with(&[
            (0x8000_0020, 0x8000_1000, BL, true),
            (0x8000_0000, 0x8000_3000, B, true),
            (0x8000_0010, 0x8000_2000, BEQ, false),
            (0x8000_0030, 0x8000_0000, BLR, true),
        ])
    }

    #[test]
    fn default_sort_is_origin_ascending() {
        let store = sample();
        let mut engine = FilterEngine::new();
        assert_eq!(engine.visible_rows(&store), &[1, 2, 0, 3]);
        assert_eq!(engine.count_visible(&store), 4);
    }

    #[test]
    fn filter_toggles_shrink_and_restore() {
        let store = sample();
        let mut engine = FilterEngine::new();
        let saved = engine.config().clone();

        engine.set_condition(false, false);
        assert_eq!(engine.visible_rows(&store), &[1, 0, 3]);

        engine.set_branch_kind(BranchKind::Blr, false);
        assert_eq!(engine.visible_rows(&store), &[1, 0]);

        engine.set_address_bound(AddressBound::DestinationMin, "80002000");
        assert_eq!(engine.visible_rows(&store), &[1]);

        engine.restore(saved);
        assert_eq!(engine.count_visible(&store), 4);
    }

    #[test]
    fn descending_sort_keeps_ties_in_row_order() {
        let store = store_with(&[
            (0x8000_0000, 0x8000_1000, BL, true),
            (0x8000_0004, 0x8000_1000, BL, true),
            (0x8000_0008, 0x8000_2000, BL, true),
        ]);
        let mut engine = FilterEngine::new();
        engine.set_sort_order(SortOrder {
            column: Column::Destination,
            ascending: false,
        });
        assert_eq!(engine.visible_rows(&store), &[2, 0, 1]);

        engine.set_sort_order(SortOrder {
            column: Column::Destination,
            ascending: true,
        });
        assert_eq!(engine.visible_rows(&store), &[0, 1, 2]);
    }

    #[test]
    fn hits_invalidate_the_cache() {
        let mut store = sample();
        let mut engine = FilterEngine::new();
        engine.set_sort_order(SortOrder {
            column: Column::TotalHits,
            ascending: false,
        });
        assert!(engine.refresh(&store));
        assert!(!engine.refresh(&store));

        store.record_hit(CandidateKey::new(0x8000_0030, 0x8000_0000, BLR), true);
        assert!(engine.is_stale(&store));
        assert_eq!(engine.visible_rows(&store)[0], 3);
    }

    #[test]
    fn refresh_is_pure_and_idempotent() {
        let store = sample();
        let revision = store.revision();
        let mut engine = FilterEngine::new();
        engine.set_condition(true, false);

        let first = engine.visible_rows(&store).to_vec();
        engine.invalidate();
        let second = engine.visible_rows(&store).to_vec();
        assert_eq!(first, second);
        assert_eq!(store.revision(), revision);
        assert_eq!(store.row_count(), 4);
    }

    #[test]
    fn same_bound_twice_matches_once() {
        let store = sample();
        let mut once = FilterEngine::new();
        once.set_address_bound(AddressBound::OriginMin, "80000010");
        let mut twice = FilterEngine::new();
        twice.set_address_bound(AddressBound::OriginMin, "80000010");
        let first = twice.visible_rows(&store).to_vec();
        twice.set_address_bound(AddressBound::OriginMin, "80000010");

        assert_eq!(twice.config(), once.config());
        assert_eq!(twice.visible_rows(&store), first.as_slice());
        assert_eq!(twice.visible_rows(&store), once.visible_rows(&store));
        assert_eq!(first, [2, 0, 3]);
    }

    #[test]
    fn refreshes_after_snapshot_load() {
        let mut store = store_with(&[(0x8000_0000, 0x8000_1000, BL, true)]);
        let mut engine = FilterEngine::new();
        assert_eq!(engine.count_visible(&store), 1);

        let text = "branchwatch 1\nphase blacklist\n\
                    80000000 80001000 48000001 1 1 0 1 0 c\n\
                    80000004 80001004 48000001 1 1 0 1 0 c\n\
                    80000008 80001008 48000001 1 1 0 1 0 c\n";
        store.load(&mut Cursor::new(text)).unwrap();
        assert!(engine.is_stale(&store));
        assert_eq!(engine.count_visible(&store), 3);
    }

    #[test]
    fn refresh_skips_non_branches() {
        let store = store_with(&[
            (0x8000_0000, 0x8000_1000, BL, true),
            (0x8000_0004, 0x8000_0008, MFLR, true),
        ]);
        let mut engine = FilterEngine::new();
        assert_eq!(engine.visible_rows(&store), &[0]);
    }

    #[test]
    fn parallel_and_serial_agree() {
        let keys = (0..512u32)
            .map(|i| {
                let instruction = if i % 3 == 0 { B } else { BL };
                (0x8000_0000 + i * 4, 0x8010_0000 - i * 8, instruction, i % 2 == 0)
            })
            .collect::<Vec<_>>();
        let store = store_with(&keys);

        for column in Column::iter() {
            let order = SortOrder {
                column,
                ascending: false,
            };
            let mut serial = FilterEngine::new().with_parallel_threshold(usize::MAX);
            let mut parallel = FilterEngine::new().with_parallel_threshold(0);
            for engine in [&mut serial, &mut parallel] {
                engine.set_branch_kind(BranchKind::B, false);
                engine.set_sort_order(order);
            }
            assert_eq!(serial.visible_rows(&store), parallel.visible_rows(&store), "{column}");
        }
    }

    #[test]
    fn follows_the_selection_after_reduction() {
        let mut store = sample();
        let memory = MockMemory::default();
        let mut engine = FilterEngine::new();
        assert_eq!(engine.count_visible(&store), 4);

        store.reduce(Reduction::CodePathWasTaken, &memory);
        store.record_hit(CandidateKey::new(0x8000_0000, 0x8000_3000, B), true);
        store.reduce(Reduction::CodePathWasTaken, &memory);
        assert_eq!(engine.visible_rows(&store), &[0]);
        assert_eq!(store.row(0).unwrap().key.origin_address, 0x8000_0000);
    }

    #[test]
    fn column_names() {
        assert_eq!(Column::COUNT, 8);
        assert_eq!(Column::RecentHits.to_string(), "Recent Hits");
        assert_eq!(Column::default(), Column::Origin);
    }
}
