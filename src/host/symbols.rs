//! Symbol name cache.
//!
//! Resolving a name walks the emulator's symbol map, which is far slower than the filter
//! predicate. Names are therefore resolved once per address and reused across polls until
//! the symbol map changes and the cache is invalidated.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::trace;

use crate::{
    host::{CoreState, DebugInterface},
    watch::BranchWatch,
    Result,
};

/// Concurrent address to symbol name cache.
///
/// Cloning is cheap and clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct SymbolCache {
    names: Arc<DashMap<u32, Option<Arc<str>>>>,
}

impl SymbolCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Name of the symbol containing `address`, resolving and caching it on first use.
    ///
    /// Misses are cached too, so unknown addresses are not looked up again.
    pub fn resolve(&self, address: u32, debug: &dyn DebugInterface) -> Option<Arc<str>> {
        self.names
            .entry(address)
            .or_insert_with(|| debug.resolve_symbol_name(address).map(Arc::from))
            .clone()
    }

    /// Forget all cached names, e.g. after a new symbol map was loaded.
    pub fn invalidate(&self) {
        self.names.clear();
    }

    /// Number of cached addresses, including misses.
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Returns `true` if nothing has been cached yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Fill the symbol columns of every row of the watch.
    ///
    /// Returns the number of rows visited.
    ///
    /// # Errors
    /// Propagates row errors from the watch, which only happen if the row count changes
    /// while the guard is not held.
    pub fn apply<W: BranchWatch, D: DebugInterface>(
        &self,
        core: &mut CoreState<W, D>,
    ) -> Result<usize> {
        let CoreState { watch, debug } = core;
        let rows = watch.row_count();

        for row in 0..rows {
            let Some(record) = watch.row(row) else {
                continue;
            };
            let origin = self.resolve(record.key.origin_address, &*debug);
            let destination = self.resolve(record.key.destination_address, &*debug);
            watch.set_symbols(
                row,
                origin.as_deref().map(str::to_owned),
                destination.as_deref().map(str::to_owned),
            )?;
        }

        trace!(rows, cached = self.len(), "updated symbol columns");
        Ok(rows)
    }
}
