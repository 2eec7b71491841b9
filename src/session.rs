//! The branch watch session controller.
//!
//! A [`WatchSession`] is everything a front end needs besides drawing: it drives the
//! blacklist/reduction lifecycle, decides when the candidate view has to be polled,
//! persists snapshots, keeps the symbol columns filled, and renders the status line.
//! It owns the [`FilterEngine`] for the candidate table and hands out
//! [`PatchActions`] for context menu actions.
//!
//! # Examples
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use branchwatch::{host::EmulatedSystem, session::WatchSession, watch::CandidateStore, WatchConfig};
//!
//! let system = Arc::new(EmulatedSystem::new(CandidateStore::new(), debugger));
//! let mut session = WatchSession::new(Arc::clone(&system), WatchConfig::default());
//!
//! session.start_pause(true)?;
//! // ... play until the behavior of interest happened ...
//! session.code_path_was_taken()?;
//! println!("{}", session.status()?);
//! ```

use std::{
    fs::{self, File},
    io::{BufReader, BufWriter, Write},
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use tracing::{debug, info, warn};

use crate::{
    config::WatchConfig,
    filter::FilterEngine,
    host::{CoreState, DebugInterface, EmulatedSystem, ExecutionState, SymbolCache},
    patch::PatchActions,
    watch::{BranchWatch, Phase, Reduction},
    Error, Result,
};

/// When the front end should next poll the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollSchedule {
    /// No polling
    Stopped,
    /// Poll at this interval until told otherwise
    Repeating(Duration),
    /// Poll once after this delay, then stop
    Once(Duration),
}

/// Controller for one branch watch over an emulated system.
pub struct WatchSession<W, D> {
    system: Arc<EmulatedSystem<W, D>>,
    config: WatchConfig,
    filter: FilterEngine,
    symbols: SymbolCache,
    schedule: PollSchedule,
}

impl<W: BranchWatch + Sync, D: DebugInterface> WatchSession<W, D> {
    /// Create a session over `system`.
    pub fn new(system: Arc<EmulatedSystem<W, D>>, config: WatchConfig) -> Self {
        let filter = FilterEngine::new().with_parallel_threshold(config.parallel_filter_threshold);
        WatchSession {
            system,
            config,
            filter,
            symbols: SymbolCache::new(),
            schedule: PollSchedule::Stopped,
        }
    }

    /// The emulated system this session watches.
    pub fn system(&self) -> &Arc<EmulatedSystem<W, D>> {
        &self.system
    }

    /// The session configuration.
    pub fn config(&self) -> &WatchConfig {
        &self.config
    }

    /// Mutable access to the session configuration, e.g. to toggle auto-saving.
    pub fn config_mut(&mut self) -> &mut WatchConfig {
        &mut self.config
    }

    /// The filter of the candidate table.
    pub fn filter(&self) -> &FilterEngine {
        &self.filter
    }

    /// Mutable access to the filter of the candidate table.
    pub fn filter_mut(&mut self) -> &mut FilterEngine {
        &mut self.filter
    }

    /// Patch and context menu actions on the watched candidates.
    pub fn patch_actions(&self) -> PatchActions<'_, W, D> {
        PatchActions::new(&self.system)
    }

    /// The symbol name cache used by [`WatchSession::update_symbols`].
    pub fn symbols(&self) -> &SymbolCache {
        &self.symbols
    }

    /// Start or pause recording, then bring the view up to date.
    ///
    /// Pausing while the core executes schedules one last poll, so a hit that was being
    /// recorded at that moment still shows up.
    ///
    /// # Errors
    /// Returns [`Error::LockError`] if the guard cannot be acquired.
    pub fn start_pause(&mut self, start: bool) -> Result<()> {
        let state = self.system.state();
        {
            let mut guard = self.system.guard()?;
            if start {
                guard.watch.start();
            } else {
                guard.watch.pause();
            }
            self.filter.refresh(&guard.watch);
        }

        self.schedule = match (start, state > ExecutionState::Paused) {
            (true, true) => PollSchedule::Repeating(self.config.poll_interval),
            (false, true) => PollSchedule::Once(self.config.pause_oneshot),
            (_, false) => PollSchedule::Stopped,
        };
        debug!(recording = start, %state, schedule = ?self.schedule, "branch watch toggled");
        Ok(())
    }

    /// Whether the candidate view changes on its own right now: recording is active and
    /// the core is executing.
    ///
    /// # Errors
    /// Returns [`Error::LockError`] if the guard cannot be acquired.
    pub fn should_poll(&self) -> Result<bool> {
        let recording = self.system.guard()?.watch.is_recording();
        Ok(recording && self.system.state() > ExecutionState::Paused)
    }

    /// The current polling schedule.
    pub fn poll_schedule(&self) -> PollSchedule {
        self.schedule
    }

    /// React to a change of the emulator's execution state.
    ///
    /// # Errors
    /// Returns [`Error::LockError`] if the guard cannot be acquired.
    pub fn on_state_changed(&mut self, state: ExecutionState) -> Result<PollSchedule> {
        self.system.set_state(state);
        self.schedule = if self.should_poll()? {
            PollSchedule::Repeating(self.config.poll_interval)
        } else {
            PollSchedule::Stopped
        };
        self.poll()?;
        Ok(self.schedule)
    }

    /// One timer tick: bring the filtered view up to date.
    ///
    /// Returns whether the view was recomputed.
    ///
    /// # Errors
    /// Returns [`Error::LockError`] if the guard cannot be acquired.
    pub fn poll(&mut self) -> Result<bool> {
        if let PollSchedule::Once(_) = self.schedule {
            self.schedule = PollSchedule::Stopped;
        }
        let guard = self.system.guard()?;
        Ok(self.filter.refresh(&guard.watch))
    }

    /// Visible rows of the candidate table, filtered and sorted.
    ///
    /// # Errors
    /// Returns [`Error::LockError`] if the guard cannot be acquired.
    pub fn visible_rows(&mut self) -> Result<Vec<usize>> {
        let guard = self.system.guard()?;
        Ok(self.filter.visible_rows(&guard.watch).to_vec())
    }

    /// Discard all candidates and return to the blacklist phase.
    ///
    /// # Errors
    /// Returns [`Error::LockError`], or an I/O error from the auto-save.
    pub fn clear(&mut self) -> Result<()> {
        let mut guard = self.system.guard()?;
        guard.watch.clear();
        self.autosave(&guard)
    }

    /// Keep candidates that were hit since the last step. The first time, this ends the
    /// blacklist phase.
    ///
    /// # Errors
    /// Returns [`Error::LockError`], or an I/O error from the auto-save.
    pub fn code_path_was_taken(&mut self) -> Result<()> {
        self.reduce(Reduction::CodePathWasTaken)
    }

    /// Keep candidates that were not hit since the last step.
    ///
    /// # Errors
    /// Returns [`Error::LockError`], or an I/O error from the auto-save.
    pub fn code_path_not_taken(&mut self) -> Result<()> {
        self.reduce(Reduction::CodePathNotTaken)
    }

    /// Keep candidates whose branch instruction was overwritten in memory.
    ///
    /// # Errors
    /// Returns [`Error::UninitializedExecutionContext`] if memory cannot be read, or
    /// [`Error::LockError`], or an I/O error from the auto-save.
    pub fn branch_was_overwritten(&mut self) -> Result<()> {
        self.reduce(Reduction::BranchWasOverwritten)
    }

    /// Keep candidates whose branch instruction is still in memory.
    ///
    /// # Errors
    /// Returns [`Error::UninitializedExecutionContext`] if memory cannot be read, or
    /// [`Error::LockError`], or an I/O error from the auto-save.
    pub fn branch_not_overwritten(&mut self) -> Result<()> {
        self.reduce(Reduction::BranchNotOverwritten)
    }

    fn reduce(&mut self, action: Reduction) -> Result<()> {
        if action.reads_memory() && !self.system.state().is_initialized() {
            warn!(%action, "core is uninitialized");
            return Err(Error::UninitializedExecutionContext);
        }

        let mut guard = self.system.guard()?;
        let CoreState { watch, debug } = &mut *guard;
        watch.reduce(action, &*debug);
        self.autosave(&guard)
    }

    /// Whether recent hits can be wiped, which is the case in the reduction phase.
    ///
    /// # Errors
    /// Returns [`Error::LockError`] if the guard cannot be acquired.
    pub fn can_wipe_recent_hits(&self) -> Result<bool> {
        Ok(self.system.guard()?.watch.phase() == Phase::Reduction)
    }

    /// Reset the recent hit counters. Only has an effect in the reduction phase.
    ///
    /// Returns whether anything was wiped.
    ///
    /// # Errors
    /// Returns [`Error::LockError`] if the guard cannot be acquired.
    pub fn wipe_recent_hits(&mut self) -> Result<bool> {
        let mut guard = self.system.guard()?;
        if guard.watch.phase() != Phase::Reduction {
            return Ok(false);
        }
        guard.watch.wipe_recent_hits();
        Ok(true)
    }

    /// Clear every inspected mark.
    ///
    /// # Errors
    /// Returns [`Error::LockError`] if the guard cannot be acquired.
    pub fn wipe_inspection(&mut self) -> Result<()> {
        self.system.guard()?.watch.wipe_inspection();
        Ok(())
    }

    /// Fill the symbol columns of every row, resolving new addresses.
    ///
    /// # Errors
    /// Returns [`Error::LockError`] if the guard cannot be acquired.
    pub fn update_symbols(&mut self) -> Result<usize> {
        let mut guard = self.system.guard()?;
        self.symbols.apply(&mut *guard)
    }

    /// Forget cached symbol names, after the emulator loaded a new symbol map.
    pub fn invalidate_symbols(&mut self) {
        self.symbols.invalidate();
    }

    /// Save a snapshot to the default per-game location.
    ///
    /// # Errors
    /// Returns [`Error::NothingToPersist`] if there are no candidates, or an I/O error.
    pub fn save(&self) -> Result<PathBuf> {
        let path = self.config.default_snapshot_path();
        self.save_as(&path)?;
        Ok(path)
    }

    /// Save a snapshot to `path`.
    ///
    /// # Errors
    /// Returns [`Error::NothingToPersist`] if there are no candidates, or an I/O error.
    pub fn save_as(&self, path: &Path) -> Result<()> {
        let guard = self.system.guard()?;
        if !guard.watch.can_persist() {
            return Err(Error::NothingToPersist);
        }
        write_snapshot(&guard.watch, path)
    }

    /// Load the snapshot from the default per-game location.
    ///
    /// # Errors
    /// Returns an I/O error if the file cannot be opened, or [`Error::Malformed`].
    pub fn load(&mut self) -> Result<()> {
        let path = self.config.default_snapshot_path();
        self.load_from(&path)
    }

    /// Replace the candidates with the snapshot at `path`.
    ///
    /// # Errors
    /// Returns an I/O error if the file cannot be opened, or [`Error::Malformed`]. The
    /// candidates are unchanged on error.
    pub fn load_from(&mut self, path: &Path) -> Result<()> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);
        self.system.guard()?.watch.load(&mut reader)?;
        info!(path = %path.display(), "loaded branch watch snapshot");
        Ok(())
    }

    fn autosave(&self, core: &CoreState<W, D>) -> Result<()> {
        if !self.config.autosave || !core.watch.can_persist() {
            return Ok(());
        }
        write_snapshot(&core.watch, &self.config.autosave_target())
    }

    /// The status line.
    ///
    /// - blacklist phase: `Candidates: N`, or with exclusions
    ///   `Candidates: N | Excluded: B | Remaining: R`
    /// - reduction phase: `Zero candidates remaining.` once the selection is empty,
    ///   otherwise `Candidates: S | Filtered: F | Remaining: V` where `V` is the
    ///   number of rows passing the filter
    ///
    /// # Errors
    /// Returns [`Error::LockError`] if the guard cannot be acquired.
    pub fn status(&mut self) -> Result<String> {
        let guard = self.system.guard()?;
        let watch = &guard.watch;

        let status = match watch.phase() {
            Phase::Blacklist => {
                let candidates = watch.collection_size();
                let excluded = watch.blacklist_size();
                if excluded == 0 {
                    format!("Candidates: {candidates}")
                } else {
                    format!(
                        "Candidates: {candidates} | Excluded: {excluded} | Remaining: {}",
                        candidates.saturating_sub(excluded)
                    )
                }
            }
            Phase::Reduction => {
                let candidates = watch.row_count();
                if candidates == 0 {
                    "Zero candidates remaining.".to_owned()
                } else {
                    let remaining = self.filter.count_visible(watch);
                    format!(
                        "Candidates: {candidates} | Filtered: {} | Remaining: {remaining}",
                        candidates.saturating_sub(remaining)
                    )
                }
            }
        };
        Ok(status)
    }
}

fn write_snapshot<W: BranchWatch + ?Sized>(watch: &W, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut writer = BufWriter::new(File::create(path)?);
    watch.save(&mut writer)?;
    writer.flush()?;
    debug!(path = %path.display(), "saved branch watch snapshot");
    Ok(())
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;
    use crate::{
        filter::AddressBound,
        test::{key, MockMemory},
        watch::CandidateStore,
    };

    type Session = WatchSession<CandidateStore, MockMemory>;

    fn session(config: WatchConfig) -> Session {
        let system = Arc::new(EmulatedSystem::new(CandidateStore::new(), MockMemory::default()));
        system.set_state(ExecutionState::Running);
        WatchSession::new(system, config)
    }

    fn hit(session: &Session, origin: u32) {
        session.system().guard().unwrap().watch.record_hit(key(origin), true);
    }

    #[test]
    fn poll_schedule_follows_recording_and_state() {
        let mut session = session(WatchConfig::default());
        assert_eq!(session.poll_schedule(), PollSchedule::Stopped);

        session.start_pause(true).unwrap();
        assert!(session.should_poll().unwrap());
        assert_eq!(
            session.poll_schedule(),
            PollSchedule::Repeating(Duration::from_millis(100))
        );

        session.start_pause(false).unwrap();
        assert!(!session.should_poll().unwrap());
        assert_eq!(session.poll_schedule(), PollSchedule::Once(Duration::from_millis(200)));
        session.poll().unwrap();
        assert_eq!(session.poll_schedule(), PollSchedule::Stopped);

        session.start_pause(true).unwrap();
        assert_eq!(
            session.on_state_changed(ExecutionState::Paused).unwrap(),
            PollSchedule::Stopped
        );
        assert_eq!(
            session.on_state_changed(ExecutionState::Running).unwrap(),
            PollSchedule::Repeating(Duration::from_millis(100))
        );
    }

    #[test]
    fn start_pause_refreshes_the_view() {
        let mut session = session(WatchConfig::default());
        session.start_pause(true).unwrap();
        hit(&session, 0x8000_0000);
        hit(&session, 0x8000_0004);
        {
            let guard = session.system().guard().unwrap();
            assert!(session.filter().is_stale(&guard.watch));
        }

        session.start_pause(false).unwrap();
        {
            let guard = session.system().guard().unwrap();
            assert!(!session.filter().is_stale(&guard.watch));
        }
        assert_eq!(session.poll_schedule(), PollSchedule::Once(Duration::from_millis(200)));
    }

    #[test]
    fn status_lines() {
        let mut session = session(WatchConfig::default());
        session.start_pause(true).unwrap();
        for origin in [0x8000_0000, 0x8000_0004, 0x8000_0008, 0x8000_000c] {
            hit(&session, origin);
        }
        assert_eq!(session.status().unwrap(), "Candidates: 4");

        session.patch_actions().delete_rows(&[0]).unwrap();
        assert_eq!(
            session.status().unwrap(),
            "Candidates: 4 | Excluded: 1 | Remaining: 3"
        );

        session.code_path_was_taken().unwrap();
        session
            .filter_mut()
            .set_address_bound(AddressBound::OriginMin, "80000008");
        assert_eq!(
            session.status().unwrap(),
            "Candidates: 3 | Filtered: 1 | Remaining: 2"
        );

        session.code_path_was_taken().unwrap();
        assert_eq!(session.status().unwrap(), "Zero candidates remaining.");
    }

    #[test]
    fn overwrite_steps_need_initialized_core() {
        let mut session = session(WatchConfig::default());
        session.system().set_state(ExecutionState::Uninitialized);
        assert!(matches!(
            session.branch_was_overwritten(),
            Err(Error::UninitializedExecutionContext)
        ));
        assert!(matches!(
            session.branch_not_overwritten(),
            Err(Error::UninitializedExecutionContext)
        ));
        session.code_path_not_taken().unwrap();
    }

    #[test]
    fn wipe_recent_hits_only_in_reduction() {
        let mut session = session(WatchConfig::default());
        session.start_pause(true).unwrap();
        hit(&session, 0x8000_0000);

        assert!(!session.can_wipe_recent_hits().unwrap());
        assert!(!session.wipe_recent_hits().unwrap());
        assert_eq!(session.system().guard().unwrap().watch.row(0).unwrap().hits_recent, 1);

        session.code_path_was_taken().unwrap();
        assert!(session.can_wipe_recent_hits().unwrap());
        assert!(session.wipe_recent_hits().unwrap());
        assert_eq!(session.system().guard().unwrap().watch.row(0).unwrap().hits_recent, 0);

        session.clear().unwrap();
        assert!(!session.can_wipe_recent_hits().unwrap());
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = tempdir().unwrap();
        let mut session = session(
            WatchConfig::default()
                .with_snapshot_dir(dir.path())
                .with_game_id("GALE01"),
        );
        assert!(matches!(session.save(), Err(Error::NothingToPersist)));

        session.start_pause(true).unwrap();
        hit(&session, 0x8000_0000);
        hit(&session, 0x8000_0004);
        session.code_path_was_taken().unwrap();
        let path = session.save().unwrap();
        assert_eq!(path, dir.path().join("GALE01.txt"));

        session.clear().unwrap();
        session.load().unwrap();
        {
            let guard = session.system().guard().unwrap();
            assert_eq!(guard.watch.phase(), Phase::Reduction);
            assert_eq!(guard.watch.row_count(), 2);
        }

        assert!(matches!(
            session.load_from(&dir.path().join("missing.txt")),
            Err(Error::FileError(_))
        ));
    }

    #[test]
    fn autosave_after_lifecycle_steps() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("auto").join("snapshot.txt");
        let mut session = session(
            WatchConfig::default()
                .with_autosave(true)
                .with_autosave_path(&target),
        );
        session.start_pause(true).unwrap();

        // Nothing to persist, nothing written
        session.code_path_not_taken().unwrap();
        assert!(!target.exists());

        hit(&session, 0x8000_0000);
        session.code_path_was_taken().unwrap();
        let text = fs::read_to_string(&target).unwrap();
        assert!(text.contains("phase reduction"));
    }

    #[test]
    fn update_symbols_fills_rows() {
        let mut session = session(WatchConfig::default());
        session
            .system()
            .guard()
            .unwrap()
            .debug
            .add_symbol("main", 0x8000_0000, 0x100);
        session.start_pause(true).unwrap();
        hit(&session, 0x8000_0010);

        assert_eq!(session.update_symbols().unwrap(), 1);
        let guard = session.system().guard().unwrap();
        assert_eq!(guard.watch.row(0).unwrap().origin_symbol.as_deref(), Some("main"));
    }
}
