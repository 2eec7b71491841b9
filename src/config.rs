//! Configuration for a branch watch session.
//!
//! This module provides the knobs of the session controller: polling cadence, snapshot
//! locations and auto-saving, and the size above which filtering runs in parallel. The
//! filter configuration itself lives in [`crate::filter::FilterConfig`] and is never
//! persisted.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

/// Default interval between two refreshes while recording.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Default delay of the one final refresh after recording was paused.
pub const DEFAULT_PAUSE_ONESHOT: Duration = Duration::from_millis(200);

/// Default row count above which the filter engine evaluates rows in parallel.
pub const DEFAULT_PARALLEL_FILTER_THRESHOLD: usize = 4096;

/// Configuration for a branch watch session.
///
/// # Examples
///
/// ```rust
/// use branchwatch::WatchConfig;
/// use std::time::Duration;
///
/// let config = WatchConfig::default()
///     .with_snapshot_dir("/tmp/branchwatch")
///     .with_game_id("GALE01")
///     .with_autosave(true);
///
/// assert_eq!(config.poll_interval, Duration::from_millis(100));
/// assert!(config.default_snapshot_path().ends_with("GALE01.txt"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchConfig {
    /// Interval between two refreshes while recording (default: 100ms).
    pub poll_interval: Duration,

    /// Delay of the final refresh scheduled after pausing (default: 200ms).
    ///
    /// Gives a hit that was in flight when recording paused a chance to show up.
    pub pause_oneshot: Duration,

    /// Save a snapshot after every lifecycle step (default: false).
    pub autosave: bool,

    /// Where auto-saves go. Falls back to [`WatchConfig::default_snapshot_path`].
    pub autosave_path: Option<PathBuf>,

    /// Directory holding per-game snapshots.
    pub snapshot_dir: PathBuf,

    /// Identifier of the running game, used to name the default snapshot.
    pub game_id: String,

    /// Row count above which filtering runs on the rayon pool (default: 4096).
    pub parallel_filter_threshold: usize,
}

impl Default for WatchConfig {
    fn default() -> Self {
        WatchConfig {
            poll_interval: DEFAULT_POLL_INTERVAL,
            pause_oneshot: DEFAULT_PAUSE_ONESHOT,
            autosave: false,
            autosave_path: None,
            snapshot_dir: PathBuf::from("BranchWatch"),
            game_id: String::new(),
            parallel_filter_threshold: DEFAULT_PARALLEL_FILTER_THRESHOLD,
        }
    }
}

impl WatchConfig {
    /// Set the refresh interval.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Enable or disable auto-saving.
    #[must_use]
    pub fn with_autosave(mut self, enabled: bool) -> Self {
        self.autosave = enabled;
        self
    }

    /// Auto-save to a specific file instead of the default snapshot path.
    #[must_use]
    pub fn with_autosave_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.autosave_path = Some(path.into());
        self
    }

    /// Set the snapshot directory.
    #[must_use]
    pub fn with_snapshot_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.snapshot_dir = dir.into();
        self
    }

    /// Set the game identifier.
    #[must_use]
    pub fn with_game_id(mut self, game_id: impl Into<String>) -> Self {
        self.game_id = game_id.into();
        self
    }

    /// Set the parallel filtering threshold.
    #[must_use]
    pub fn with_parallel_filter_threshold(mut self, rows: usize) -> Self {
        self.parallel_filter_threshold = rows;
        self
    }

    /// `<snapshot_dir>/<game_id>.txt`
    #[must_use]
    pub fn default_snapshot_path(&self) -> PathBuf {
        self.snapshot_dir.join(format!("{}.txt", self.game_id))
    }

    /// The file auto-saves are written to.
    #[must_use]
    pub fn autosave_target(&self) -> PathBuf {
        self.autosave_path
            .as_deref()
            .map_or_else(|| self.default_snapshot_path(), Path::to_path_buf)
    }
}
