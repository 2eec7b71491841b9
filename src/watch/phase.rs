use strum::{Display, EnumIter};

/// Search stage of a branch watch.
///
/// A watch starts in [`Phase::Blacklist`] and moves to [`Phase::Reduction`] the first time
/// a code path is confirmed taken. The only way back is clearing the watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumIter)]
pub enum Phase {
    /// No candidate confirmed yet, work proceeds by exclusion
    #[default]
    Blacklist,
    /// A selection exists and is narrowed step by step
    Reduction,
}

/// The four narrowing steps the user can request.
///
/// The runtime test behind each step is evaluated by the recording store, against hit
/// counts and live emulated memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum Reduction {
    /// Keep candidates hit since the last check
    CodePathWasTaken,
    /// Keep candidates not hit since the last check
    CodePathNotTaken,
    /// Keep candidates whose origin instruction no longer matches the recorded one
    BranchWasOverwritten,
    /// Keep candidates whose origin instruction is unchanged
    BranchNotOverwritten,
}

impl Reduction {
    /// `true` if the step needs to read emulated memory.
    #[must_use]
    pub const fn reads_memory(self) -> bool {
        matches!(
            self,
            Reduction::BranchWasOverwritten | Reduction::BranchNotOverwritten
        )
    }
}
