//! The emulated system as seen by the branch watch core.
//!
//! The recording engine runs on the emulated CPU thread while filtering and patching
//! happen on a consumer thread. Both sides go through [`EmulatedSystem::guard`], which
//! pauses the other side for as long as the returned [`CpuThreadGuard`] lives. The
//! execution state is readable without the guard, the same way the presentation layer
//! checks it before offering an action.
//!
//! # Key Types
//! - [`EmulatedSystem`] - Owns the watch and the debug interface behind one lock
//! - [`CpuThreadGuard`] - Scoped exclusive access
//! - [`DebugInterface`] - Memory and symbol access provided by the emulator
//! - [`ExecutionState`] - Coarse state of the emulated core
//! - [`SymbolCache`] - Concurrent address to symbol name cache

mod guard;
mod symbols;

use std::fmt;

pub use guard::{CoreState, CpuThreadGuard, EmulatedSystem};
pub use symbols::SymbolCache;

use crate::Result;

/// Memory and symbol access of the emulated machine.
///
/// Implemented by the emulator's debugger backend. All methods are called while the
/// exclusive-access guard is held.
pub trait DebugInterface {
    /// Patch one instruction word in emulated memory.
    ///
    /// # Errors
    /// Returns an error if the address is not writable.
    fn write_instruction(&mut self, address: u32, encoding: u32) -> Result<()>;

    /// Read back the instruction word at `address`, if the address is mapped.
    fn read_instruction(&self, address: u32) -> Option<u32>;

    /// Name of the symbol containing `address`.
    fn resolve_symbol_name(&self, address: u32) -> Option<String>;

    /// Start address of the symbol containing `address`.
    fn symbol_start(&self, address: u32) -> Option<u32>;
}

/// Coarse execution state of the emulated core.
///
/// Ordered so that `state > ExecutionState::Paused` means "executing or about to stop".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(u8)]
pub enum ExecutionState {
    /// No game is running, memory is not mapped
    #[default]
    Uninitialized = 0,
    /// Memory is mapped, the CPU is halted
    Paused = 1,
    /// The CPU is executing
    Running = 2,
    /// Shutdown is in progress
    Stopping = 3,
}

impl ExecutionState {
    pub(crate) const fn from_u8(value: u8) -> Self {
        match value {
            1 => ExecutionState::Paused,
            2 => ExecutionState::Running,
            3 => ExecutionState::Stopping,
            _ => ExecutionState::Uninitialized,
        }
    }

    /// `true` once emulated memory can be read and patched.
    #[must_use]
    pub const fn is_initialized(self) -> bool {
        !matches!(self, ExecutionState::Uninitialized)
    }
}

impl fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExecutionState::Uninitialized => "uninitialized",
            ExecutionState::Paused => "paused",
            ExecutionState::Running => "running",
            ExecutionState::Stopping => "stopping",
        };
        f.write_str(name)
    }
}
