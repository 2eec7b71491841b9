//! Exclusive access to the emulated system.

use std::{
    ops::{Deref, DerefMut},
    sync::{
        atomic::{AtomicU8, Ordering},
        Mutex, MutexGuard,
    },
};

use crate::{
    host::{DebugInterface, ExecutionState},
    watch::BranchWatch,
    Error, Result,
};

/// Everything the producer and the consumer share.
#[derive(Debug)]
pub struct CoreState<W, D> {
    /// The recording engine's candidate store
    pub watch: W,
    /// Memory and symbol access of the emulated machine
    pub debug: D,
}

/// The emulated machine, reduced to what the branch watch core needs.
///
/// # Examples
///
/// ```rust,ignore
/// use branchwatch::host::{EmulatedSystem, ExecutionState};
/// use branchwatch::watch::{BranchWatch, CandidateStore};
///
/// let system = EmulatedSystem::new(CandidateStore::new(), my_debugger);
/// system.set_state(ExecutionState::Running);
///
/// let mut guard = system.guard()?;
/// guard.watch.start();
/// ```
#[derive(Debug)]
pub struct EmulatedSystem<W, D> {
    state: AtomicU8,
    core: Mutex<CoreState<W, D>>,
}

impl<W: BranchWatch, D: DebugInterface> EmulatedSystem<W, D> {
    /// Create a new system in the [`ExecutionState::Uninitialized`] state.
    ///
    /// ## Arguments
    /// * `watch` - The recording engine's candidate store
    /// * `debug` - Memory and symbol access
    pub fn new(watch: W, debug: D) -> Self {
        EmulatedSystem {
            state: AtomicU8::new(ExecutionState::Uninitialized as u8),
            core: Mutex::new(CoreState { watch, debug }),
        }
    }

    /// Current execution state. Does not need the guard.
    pub fn state(&self) -> ExecutionState {
        ExecutionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Update the execution state, done by the emulator when it boots, pauses or stops.
    pub fn set_state(&self, state: ExecutionState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Acquire exclusive access for the duration of the returned guard.
    ///
    /// Keep guards short-lived; the producer cannot record hits while one is held.
    ///
    /// # Errors
    /// Returns [`Error::LockError`] if a previous holder panicked.
    pub fn guard(&self) -> Result<CpuThreadGuard<'_, W, D>> {
        let inner = self.core.lock().map_err(|_| Error::LockError)?;
        Ok(CpuThreadGuard { inner })
    }

    /// Consume the system and return the shared state.
    ///
    /// # Errors
    /// Returns [`Error::LockError`] if a previous holder panicked.
    pub fn into_inner(self) -> Result<CoreState<W, D>> {
        self.core.into_inner().map_err(|_| Error::LockError)
    }
}

/// Scoped exclusive access to the [`CoreState`] of an [`EmulatedSystem`].
pub struct CpuThreadGuard<'a, W, D> {
    inner: MutexGuard<'a, CoreState<W, D>>,
}

impl<W, D> Deref for CpuThreadGuard<'_, W, D> {
    type Target = CoreState<W, D>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl<W, D> DerefMut for CpuThreadGuard<'_, W, D> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread};

    use super::*;
    use crate::{
        test::{key, MockMemory},
        watch::CandidateStore,
    };

    #[test]
    fn state_roundtrip() {
        let system = EmulatedSystem::new(CandidateStore::new(), MockMemory::default());
        assert_eq!(system.state(), ExecutionState::Uninitialized);

        for state in [
            ExecutionState::Paused,
            ExecutionState::Running,
            ExecutionState::Stopping,
        ] {
            system.set_state(state);
            assert_eq!(system.state(), state);
            assert!(system.state().is_initialized());
        }
        assert!(ExecutionState::Running > ExecutionState::Paused);
    }

    #[test]
    fn producer_and_consumer_share_the_guard() {
        let system = Arc::new(EmulatedSystem::new(
            CandidateStore::new(),
            MockMemory::default(),
        ));
        system.guard().unwrap().watch.start();

        let producer = {
            let system = Arc::clone(&system);
            thread::spawn(move || {
                for i in 0..1000_u32 {
                    let mut guard = system.guard().unwrap();
                    guard.watch.record_hit(key(0x8000_0000 + (i % 10) * 4), true);
                }
            })
        };

        for _ in 0..100 {
            let guard = system.guard().unwrap();
            let total: u64 = guard.watch.rows().map(|r| r.hits_total).sum();
            assert!(total <= 1000);
        }
        producer.join().unwrap();

        let guard = system.guard().unwrap();
        assert_eq!(guard.watch.collection_size(), 10);
        assert_eq!(guard.watch.rows().map(|r| r.hits_total).sum::<u64>(), 1000);
    }
}
