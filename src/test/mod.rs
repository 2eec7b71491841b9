//! Shared fixtures for the unit tests.

mod memory;

pub use fixtures::*;
pub use memory::MockMemory;
