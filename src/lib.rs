// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![deny(unsafe_code)]

//! # branchwatch
//!
//! [![License](https://img.shields.io/badge/license-Apache--2.0-blue.svg)](LICENSE-APACHE)
//!
//! The candidate search engine behind a live "branch watch" debugger tool for Power-ISA
//! (GameCube / Wii Gekko) emulators. While a game runs, every executed branch is recorded
//! as a candidate. The user then narrows the candidates down by telling the tool whether
//! the behavior they are looking for happened since the last step, until only the
//! branches responsible for it remain.
//!
//! ## Features
//!
//! - **Branch classification** - Decode the twelve Gekko branch forms from a raw encoding
//! - **Two-phase search** - Blacklist uninteresting branches, then reduce to the culprits
//! - **Filtering** - Query candidates by kind, condition, address range and symbol name
//! - **Patching** - Replace branches with `nop` or make their targets return immediately
//! - **Snapshots** - Persist and restore the search state per game
//!
//! ## Quick Start
//!
//! ```rust
//! use branchwatch::prelude::*;
//!
//! let mut store = CandidateStore::new();
//! store.start();
//!
//! // The emulated CPU reports branch executions
//! store.record_hit(CandidateKey::new(0x8000_1234, 0x8000_4000, 0x4800_2dcd), true);
//! store.record_hit(CandidateKey::new(0x8000_2000, 0x8000_2040, 0x4182_0040), false);
//!
//! let mut engine = FilterEngine::new();
//! engine.set_condition(false, false);
//! assert_eq!(engine.count_visible(&store), 1);
//! # Ok::<(), branchwatch::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`instruction`] - Branch instruction classification
//! - [`watch`] - Candidate records, the recording store and the search lifecycle
//! - [`filter`] - The user's query over the candidates and the filtered view
//! - [`patch`] - Memory patches on selected candidates
//! - [`host`] - The emulated system: exclusive access, memory and symbols
//! - [`session`] - Session control, persistence and status reporting
//! - [`config`] - Session configuration
//!
//! ## Threading
//!
//! The recording engine runs on the emulated CPU thread. Everything that reads or changes
//! candidates goes through [`host::EmulatedSystem::guard`], which pauses the other side
//! for the lifetime of the returned guard. Patch batches take the guard once per record.
//!
//! ## Logging
//!
//! The crate emits [`tracing`] events for lifecycle transitions, reductions, patch writes
//! and refused actions. Install a subscriber in the application to see them.
//!
//! ## Error Handling
//!
//! All fallible operations return [`Result<T, Error>`](Result):
//!
//! ```rust
//! use branchwatch::{filter::parse_address, Error};
//!
//! match parse_address("8000zzzz") {
//!     Ok(address) => println!("bound: {address:08x}"),
//!     Err(Error::InvalidAddressText(text)) => println!("not an address: {text}"),
//!     Err(e) => println!("other error: {e}"),
//! }
//! ```

#[macro_use]
pub(crate) mod error;

/// Shared functionality which is used in unit-tests
#[cfg(test)]
pub(crate) mod test;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust
/// use branchwatch::prelude::*;
///
/// let config = FilterConfig::default();
/// assert!(config.branch_kind_enabled(BranchKind::Bctrl));
/// ```
pub mod prelude;

pub mod config;
pub mod filter;
pub mod host;
pub mod instruction;
pub mod patch;
pub mod session;
pub mod watch;

/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
/// This is used consistently throughout the crate for all fallible operations.
pub type Result<T> = std::result::Result<T, Error>;

/// `branchwatch` Error type
///
/// The main error type for all operations in this crate.
pub use error::Error;

/// Session configuration, see [`config::WatchConfig`].
pub use config::WatchConfig;
