//! Filtering and sorting of branch watch candidates.
//!
//! [`FilterConfig`] is the user's query: which branch kinds and condition results to show,
//! inclusive bounds on origin and destination addresses, and case-insensitive substring
//! patterns on the resolved symbol names. [`FilterEngine`] applies it to the rows of a
//! [`crate::watch::BranchWatch`] and keeps the filtered view sorted and cached.
//!
//! Filtering never mutates the underlying candidates, and evaluating the same
//! configuration against the same rows always yields the same view.
//!
//! # Examples
//!
//! ```rust
//! use branchwatch::filter::{parse_address, AddressBound, FilterEngine, SymbolField};
//!
//! let mut engine = FilterEngine::new();
//! engine.set_address_bound(AddressBound::OriginMin, "0x80003000");
//! engine.set_symbol_pattern(SymbolField::Destination, "memcpy");
//!
//! assert_eq!(engine.config().address_bound(AddressBound::OriginMin), Some(0x8000_3000));
//! assert!(parse_address("zz").is_err());
//! ```

mod config;
mod engine;

pub use config::{parse_address, AddressBound, BranchKinds, FilterConfig, SymbolField};
pub use engine::{Column, FilterEngine, SortOrder};
