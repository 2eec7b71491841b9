//! In-memory debug interface.

use std::collections::HashMap;

use crate::{host::DebugInterface, Error, Result};

/// A sparse word-addressed memory with a flat symbol table and a write log.
#[derive(Debug, Default, Clone)]
pub struct MockMemory {
    words: HashMap<u32, u32>,
    symbols: Vec<(String, u32, u32)>,
    /// Every successful `write_instruction`, in order
    pub writes: Vec<(u32, u32)>,
    /// Addresses that reject writes
    pub read_only: Vec<u32>,
}

impl MockMemory {
    /// Set the word at `address` without logging a write.
    pub fn poke(&mut self, address: u32, value: u32) {
        self.words.insert(address, value);
    }

    /// Add a symbol covering `[start, start + size)`.
    pub fn add_symbol(&mut self, name: &str, start: u32, size: u32) {
        self.symbols.push((name.to_owned(), start, size));
    }

    fn symbol(&self, address: u32) -> Option<&(String, u32, u32)> {
        self.symbols
            .iter()
            .find(|(_, start, size)| address >= *start && address - *start < *size)
    }
}

impl DebugInterface for MockMemory {
    fn write_instruction(&mut self, address: u32, encoding: u32) -> Result<()> {
        if self.read_only.contains(&address) {
            return Err(Error::MemoryWrite(address));
        }
        self.words.insert(address, encoding);
        self.writes.push((address, encoding));
        Ok(())
    }

    fn read_instruction(&self, address: u32) -> Option<u32> {
        self.words.get(&address).copied()
    }

    fn resolve_symbol_name(&self, address: u32) -> Option<String> {
        self.symbol(address).map(|(name, _, _)| name.clone())
    }

    fn symbol_start(&self, address: u32) -> Option<u32> {
        self.symbol(address).map(|(_, start, _)| *start)
    }
}
