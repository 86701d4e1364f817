//! Section walkers, one per object-file format (spec §4.E).

pub mod coff;
pub mod elf;
pub mod macho;

use crate::reader::Section;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Parser state, transient, one instance per object file (spec §3).
#[derive(Debug, Default)]
pub struct ParserState {
    pub body: Vec<u8>,
    pub body_symbols: BTreeMap<String, usize>,
    pub body_offsets: BTreeMap<u64, usize>,
    pub dupes: BTreeSet<String>,
    pub got_entries: Vec<String>,
    pub relocations_todo: Vec<(u64, Value)>,
    pub symbol_prefix: String,
}

impl ParserState {
    pub fn new(symbol_prefix: impl Into<String>) -> Self {
        ParserState {
            symbol_prefix: symbol_prefix.into(),
            ..Default::default()
        }
    }

    pub fn strip_prefix<'a>(&self, name: &'a str) -> &'a str {
        name.strip_prefix(self.symbol_prefix.as_str()).unwrap_or(name)
    }

    /// Record a symbol seen more than once into `dupes` rather than
    /// asserting (COFF/Mach-O behavior, spec §4.E).
    pub fn record_symbol_tracking_dupes(&mut self, name: String, offset: usize) {
        if self.body_symbols.contains_key(&name) {
            self.dupes.insert(name.clone());
        }
        self.body_symbols.insert(name, offset);
    }

    pub fn queue_relocations(&mut self, base: u64, section: &Section) -> crate::error::Result<()> {
        for relocation in section.relocations()? {
            self.relocations_todo.push((base, relocation.clone()));
        }
        Ok(())
    }
}

/// Which per-format walker to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Elf,
    MachO,
    Coff,
}

pub fn walk_section(format: Format, state: &mut ParserState, section: &Section) -> crate::error::Result<()> {
    match format {
        Format::Elf => elf::walk_section(state, section),
        Format::MachO => macho::walk_section(state, section),
        Format::Coff => coff::walk_section(state, section),
    }
}
