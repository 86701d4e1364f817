//! The data model shared by every stage of the pipeline (spec §3).

use std::fmt;

/// Patch-site addressing mode. `Absolute` means the patcher writes the
/// resolved address directly; `PcRelative` means it subtracts the address
/// of the patch site first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pc {
    Absolute,
    PcRelative,
}

impl Pc {
    /// The `pc` field's on-the-wire encoding: `0` or `-1`.
    pub fn as_i32(self) -> i32 {
        match self {
            Pc::Absolute => 0,
            Pc::PcRelative => -1,
        }
    }
}

/// One of the runtime-recognized symbolic targets a hole can reference
/// without needing a dynamic symbol lookup (spec §3, §4.H).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum HoleKind {
    Base,
    Continue,
    NextInstr,
    NextTrace,
    OpargPlusOne,
}

impl HoleKind {
    pub const ALL: [HoleKind; 5] = [
        HoleKind::Base,
        HoleKind::Continue,
        HoleKind::NextInstr,
        HoleKind::NextTrace,
        HoleKind::OpargPlusOne,
    ];

    /// The bare name after the `_justin_` prefix is stripped, e.g. `"base"`.
    pub fn bare_name(self) -> &'static str {
        match self {
            HoleKind::Base => "base",
            HoleKind::Continue => "continue",
            HoleKind::NextInstr => "next_instr",
            HoleKind::NextTrace => "next_trace",
            HoleKind::OpargPlusOne => "oparg_plus_one",
        }
    }

    /// Map a (possibly `_justin_`-prefixed) symbol name back to a well-known
    /// kind, if it is one.
    pub fn from_symbol(symbol: &str) -> Option<HoleKind> {
        let bare = symbol.strip_prefix("_justin_")?;
        HoleKind::ALL.into_iter().find(|k| k.bare_name() == bare)
    }

    pub fn enum_name(self) -> String {
        format!("HOLE_{}", self.bare_name())
    }
}

impl fmt::Display for HoleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.enum_name())
    }
}

/// The well-known symbol the runtime patcher uses to mean "the address at
/// which this stencil is placed" (spec glossary: Base).
pub const BASE_SYMBOL: &str = "_justin_base";

/// A single patch site (spec §3 "Hole").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hole {
    pub symbol: String,
    pub offset: usize,
    pub addend: i64,
    pub pc: Pc,
}

impl Hole {
    pub fn new(symbol: impl Into<String>, offset: usize, addend: i64, pc: Pc) -> Self {
        Hole {
            symbol: symbol.into(),
            offset,
            addend,
            pc,
        }
    }

    /// `Some(kind)` if this hole targets a well-known runtime symbol rather
    /// than one requiring dynamic lookup.
    pub fn kind(&self) -> Option<HoleKind> {
        HoleKind::from_symbol(&self.symbol)
    }
}

/// A prefabricated machine-code template for one opcode (spec §3 "Stencil").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stencil {
    pub body: Vec<u8>,
    pub holes: Vec<Hole>,
}

impl Stencil {
    /// Holes targeting well-known symbols, i.e. those that become `Hole`
    /// entries in the generated header rather than `SymbolLoad` entries.
    pub fn well_known_holes(&self) -> impl Iterator<Item = (&Hole, HoleKind)> {
        self.holes.iter().filter_map(|h| h.kind().map(|k| (h, k)))
    }

    /// Holes requiring a runtime symbol lookup.
    pub fn symbol_loads(&self) -> impl Iterator<Item = &Hole> {
        self.holes.iter().filter(|h| h.kind().is_none())
    }
}
