//! Stencil assembly (spec §4.G): drains `relocations_todo` through the
//! relocation-lowering switch table, rewrites body-local symbols to `base`,
//! appends the GOT region, and sorts the final hole list.

use crate::error::{Error, Result};
use crate::format::{walk_section, Format, ParserState};
use crate::model::{Hole, Pc, Stencil, BASE_SYMBOL};
use crate::reader::Section;
use crate::reloc::lower_relocation;

/// The distinguished entry offset (spec §3, §9 Open Question 1). Hard-coded
/// to 0; selecting `_justin_entry`/`_justin_trampoline` instead is left
/// undecided upstream and is not implemented here (see DESIGN.md).
const ENTRY: usize = 0;

/// Walk every section, then lower every queued relocation, producing one
/// immutable [`Stencil`] (spec §3 "Lifecycle").
pub fn parse(format: Format, symbol_prefix: &str, sections: &[Section]) -> Result<Stencil> {
    let mut state = ParserState::new(symbol_prefix);
    for section in sections {
        walk_section(format, &mut state, section)?;
    }
    assemble(state)
}

fn assemble(mut state: ParserState) -> Result<Stencil> {
    let mut holes = Vec::new();
    let relocations = std::mem::take(&mut state.relocations_todo);
    for (base, relocation) in relocations {
        let Some(mut hole) = lower_relocation(&mut state.body, &mut state.got_entries, base, &relocation)? else {
            continue;
        };
        if state.dupes.contains(&hole.symbol) {
            return Err(Error::InvariantViolation(format!(
                "hole targets duplicate symbol {:?}",
                hole.symbol
            )));
        }
        if let Some(&defined_at) = state.body_symbols.get(&hole.symbol) {
            let addend = hole.addend + defined_at as i64 - ENTRY as i64;
            hole = Hole::new(BASE_SYMBOL, hole.offset, addend, hole.pc);
        }
        holes.push(hole);
    }

    let got_base = state.body.len();
    for (i, got_symbol) in state.got_entries.iter().enumerate() {
        if let Some(offset) = state.body_symbols.get_mut(got_symbol) {
            *offset = offset.saturating_sub(ENTRY);
        }
        holes.push(Hole::new(got_symbol.clone(), got_base + 8 * i, 0, Pc::Absolute));
    }
    state.body.extend(std::iter::repeat(0u8).take(8 * state.got_entries.len()));

    holes.sort_by_key(|h| h.offset);

    Ok(Stencil {
        body: state.body[ENTRY..].to_vec(),
        holes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn s1_single_progbits_section_with_r_x86_64_64() {
        let sections = vec![
            Section(json!({
                "Index": 1,
                "Type": {"Value": "SHT_PROGBITS"},
                "Flags": {"Flags": [{"Name": "SHF_ALLOC"}]},
                "SectionData": {"Offset": 0, "Bytes": [0u8; 16]},
                "Relocations": [],
                "Symbols": [],
            })),
            Section(json!({
                "Type": {"Value": "SHT_RELA"},
                "Flags": {"Flags": [{"Name": "SHF_INFO_LINK"}]},
                "Info": 1,
                "Symbols": [],
                "Relocations": [{"Relocation": {
                    "Addend": 7, "Offset": 0,
                    "Symbol": {"Value": "foo"},
                    "Type": {"Value": "R_X86_64_64"},
                }}],
            })),
        ];
        let stencil = parse(Format::Elf, "", &sections).unwrap();
        assert_eq!(stencil.body.len(), 16);
        assert_eq!(stencil.holes, vec![Hole::new("foo", 0, 7, Pc::Absolute)]);
    }

    #[test]
    fn s2_symbol_defined_inside_body_rewrites_to_base() {
        let sections = vec![
            Section(json!({
                "Index": 1,
                "Type": {"Value": "SHT_PROGBITS"},
                "Flags": {"Flags": [{"Name": "SHF_ALLOC"}]},
                "SectionData": {"Offset": 0, "Bytes": [0u8; 16]},
                "Relocations": [],
                "Symbols": [{"Symbol": {"Name": {"Value": "foo"}, "Value": 8}}],
            })),
            Section(json!({
                "Type": {"Value": "SHT_RELA"},
                "Flags": {"Flags": [{"Name": "SHF_INFO_LINK"}]},
                "Info": 1,
                "Symbols": [],
                "Relocations": [{"Relocation": {
                    "Addend": 7, "Offset": 0,
                    "Symbol": {"Value": "foo"},
                    "Type": {"Value": "R_X86_64_64"},
                }}],
            })),
        ];
        let stencil = parse(Format::Elf, "", &sections).unwrap();
        assert_eq!(stencil.holes, vec![Hole::new(BASE_SYMBOL, 0, 15, Pc::Absolute)]);
    }

    #[test]
    fn s3_two_got_entries_produce_two_holes_and_sixteen_extra_bytes() {
        let sections = vec![
            Section(json!({
                "Index": 1,
                "Type": {"Value": "SHT_PROGBITS"},
                "Flags": {"Flags": [{"Name": "SHF_ALLOC"}]},
                "SectionData": {"Offset": 0, "Bytes": [0u8; 24]},
                "Relocations": [],
                "Symbols": [],
            })),
            Section(json!({
                "Type": {"Value": "SHT_RELA"},
                "Flags": {"Flags": [{"Name": "SHF_INFO_LINK"}]},
                "Info": 1,
                "Symbols": [],
                "Relocations": [
                    {"Relocation": {"Addend": 0, "Offset": 0, "Symbol": {"Value": "a"}, "Type": {"Value": "R_X86_64_GOT64"}}},
                    {"Relocation": {"Addend": 0, "Offset": 8, "Symbol": {"Value": "b"}, "Type": {"Value": "R_X86_64_GOT64"}}},
                    {"Relocation": {"Addend": 0, "Offset": 16, "Symbol": {"Value": "a"}, "Type": {"Value": "R_X86_64_GOT64"}}},
                ],
            })),
        ];
        let stencil = parse(Format::Elf, "", &sections).unwrap();
        assert_eq!(stencil.body.len(), 24 + 16);
        let got_base = 24;
        assert_eq!(
            stencil.holes,
            vec![
                Hole::new("a", got_base, 0, Pc::Absolute),
                Hole::new("b", got_base + 8, 0, Pc::Absolute),
            ]
        );
    }

    #[test]
    fn s6_unsupported_relocation_fails_the_whole_parse() {
        let sections = vec![
            Section(json!({
                "Index": 1,
                "Type": {"Value": "SHT_PROGBITS"},
                "Flags": {"Flags": [{"Name": "SHF_ALLOC"}]},
                "SectionData": {"Offset": 0, "Bytes": [0u8; 8]},
                "Relocations": [],
                "Symbols": [],
            })),
            Section(json!({
                "Type": {"Value": "SHT_RELA"},
                "Flags": {"Flags": [{"Name": "SHF_INFO_LINK"}]},
                "Info": 1,
                "Symbols": [],
                "Relocations": [{"Relocation": {"Type": {"Value": "R_NOT_REAL"}}}],
            })),
        ];
        let err = parse(Format::Elf, "", &sections).unwrap_err();
        assert!(matches!(err, Error::UnsupportedRelocation(_)));
    }

    #[test]
    fn holes_never_target_a_duplicate_symbol() {
        // Two Mach-O sections whose names collide put the name in `dupes`;
        // a relocation pointing at it must fail rather than silently
        // resolving to one of the two definitions.
        let sections = vec![
            Section(json!({
                "Index": 0, "Address": 0, "Name": {"Value": "_dup"},
                "SectionData": {"Offset": 0, "Bytes": [0u8; 8]},
                "Relocations": [], "Symbols": [],
            })),
            Section(json!({
                "Index": 1, "Address": 8, "Name": {"Value": "_dup"},
                "SectionData": {"Offset": 0, "Bytes": [0u8; 8]},
                "Relocations": [{"Relocation": {
                    "Length": 3, "Offset": 0, "PCRel": 0,
                    "Section": {"Value": "_dup"},
                    "Type": {"Value": "X86_64_RELOC_UNSIGNED"},
                }}],
                "Symbols": [],
            })),
        ];
        let err = parse(Format::MachO, "_", &sections).unwrap_err();
        assert!(matches!(err, Error::InvariantViolation(_)));
    }

    #[test]
    fn parse_is_idempotent() {
        let sections = vec![Section(json!({
            "Index": 1,
            "Type": {"Value": "SHT_PROGBITS"},
            "Flags": {"Flags": [{"Name": "SHF_ALLOC"}]},
            "SectionData": {"Offset": 0, "Bytes": [1, 2, 3, 4]},
            "Relocations": [],
            "Symbols": [],
        }))];
        let first = parse(Format::Elf, "", &sections).unwrap();
        let second = parse(Format::Elf, "", &sections).unwrap();
        assert_eq!(first, second);
    }
}
