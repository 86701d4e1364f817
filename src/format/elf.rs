//! ELF section walker (spec §4.E).

use super::ParserState;
use crate::error::{Error, Result};
use crate::reader::Section;

const IGNORED_TYPES: &[&str] = &["SHT_LLVM_ADDRSIG", "SHT_NULL", "SHT_STRTAB", "SHT_SYMTAB"];

pub fn walk_section(state: &mut ParserState, section: &Section) -> Result<()> {
    match section.elf_type()? {
        "SHT_RELA" => handle_rela(state, section),
        "SHT_PROGBITS" => handle_progbits(state, section),
        other if IGNORED_TYPES.contains(&other) => Ok(()),
        other => Err(Error::UnsupportedSectionType(other.to_string())),
    }
}

fn handle_rela(state: &mut ParserState, section: &Section) -> Result<()> {
    let flags = section.flag_names("Flags")?;
    if !flags.iter().any(|f| f == "SHF_INFO_LINK") {
        return Err(Error::InvariantViolation(
            "SHT_RELA section missing SHF_INFO_LINK".into(),
        ));
    }
    let linked_index = section.info()?;
    let before = *state.body_offsets.get(&linked_index).ok_or_else(|| {
        Error::InvariantViolation(format!("SHT_RELA references unknown section {linked_index}"))
    })?;
    if !section.symbols()?.is_empty() {
        return Err(Error::InvariantViolation("SHT_RELA section unexpectedly carries symbols".into()));
    }
    state.queue_relocations(before as u64, section)
}

fn handle_progbits(state: &mut ParserState, section: &Section) -> Result<()> {
    let index = section.index()?;
    let before = state.body.len();
    state.body_offsets.insert(index, before);

    let flags = section.flag_names("Flags")?;
    if !flags.iter().any(|f| f == "SHF_ALLOC") {
        return Ok(());
    }
    if section.has_section_data() {
        // The SHF_MERGE-only case is appended identically today (spec §4.E,
        // §9 Open Question 3): merge-eligible sections are not actually
        // merged by name.
        state.body.extend(section.section_data_bytes()?);
    }
    if !section.relocations()?.is_empty() {
        return Err(Error::InvariantViolation(
            "SHT_PROGBITS section unexpectedly carries relocations".into(),
        ));
    }
    for symbol in section.symbols()? {
        let value = symbol
            .get("Value")
            .and_then(|v| v.as_u64())
            .ok_or_else(|| Error::Malformed("ELF symbol missing Value".into()))?;
        let name = symbol
            .get("Name")
            .and_then(|n| n.get("Value"))
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::Malformed("ELF symbol missing Name.Value".into()))?;
        let name = state.strip_prefix(name).to_string();
        let offset = before + value as usize;
        if state.body_symbols.contains_key(&name) {
            return Err(Error::InvariantViolation(format!(
                "duplicate ELF symbol {name:?}"
            )));
        }
        state.body_symbols.insert(name, offset);
    }
    Ok(())
}
