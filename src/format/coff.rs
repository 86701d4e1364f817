//! COFF section walker (spec §4.E).

use super::ParserState;
use crate::error::{Error, Result};
use crate::reader::Section;

/// Accept `IMAGE_SCN_MEM_READ` sections that are neither writable nor
/// executable (spec §4.E); `IMAGE_SCN_LINK_COMDAT` may additionally be set.
/// Any other flag (alignment, content type, ...) is ignored rather than
/// disqualifying the section.
fn accepted(flags: &[String]) -> bool {
    let has = |name: &str| flags.iter().any(|f| f == name);
    has("IMAGE_SCN_MEM_READ") && !has("IMAGE_SCN_MEM_WRITE") && !has("IMAGE_SCN_MEM_EXECUTE")
}

pub fn walk_section(state: &mut ParserState, section: &Section) -> Result<()> {
    if !section.has_section_data() {
        return Ok(());
    }
    let flags = section.flag_names("Characteristics")?;
    if !accepted(&flags) {
        return Ok(());
    }

    let number = section.number()?;
    let before = state.body.len();
    state.body_offsets.insert(number, before);
    state.body.extend(section.section_data_bytes()?);

    for symbol in section.symbols()? {
        let value = symbol
            .get("Value")
            .and_then(|v| v.as_u64())
            .ok_or_else(|| Error::Malformed("COFF symbol missing Value".into()))?;
        let name = symbol
            .get("Name")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::Malformed("COFF symbol missing Name".into()))?;
        let name = state.strip_prefix(name).to_string();
        state.record_symbol_tracking_dupes(name, before + value as usize);
    }

    state.queue_relocations(before as u64, section)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn s5_read_write_section_is_skipped() {
        let mut state = ParserState::new("");
        let sec = Section(json!({
            "Number": 1,
            "Characteristics": {"Flags": [
                {"Name": "IMAGE_SCN_MEM_READ"},
                {"Name": "IMAGE_SCN_MEM_WRITE"},
            ]},
            "SectionData": {"Offset": 0, "Bytes": [1,2,3]},
            "Relocations": [],
            "Symbols": [],
        }));
        walk_section(&mut state, &sec).unwrap();
        assert_eq!(state.body.len(), 0);
        assert!(state.relocations_todo.is_empty());
    }

    #[test]
    fn comdat_readonly_combination_is_accepted() {
        let mut state = ParserState::new("");
        let sec = Section(json!({
            "Number": 3,
            "Characteristics": {"Flags": [
                {"Name": "IMAGE_SCN_LINK_COMDAT"},
                {"Name": "IMAGE_SCN_MEM_READ"},
            ]},
            "SectionData": {"Offset": 0, "Bytes": [9, 9]},
            "Relocations": [],
            "Symbols": [],
        }));
        walk_section(&mut state, &sec).unwrap();
        assert_eq!(state.body, vec![9, 9]);
    }

    #[test]
    fn comdat_readonly_with_extra_alignment_flag_is_still_accepted() {
        let mut state = ParserState::new("");
        let sec = Section(json!({
            "Number": 4,
            "Characteristics": {"Flags": [
                {"Name": "IMAGE_SCN_LINK_COMDAT"},
                {"Name": "IMAGE_SCN_MEM_READ"},
                {"Name": "IMAGE_SCN_ALIGN_4BYTES"},
            ]},
            "SectionData": {"Offset": 0, "Bytes": [7]},
            "Relocations": [],
            "Symbols": [],
        }));
        walk_section(&mut state, &sec).unwrap();
        assert_eq!(state.body, vec![7]);
    }

    #[test]
    fn plain_read_only_section_is_accepted() {
        let mut state = ParserState::new("");
        let sec = Section(json!({
            "Number": 2,
            "Characteristics": {"Flags": [{"Name": "IMAGE_SCN_MEM_READ"}]},
            "SectionData": {"Offset": 0, "Bytes": [5]},
            "Relocations": [],
            "Symbols": [{"Symbol": {"Name": "sym", "Value": 0}}],
        }));
        walk_section(&mut state, &sec).unwrap();
        assert_eq!(state.body, vec![5]);
        assert_eq!(state.body_symbols["sym"], 0);
    }
}
