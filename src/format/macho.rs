//! Mach-O section walker (spec §4.E).

use super::ParserState;
use crate::error::{Error, Result};
use crate::reader::Section;

pub fn walk_section(state: &mut ParserState, section: &Section) -> Result<()> {
    let address = section.address()? as usize;
    if address < state.body.len() {
        return Err(Error::InvariantViolation(format!(
            "Mach-O section address {address} precedes current body length {}",
            state.body.len()
        )));
    }
    state.body.resize(address, 0);
    let before = address;
    let index = section.index()?;
    state.body_offsets.insert(index, before);

    state.body.extend(section.section_data_bytes()?);

    let name = state.strip_prefix(section.name()?).to_string();
    state.record_symbol_tracking_dupes(name, 0);

    for symbol in section.symbols()? {
        let value = symbol
            .get("Value")
            .and_then(|v| v.as_u64())
            .ok_or_else(|| Error::Malformed("Mach-O symbol missing Value".into()))?;
        let name = symbol
            .get("Name")
            .and_then(|n| n.get("Value"))
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::Malformed("Mach-O symbol missing Name.Value".into()))?;
        let name = state.strip_prefix(name).to_string();
        state.record_symbol_tracking_dupes(name, value as usize);
    }

    state.queue_relocations(before as u64, section)
}
