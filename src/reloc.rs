//! Relocation lowering (spec §4.F): the core switch table translating one
//! linker relocation record into a [`Hole`], or into a direct in-place
//! patch plus a GOT-entry reservation.

use crate::error::{Error, Result};
use crate::model::{Hole, Pc};
use scroll::{Pread, Pwrite, LE};
use serde_json::Value;

fn read_u64(body: &[u8], offset: usize) -> Result<u64> {
    body.pread_with(offset, LE)
        .map_err(|_| Error::InvariantViolation(format!("relocation site at {offset} out of bounds (8 bytes)")))
}

fn read_u32(body: &[u8], offset: usize) -> Result<u32> {
    body.pread_with(offset, LE)
        .map_err(|_| Error::InvariantViolation(format!("relocation site at {offset} out of bounds (4 bytes)")))
}

fn write_u64(body: &mut [u8], offset: usize, value: u64) -> Result<()> {
    body.pwrite_with(value, offset, LE)
        .map_err(|_| Error::InvariantViolation(format!("relocation site at {offset} out of bounds (8 bytes)")))?;
    Ok(())
}

fn write_u32(body: &mut [u8], offset: usize, value: u32) -> Result<()> {
    body.pwrite_with(value, offset, LE)
        .map_err(|_| Error::InvariantViolation(format!("relocation site at {offset} out of bounds (4 bytes)")))?;
    Ok(())
}

fn zero_range(body: &mut [u8], offset: usize, width: usize) {
    body[offset..offset + width].fill(0);
}

fn require_usize(n: i64, what: &str) -> Result<usize> {
    usize::try_from(n).map_err(|_| Error::InvariantViolation(format!("{what} is negative: {n}")))
}

/// Strip one leading underscore, matching `str.removeprefix("_")` in the
/// original (only ever applied where the symbol is asserted to start with
/// one).
fn strip_one_underscore(symbol: &str) -> String {
    symbol.strip_prefix('_').unwrap_or(symbol).to_string()
}

fn type_value(relocation: &Value) -> Option<&str> {
    relocation.get("Type")?.get("Value")?.as_str()
}

fn get_i64(relocation: &Value, key: &str) -> Option<i64> {
    relocation.get(key)?.as_i64()
}

fn get_u64(relocation: &Value, key: &str) -> Option<u64> {
    relocation.get(key)?.as_u64()
}

fn get_str<'a>(relocation: &'a Value, key: &str) -> Option<&'a str> {
    relocation.get(key)?.as_str()
}

/// `{"Value": "..."}`-wrapped string field, as ELF/Mach-O use for `Symbol`
/// and `Section` but COFF does not.
fn get_wrapped_str<'a>(relocation: &'a Value, key: &str) -> Option<&'a str> {
    relocation.get(key)?.get("Value")?.as_str()
}

fn malformed(relocation: &Value) -> Error {
    Error::UnsupportedRelocation(relocation.to_string())
}

/// Lower one queued `(base, relocation)` pair (spec §3 "relocations_todo")
/// into zero or one [`Hole`], mutating `body` in place and interning GOT
/// symbols as needed. `base` is the absolute offset of the relocation's
/// section within `body`.
pub fn lower_relocation(
    body: &mut Vec<u8>,
    got_entries: &mut Vec<String>,
    base: u64,
    relocation: &Value,
) -> Result<Option<Hole>> {
    let kind = type_value(relocation).ok_or_else(|| malformed(relocation))?;
    match kind {
        "IMAGE_REL_AMD64_ADDR64" => {
            let offset = get_u64(relocation, "Offset").ok_or_else(|| malformed(relocation))?;
            let symbol = get_str(relocation, "Symbol").ok_or_else(|| malformed(relocation))?;
            let offset = require_usize((base + offset) as i64, "offset")?;
            let addend = read_u64(body, offset)? as i64;
            zero_range(body, offset, 8);
            Ok(Some(Hole::new(symbol, offset, addend, Pc::Absolute)))
        }
        "IMAGE_REL_I386_DIR32" => {
            let offset = get_u64(relocation, "Offset").ok_or_else(|| malformed(relocation))?;
            let symbol = get_str(relocation, "Symbol").ok_or_else(|| malformed(relocation))?;
            let offset = require_usize((base + offset) as i64, "offset")?;
            let addend = read_u32(body, offset)? as i64;
            zero_range(body, offset, 4);
            Ok(Some(Hole::new(strip_one_underscore(symbol), offset, addend, Pc::Absolute)))
        }
        "R_X86_64_64" => {
            let offset = get_u64(relocation, "Offset").ok_or_else(|| malformed(relocation))?;
            let addend = get_i64(relocation, "Addend").ok_or_else(|| malformed(relocation))?;
            let symbol = get_wrapped_str(relocation, "Symbol").ok_or_else(|| malformed(relocation))?;
            let offset = require_usize((base + offset) as i64, "offset")?;
            let implicit = read_u64(body, offset)?;
            if implicit != 0 {
                return Err(Error::InvariantViolation(format!(
                    "R_X86_64_64 at {offset} has nonzero implicit addend {implicit}"
                )));
            }
            Ok(Some(Hole::new(symbol, offset, addend, Pc::Absolute)))
        }
        "R_X86_64_GOT64" => {
            let offset = get_u64(relocation, "Offset").ok_or_else(|| malformed(relocation))?;
            let addend = get_i64(relocation, "Addend").ok_or_else(|| malformed(relocation))?;
            let symbol = get_wrapped_str(relocation, "Symbol").ok_or_else(|| malformed(relocation))?;
            let offset = require_usize((base + offset) as i64, "offset")?;
            let implicit = read_u64(body, offset)?;
            if implicit != 0 {
                log::warn!("R_X86_64_GOT64 at {offset} has nonzero implicit addend {implicit}");
            }
            if !got_entries.iter().any(|s| s == symbol) {
                got_entries.push(symbol.to_string());
            }
            let index = got_entries.iter().position(|s| s == symbol).unwrap();
            let patched = addend + (index as i64) * 8;
            write_u64(body, offset, patched as u64)?;
            Ok(None)
        }
        "R_X86_64_GOTOFF64" => {
            let offset = get_u64(relocation, "Offset").ok_or_else(|| malformed(relocation))?;
            let addend = get_i64(relocation, "Addend").ok_or_else(|| malformed(relocation))?;
            let symbol = get_wrapped_str(relocation, "Symbol").ok_or_else(|| malformed(relocation))?;
            let offset = require_usize((base + offset) as i64, "offset")?;
            let implicit = read_u64(body, offset)?;
            if implicit != 0 {
                log::warn!("R_X86_64_GOTOFF64 at {offset} has nonzero implicit addend {implicit}");
            }
            let addend = addend + offset as i64 - body.len() as i64;
            Ok(Some(Hole::new(symbol, offset, addend, Pc::PcRelative)))
        }
        "R_X86_64_GOTPC64" => {
            let symbol = get_wrapped_str(relocation, "Symbol").ok_or_else(|| malformed(relocation))?;
            if symbol != "_GLOBAL_OFFSET_TABLE_" {
                return Err(malformed(relocation));
            }
            let offset = get_u64(relocation, "Offset").ok_or_else(|| malformed(relocation))?;
            let addend = get_i64(relocation, "Addend").ok_or_else(|| malformed(relocation))?;
            let offset = require_usize((base + offset) as i64, "offset")?;
            let implicit = read_u64(body, offset)?;
            if implicit != 0 {
                log::warn!("R_X86_64_GOTPC64 at {offset} has nonzero implicit addend {implicit}");
            }
            let patched = addend + body.len() as i64 - offset as i64;
            write_u64(body, offset, patched as u64)?;
            Ok(None)
        }
        "R_X86_64_PC32" => {
            let offset = get_u64(relocation, "Offset").ok_or_else(|| malformed(relocation))?;
            let addend = get_i64(relocation, "Addend").ok_or_else(|| malformed(relocation))?;
            let symbol = get_wrapped_str(relocation, "Symbol").ok_or_else(|| malformed(relocation))?;
            let offset = require_usize((base + offset) as i64, "offset")?;
            let implicit = read_u32(body, offset)?;
            if implicit != 0 {
                return Err(Error::InvariantViolation(format!(
                    "R_X86_64_PC32 at {offset} has nonzero implicit addend {implicit}"
                )));
            }
            Ok(Some(Hole::new(symbol, offset, addend, Pc::PcRelative)))
        }
        "X86_64_RELOC_UNSIGNED" => lower_macho_unsigned(body, base, relocation),
        _ => Err(malformed(relocation)),
    }
}

fn lower_macho_unsigned(body: &mut Vec<u8>, base: u64, relocation: &Value) -> Result<Option<Hole>> {
    let length = get_i64(relocation, "Length");
    let pcrel = get_i64(relocation, "PCRel");
    if length != Some(3) || pcrel != Some(0) {
        return Err(malformed(relocation));
    }
    let offset = get_u64(relocation, "Offset").ok_or_else(|| malformed(relocation))?;
    let offset = require_usize((base + offset) as i64, "offset")?;
    let addend = read_u64(body, offset)? as i64;
    zero_range(body, offset, 8);
    if let Some(section) = get_wrapped_str(relocation, "Section") {
        return Ok(Some(Hole::new(strip_one_underscore(section), offset, addend, Pc::Absolute)));
    }
    if let Some(symbol) = get_wrapped_str(relocation, "Symbol") {
        return Ok(Some(Hole::new(strip_one_underscore(symbol), offset, addend, Pc::Absolute)));
    }
    Err(malformed(relocation))
}
