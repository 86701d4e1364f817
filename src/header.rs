//! Header emitter (spec §4.H): serialize every stencil into one C header
//! with a fixed layout.

use crate::error::{Error, Result};
use crate::model::{HoleKind, Stencil};
use std::collections::BTreeMap;
use std::fmt::Write as _;

const TRAMPOLINE: &str = "trampoline";

fn batched<'a>(bytes: &'a [u8], n: usize) -> impl Iterator<Item = &'a [u8]> {
    bytes.chunks(n)
}

fn emit_stencil(out: &mut String, opname: &str, stencil: &Stencil) -> Result<()> {
    if stencil.body.is_empty() {
        return Err(Error::InvariantViolation(format!("{opname} stencil has an empty body")));
    }
    writeln!(out, "// {opname}").unwrap();
    writeln!(out, "static unsigned char {opname}_stencil_bytes[] = {{").unwrap();
    for chunk in batched(&stencil.body, 8) {
        let joined = chunk.iter().map(|b| format!("0x{b:02X}")).collect::<Vec<_>>().join(", ");
        writeln!(out, "    {joined},").unwrap();
    }
    writeln!(out, "}};").unwrap();

    let mut hole_lines = Vec::new();
    let mut load_lines = Vec::new();
    for hole in &stencil.holes {
        match hole.kind() {
            Some(kind) => hole_lines.push(format!(
                "    {{.offset = {:4}, .addend = {:4}, .kind = {}, .pc = {}}},",
                hole.offset,
                hole.addend,
                kind.enum_name(),
                hole.pc.as_i32()
            )),
            None => load_lines.push(format!(
                "    {{.offset = {:4}, .addend = {:4}, .symbol = \"{}\", .pc = {}}},",
                hole.offset,
                hole.addend,
                hole.symbol,
                hole.pc.as_i32()
            )),
        }
    }
    if hole_lines.is_empty() {
        return Err(Error::InvariantViolation(format!(
            "{opname} stencil has no well-known holes"
        )));
    }

    writeln!(out, "static const Hole {opname}_stencil_holes[] = {{").unwrap();
    for line in hole_lines {
        writeln!(out, "{line}").unwrap();
    }
    writeln!(out, "}};").unwrap();

    writeln!(out, "static const SymbolLoad {opname}_stencil_loads[] = {{").unwrap();
    for line in load_lines {
        writeln!(out, "{line}").unwrap();
    }
    writeln!(out, "    {{.offset =    0, .addend =    0, .symbol = NULL, .pc = 0}},").unwrap();
    writeln!(out, "}};").unwrap();
    writeln!(out).unwrap();
    Ok(())
}

/// Emit the complete generated header for every built stencil (spec §4.H).
/// `stencils` must contain a `"trampoline"` entry; every other key is
/// treated as an opcode name indexed into `stencils[256]`.
pub fn emit_header(stencils: &BTreeMap<String, Stencil>) -> Result<String> {
    let trampoline = stencils
        .get(TRAMPOLINE)
        .ok_or_else(|| Error::InvariantViolation("no trampoline stencil was built".into()))?;

    let mut lines = String::new();
    writeln!(lines, "// Generated by stencilgen. Do not edit by hand.").unwrap();
    writeln!(lines).unwrap();
    writeln!(lines, "typedef enum {{").unwrap();
    for kind in HoleKind::ALL {
        writeln!(lines, "    {},", kind.enum_name()).unwrap();
    }
    writeln!(lines, "}} HoleKind;").unwrap();
    writeln!(lines).unwrap();
    writeln!(lines, "typedef struct {{").unwrap();
    writeln!(lines, "    const uintptr_t offset;").unwrap();
    writeln!(lines, "    const uintptr_t addend;").unwrap();
    writeln!(lines, "    const HoleKind kind;").unwrap();
    writeln!(lines, "    const int pc;").unwrap();
    writeln!(lines, "}} Hole;").unwrap();
    writeln!(lines).unwrap();
    writeln!(lines, "typedef struct {{").unwrap();
    writeln!(lines, "    const uintptr_t offset;").unwrap();
    writeln!(lines, "    const uintptr_t addend;").unwrap();
    writeln!(lines, "    const char * const symbol;").unwrap();
    writeln!(lines, "    const int pc;").unwrap();
    writeln!(lines, "}} SymbolLoad;").unwrap();
    writeln!(lines).unwrap();
    writeln!(lines, "typedef struct {{").unwrap();
    writeln!(lines, "    const size_t nbytes;").unwrap();
    writeln!(lines, "    unsigned char * const bytes;").unwrap();
    writeln!(lines, "    const size_t nholes;").unwrap();
    writeln!(lines, "    const Hole * const holes;").unwrap();
    writeln!(lines, "    size_t nloads;").unwrap();
    writeln!(lines, "    const SymbolLoad * const loads;").unwrap();
    writeln!(lines, "}} Stencil;").unwrap();
    writeln!(lines).unwrap();

    let opnames: Vec<&String> = stencils.keys().filter(|k| k.as_str() != TRAMPOLINE).collect();
    for opname in &opnames {
        emit_stencil(&mut lines, opname, &stencils[*opname])?;
    }
    emit_stencil(&mut lines, TRAMPOLINE, trampoline)?;

    writeln!(lines, "#define INIT_STENCIL(OP) {{                             \\").unwrap();
    writeln!(lines, "    .nbytes = Py_ARRAY_LENGTH(OP##_stencil_bytes),     \\").unwrap();
    writeln!(lines, "    .bytes = OP##_stencil_bytes,                       \\").unwrap();
    writeln!(lines, "    .nholes = Py_ARRAY_LENGTH(OP##_stencil_holes),     \\").unwrap();
    writeln!(lines, "    .holes = OP##_stencil_holes,                       \\").unwrap();
    writeln!(lines, "    .nloads = Py_ARRAY_LENGTH(OP##_stencil_loads) - 1, \\").unwrap();
    writeln!(lines, "    .loads = OP##_stencil_loads,                       \\").unwrap();
    writeln!(lines, "}}").unwrap();
    writeln!(lines).unwrap();

    writeln!(lines, "static const Stencil trampoline_stencil = INIT_STENCIL(trampoline);").unwrap();
    writeln!(lines).unwrap();
    writeln!(lines, "static const Stencil stencils[256] = {{").unwrap();
    for opname in &opnames {
        writeln!(lines, "    [{opname}] = INIT_STENCIL({opname}),").unwrap();
    }
    writeln!(lines, "}};").unwrap();
    writeln!(lines).unwrap();

    writeln!(lines, "#define INIT_HOLE(NAME) [HOLE_##NAME] = (uintptr_t)0xBAD0BAD0BAD0BAD0").unwrap();
    writeln!(lines).unwrap();
    writeln!(lines, "#define GET_PATCHES() {{ \\").unwrap();
    for kind in HoleKind::ALL {
        writeln!(lines, "    INIT_HOLE({}), \\", kind.bare_name()).unwrap();
    }
    writeln!(lines, "}}").unwrap();

    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Hole, Pc};

    fn stencil_with_base_hole() -> Stencil {
        Stencil {
            body: vec![0xAA; 8],
            holes: vec![Hole::new("_justin_base", 0, 0, Pc::Absolute)],
        }
    }

    #[test]
    fn emits_enum_struct_and_stencils_table() {
        let mut stencils = BTreeMap::new();
        stencils.insert("trampoline".to_string(), stencil_with_base_hole());
        stencils.insert("NOP".to_string(), stencil_with_base_hole());
        let header = emit_header(&stencils).unwrap();
        assert!(header.contains("typedef enum {"));
        assert!(header.contains("HOLE_base"));
        assert!(header.contains("NOP_stencil_bytes"));
        assert!(header.contains("trampoline_stencil_bytes"));
        assert!(header.contains("[NOP] = INIT_STENCIL(NOP)"));
        assert!(!header.contains("[trampoline] = INIT_STENCIL"));
        assert!(header.contains("static const Stencil trampoline_stencil = INIT_STENCIL(trampoline);"));
    }

    #[test]
    fn missing_trampoline_is_an_error() {
        let stencils = BTreeMap::new();
        let err = emit_header(&stencils).unwrap_err();
        assert!(matches!(err, Error::InvariantViolation(_)));
    }

    #[test]
    fn stencil_with_no_well_known_hole_is_rejected() {
        let mut stencils = BTreeMap::new();
        stencils.insert("trampoline".to_string(), stencil_with_base_hole());
        stencils.insert(
            "WEIRD".to_string(),
            Stencil {
                body: vec![1, 2, 3],
                holes: vec![Hole::new("external_symbol", 0, 0, Pc::Absolute)],
            },
        );
        let err = emit_header(&stencils).unwrap_err();
        assert!(matches!(err, Error::InvariantViolation(_)));
    }

    #[test]
    fn nloads_accounts_for_sentinel() {
        let mut stencils = BTreeMap::new();
        stencils.insert(
            "trampoline".to_string(),
            Stencil {
                body: vec![0u8; 4],
                holes: vec![
                    Hole::new("_justin_base", 0, 0, Pc::Absolute),
                    Hole::new("PyLong_Type", 0, 0, Pc::Absolute),
                ],
            },
        );
        let header = emit_header(&stencils).unwrap();
        assert!(header.contains(".symbol = \"PyLong_Type\""));
        assert!(header.contains(".symbol = NULL"));
    }
}
