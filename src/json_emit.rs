//! Supplemental machine-readable sibling to the generated header (SPEC_FULL
//! §[MODULE H]), grounded in `disassemble.py`'s need to read stencils back
//! without regexing C source.

use crate::model::{Hole, Pc, Stencil};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Serialize)]
struct HoleJson {
    symbol: String,
    offset: usize,
    addend: i64,
    pc: i32,
}

impl From<&Hole> for HoleJson {
    fn from(hole: &Hole) -> Self {
        HoleJson {
            symbol: hole.symbol.clone(),
            offset: hole.offset,
            addend: hole.addend,
            pc: hole.pc.as_i32(),
        }
    }
}

#[derive(Serialize)]
struct StencilJson {
    bytes_hex: String,
    holes: Vec<HoleJson>,
}

impl From<&Stencil> for StencilJson {
    fn from(stencil: &Stencil) -> Self {
        StencilJson {
            bytes_hex: stencil.body.iter().map(|b| format!("{b:02x}")).collect(),
            holes: stencil.holes.iter().map(HoleJson::from).collect(),
        }
    }
}

pub fn to_json(stencils: &BTreeMap<String, Stencil>) -> serde_json::Result<String> {
    let as_json: BTreeMap<&String, StencilJson> = stencils.iter().map(|(k, v)| (k, v.into())).collect();
    serde_json::to_string_pretty(&as_json)
}
