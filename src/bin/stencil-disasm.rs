//! Debug helper: disassemble every stencil body and print basic per-opcode
//! instruction counts, grounded in `disassemble.py`'s capstone-based sanity
//! check. Reads the `--emit-json` sibling of a generated header rather than
//! regexing C source.

use capstone::prelude::*;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::process::ExitCode;

#[derive(Deserialize)]
struct StencilJson {
    bytes_hex: String,
    #[allow(dead_code)]
    holes: Vec<serde_json::Value>,
}

fn decode_hex(hex: &str) -> Vec<u8> {
    hex.as_bytes()
        .chunks(2)
        .map(|pair| u8::from_str_radix(std::str::from_utf8(pair).unwrap(), 16).unwrap())
        .collect()
}

fn main() -> ExitCode {
    let Some(path) = std::env::args().nth(1) else {
        eprintln!("usage: stencil-disasm <stencils.json>");
        return ExitCode::FAILURE;
    };
    let raw = match std::fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(err) => {
            eprintln!("stencil-disasm: {err}");
            return ExitCode::FAILURE;
        }
    };
    let stencils: BTreeMap<String, StencilJson> = match serde_json::from_str(&raw) {
        Ok(stencils) => stencils,
        Err(err) => {
            eprintln!("stencil-disasm: {err}");
            return ExitCode::FAILURE;
        }
    };

    let capstone = Capstone::new()
        .x86()
        .mode(arch::x86::ArchMode::Mode64)
        .build()
        .expect("capstone should support x86-64");

    let mut counts = Vec::new();
    for (opname, stencil) in &stencils {
        let bytes = decode_hex(&stencil.bytes_hex);
        let insns = capstone.disasm_all(&bytes, 0).expect("disassembly should not fail on valid stencil bytes");
        println!();
        println!("{opname}: ninsts = {}", insns.len());
        for insn in insns.iter() {
            println!(
                "    0x{:05x}: {} \t{}",
                insn.address(),
                insn.mnemonic().unwrap_or(""),
                insn.op_str().unwrap_or("")
            );
        }
        counts.push((opname.clone(), insns.len()));
    }

    if !counts.is_empty() {
        let total: usize = counts.iter().map(|(_, n)| n).sum();
        let (max_op, max_n) = counts.iter().max_by_key(|(_, n)| *n).unwrap();
        let (min_op, min_n) = counts.iter().min_by_key(|(_, n)| *n).unwrap();
        println!();
        println!("Average: {}", total as f64 / counts.len() as f64);
        println!("Max: '{max_op}': {max_n}");
        println!("Min: '{min_op}': {min_n}");
    }

    ExitCode::SUCCESS
}
