//! End-to-end coverage of the part of the pipeline that doesn't need a real
//! C toolchain on the test machine: feed synthetic object-reader sections
//! straight into the parser, then through header and JSON emission.

use serde_json::json;
use stencilgen::format::Format;
use stencilgen::header::emit_header;
use stencilgen::json_emit::to_json;
use stencilgen::parser::parse;
use stencilgen::reader::Section;
use std::collections::BTreeMap;

fn trampoline() -> stencilgen::Stencil {
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
            "Relocations": [{"Relocation": {
                "Addend": 0, "Offset": 0,
                "Symbol": {"Value": "_justin_base"},
                "Type": {"Value": "R_X86_64_64"},
            }}],
        })),
    ];
    parse(Format::Elf, "", &sections).unwrap()
}

#[test]
fn synthetic_elf_opcode_round_trips_through_header_and_json() {
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
                "Symbol": {"Value": "PyLong_Type"},
                "Type": {"Value": "R_X86_64_64"},
            }}],
        })),
    ];
    let stencil = parse(Format::Elf, "", &sections).unwrap();
    assert_eq!(stencil.body.len(), 16);

    let mut stencils = BTreeMap::new();
    stencils.insert("NOP".to_string(), stencil);
    stencils.insert("trampoline".to_string(), trampoline());

    let header = emit_header(&stencils).unwrap();
    assert!(header.contains("NOP_stencil_bytes"));
    assert!(header.contains(".symbol = \"PyLong_Type\""));
    assert!(header.contains("[NOP] = INIT_STENCIL(NOP)"));

    let json = to_json(&stencils).unwrap();
    assert!(json.contains("\"NOP\""));
    assert!(json.contains("PyLong_Type"));
}

#[test]
fn unsupported_relocation_aborts_before_any_header_is_produced() {
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
    assert!(parse(Format::Elf, "", &sections).is_err());
}

#[test]
fn windows_config_parsing_matches_the_fixed_set() {
    use stencilgen::PlatformConfig;

    let release_x64 = PlatformConfig::parse_windows_config("Release|x64").unwrap();
    assert_eq!(release_x64.symbol_prefix(), "");
    assert!(release_x64.extra_cflags().is_empty());

    let debug_win32 = PlatformConfig::parse_windows_config("Debug|Win32").unwrap();
    assert_eq!(debug_win32.symbol_prefix(), "_");
    assert_eq!(debug_win32.extra_cflags(), vec!["-m32", "-D_DEBUG"]);

    assert!(PlatformConfig::parse_windows_config("Nonsense").is_err());
    assert!(PlatformConfig::parse_windows_config("Release|ia64").is_err());
}
