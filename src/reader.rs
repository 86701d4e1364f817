//! Object-file reader adapter (spec §4.D): invoke the reader, trim
//! platform-specific decorations, locate the outermost JSON array, and
//! expose its sections through a neutral wrapper.

use crate::error::{Error, Result};
use serde_json::Value;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

/// The fixed argument set from spec §6.
pub const READER_ARGS: &[&str] = &[
    "--elf-output-style=JSON",
    "--expand-relocs",
    "--pretty-print",
    "--section-data",
    "--section-relocations",
    "--section-symbols",
    "--sections",
];

/// Run the object-file reader on `object_path` and parse its output into a
/// flat sequence of [`Section`]s.
pub async fn read_sections(reader: &str, object_path: &Path) -> Result<Vec<Section>> {
    let output = Command::new(reader)
        .args(READER_ARGS)
        .arg(object_path)
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .output()
        .await?;
    if !output.status.success() {
        return Err(Error::ExternalProcessFailed(
            reader.to_string(),
            object_path.display().to_string(),
            output.status.code().unwrap_or(-1),
        ));
    }
    parse_reader_output(&output.stdout)
}

/// Pure parsing half of [`read_sections`], split out so it's testable
/// without a real `llvm-readobj` on hand.
pub fn parse_reader_output(raw: &[u8]) -> Result<Vec<Section>> {
    let mut text = String::from_utf8_lossy(raw).into_owned();
    // Mach-O's --pretty-print output interleaves these bare decorations.
    text = text.replace("PrivateExtern\n", "\n");
    text = text.replace("Extern\n", "\n");
    let start = text
        .find('[')
        .ok_or_else(|| Error::Malformed("no JSON array found in reader output".into()))?;
    let end = text
        .rfind(']')
        .ok_or_else(|| Error::Malformed("no JSON array found in reader output".into()))?;
    if end < start {
        return Err(Error::Malformed("unbalanced JSON array in reader output".into()));
    }
    let document: Value = serde_json::from_str(&text[start..=end])?;
    let entries = document
        .as_array()
        .ok_or_else(|| Error::Malformed("outermost JSON value is not an array".into()))?;
    entries
        .iter()
        .map(|entry| {
            entry
                .get("Section")
                .cloned()
                .ok_or_else(|| Error::Malformed("array entry missing \"Section\" key".into()))
                .map(Section)
        })
        .collect()
}

/// A single parsed object-file section, still in its raw per-format JSON
/// shape. Accessors translate field-shape mismatches into [`Error::Malformed`]
/// instead of panicking, since every upstream `KeyError`/`AssertionError` has
/// to become a recoverable (if still fatal-at-the-top) `Result` here.
#[derive(Debug, Clone)]
pub struct Section(pub Value);

fn field<'a>(value: &'a Value, key: &str) -> Result<&'a Value> {
    value
        .get(key)
        .ok_or_else(|| Error::Malformed(format!("missing field {key:?}")))
}

fn as_u64(value: &Value, key: &str) -> Result<u64> {
    field(value, key)?
        .as_u64()
        .ok_or_else(|| Error::Malformed(format!("field {key:?} is not an unsigned integer")))
}

fn as_str<'a>(value: &'a Value, key: &str) -> Result<&'a str> {
    field(value, key)?
        .as_str()
        .ok_or_else(|| Error::Malformed(format!("field {key:?} is not a string")))
}

/// Unwraps `{"Value": "..."}`-shaped fields used throughout the reader's
/// JSON output for enum-valued fields.
fn value_field<'a>(value: &'a Value, key: &str) -> Result<&'a str> {
    as_str(field(value, key)?, "Value")
}

impl Section {
    pub fn index(&self) -> Result<u64> {
        as_u64(&self.0, "Index")
    }

    pub fn number(&self) -> Result<u64> {
        as_u64(&self.0, "Number")
    }

    pub fn name(&self) -> Result<&str> {
        value_field(&self.0, "Name")
    }

    /// ELF `Type.Value`, e.g. `"SHT_PROGBITS"`.
    pub fn elf_type(&self) -> Result<&str> {
        value_field(&self.0, "Type")
    }

    pub fn address(&self) -> Result<u64> {
        as_u64(&self.0, "Address")
    }

    pub fn info(&self) -> Result<u64> {
        as_u64(&self.0, "Info")
    }

    /// The set of flag names set on this section (ELF `Flags.Flags[].Name`,
    /// or COFF `Characteristics.Flags[].Name`).
    pub fn flag_names(&self, key: &str) -> Result<Vec<String>> {
        let flags = field(&self.0, key)?;
        let list = field(flags, "Flags")?
            .as_array()
            .ok_or_else(|| Error::Malformed(format!("{key}.Flags is not an array")))?;
        list.iter()
            .map(|flag| as_str(flag, "Name").map(str::to_string))
            .collect()
    }

    pub fn section_data_bytes(&self) -> Result<Vec<u8>> {
        let data = field(&self.0, "SectionData")?;
        let bytes = field(data, "Bytes")?
            .as_array()
            .ok_or_else(|| Error::Malformed("SectionData.Bytes is not an array".into()))?;
        bytes
            .iter()
            .map(|b| {
                b.as_u64()
                    .filter(|v| *v <= 0xff)
                    .map(|v| v as u8)
                    .ok_or_else(|| Error::Malformed("SectionData.Bytes entry not a byte".into()))
            })
            .collect()
    }

    pub fn has_section_data(&self) -> bool {
        self.0.get("SectionData").is_some()
    }

    fn unwrap_list<'a>(&'a self, key: &str, wrapper: &str) -> Result<Vec<&'a Value>> {
        match self.0.get(key) {
            None => Ok(Vec::new()),
            Some(list) => list
                .as_array()
                .ok_or_else(|| Error::Malformed(format!("{key} is not an array")))?
                .iter()
                .map(|entry| {
                    entry
                        .get(wrapper)
                        .ok_or_else(|| Error::Malformed(format!("{key} entry missing {wrapper:?}")))
                })
                .collect(),
        }
    }

    pub fn relocations(&self) -> Result<Vec<&Value>> {
        self.unwrap_list("Relocations", "Relocation")
    }

    pub fn symbols(&self) -> Result<Vec<&Value>> {
        self.unwrap_list("Symbols", "Symbol")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_array_with_macho_decorations_stripped() {
        let raw = br#"Blah PrivateExtern
Extern
[{"Section": {"Index": 0, "Name": {"Value": "__text"}}}]
"#;
        let sections = parse_reader_output(raw).unwrap();
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].name().unwrap(), "__text");
    }

    #[test]
    fn missing_array_is_malformed() {
        let err = parse_reader_output(b"no json here").unwrap_err();
        assert!(matches!(err, Error::Malformed(_)));
    }

    #[test]
    fn section_data_bytes_roundtrip() {
        let section = Section(serde_json::json!({
            "SectionData": {"Offset": 0, "Bytes": [0, 1, 255]}
        }));
        assert_eq!(section.section_data_bytes().unwrap(), vec![0, 1, 255]);
    }
}
