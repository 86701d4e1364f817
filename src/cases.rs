//! Extraction of per-opcode C case bodies from the upstream generated
//! dispatch table (spec §6, supplemental to the distilled spec's "the core
//! consumes an already-parsed mapping").

use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;

fn case_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?s) {8}TARGET\((\w+)\) \{\n.*?\n {8}\}").unwrap())
}

/// Parse `^ {8}TARGET\((\w+)\) \{\n.*?\n {8}\}$`-shaped blocks out of a
/// generated dispatch table, keeping the `TARGET(OP) { ... }` wrapper intact
/// (the template is spliced around the whole block, not just its
/// statements) and reindenting the whole block from 8 spaces to 4.
pub fn extract_cases(generated_cases: &str) -> BTreeMap<String, String> {
    let mut cases = BTreeMap::new();
    for captures in case_pattern().captures_iter(generated_cases) {
        let whole = captures.get(0).unwrap().as_str();
        let opname = captures[1].to_string();
        cases.insert(opname, reindent(whole));
    }
    cases
}

/// Every run of 8 literal spaces becomes 4, left to right, non-overlapping —
/// a 16-space line dedents to 8, not 12.
fn reindent(body: &str) -> String {
    body.replace("        ", "    ")
}
