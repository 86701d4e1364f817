//! Template assembly: splice an opcode's C body into the fixed C template
//! and apply the two optional source-level rewrites (spec §4.B).

use crate::config::TosCacheDepth;

/// Replace `stack_pointer[-i]` with `_tos{i}` for `i` in `1..=depth`, and
/// delete any line mentioning `_tos{j}` for `j > depth`. `depth = 0` strips
/// every `_tos*` line, matching the default in spec §4.B.
pub fn apply_tos_caching(body: &str, depth: TosCacheDepth) -> String {
    let depth = depth.get();
    let mut text = body.to_string();
    for i in 1..=depth {
        let needle = format!(" = stack_pointer[-{i}];");
        let replacement = format!(" = _tos{i};");
        text = text.replace(&needle, &replacement);
    }
    text.lines()
        .filter(|line| {
            !(depth + 1..=4).any(|j| line.contains(&format!("_tos{j}")))
        })
        .collect::<Vec<_>>()
        .join("\n")
        + if text.ends_with('\n') { "\n" } else { "" }
}

/// Prepend `ghccc` to the declared return type of the two well-known entry
/// symbols, on the *LLVM IR* text (after the first compile pass), per
/// spec §4.B. A no-op unless `enable` is set.
pub fn apply_ghccc(ir: &str, enable: bool) -> String {
    if !enable {
        return ir.to_string();
    }
    ir.replace("i32 @_justin_continue", "ghccc i32 @_justin_continue")
        .replace("i32 @_justin_entry", "ghccc i32 @_justin_entry")
}

/// Splice `body` into the primary template's single substitution point.
/// The template uses a literal `{body}` marker rather than C's `%s`
/// (straight `format!`/`%`-style substitution on an arbitrary case body
/// containing braces would be wrong either way; `str::replacen` sidesteps
/// both problems identically).
pub fn assemble_case(template: &str, body: &str, depth: TosCacheDepth) -> String {
    let cased = apply_tos_caching(body, depth);
    template.replacen("{body}", &cased, 1)
}

/// The trampoline template is used verbatim (spec §6).
pub fn assemble_trampoline(trampoline_template: &str) -> String {
    trampoline_template.to_string()
}
