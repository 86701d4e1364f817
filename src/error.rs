//! Error taxonomy for the stencil generator (spec §7).
//!
//! No error is ever recovered locally: every fallible operation propagates
//! with `?`, and the only place an [`Error`] is rendered for a human is the
//! CLI driver's `main`.

use core::result;

quick_error::quick_error! {
    #[derive(Debug)]
    pub enum Error {
        Io(err: std::io::Error) {
            from()
            display("I/O error: {}", err)
        }
        Json(err: serde_json::Error) {
            from()
            display("failed to parse object-reader JSON: {}", err)
        }
        /// No acceptable compiler/reader version was found on the host (§4.A).
        ToolchainNotFound(tool: String) {
            display("could not find an acceptable version of {}", tool)
        }
        /// A subprocess (compiler or object-file reader) exited non-zero.
        ExternalProcessFailed(tool: String, opcode: String, code: i32) {
            display("{} exited with status {} while building {}", tool, code, opcode)
        }
        /// A relocation kind or shape outside §4.F's supported set.
        UnsupportedRelocation(record: String) {
            display("unsupported relocation record: {}", record)
        }
        /// An ELF section type outside §4.E's accepted/ignored sets.
        UnsupportedSectionType(kind: String) {
            display("unsupported ELF section type: {}", kind)
        }
        /// A consistency check failed: nonzero implicit addend where forbidden,
        /// a hole targeting a `dupes` symbol, a missing linked section, etc.
        InvariantViolation(msg: String) {
            display("invariant violation: {}", msg)
        }
        /// An unknown `--windows <Config>|<Arch>` string, or `--windows` used
        /// off Windows, or omitted on Windows.
        PlatformConfigMissing(msg: String) {
            display("platform configuration error: {}", msg)
        }
        /// The object-reader adapter could not make sense of the tool's output.
        Malformed(msg: String) {
            display("malformed object-reader output: {}", msg)
        }
    }
}

pub type Result<T> = result::Result<T, Error>;
