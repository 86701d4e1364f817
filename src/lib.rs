//! `stencilgen`: the build-time stencil generator for a copy-and-patch JIT.
//!
//! For each supported interpreter opcode this crate compiles a specialized C
//! template to a relocatable object file, parses that object file, lowers
//! its relocations into a table of patch sites ("holes"), and emits a C
//! header declaring one [`model::Stencil`] per opcode. Filling those holes
//! at runtime is out of scope for this crate.

pub mod cases;
pub mod compiler;
pub mod config;
pub mod error;
pub mod format;
pub mod header;
pub mod json_emit;
pub mod model;
pub mod parser;
pub mod reader;
pub mod reloc;
pub mod template;
pub mod toolchain;

pub use config::{PlatformConfig, StencilConfig};
pub use error::{Error, Result};
pub use model::{Hole, HoleKind, Pc, Stencil};
