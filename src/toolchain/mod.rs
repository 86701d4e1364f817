//! Tool discovery (spec §4.A).

mod discovery;

pub use discovery::{find_llvm_tool, ToolVersion};

use crate::config::StencilConfig;
use crate::error::Result;

/// The two tools the rest of the pipeline needs: a compiler and an
/// object-file reader.
#[derive(Debug, Clone)]
pub struct Toolchain {
    pub clang: ToolVersion,
    pub readobj: ToolVersion,
}

impl Toolchain {
    pub fn discover(config: &StencilConfig) -> Result<Self> {
        let clang = find_llvm_tool("clang", &config.acceptable_llvm_versions)?;
        let readobj = find_llvm_tool("llvm-readobj", &config.acceptable_llvm_versions)?;
        log::info!(
            "using {} ({}) and {} ({})",
            clang.path,
            clang.version,
            readobj.path,
            readobj.version
        );
        Ok(Toolchain { clang, readobj })
    }
}
