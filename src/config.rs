//! Ambient configuration: LLVM version selection, target-platform symbol
//! conventions, and the optional template rewrites from spec §4.B.

use crate::error::{Error, Result};
use std::collections::BTreeSet;

/// `PYTHON_LLVM_VERSION`'s Rust-side equivalent: narrows the acceptable
/// LLVM major version set to a single value when set.
pub const LLVM_VERSION_ENV: &str = "STENCILGEN_LLVM_VERSION";

/// The three platform families spec §4.E/§6 give distinct section-walking
/// and symbol-prefix rules for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformConfig {
    /// ELF, no leading-underscore stripping.
    Elf,
    /// Mach-O; symbols are stored with a leading underscore.
    MachO,
    /// COFF, selected by `--windows <Config>|<Arch>` (spec §6).
    Coff {
        arch: CoffArch,
        debug: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoffArch {
    Win32,
    X64,
}

impl PlatformConfig {
    /// The prefix stripped from every symbol name before it is recorded
    /// (spec §3 "symbol_prefix").
    pub fn symbol_prefix(&self) -> &'static str {
        match self {
            PlatformConfig::Elf => "",
            PlatformConfig::MachO => "_",
            PlatformConfig::Coff { arch: CoffArch::Win32, .. } => "_",
            PlatformConfig::Coff { arch: CoffArch::X64, .. } => "",
        }
    }

    /// Extra CFLAGS this platform configuration adds on top of §4.C's
    /// fixed set (spec §6: `-m32` for Win32, `-D_DEBUG` for Debug builds).
    pub fn extra_cflags(&self) -> Vec<&'static str> {
        match self {
            PlatformConfig::Elf | PlatformConfig::MachO => vec![],
            PlatformConfig::Coff { arch, debug } => {
                let mut flags = Vec::new();
                if *arch == CoffArch::Win32 {
                    flags.push("-m32");
                }
                if *debug {
                    flags.push("-D_DEBUG");
                }
                flags
            }
        }
    }

    /// Parse a `--windows <Config>|<Arch>` argument per spec §6's fixed set:
    /// `{Debug, PGInstrument, PGUpdate, Release} x {Win32, x64}`.
    pub fn parse_windows_config(raw: &str) -> Result<PlatformConfig> {
        let (config, arch) = raw.split_once('|').ok_or_else(|| {
            Error::PlatformConfigMissing(format!("expected `<Config>|<Arch>`, got {raw:?}"))
        })?;
        let arch = match arch {
            "Win32" => CoffArch::Win32,
            "x64" => CoffArch::X64,
            other => {
                return Err(Error::PlatformConfigMissing(format!(
                    "unknown architecture {other:?}"
                )))
            }
        };
        let debug = match config {
            "Debug" => true,
            "PGInstrument" | "PGUpdate" | "Release" => false,
            other => {
                return Err(Error::PlatformConfigMissing(format!(
                    "unknown configuration {other:?}"
                )))
            }
        };
        Ok(PlatformConfig::Coff { arch, debug })
    }
}

/// Top-of-stack cache depth, `k` in spec §4.B: `0..=4`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TosCacheDepth(u8);

impl TosCacheDepth {
    pub fn new(depth: u8) -> Result<Self> {
        if depth > 4 {
            return Err(Error::InvariantViolation(format!(
                "top-of-stack cache depth must be 0..=4, got {depth}"
            )));
        }
        Ok(TosCacheDepth(depth))
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl Default for TosCacheDepth {
    fn default() -> Self {
        TosCacheDepth(0)
    }
}

/// Everything the pipeline needs that isn't per-opcode data.
#[derive(Debug, Clone)]
pub struct StencilConfig {
    pub platform: PlatformConfig,
    pub acceptable_llvm_versions: BTreeSet<u32>,
    pub tos_cache_depth: TosCacheDepth,
    pub use_ghccc: bool,
}

impl StencilConfig {
    pub fn for_host(platform: PlatformConfig) -> Self {
        let mut acceptable_llvm_versions: BTreeSet<u32> = [14, 15, 16].into_iter().collect();
        if let Ok(forced) = std::env::var(LLVM_VERSION_ENV) {
            if let Ok(v) = forced.parse() {
                acceptable_llvm_versions = [v].into_iter().collect();
            }
        }
        StencilConfig {
            platform,
            acceptable_llvm_versions,
            tos_cache_depth: TosCacheDepth::default(),
            use_ghccc: false,
        }
    }
}
