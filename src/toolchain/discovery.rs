//! Locate a versioned C compiler and object-file reader on the host (spec §4.A).

use crate::error::{Error, Result};
use regex::Regex;
use std::collections::BTreeSet;
use std::process::Command;

/// One located tool: the path or name to invoke, and the major version it
/// reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolVersion {
    pub path: String,
    pub version: u32,
}

fn version_of(path: &str) -> Option<u32> {
    let output = Command::new(path).arg("--version").output().ok()?;
    if !output.status.success() {
        return None;
    }
    let regex = Regex::new(r"version\s+(\d+)\.\d+\.\d+").unwrap();
    let text = String::from_utf8_lossy(&output.stdout);
    let captures = regex.captures(&text)?;
    captures.get(1)?.as_str().parse().ok()
}

/// `brew --prefix llvm@<version>`, for the macOS fallback probe.
fn brew_prefix(version: u32) -> Option<String> {
    let output = Command::new("brew")
        .args(["--prefix", &format!("llvm@{version}")])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let prefix = String::from_utf8_lossy(&output.stdout);
    Some(prefix.trim_end_matches('\n').to_string())
}

/// Probe, in order: the unversioned executable, `<name>-<v>` descending
/// through `versions`, then (macOS only) a homebrew-prefixed path.
pub fn find_llvm_tool(tool: &str, versions: &BTreeSet<u32>) -> Result<ToolVersion> {
    if let Some(version) = version_of(tool) {
        if versions.contains(&version) {
            log::info!("using {tool} ({version})");
            return Ok(ToolVersion {
                path: tool.to_string(),
                version,
            });
        }
    }
    for &version in versions.iter().rev() {
        let versioned = format!("{tool}-{version}");
        log::debug!("probing {versioned}");
        if version_of(&versioned) == Some(version) {
            log::info!("using {versioned} ({version})");
            return Ok(ToolVersion {
                path: versioned,
                version,
            });
        }
        if cfg!(target_os = "macos") {
            if let Some(prefix) = brew_prefix(version) {
                let path = format!("{prefix}/bin/{tool}");
                log::debug!("probing {path}");
                if version_of(&path) == Some(version) {
                    log::info!("using {path} ({version})");
                    return Ok(ToolVersion { path, version });
                }
            }
        }
    }
    Err(Error::ToolchainNotFound(tool.to_string()))
}
