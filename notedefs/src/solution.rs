//! Solution definition files (`<NAME>.sol`).
//!
//! ```text
//! [ArchX86]
//! 941735 1771258 1980196
//! [ArchPPC64LE]
//! 941735 1771258
//! ```
//!
//! Lines outside any section apply to every architecture.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// Architecture section name for the running build target.
pub fn current_arch_section() -> &'static str {
    arch_section(std::env::consts::ARCH)
}

pub fn arch_section(arch: &str) -> &'static str {
    match arch {
        "powerpc64" | "ppc64le" => "ArchPPC64LE",
        _ => "ArchX86",
    }
}

/// Note IDs a solution lists for `arch_section`, in file order, deduplicated.
pub fn parse_solution(text: &str, arch_section: &str) -> Vec<String> {
    let mut notes: Vec<String> = Vec::new();
    let mut active = true;
    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if line.starts_with('[') && line.ends_with(']') {
            active = line[1..line.len() - 1].trim() == arch_section;
            continue;
        }
        if !active {
            continue;
        }
        for id in line.split_whitespace() {
            if !notes.iter().any(|n| n == id) {
                notes.push(id.to_string());
            }
        }
    }
    notes
}

pub fn parse_solution_file(path: &Path, arch_section: &str) -> Result<Vec<String>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading solution file {}", path.display()))?;
    Ok(parse_solution(&text, arch_section))
}
