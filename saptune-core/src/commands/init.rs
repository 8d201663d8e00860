// saptune-core/src/commands/init.rs

use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::CoreConfig;
use crate::utils::fsio::write_atomic;

#[derive(Debug, Clone)]
pub struct InitReport {
    pub root: PathBuf,
    pub config: CoreConfig,
    pub created: Vec<String>,
    pub existed: Vec<String>,
}

// ---------- single global init gate ----------

static INIT: OnceCell<InitReport> = OnceCell::new();

/// Idempotent global initializer for the default root.
pub fn ensure_initialized_once() -> Result<&'static InitReport> {
    INIT.get_or_try_init(|| ensure_initialized(&saptune_root()))
}

/// Installation root. `SAPTUNE_ROOT` overrides `/` (tests, images, chroots).
pub fn saptune_root() -> PathBuf {
    std::env::var_os("SAPTUNE_ROOT")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("/"))
}

/// Create the state directories and the desired-state file if missing.
pub fn ensure_initialized(root: &Path) -> Result<InitReport> {
    let config = CoreConfig::load(root)?;
    let mut created = Vec::new();
    let mut existed = Vec::new();

    let p = &config.paths;
    for dir in [
        &p.saved_state_dir,
        &p.parameter_dir,
        &p.sections_dir,
        &p.override_dir,
    ] {
        ensure_dir(root, dir, &mut created, &mut existed)?;
    }
    ensure_file(
        root,
        &p.sysconfig_file,
        DEFAULT_SYSCONFIG,
        &mut created,
        &mut existed,
    )?;

    Ok(InitReport {
        root: root.to_path_buf(),
        config,
        created,
        existed,
    })
}

fn display_rel(root: &Path, p: &Path) -> String {
    p.strip_prefix(root).unwrap_or(p).display().to_string()
}

fn ensure_dir(
    root: &Path,
    dir: &Path,
    created: &mut Vec<String>,
    existed: &mut Vec<String>,
) -> Result<()> {
    if dir.exists() {
        existed.push(display_rel(root, dir));
        return Ok(());
    }
    fs::create_dir_all(dir).with_context(|| format!("create_dir_all({:?})", dir))?;
    created.push(display_rel(root, dir));
    Ok(())
}

fn ensure_file(
    root: &Path,
    file: &Path,
    content_if_absent: &str,
    created: &mut Vec<String>,
    existed: &mut Vec<String>,
) -> Result<()> {
    if file.exists() {
        existed.push(display_rel(root, file));
        return Ok(());
    }
    write_atomic(file, content_if_absent.as_bytes())?;
    created.push(display_rel(root, file));
    Ok(())
}

// ---------- defaults ----------

const DEFAULT_SYSCONFIG: &str = r#"## Path:        SAP/System Tuning/General
## Description: Global settings for saptune
## Type:        string
## Default:     ""
#
# Solutions enabled for tuning, separated by blanks.
TUNE_FOR_SOLUTIONS=""

# Notes enabled for tuning in addition to the notes of the solutions above.
TUNE_FOR_NOTES=""

# Order in which the notes were applied. Maintained by saptune, do not edit.
NOTE_APPLY_ORDER=""
"#;
