// src/services/sections.rs
//! Section snapshots: the post-override declarations of each applied note,
//! stored as `<sections_dir>/<ID>.sections`. Baseline for refresh diffing and
//! the revert fallback when the definition file is gone.

use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;

use notedefs::IniFile;

use crate::utils::fsio::{read_json_lenient, remove_if_exists, store_file_name, write_json};

#[derive(Debug, Clone)]
pub struct SectionStore {
    dir: PathBuf,
}

impl SectionStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).with_context(|| format!("create_dir_all({:?})", dir))?;
        Ok(Self { dir })
    }

    fn path(&self, note_id: &str) -> Result<PathBuf> {
        Ok(self
            .dir
            .join(format!("{}.sections", store_file_name(note_id)?)))
    }

    pub fn store(&self, note_id: &str, snapshot: &IniFile) -> Result<()> {
        write_json(&self.path(note_id)?, snapshot)
    }

    pub fn load(&self, note_id: &str) -> Result<Option<IniFile>> {
        read_json_lenient(&self.path(note_id)?, "section snapshot")
    }

    pub fn remove(&self, note_id: &str) -> Result<bool> {
        remove_if_exists(&self.path(note_id)?)
    }
}
