// src/services/state.rs
//! Saved-state store: one JSON snapshot per applied note.
//!
//! The snapshot records, per parameter, the value that was visible just
//! before the note took effect. Its presence is what marks a note as applied.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use notedefs::types::null_as_default;

use crate::utils::fsio::{list_file_names, read_json_lenient, remove_if_exists, store_file_name, write_json};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedState {
    #[serde(rename = "ConfFilePath", default)]
    pub conf_file_path: String,
    #[serde(rename = "ID", default)]
    pub id: String,
    #[serde(rename = "DescriptiveName", default)]
    pub descriptive_name: String,
    /// Parameter key -> value seen before this note was applied.
    #[serde(rename = "SysctlParams", default, deserialize_with = "null_as_default")]
    pub values: BTreeMap<String, String>,
    #[serde(rename = "ValuesToApply", default, deserialize_with = "null_as_default")]
    pub values_to_apply: BTreeMap<String, String>,
    /// Override values in effect when the note was applied.
    #[serde(rename = "OverrideParams", default, deserialize_with = "null_as_default")]
    pub override_params: BTreeMap<String, String>,
    #[serde(rename = "Inform", default, deserialize_with = "null_as_default")]
    pub inform: BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct SavedStateStore {
    dir: PathBuf,
}

impl SavedStateStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).with_context(|| format!("create_dir_all({:?})", dir))?;
        Ok(Self { dir })
    }

    fn path(&self, note_id: &str) -> Result<PathBuf> {
        Ok(self.dir.join(store_file_name(note_id)?))
    }

    /// True when a state file exists for the note, even an empty one.
    pub fn exists(&self, note_id: &str) -> bool {
        self.path(note_id).map(|p| p.exists()).unwrap_or(false)
    }

    pub fn store(&self, note_id: &str, state: &SavedState) -> Result<()> {
        write_json(&self.path(note_id)?, state)
    }

    /// Write the snapshot only if none exists yet; the first snapshot is the
    /// one every later revert goes back to.
    pub fn store_if_absent(&self, note_id: &str, state: &SavedState) -> Result<bool> {
        if self.exists(note_id) {
            return Ok(false);
        }
        self.store(note_id, state)?;
        Ok(true)
    }

    /// `Ok(None)` when absent, empty or corrupt.
    pub fn retrieve(&self, note_id: &str) -> Result<Option<SavedState>> {
        read_json_lenient(&self.path(note_id)?, "saved state")
    }

    pub fn remove(&self, note_id: &str) -> Result<bool> {
        remove_if_exists(&self.path(note_id)?)
    }

    /// Note IDs with a state file.
    pub fn list(&self) -> Result<Vec<String>> {
        list_file_names(&self.dir)
    }

    /// Correct one recorded pre-value of another note (used when a chain
    /// neighbour changes underneath it). No-op if that note has no state.
    pub fn set_value(&self, note_id: &str, key: &str, value: &str) -> Result<bool> {
        let Some(mut state) = self.retrieve(note_id)? else {
            return Ok(false);
        };
        state.values.insert(key.to_string(), value.to_string());
        self.store(note_id, &state)?;
        Ok(true)
    }
}
