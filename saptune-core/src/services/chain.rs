// src/services/chain.rs
//! Parameter chain store: per-parameter ordered contribution history.
//!
//! - One JSON file per parameter under `<parameter_dir>/<key>`.
//! - Entry 0 is always `"start"`, the value found before any note touched it.
//! - The effective value is the value of the last entry.
//! - A note ID appears at most once; order follows the global apply order.
//!
//! Unparsable chain files are logged and treated as empty.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use notedefs::types::null_as_default;

use crate::utils::fsio::{
    key_from_file_name, list_file_names, read_json_lenient, remove_if_exists, store_file_name,
    write_json,
};

/// Note ID of the pristine-value entry.
pub const START: &str = "start";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contribution {
    #[serde(rename = "NoteID")]
    pub note_id: String,
    #[serde(rename = "Value")]
    pub value: String,
}

impl Contribution {
    pub fn new(note_id: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            note_id: note_id.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterChain {
    #[serde(rename = "AllNotes", default, deserialize_with = "null_as_default")]
    pub entries: Vec<Contribution>,
}

impl ParameterChain {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// True once at least one note sits on top of `"start"`.
    pub fn has_contributors(&self) -> bool {
        self.entries.len() > 1
    }

    pub fn start_value(&self) -> Option<&str> {
        self.entries
            .first()
            .filter(|c| c.note_id == START)
            .map(|c| c.value.as_str())
    }

    pub fn tail(&self) -> Option<&Contribution> {
        self.entries.last()
    }

    pub fn effective_value(&self) -> Option<&str> {
        self.tail().map(|c| c.value.as_str())
    }

    /// Position of `note_id`; 0 means "not present" (index 0 is `"start"`).
    pub fn position_of(&self, note_id: &str) -> usize {
        if note_id == START || self.entries.len() < 2 {
            return 0;
        }
        self.entries
            .iter()
            .position(|c| c.note_id == note_id)
            .unwrap_or(0)
    }

    pub fn contains(&self, note_id: &str) -> bool {
        self.position_of(note_id) != 0
    }

    pub fn is_tail(&self, note_id: &str) -> bool {
        let pos = self.position_of(note_id);
        pos != 0 && pos == self.entries.len() - 1
    }

    pub fn value_of(&self, note_id: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|c| c.note_id == note_id)
            .map(|c| c.value.as_str())
    }

    /// Contributing note IDs in chain order, `"start"` excluded.
    pub fn note_ids(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().skip(1).map(|c| c.note_id.as_str())
    }
}

/// Chain position the given note should take: the position of the first
/// note that comes after `note_id` in `apply_order` and is already in the
/// chain, or 0 when there is none (append).
pub fn insertion_index(note_id: &str, apply_order: &[String], chain: &ParameterChain) -> usize {
    let Some(start) = apply_order.iter().position(|n| n == note_id) else {
        return 0;
    };
    apply_order[start + 1..]
        .iter()
        .map(|later| chain.position_of(later))
        .find(|&pos| pos != 0)
        .unwrap_or(0)
}

/// Result of removing one note from a parameter chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainRevert {
    /// No chain, or only `"start"`: the parameter is not managed.
    Unmanaged,
    /// The chain exists but holds no entry for the note.
    NotPresent,
    /// The note was the tail. `value` (owned by `owner`) is now effective and
    /// must be re-applied. `collapsed` is set when only `"start"` was left and
    /// the chain file has been deleted.
    Tail {
        value: String,
        owner: String,
        collapsed: bool,
    },
    /// The note was shadowed by `successor`; the live value is unaffected but
    /// the successor's saved pre-value is now `predecessor_value`.
    Shadowed {
        successor: String,
        predecessor_value: String,
    },
}

/// Filesystem-backed chain store.
#[derive(Debug, Clone)]
pub struct ChainStore {
    dir: PathBuf,
}

impl ChainStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).with_context(|| format!("create_dir_all({:?})", dir))?;
        Ok(Self { dir })
    }

    fn path(&self, key: &str) -> Result<PathBuf> {
        Ok(self.dir.join(store_file_name(key)?))
    }

    /// Load a chain; a missing or corrupt file yields an empty chain.
    pub fn load(&self, key: &str) -> Result<ParameterChain> {
        let path = self.path(key)?;
        Ok(read_json_lenient::<ParameterChain>(&path, "parameter chain")?.unwrap_or_default())
    }

    fn save(&self, key: &str, chain: &ParameterChain) -> Result<()> {
        write_json(&self.path(key)?, chain)
    }

    pub fn remove(&self, key: &str) -> Result<bool> {
        remove_if_exists(&self.path(key)?)
    }

    /// Record the pristine value. No-op when a chain already exists.
    ///
    /// # Returns
    /// * `Ok(true)` when the chain was created.
    pub fn start_value(&self, key: &str, value: &str) -> Result<bool> {
        let chain = self.load(key)?;
        if !chain.is_empty() {
            return Ok(false);
        }
        let chain = ParameterChain {
            entries: vec![Contribution::new(START, value)],
        };
        self.save(key, &chain)?;
        tracing::debug!(key, value, "chain started");
        Ok(true)
    }

    /// Add `note_id` at the end. Fails if it is already present or the chain
    /// has no `"start"` entry yet.
    pub fn append(&self, key: &str, note_id: &str, value: &str) -> Result<()> {
        let mut chain = self.load(key)?;
        if chain.is_empty() {
            anyhow::bail!("parameter {key}: no start value recorded");
        }
        if chain.contains(note_id) {
            anyhow::bail!("parameter {key}: note {note_id} already in chain");
        }
        chain.entries.push(Contribution::new(note_id, value));
        self.save(key, &chain)
    }

    /// Insert `note_id` at `index` (1..=len). Entries from `index` on move
    /// one position back.
    pub fn insert_before(&self, key: &str, note_id: &str, value: &str, index: usize) -> Result<()> {
        let mut chain = self.load(key)?;
        if chain.is_empty() {
            anyhow::bail!("parameter {key}: no start value recorded");
        }
        if chain.contains(note_id) {
            anyhow::bail!("parameter {key}: note {note_id} already in chain");
        }
        if index == 0 || index > chain.entries.len() {
            anyhow::bail!(
                "parameter {key}: insert position {index} out of range 1..={}",
                chain.entries.len()
            );
        }
        chain.entries.insert(index, Contribution::new(note_id, value));
        self.save(key, &chain)
    }

    /// Update the value of an existing entry in place.
    pub fn replace(&self, key: &str, note_id: &str, value: &str) -> Result<()> {
        let mut chain = self.load(key)?;
        let pos = chain.position_of(note_id);
        if pos == 0 {
            anyhow::bail!("parameter {key}: note {note_id} not in chain");
        }
        chain.entries[pos].value = value.to_string();
        self.save(key, &chain)
    }

    /// Position of `note_id` in the chain of `key`; 0 means absent.
    pub fn position_of(&self, key: &str, note_id: &str) -> Result<usize> {
        Ok(self.load(key)?.position_of(note_id))
    }

    /// Remove `note_id` from the chain of `key`.
    ///
    /// # Behavior
    /// - Tail removal reports the new tail value to re-apply.
    /// - Mid-chain removal reports the successor and its new predecessor value.
    /// - When only `"start"` remains the chain file is deleted, also when
    ///   it held nothing else to begin with.
    pub fn revert(&self, key: &str, note_id: &str) -> Result<ChainRevert> {
        let mut chain = self.load(key)?;
        if !chain.has_contributors() {
            if !chain.is_empty() {
                self.remove(key)?;
                tracing::debug!(key, "chain without contributors removed");
            }
            return Ok(ChainRevert::Unmanaged);
        }
        let pos = chain.position_of(note_id);
        if pos == 0 {
            return Ok(ChainRevert::NotPresent);
        }
        let was_tail = pos == chain.entries.len() - 1;
        chain.entries.remove(pos);

        if !was_tail {
            let outcome = ChainRevert::Shadowed {
                successor: chain.entries[pos].note_id.clone(),
                predecessor_value: chain.entries[pos - 1].value.clone(),
            };
            self.save(key, &chain)?;
            return Ok(outcome);
        }

        let tail = chain.entries[pos - 1].clone();
        let collapsed = !chain.has_contributors();
        if collapsed {
            self.remove(key)?;
            tracing::debug!(key, "chain collapsed to start value, parameter released");
        } else {
            self.save(key, &chain)?;
        }
        Ok(ChainRevert::Tail {
            value: tail.value,
            owner: tail.note_id,
            collapsed,
        })
    }

    /// Keys of every chain file currently on disk.
    pub fn keys(&self) -> Result<Vec<String>> {
        Ok(list_file_names(&self.dir)?
            .iter()
            .map(|f| key_from_file_name(f))
            .collect())
    }
}
