// src/services/overrides.rs
//! Override layer.
//!
//! Resolution per parameter: override value (unless untouched) > declared
//! value > leave the current value alone. An override operator replaces the
//! declared one. The merged view is what section snapshots persist.

use anyhow::Result;
use std::collections::BTreeMap;
use std::path::PathBuf;

use notedefs::{parse_ini_file, IniEntry, IniFile, Operator, Section};

use crate::utils::fsio::store_file_name;

/// Override value meaning "do not manage this parameter".
pub const UNTOUCHED: &str = "untouched";

/// What a note wants for one parameter once overrides are applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Value { operator: Operator, value: String },
    Untouched,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    pub section: Section,
    pub key: String,
    pub target: Target,
    /// True when an override entry decided the target.
    pub overridden: bool,
}

impl Declaration {
    pub fn is_untouched(&self) -> bool {
        matches!(self.target, Target::Untouched)
    }

    /// Snapshot form; untouched is stored as an empty value.
    pub fn to_entry(&self) -> IniEntry {
        match &self.target {
            Target::Value { operator, value } => {
                IniEntry::new(self.section.clone(), self.key.clone(), *operator, value.clone())
            }
            Target::Untouched => {
                IniEntry::new(self.section.clone(), self.key.clone(), Operator::Equal, "")
            }
        }
    }

    pub fn from_entry(entry: &IniEntry) -> Self {
        Self {
            section: entry.section.clone(),
            key: entry.key.clone(),
            target: target_of(entry),
            overridden: false,
        }
    }
}

/// A note's declarations after override resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergedNote {
    pub declarations: Vec<Declaration>,
    /// Key -> override value, `untouched` for suppressed keys.
    pub override_params: BTreeMap<String, String>,
}

impl MergedNote {
    pub fn get(&self, key: &str) -> Option<&Declaration> {
        self.declarations.iter().find(|d| d.key == key)
    }

    pub fn managed(&self) -> impl Iterator<Item = &Declaration> {
        self.declarations.iter().filter(|d| !d.is_untouched())
    }

    pub fn to_snapshot(&self) -> IniFile {
        let mut ini = IniFile::new();
        for d in &self.declarations {
            ini.push(d.to_entry());
        }
        ini
    }

    pub fn from_snapshot(snapshot: &IniFile) -> Self {
        Self {
            declarations: snapshot.entries().map(Declaration::from_entry).collect(),
            override_params: BTreeMap::new(),
        }
    }
}

/// Merge an optional override file into the declared parameters.
/// Informational sections (`version`, `reminder`) are dropped.
pub fn merge(declared: &IniFile, overrides: Option<&IniFile>) -> MergedNote {
    let mut merged = MergedNote::default();
    for entry in declared.entries() {
        if entry.section.is_informational() {
            continue;
        }
        let over = overrides.and_then(|o| o.get(&entry.section, &entry.key));
        let decl = match over {
            Some(o) => {
                let target = target_of(o);
                let recorded = match &target {
                    Target::Untouched => UNTOUCHED.to_string(),
                    Target::Value { value, .. } => value.clone(),
                };
                merged.override_params.insert(entry.key.clone(), recorded);
                Declaration {
                    section: entry.section.clone(),
                    key: entry.key.clone(),
                    target,
                    overridden: true,
                }
            }
            None => Declaration::from_entry(entry),
        };
        merged.declarations.push(decl);
    }
    if let Some(o) = overrides {
        for extra in o.entries().filter(|e| declared.get(&e.section, &e.key).is_none()) {
            tracing::debug!(
                section = %extra.section,
                key = %extra.key,
                "override entry has no matching note declaration, ignored"
            );
        }
    }
    merged
}

fn target_of(entry: &IniEntry) -> Target {
    let value = entry.value.trim();
    if value.is_empty() || value == UNTOUCHED {
        Target::Untouched
    } else {
        Target::Value {
            operator: entry.operator,
            value: entry.value.clone(),
        }
    }
}

/// Reads administrator override files, `<override_dir>/<ID>`.
#[derive(Debug, Clone)]
pub struct OverrideStore {
    dir: PathBuf,
}

impl OverrideStore {
    pub fn open(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn load(&self, note_id: &str) -> Result<Option<IniFile>> {
        let path = self.dir.join(store_file_name(note_id)?);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(parse_ini_file(&path)?.ini))
    }
}
