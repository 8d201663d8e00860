//! Note and solution catalogue built from the definition directories.
//!
//! - `notes_dir/<ID>`: shipped Notes, file name is the ID.
//! - `extra_dir/<ID>.conf`: administrator Notes; they shadow shipped ones.
//! - `solutions_dir/<NAME>.sol`: solutions for the running architecture.

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::ini::{parse_ini_file, ParsedIni};
use crate::solution::parse_solution_file;
use crate::types::{IniFile, Section};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteDefinition {
    pub id: String,
    pub description: String,
    pub version: Option<String>,
    pub path: PathBuf,
    pub ini: IniFile,
    pub duplicates: Vec<(Section, String)>,
}

impl NoteDefinition {
    pub fn load(id: &str, path: &Path) -> Result<Self> {
        let parsed = parse_ini_file(path)
            .with_context(|| format!("loading note definition {id}"))?;
        Ok(Self::from_parsed(id, path, parsed))
    }

    pub fn from_parsed(id: &str, path: &Path, parsed: ParsedIni) -> Self {
        let meta = |key: &str| {
            parsed
                .ini
                .get(&Section::Version, key)
                .map(|e| e.value.clone())
        };
        let description = meta("DESCRIPTION").unwrap_or_default();
        let version = meta("VERSION");
        Self {
            id: id.to_string(),
            description,
            version,
            path: path.to_path_buf(),
            ini: parsed.ini,
            duplicates: parsed.duplicates,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct NoteCatalog {
    notes: BTreeMap<String, NoteDefinition>,
    solutions: BTreeMap<String, Vec<String>>,
}

impl NoteCatalog {
    pub fn load(
        notes_dir: &Path,
        extra_dir: &Path,
        solutions_dir: &Path,
        arch_section: &str,
    ) -> Result<Self> {
        let mut catalog = Self::default();
        for path in files_in(notes_dir) {
            let Some(id) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if id.starts_with('.') {
                continue;
            }
            catalog.insert_note(NoteDefinition::load(id, &path)?);
        }
        for path in files_in(extra_dir) {
            if path.extension().and_then(|e| e.to_str()) != Some("conf") {
                continue;
            }
            let Some(id) = path.file_stem().and_then(|n| n.to_str()) else {
                continue;
            };
            if catalog.notes.contains_key(id) {
                tracing::warn!(note = id, "extra note definition shadows shipped note");
            }
            catalog.insert_note(NoteDefinition::load(id, &path)?);
        }
        for path in files_in(solutions_dir) {
            if path.extension().and_then(|e| e.to_str()) != Some("sol") {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|n| n.to_str()) else {
                continue;
            };
            let notes = parse_solution_file(&path, arch_section)?;
            catalog.insert_solution(name, notes);
        }
        tracing::debug!(
            notes = catalog.notes.len(),
            solutions = catalog.solutions.len(),
            "note catalogue loaded"
        );
        Ok(catalog)
    }

    pub fn insert_note(&mut self, def: NoteDefinition) {
        self.notes.insert(def.id.clone(), def);
    }

    pub fn insert_solution(&mut self, name: &str, notes: Vec<String>) {
        self.solutions.insert(name.to_string(), notes);
    }

    pub fn note(&self, id: &str) -> Option<&NoteDefinition> {
        self.notes.get(id)
    }

    /// Re-read a Note from its file so on-disk edits since start-up are seen.
    /// `Ok(None)` when the file has gone away.
    pub fn reload_note(&self, id: &str) -> Result<Option<NoteDefinition>> {
        let Some(known) = self.notes.get(id) else {
            return Ok(None);
        };
        if !known.path.exists() {
            return Ok(None);
        }
        NoteDefinition::load(id, &known.path).map(Some)
    }

    pub fn contains_note(&self, id: &str) -> bool {
        self.notes.contains_key(id)
    }

    pub fn notes(&self) -> impl Iterator<Item = &NoteDefinition> {
        self.notes.values()
    }

    pub fn solution(&self, name: &str) -> Option<&[String]> {
        self.solutions.get(name).map(Vec::as_slice)
    }

    pub fn solutions(&self) -> impl Iterator<Item = (&String, &Vec<String>)> {
        self.solutions.iter()
    }
}

// ---------- helpers ----------

fn files_in(dir: &Path) -> Vec<PathBuf> {
    if !dir.is_dir() {
        return Vec::new();
    }
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(e) => Some(e),
            Err(err) => {
                tracing::warn!(dir = %dir.display(), error = %err, "skipping unreadable entry");
                None
            }
        })
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .collect()
}
