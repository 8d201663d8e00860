// src/services/appconfig.rs
//! Desired state: enabled solutions, explicitly enabled notes and the global
//! apply order, kept in the sysconfig file.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use notedefs::Sysconfig;

use crate::utils::fsio::write_atomic;

pub const TUNE_FOR_SOLUTIONS: &str = "TUNE_FOR_SOLUTIONS";
pub const TUNE_FOR_NOTES: &str = "TUNE_FOR_NOTES";
pub const NOTE_APPLY_ORDER: &str = "NOTE_APPLY_ORDER";

#[derive(Debug, Clone)]
pub struct AppConfig {
    path: PathBuf,
    raw: Sysconfig,
    /// Sorted.
    pub tune_for_solutions: Vec<String>,
    /// Sorted. Notes enabled on their own, not through a solution.
    pub tune_for_notes: Vec<String>,
    /// Never sorted.
    pub note_apply_order: Vec<String>,
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = Sysconfig::load(path)?;
        let mut cfg = Self {
            path: path.to_path_buf(),
            tune_for_solutions: raw.get_list(TUNE_FOR_SOLUTIONS),
            tune_for_notes: raw.get_list(TUNE_FOR_NOTES),
            note_apply_order: raw.get_list(NOTE_APPLY_ORDER),
            raw,
        };
        cfg.tune_for_solutions.sort();
        cfg.tune_for_solutions.dedup();
        cfg.tune_for_notes.sort();
        cfg.tune_for_notes.dedup();
        Ok(cfg)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn save(&mut self) -> Result<()> {
        self.tune_for_solutions.sort();
        self.tune_for_solutions.dedup();
        self.tune_for_notes.sort();
        self.tune_for_notes.dedup();
        self.raw.set_list(TUNE_FOR_SOLUTIONS, &self.tune_for_solutions);
        self.raw.set_list(TUNE_FOR_NOTES, &self.tune_for_notes);
        self.raw.set_list(NOTE_APPLY_ORDER, &self.note_apply_order);
        write_atomic(&self.path, self.raw.to_text().as_bytes())
            .with_context(|| format!("writing {}", self.path.display()))
    }

    pub fn solution_enabled(&self, name: &str) -> bool {
        self.tune_for_solutions.iter().any(|s| s == name)
    }

    pub fn note_enabled(&self, id: &str) -> bool {
        self.tune_for_notes.iter().any(|n| n == id)
    }

    pub fn position_in_order(&self, id: &str) -> Option<usize> {
        self.note_apply_order.iter().position(|n| n == id)
    }

    /// Append to the apply order unless present. Returns true if changed.
    pub fn push_apply_order(&mut self, id: &str) -> bool {
        if self.position_in_order(id).is_some() {
            return false;
        }
        self.note_apply_order.push(id.to_string());
        true
    }

    pub fn remove_from_apply_order(&mut self, id: &str) -> bool {
        let before = self.note_apply_order.len();
        self.note_apply_order.retain(|n| n != id);
        before != self.note_apply_order.len()
    }

    pub fn enable_note(&mut self, id: &str) -> bool {
        if self.note_enabled(id) {
            return false;
        }
        self.tune_for_notes.push(id.to_string());
        self.tune_for_notes.sort();
        true
    }

    pub fn disable_note(&mut self, id: &str) -> bool {
        let before = self.tune_for_notes.len();
        self.tune_for_notes.retain(|n| n != id);
        before != self.tune_for_notes.len()
    }

    pub fn enable_solution(&mut self, name: &str) -> bool {
        if self.solution_enabled(name) {
            return false;
        }
        self.tune_for_solutions.push(name.to_string());
        self.tune_for_solutions.sort();
        true
    }

    pub fn disable_solution(&mut self, name: &str) -> bool {
        let before = self.tune_for_solutions.len();
        self.tune_for_solutions.retain(|s| s != name);
        before != self.tune_for_solutions.len()
    }
}
