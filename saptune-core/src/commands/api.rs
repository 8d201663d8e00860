// saptune-core/src/commands/api.rs
//! `App`: the orchestrator the CLI talks to.
//!
//! - Maps solutions to their notes and keeps the desired state in step.
//! - Builds a fresh `NoteEngine` for every note operation.
//! - Multi-note operations attempt every note and return one aggregate error.
//! - Never prints; every operation returns a serialisable report.

use anyhow::Result;
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeSet;
use std::path::Path;

use notedefs::{NoteCatalog, NoteDefinition};

use crate::commands::init::{ensure_initialized, ensure_initialized_once};
use crate::config::CoreConfig;
use crate::error::{TuneError, TuneResult};
use crate::services::{
    merge, AdapterRegistry, AppConfig, ChainStore, MergedNote, NoteEngine, OverrideStore,
    RefreshReport, RevertReport, SavedStateStore, SectionStore, TuneReport, VerifyReport,
};
use crate::utils::Logbook;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteStatus {
    NotApplied,
    Applied,
    /// Saved state exists but the note is missing from the apply order.
    Mismatch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SolutionStatus {
    Fully,
    Partial,
    NotApplied,
}

#[derive(Debug, Clone, Serialize)]
pub struct SolutionReport {
    pub solution: String,
    /// Notes that were enabled on their own and are now covered by the solution.
    pub removed_explicit_notes: Vec<String>,
    pub tuned: Vec<TuneReport>,
    /// Member notes that were already applied.
    pub skipped: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SolutionRevertReport {
    pub solution: String,
    pub reverted: Vec<RevertReport>,
    /// Member notes left applied because something else still enables them.
    pub kept: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SolutionVerifyReport {
    pub solution: String,
    pub conforming: bool,
    pub notes: Vec<VerifyReport>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", content = "report", rename_all = "snake_case")]
pub enum RefreshOutcome {
    /// The note was not applied yet, so it was tuned instead.
    Applied(TuneReport),
    Refreshed(RefreshReport),
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SanityReport {
    pub removed_unknown: Vec<String>,
    pub dropped_empty_states: Vec<String>,
    pub repaired_order: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NoteListing {
    pub id: String,
    pub description: String,
    pub enabled: bool,
    pub status: NoteStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct SolutionListing {
    pub name: String,
    pub notes: Vec<String>,
    pub enabled: bool,
    pub status: SolutionStatus,
}

pub struct App {
    cfg: CoreConfig,
    catalog: NoteCatalog,
    desired: AppConfig,
    chains: ChainStore,
    states: SavedStateStore,
    sections: SectionStore,
    overrides: OverrideStore,
    adapters: AdapterRegistry,
    logbook: Logbook,
}

impl App {
    /// Open against an explicit installation root.
    pub fn open(root: &Path) -> Result<Self> {
        let report = ensure_initialized(root)?;
        let adapters = AdapterRegistry::with_defaults(&report.config.system);
        Self::from_config(report.config, adapters)
    }

    /// Open against `SAPTUNE_ROOT` (or `/`), initialising once per process.
    pub fn open_default() -> Result<Self> {
        let report = ensure_initialized_once()?;
        let adapters = AdapterRegistry::with_defaults(&report.config.system);
        Self::from_config(report.config.clone(), adapters)
    }

    pub fn from_config(cfg: CoreConfig, adapters: AdapterRegistry) -> Result<Self> {
        let p = &cfg.paths;
        let catalog = NoteCatalog::load(
            &p.notes_dir,
            &p.extra_dir,
            &p.solutions_dir,
            &cfg.system.arch_section(),
        )?;
        let desired = AppConfig::load(&p.sysconfig_file)?;
        let chains = ChainStore::open(&p.parameter_dir)?;
        let states = SavedStateStore::open(&p.saved_state_dir)?;
        let sections = SectionStore::open(&p.sections_dir)?;
        let overrides = OverrideStore::open(&p.override_dir);
        let logbook = Logbook::open(&cfg.logbook);
        Ok(Self {
            cfg,
            catalog,
            desired,
            chains,
            states,
            sections,
            overrides,
            adapters,
            logbook,
        })
    }

    /// Replace the adapter registry (alternate backends, tests).
    pub fn with_adapters(mut self, adapters: AdapterRegistry) -> Self {
        self.adapters = adapters;
        self
    }

    pub fn config(&self) -> &CoreConfig {
        &self.cfg
    }

    pub fn desired(&self) -> &AppConfig {
        &self.desired
    }

    pub fn catalog(&self) -> &NoteCatalog {
        &self.catalog
    }

    // ---------- note operations ----------

    pub fn tune_note(&mut self, id: &str) -> TuneResult<TuneReport> {
        let def = self.definition(id)?;
        if self.note_status(id) == NoteStatus::Mismatch {
            return Err(TuneError::Mismatch(id.to_string()));
        }
        let mut changed = false;
        if !self.desired.note_enabled(id) && !self.covered_by_enabled_solution(id) {
            changed |= self.desired.enable_note(id);
        }
        changed |= self.desired.push_apply_order(id);
        if changed {
            self.persist()?;
        }

        let merged = self.merged(&def)?;
        let report = self.engine().tune(&def, &merged)?;
        self.logbook.record(
            "note_applied",
            json!({
                "note": id,
                "first_apply": report.first_apply,
                "written": report.written,
            }),
        );
        Ok(report)
    }

    /// Revert a note. Unknown or unapplied notes are a no-op; a note whose
    /// definition has been removed is reverted from its section snapshot.
    pub fn revert_note(&mut self, id: &str, permanent: bool) -> TuneResult<RevertReport> {
        if permanent {
            let mut changed = self.desired.disable_note(id);
            changed |= self.desired.remove_from_apply_order(id);
            if changed {
                self.persist()?;
            }
        }
        let fallback = match self.catalog.note(id) {
            Some(def) => Some(self.merged(def)?),
            None => None,
        };
        let report = self.engine().revert(id, fallback.as_ref())?;
        if report.was_applied {
            self.logbook.record(
                "note_reverted",
                json!({
                    "note": id,
                    "permanent": permanent,
                    "restored": report.restored.len(),
                }),
            );
        }
        Ok(report)
    }

    /// Reconcile an applied note with its current definition and override.
    /// A note that is not applied is tuned instead.
    pub fn refresh_note(&mut self, id: &str) -> TuneResult<RefreshOutcome> {
        if self.note_status(id) == NoteStatus::NotApplied {
            return self.tune_note(id).map(RefreshOutcome::Applied);
        }
        let def = self
            .catalog
            .reload_note(id)
            .map_err(|e| TuneError::store(id, e))?
            .ok_or_else(|| TuneError::NoteNotFound(id.to_string()))?;
        let merged = self.merged(&def)?;
        let report = self.engine().refresh(&def, &merged)?;
        self.catalog.insert_note(def);
        self.logbook.record(
            "note_refreshed",
            json!({
                "note": id,
                "changes": report.changes.len(),
                "written": report.written,
            }),
        );
        Ok(RefreshOutcome::Refreshed(report))
    }

    pub fn verify_note(&self, id: &str) -> TuneResult<VerifyReport> {
        let def = self.definition(id)?;
        let merged = self.merged(&def)?;
        self.engine().verify(id, &merged)
    }

    pub fn note_status(&self, id: &str) -> NoteStatus {
        match (self.states.exists(id), self.desired.position_in_order(id)) {
            (false, _) => NoteStatus::NotApplied,
            (true, Some(_)) => NoteStatus::Applied,
            (true, None) => NoteStatus::Mismatch,
        }
    }

    // ---------- solution operations ----------

    pub fn tune_solution(&mut self, name: &str) -> TuneResult<SolutionReport> {
        let notes = self.solution_notes(name)?;
        let mut changed = self.desired.enable_solution(name);
        let mut removed = Vec::new();
        for id in &notes {
            if self.desired.disable_note(id) {
                removed.push(id.clone());
                changed = true;
            }
        }
        if changed {
            self.persist()?;
        }

        let mut report = SolutionReport {
            solution: name.to_string(),
            removed_explicit_notes: removed,
            tuned: Vec::new(),
            skipped: Vec::new(),
        };
        let mut failures = Vec::new();
        for id in &notes {
            if self.note_status(id) == NoteStatus::Applied {
                report.skipped.push(id.clone());
                continue;
            }
            match self.tune_note(id) {
                Ok(r) => report.tuned.push(r),
                Err(e) => {
                    tracing::error!(solution = name, note = %id, error = %e, "note failed");
                    failures.push(e);
                }
            }
        }
        self.logbook.record(
            "solution_applied",
            json!({ "solution": name, "tuned": report.tuned.len(), "failed": failures.len() }),
        );
        TuneError::aggregate(format!("solution {name}"), failures)?;
        Ok(report)
    }

    /// Revert the notes of a solution that nothing else still enables.
    pub fn revert_solution(&mut self, name: &str) -> TuneResult<SolutionRevertReport> {
        let notes = self.solution_notes(name)?;
        if self.desired.disable_solution(name) {
            self.persist()?;
        }
        let mut keep: BTreeSet<String> = self.desired.tune_for_notes.iter().cloned().collect();
        for other in self.desired.tune_for_solutions.clone() {
            if let Some(members) = self.catalog.solution(&other) {
                keep.extend(members.iter().cloned());
            }
        }

        let mut report = SolutionRevertReport {
            solution: name.to_string(),
            reverted: Vec::new(),
            kept: Vec::new(),
        };
        let mut failures = Vec::new();
        for id in &notes {
            if keep.contains(id) {
                report.kept.push(id.clone());
                continue;
            }
            match self.revert_note(id, true) {
                Ok(r) => report.reverted.push(r),
                Err(e) => {
                    tracing::error!(solution = name, note = %id, error = %e, "note revert failed");
                    failures.push(e);
                }
            }
        }
        self.logbook.record(
            "solution_reverted",
            json!({ "solution": name, "reverted": report.reverted.len(), "kept": report.kept }),
        );
        TuneError::aggregate(format!("solution {name}"), failures)?;
        Ok(report)
    }

    pub fn verify_solution(&self, name: &str) -> TuneResult<SolutionVerifyReport> {
        let notes = self.solution_notes(name)?;
        let mut report = SolutionVerifyReport {
            solution: name.to_string(),
            conforming: true,
            notes: Vec::new(),
        };
        let mut failures = Vec::new();
        for id in &notes {
            match self.verify_note(id) {
                Ok(r) => {
                    report.conforming &= r.conforming;
                    report.notes.push(r);
                }
                Err(e) => failures.push(e),
            }
        }
        TuneError::aggregate(format!("solution {name}"), failures)?;
        Ok(report)
    }

    // ---------- everything ----------

    /// Re-apply every note of the apply order that has no saved state
    /// (e.g. after a reboot cleared the runtime stores).
    pub fn tune_all(&mut self) -> TuneResult<Vec<TuneReport>> {
        let mut reports = Vec::new();
        let mut failures = Vec::new();
        for id in self.desired.note_apply_order.clone() {
            if !self.catalog.contains_note(&id) {
                tracing::error!(note = %id, "note in apply order is not recognised, skipped");
                continue;
            }
            if self.states.exists(&id) {
                continue;
            }
            match self.tune_note(&id) {
                Ok(r) => reports.push(r),
                Err(e) => {
                    tracing::error!(note = %id, error = %e, "note failed");
                    failures.push(e);
                }
            }
        }
        TuneError::aggregate("tune all", failures)?;
        Ok(reports)
    }

    /// Revert every applied note, latest first.
    pub fn revert_all(&mut self, permanent: bool) -> TuneResult<Vec<RevertReport>> {
        let mut reports = Vec::new();
        let mut failures = Vec::new();
        let mut applied = self.applied_notes().map_err(|e| TuneError::store("*", e))?;
        applied.reverse();
        for id in applied {
            match self.revert_note(&id, permanent) {
                Ok(r) => reports.push(r),
                Err(e) => {
                    tracing::error!(note = %id, error = %e, "note revert failed");
                    failures.push(e);
                }
            }
        }
        if permanent {
            self.desired.tune_for_solutions.clear();
            self.desired.tune_for_notes.clear();
            self.desired.note_apply_order.clear();
            self.persist()?;
        }
        self.logbook.record(
            "all_reverted",
            json!({ "permanent": permanent, "reverted": reports.len(), "failed": failures.len() }),
        );
        TuneError::aggregate("revert all", failures)?;
        Ok(reports)
    }

    /// Verify every note of the apply order.
    pub fn verify_all(&self) -> TuneResult<Vec<VerifyReport>> {
        let mut reports = Vec::new();
        let mut failures = Vec::new();
        for id in &self.desired.note_apply_order {
            if !self.catalog.contains_note(id) {
                continue;
            }
            match self.verify_note(id) {
                Ok(r) => reports.push(r),
                Err(e) => failures.push(e),
            }
        }
        TuneError::aggregate("verify all", failures)?;
        Ok(reports)
    }

    /// Repair the desired state against the catalogue and the saved states.
    ///
    /// # Behavior
    /// - Unknown note IDs are reverted (from their section snapshot) and
    ///   dropped from the apply order and the enabled notes.
    /// - Empty or unreadable saved-state files without a snapshot are removed.
    /// - Applied notes missing from the apply order are appended to it.
    pub fn note_sanity_check(&mut self) -> TuneResult<SanityReport> {
        let mut report = SanityReport::default();
        let stored = self.states.list().map_err(|e| TuneError::store("*", e))?;

        let mut candidates: BTreeSet<String> = stored.iter().cloned().collect();
        candidates.extend(self.desired.note_apply_order.iter().cloned());
        candidates.extend(self.desired.tune_for_notes.iter().cloned());

        let mut changed = false;
        let mut failures = Vec::new();
        for id in candidates {
            if self.catalog.contains_note(&id) {
                continue;
            }
            if let Err(e) = self.engine().revert(&id, None) {
                failures.push(e);
            }
            changed |= self.desired.remove_from_apply_order(&id);
            changed |= self.desired.disable_note(&id);
            report.removed_unknown.push(id);
        }

        for id in stored {
            if !self.states.exists(&id) {
                continue;
            }
            let state = self.states.retrieve(&id).map_err(|e| TuneError::store(&id, e))?;
            let snapshot = self.sections.load(&id).map_err(|e| TuneError::store(&id, e))?;
            if state.is_none() && snapshot.is_none() {
                self.states.remove(&id).map_err(|e| TuneError::store(&id, e))?;
                report.dropped_empty_states.push(id);
                continue;
            }
            if self.desired.push_apply_order(&id) {
                changed = true;
                report.repaired_order.push(id);
            }
        }

        if changed {
            self.persist()?;
        }
        self.logbook.record("sanity_check", json!(report));
        TuneError::aggregate("sanity check", failures)?;
        Ok(report)
    }

    // ---------- listings ----------

    /// Notes with saved state, in apply order (unordered ones last).
    pub fn applied_notes(&self) -> Result<Vec<String>> {
        let mut applied = self.states.list()?;
        let order = &self.desired.note_apply_order;
        applied.sort_by_key(|id| order.iter().position(|n| n == id).unwrap_or(usize::MAX));
        Ok(applied)
    }

    /// Enabled solutions with how many of their notes are applied.
    pub fn applied_solutions(&self) -> Vec<(String, SolutionStatus)> {
        self.desired
            .tune_for_solutions
            .iter()
            .map(|name| (name.clone(), self.solution_status(name)))
            .collect()
    }

    fn solution_status(&self, name: &str) -> SolutionStatus {
        let Some(notes) = self.catalog.solution(name) else {
            return SolutionStatus::NotApplied;
        };
        let applied = notes.iter().filter(|n| self.states.exists(n)).count();
        match applied {
            0 => SolutionStatus::NotApplied,
            n if n == notes.len() => SolutionStatus::Fully,
            _ => SolutionStatus::Partial,
        }
    }

    pub fn list_notes(&self) -> Vec<NoteListing> {
        self.catalog
            .notes()
            .map(|def| NoteListing {
                id: def.id.clone(),
                description: def.description.clone(),
                enabled: self.desired.note_enabled(&def.id)
                    || self.covered_by_enabled_solution(&def.id),
                status: self.note_status(&def.id),
            })
            .collect()
    }

    pub fn list_solutions(&self) -> Vec<SolutionListing> {
        self.catalog
            .solutions()
            .map(|(name, notes)| SolutionListing {
                name: name.clone(),
                notes: notes.clone(),
                enabled: self.desired.solution_enabled(name),
                status: self.solution_status(name),
            })
            .collect()
    }

    /// Every enabled note: explicit ones plus those of enabled solutions.
    pub fn enabled_notes(&self) -> Vec<String> {
        let mut out: BTreeSet<String> = self.desired.tune_for_notes.iter().cloned().collect();
        for name in &self.desired.tune_for_solutions {
            if let Some(notes) = self.catalog.solution(name) {
                out.extend(notes.iter().cloned());
            }
        }
        out.into_iter().collect()
    }

    // ---------- helpers ----------

    fn engine(&self) -> NoteEngine<'_> {
        NoteEngine {
            chains: &self.chains,
            states: &self.states,
            sections: &self.sections,
            adapters: &self.adapters,
            apply_order: &self.desired.note_apply_order,
        }
    }

    fn definition(&self, id: &str) -> TuneResult<NoteDefinition> {
        self.catalog
            .note(id)
            .cloned()
            .ok_or_else(|| TuneError::NoteNotFound(id.to_string()))
    }

    fn solution_notes(&self, name: &str) -> TuneResult<Vec<String>> {
        self.catalog
            .solution(name)
            .map(<[String]>::to_vec)
            .ok_or_else(|| TuneError::SolutionNotFound(name.to_string()))
    }

    fn merged(&self, def: &NoteDefinition) -> TuneResult<MergedNote> {
        let overrides = self
            .overrides
            .load(&def.id)
            .map_err(|e| TuneError::store(&def.id, e))?;
        Ok(merge(&def.ini, overrides.as_ref()))
    }

    fn covered_by_enabled_solution(&self, id: &str) -> bool {
        self.desired.tune_for_solutions.iter().any(|name| {
            self.catalog
                .solution(name)
                .is_some_and(|notes| notes.iter().any(|n| n == id))
        })
    }

    fn persist(&mut self) -> TuneResult<()> {
        self.desired.save().map_err(|source| TuneError::ConfigPersist {
            path: self.desired.path().to_path_buf(),
            source,
        })
    }
}
