// src/services/note.rs
//! Note engine: Initialise -> Optimise -> Compare -> Apply, and Revert.
//!
//! - `NoteEngine` is built per operation from borrowed stores; it holds no
//!   state of its own between calls.
//! - A note is "applied" once its saved state exists. The first snapshot is
//!   never overwritten.
//! - Live writes only happen for parameters where this note is the chain
//!   tail; shadowed contributions are reconciled in storage only.

use serde::Serialize;
use std::collections::BTreeMap;

use notedefs::{NoteDefinition, Section};

use crate::error::{AdapterError, TuneError, TuneResult};
use crate::services::adapters::{AdapterRegistry, Reading};
use crate::services::chain::{insertion_index, ChainRevert, ChainStore};
use crate::services::optimum::values_match;
use crate::services::overrides::{MergedNote, Target};
use crate::services::refresh::diff;
use crate::services::sections::SectionStore;
use crate::services::state::{SavedState, SavedStateStore};

/// Value of one parameter inside a note snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum ParamValue {
    Value(String),
    /// The parameter does not exist on this system.
    Unsupported,
    /// Excluded from management by an override or an empty declaration.
    Untouched,
}

impl ParamValue {
    pub fn as_value(&self) -> Option<&str> {
        match self {
            ParamValue::Value(v) => Some(v.as_str()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParamState {
    pub section: Section,
    pub key: String,
    pub value: ParamValue,
}

/// Either the live values (Initialise) or the wanted values (Optimise) of
/// one note, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NoteSnapshot {
    pub id: String,
    pub params: Vec<ParamState>,
}

impl NoteSnapshot {
    pub fn get(&self, key: &str) -> Option<&ParamState> {
        self.params.iter().find(|p| p.key == key)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldComparison {
    pub section: Section,
    pub key: String,
    pub actual: ParamValue,
    pub expected: ParamValue,
    pub matches: bool,
    pub forced: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Comparison {
    pub conforming: bool,
    pub fields: Vec<FieldComparison>,
    /// Keys whose live value must be written.
    pub apply_keys: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VerifyReport {
    pub note: String,
    pub conforming: bool,
    pub comparisons: Vec<FieldComparison>,
    /// Sections declared by the note that no adapter handles.
    pub skipped_sections: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TuneReport {
    pub note: String,
    /// True when this call created the saved state.
    pub first_apply: bool,
    pub conforming_before: bool,
    pub written: Vec<String>,
    /// Parameters inserted below a later note's contribution.
    pub shadowed: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RevertReport {
    pub note: String,
    pub was_applied: bool,
    /// Parameters written back to the live system, with their value.
    pub restored: Vec<(String, String)>,
    /// Parameters where a later note keeps the live value.
    pub reconciled: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PendingWrite {
    pub section: Section,
    pub key: String,
    pub value: String,
    pub revert: bool,
}

/// Per-operation view over the stores and adapters.
pub struct NoteEngine<'a> {
    pub chains: &'a ChainStore,
    pub states: &'a SavedStateStore,
    pub sections: &'a SectionStore,
    pub adapters: &'a AdapterRegistry,
    pub apply_order: &'a [String],
}

impl<'a> NoteEngine<'a> {
    /// Read the live value of every declaration.
    ///
    /// # Returns
    /// The snapshot plus per-parameter read failures. Nothing is recorded;
    /// chains start only when a contribution is stored.
    pub fn initialise(&self, note_id: &str, merged: &MergedNote) -> (NoteSnapshot, Vec<TuneError>) {
        let mut snap = NoteSnapshot {
            id: note_id.to_string(),
            params: Vec::new(),
        };
        let mut errors = Vec::new();
        for decl in &merged.declarations {
            let Some(adapter) = self.adapters.get(&decl.section) else {
                continue;
            };
            let reading = match adapter.read_current(&decl.key) {
                Ok(r) => r,
                Err(e) => {
                    errors.push(TuneError::adapter(note_id, e));
                    continue;
                }
            };
            let value = match reading {
                Reading::Value(v) => ParamValue::Value(v),
                Reading::Unsupported => ParamValue::Unsupported,
            };
            snap.params.push(ParamState {
                section: decl.section.clone(),
                key: decl.key.clone(),
                value,
            });
        }
        (snap, errors)
    }

    /// Compute the wanted value of every declaration present in `current`.
    pub fn optimise(
        &self,
        merged: &MergedNote,
        current: &NoteSnapshot,
    ) -> (NoteSnapshot, Vec<TuneError>) {
        let mut target = NoteSnapshot {
            id: current.id.clone(),
            params: Vec::new(),
        };
        let mut errors = Vec::new();
        for cur in &current.params {
            let Some(decl) = merged.get(&cur.key) else {
                continue;
            };
            let Some(adapter) = self.adapters.get(&decl.section) else {
                continue;
            };
            let value = match (&decl.target, &cur.value) {
                (Target::Untouched, _) => ParamValue::Untouched,
                (_, ParamValue::Unsupported) => ParamValue::Unsupported,
                (Target::Value { operator, value }, actual) => {
                    let reading = match actual.as_value() {
                        Some(v) => Reading::Value(v.to_string()),
                        None => Reading::Unsupported,
                    };
                    match adapter.compute_optimum(&decl.key, *operator, value, &reading) {
                        Ok(v) => ParamValue::Value(v),
                        Err(e) => {
                            errors.push(TuneError::adapter(&current.id, e));
                            continue;
                        }
                    }
                }
            };
            target.params.push(ParamState {
                section: cur.section.clone(),
                key: cur.key.clone(),
                value,
            });
        }
        (target, errors)
    }

    /// Field-by-field comparison of live and wanted values.
    pub fn compare(&self, current: &NoteSnapshot, target: &NoteSnapshot) -> Comparison {
        let mut cmp = Comparison {
            conforming: true,
            ..Comparison::default()
        };
        for want in &target.params {
            let actual = current
                .get(&want.key)
                .map(|p| p.value.clone())
                .unwrap_or(ParamValue::Unsupported);
            let forced = self
                .adapters
                .get(&want.section)
                .is_some_and(|a| a.forced(&want.key));
            let matches = match (&actual, &want.value) {
                (_, ParamValue::Untouched) => true,
                (ParamValue::Unsupported, _) | (_, ParamValue::Unsupported) => true,
                (ParamValue::Value(a), ParamValue::Value(w)) => values_match(a, w),
                (ParamValue::Untouched, ParamValue::Value(_)) => false,
            };
            let writable = matches!(want.value, ParamValue::Value(_))
                && matches!(actual, ParamValue::Value(_));
            if !matches {
                cmp.conforming = false;
            }
            if writable && (!matches || forced) {
                cmp.apply_keys.push(want.key.clone());
            }
            cmp.fields.push(FieldComparison {
                section: want.section.clone(),
                key: want.key.clone(),
                actual,
                expected: want.value.clone(),
                matches,
                forced,
            });
        }
        cmp
    }

    pub fn verify(&self, note_id: &str, merged: &MergedNote) -> TuneResult<VerifyReport> {
        let (current, mut errors) = self.initialise(note_id, merged);
        let (target, errs) = self.optimise(merged, &current);
        errors.extend(errs);
        TuneError::aggregate(note_id, errors)?;
        let cmp = self.compare(&current, &target);
        Ok(VerifyReport {
            note: note_id.to_string(),
            conforming: cmp.conforming,
            comparisons: cmp.fields,
            skipped_sections: self.skipped_sections(merged),
        })
    }

    fn skipped_sections(&self, merged: &MergedNote) -> Vec<String> {
        let mut out: Vec<String> = merged
            .declarations
            .iter()
            .filter(|d| self.adapters.get(&d.section).is_none())
            .map(|d| d.section.as_str().to_string())
            .collect();
        out.sort();
        out.dedup();
        out
    }

    /// Apply a note.
    ///
    /// # Behavior
    /// - First apply: start chains, add this note's contributions at the
    ///   position the apply order dictates, then persist saved state and
    ///   section snapshot.
    /// - Applied note whose definition or override changed: refresh first.
    /// - Conforming and nothing forced: no live write.
    /// - Otherwise write each differing parameter this note is tail of,
    ///   updating its chain entry when the wanted value moved.
    pub fn tune(&self, def: &NoteDefinition, merged: &MergedNote) -> TuneResult<TuneReport> {
        let id = def.id.as_str();
        for section in self.skipped_sections(merged) {
            tracing::warn!(note = id, section = %section, "section not supported, skipped");
        }

        // an applied note whose definition moved on is reconciled first, so
        // its chain entries hold the values that go live
        let mut refreshed = Vec::new();
        if self.states.exists(id) && self.definition_changed(id, merged)? {
            tracing::info!(note = id, "definition changed since apply, refreshing");
            refreshed = self.refresh(def, merged)?.written;
        }

        let (current, mut errors) = self.initialise(id, merged);
        let (target, errs) = self.optimise(merged, &current);
        errors.extend(errs);
        let cmp = self.compare(&current, &target);

        let mut report = TuneReport {
            note: id.to_string(),
            first_apply: false,
            conforming_before: cmp.conforming && refreshed.is_empty(),
            written: refreshed,
            shadowed: Vec::new(),
        };

        if !self.states.exists(id) {
            report.first_apply = true;
            let mut saved = SavedState {
                conf_file_path: def.path.display().to_string(),
                id: id.to_string(),
                descriptive_name: def.description.clone(),
                override_params: merged.override_params.clone(),
                inform: duplicate_annotations(def),
                ..SavedState::default()
            };
            for want in &target.params {
                let (Some(wanted), Some(live)) = (
                    want.value.as_value(),
                    current.get(&want.key).and_then(|p| p.value.as_value()),
                ) else {
                    continue;
                };
                match self.record_contribution(id, &want.key, wanted, live) {
                    Ok(Contributed::Tail { pre_value }) => {
                        saved.values.insert(want.key.clone(), pre_value);
                    }
                    Ok(Contributed::Shadowed { pre_value }) => {
                        saved.values.insert(want.key.clone(), pre_value);
                        report.shadowed.push(want.key.clone());
                    }
                    Ok(Contributed::Existing) => {}
                    Err(e) => errors.push(e),
                }
            }
            self.states
                .store_if_absent(id, &saved)
                .map_err(|e| TuneError::store(id, e))?;
            self.sections
                .store(id, &merged.to_snapshot())
                .map_err(|e| TuneError::store(id, e))?;
        }

        if cmp.conforming && !cmp.fields.iter().any(|f| f.forced) {
            tracing::info!(note = id, "note already conforms, nothing written");
            TuneError::aggregate(id, errors)?;
            return Ok(report);
        }

        for key in &cmp.apply_keys {
            let Some(want) = target.get(key) else { continue };
            let Some(value) = want.value.as_value() else { continue };
            if report.written.contains(key) {
                continue;
            }
            let chain = match self.chains.load(key) {
                Ok(c) => c,
                Err(e) => {
                    errors.push(TuneError::store(id, e));
                    continue;
                }
            };
            if !chain.is_tail(id) {
                if chain.contains(id) {
                    tracing::debug!(note = id, key = %key, "shadowed by a later note, not written");
                } else {
                    tracing::warn!(
                        note = id,
                        key = %key,
                        "parameter has no chain entry for this note, not written"
                    );
                }
                continue;
            }
            if !chain.value_of(id).is_some_and(|v| values_match(v, value)) {
                if let Err(e) = self.chains.replace(key, id, value) {
                    errors.push(TuneError::store(id, e));
                    continue;
                }
            }
            match self.write(&want.section, key, value, false) {
                Ok(()) => report.written.push(key.clone()),
                Err(e) => errors.push(TuneError::adapter(id, e)),
            }
        }
        tracing::info!(note = id, written = report.written.len(), "note applied");
        TuneError::aggregate(id, errors)?;
        Ok(report)
    }

    fn definition_changed(&self, id: &str, merged: &MergedNote) -> TuneResult<bool> {
        let Some(snapshot) = self.sections.load(id).map_err(|e| TuneError::store(id, e))? else {
            return Ok(false);
        };
        Ok(!diff(&MergedNote::from_snapshot(&snapshot), merged).is_empty())
    }

    /// Put this note's value into the chain of `key` if it is not there yet.
    /// The chain is started with `live` when the parameter is unmanaged.
    fn record_contribution(
        &self,
        id: &str,
        key: &str,
        wanted: &str,
        live: &str,
    ) -> TuneResult<Contributed> {
        self.chains
            .start_value(key, live)
            .map_err(|e| TuneError::store(id, e))?;
        let chain = self.chains.load(key).map_err(|e| TuneError::store(id, e))?;
        if chain.contains(id) {
            return Ok(Contributed::Existing);
        }
        let index = insertion_index(id, self.apply_order, &chain);
        if index == 0 {
            self.chains
                .append(key, id, wanted)
                .map_err(|e| TuneError::store(id, e))?;
            return Ok(Contributed::Tail {
                pre_value: live.to_string(),
            });
        }
        let pre_value = chain.entries[index - 1].value.clone();
        let successor = chain.entries[index].note_id.clone();
        self.chains
            .insert_before(key, id, wanted, index)
            .map_err(|e| TuneError::store(id, e))?;
        self.states
            .set_value(&successor, key, wanted)
            .map_err(|e| TuneError::store(id, e))?;
        tracing::debug!(note = id, key, successor = %successor, index, "contribution inserted below successor");
        Ok(Contributed::Shadowed { pre_value })
    }

    /// Revert a note.
    ///
    /// # Arguments
    /// * `fallback`: merged declarations used to find each parameter's
    ///   section when no section snapshot survives.
    ///
    /// # Behavior
    /// - Not applied: no-op.
    /// - Tail contributions: the new chain tail value is written back.
    /// - Shadowed contributions: the successor's saved pre-value is fixed.
    /// - Parameters without any chain fall back to the saved-state value.
    pub fn revert(&self, note_id: &str, fallback: Option<&MergedNote>) -> TuneResult<RevertReport> {
        let mut report = RevertReport {
            note: note_id.to_string(),
            ..RevertReport::default()
        };
        let state_file = self.states.exists(note_id);
        let saved = self
            .states
            .retrieve(note_id)
            .map_err(|e| TuneError::store(note_id, e))?;
        let snapshot = self
            .sections
            .load(note_id)
            .map_err(|e| TuneError::store(note_id, e))?;
        if !state_file && snapshot.is_none() {
            tracing::debug!(note = note_id, "note not applied, nothing to revert");
            return Ok(report);
        }
        report.was_applied = true;

        let merged = match (&snapshot, fallback) {
            (Some(s), _) => MergedNote::from_snapshot(s),
            (None, Some(f)) => f.clone(),
            (None, None) => MergedNote::default(),
        };
        let saved = saved.unwrap_or_default();

        let mut keys: BTreeMap<String, Option<Section>> = BTreeMap::new();
        for decl in merged.managed() {
            keys.insert(decl.key.clone(), Some(decl.section.clone()));
        }
        for key in saved.values.keys() {
            keys.entry(key.clone()).or_insert(None);
        }

        self.states
            .remove(note_id)
            .map_err(|e| TuneError::store(note_id, e))?;

        let mut errors = Vec::new();
        for (key, section) in keys {
            let outcome = match self.chains.revert(&key, note_id) {
                Ok(o) => o,
                Err(e) => {
                    errors.push(TuneError::store(note_id, e));
                    continue;
                }
            };
            let restore = match outcome {
                ChainRevert::Tail { value, owner, .. } => {
                    tracing::debug!(note = note_id, key = %key, owner = %owner, "restoring previous contribution");
                    Some(value)
                }
                ChainRevert::Shadowed {
                    successor,
                    predecessor_value,
                } => {
                    if let Err(e) = self.states.set_value(&successor, &key, &predecessor_value) {
                        errors.push(TuneError::store(note_id, e));
                    }
                    report.reconciled.push(key.clone());
                    None
                }
                ChainRevert::NotPresent => None,
                ChainRevert::Unmanaged => saved.values.get(&key).cloned(),
            };
            let Some(value) = restore else { continue };
            let Some(section) = section else {
                tracing::warn!(note = note_id, key = %key, "no section known for parameter, cannot restore");
                continue;
            };
            match self.write(&section, &key, &value, true) {
                Ok(()) => report.restored.push((key.clone(), value)),
                Err(e) => errors.push(TuneError::adapter(note_id, e)),
            }
        }

        self.sections
            .remove(note_id)
            .map_err(|e| TuneError::store(note_id, e))?;
        tracing::info!(note = note_id, restored = report.restored.len(), "note reverted");
        TuneError::aggregate(note_id, errors)?;
        Ok(report)
    }

    pub(crate) fn write(
        &self,
        section: &Section,
        key: &str,
        value: &str,
        revert: bool,
    ) -> Result<(), AdapterError> {
        match self.adapters.get(section) {
            Some(adapter) => adapter.write_value(key, value, revert),
            None => Err(AdapterError::Unsupported {
                key: key.to_string(),
            }),
        }
    }

    pub(crate) fn flush(&self, note_id: &str, writes: Vec<PendingWrite>) -> (Vec<String>, Vec<TuneError>) {
        let mut written = Vec::new();
        let mut errors = Vec::new();
        for w in writes {
            match self.write(&w.section, &w.key, &w.value, w.revert) {
                Ok(()) => written.push(w.key),
                Err(e) => errors.push(TuneError::adapter(note_id, e)),
            }
        }
        (written, errors)
    }
}

enum Contributed {
    Existing,
    Tail { pre_value: String },
    Shadowed { pre_value: String },
}

pub(crate) fn duplicate_annotations(def: &NoteDefinition) -> BTreeMap<String, String> {
    def.duplicates
        .iter()
        .map(|(section, key)| {
            (
                key.clone(),
                format!("declared more than once in section [{section}], last value used"),
            )
        })
        .collect()
}
