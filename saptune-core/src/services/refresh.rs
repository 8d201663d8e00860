// src/services/refresh.rs
//! Refresh engine: bring an applied note in line with its current definition
//! and override file without a full re-apply.
//!
//! - Diff the new merged view against the section snapshot.
//! - Reconcile each changed parameter according to where this note sits in
//!   that parameter's chain.
//! - Persist chains, saved state and snapshot, then write only the parameters
//!   whose visible value changes.

use serde::Serialize;

use notedefs::{NoteDefinition, Section};

use crate::error::{TuneError, TuneResult};
use crate::services::adapters::Reading;
use crate::services::chain::{insertion_index, ChainRevert, ParameterChain};
use crate::services::note::{duplicate_annotations, NoteEngine, PendingWrite};
use crate::services::optimum::values_match;
use crate::services::overrides::{MergedNote, Target};
use crate::services::state::SavedState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    New,
    Changed,
    Deleted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamChange {
    pub section: Section,
    pub key: String,
    pub kind: ChangeKind,
    pub old: Option<Target>,
    pub new: Option<Target>,
}

/// Where this note sits in one parameter's chain.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Placement {
    /// No chain, or only `"start"`.
    Unmanaged,
    /// The chain has contributors, none of them this note.
    Absent,
    Tail,
    Shadowed { successor: String },
}

/// What refresh did for one parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum RefreshAction {
    /// Contribution added at the chain end; the value goes live.
    Appended,
    /// Contribution added below a later note; storage only.
    Inserted { before: String },
    /// Tail contribution updated; the value goes live.
    Replaced,
    /// Shadowed contribution updated; storage only.
    ReplacedShadowed { successor: String },
    /// Tail contribution removed; the predecessor value goes live.
    Released,
    /// Shadowed contribution removed; storage only.
    ReleasedShadowed { successor: String },
    /// Deleted parameter that this note never contributed.
    Mismatch,
    /// Parameter cannot be managed here (no adapter, or not on this system).
    Unsupported,
    Noop,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChangeRecord {
    pub key: String,
    pub kind: ChangeKind,
    #[serde(flatten)]
    pub action: RefreshAction,
}

#[derive(Debug, Clone, Serialize)]
pub struct RefreshReport {
    pub note: String,
    pub changes: Vec<ChangeRecord>,
    pub written: Vec<String>,
}

/// Classify every parameter of `new` against `old`.
///
/// A parameter that was untouched and now has a value is `Changed`.
pub fn diff(old: &MergedNote, new: &MergedNote) -> Vec<ParamChange> {
    let mut changes = Vec::new();
    for decl in &new.declarations {
        match old.get(&decl.key) {
            None => changes.push(ParamChange {
                section: decl.section.clone(),
                key: decl.key.clone(),
                kind: ChangeKind::New,
                old: None,
                new: Some(decl.target.clone()),
            }),
            Some(prev) if prev.target != decl.target => changes.push(ParamChange {
                section: decl.section.clone(),
                key: decl.key.clone(),
                kind: ChangeKind::Changed,
                old: Some(prev.target.clone()),
                new: Some(decl.target.clone()),
            }),
            Some(_) => {}
        }
    }
    for prev in &old.declarations {
        if new.get(&prev.key).is_none() {
            changes.push(ParamChange {
                section: prev.section.clone(),
                key: prev.key.clone(),
                kind: ChangeKind::Deleted,
                old: Some(prev.target.clone()),
                new: None,
            });
        }
    }
    changes
}

impl<'a> NoteEngine<'a> {
    /// Refresh an applied note.
    ///
    /// # Arguments
    /// * `def`: the definition as it is on disk now.
    /// * `merged`: `def` merged with the current override file.
    pub fn refresh(&self, def: &NoteDefinition, merged: &MergedNote) -> TuneResult<RefreshReport> {
        let id = def.id.as_str();
        let old = self
            .sections
            .load(id)
            .map_err(|e| TuneError::store(id, e))?
            .map(|s| MergedNote::from_snapshot(&s))
            .unwrap_or_default();
        let mut saved = self
            .states
            .retrieve(id)
            .map_err(|e| TuneError::store(id, e))?
            .unwrap_or_else(|| SavedState {
                id: id.to_string(),
                ..SavedState::default()
            });

        let mut report = RefreshReport {
            note: id.to_string(),
            changes: Vec::new(),
            written: Vec::new(),
        };
        let mut pending = Vec::new();
        let mut errors = Vec::new();

        for change in diff(&old, merged) {
            match self.reconcile(id, &change, &mut saved, &mut pending) {
                Ok(action) => {
                    tracing::debug!(note = id, key = %change.key, kind = ?change.kind, action = ?action, "parameter refreshed");
                    report.changes.push(ChangeRecord {
                        key: change.key.clone(),
                        kind: change.kind,
                        action,
                    });
                }
                Err(e) => errors.push(e),
            }
        }

        saved.override_params = merged.override_params.clone();
        saved.inform = duplicate_annotations(def);
        saved.conf_file_path = def.path.display().to_string();
        saved.descriptive_name = def.description.clone();
        self.states
            .store(id, &saved)
            .map_err(|e| TuneError::store(id, e))?;
        self.sections
            .store(id, &merged.to_snapshot())
            .map_err(|e| TuneError::store(id, e))?;

        let (written, write_errors) = self.flush(id, pending);
        report.written = written;
        errors.extend(write_errors);
        tracing::info!(
            note = id,
            changes = report.changes.len(),
            written = report.written.len(),
            "note refreshed"
        );
        TuneError::aggregate(id, errors)?;
        Ok(report)
    }

    fn placement(&self, id: &str, key: &str) -> TuneResult<(Placement, ParameterChain)> {
        let chain = self.chains.load(key).map_err(|e| TuneError::store(id, e))?;
        let placement = if !chain.has_contributors() {
            Placement::Unmanaged
        } else {
            match chain.position_of(id) {
                0 => Placement::Absent,
                pos if pos == chain.entries.len() - 1 => Placement::Tail,
                pos => Placement::Shadowed {
                    successor: chain.entries[pos + 1].note_id.clone(),
                },
            }
        };
        Ok((placement, chain))
    }

    fn reconcile(
        &self,
        id: &str,
        change: &ParamChange,
        saved: &mut SavedState,
        pending: &mut Vec<PendingWrite>,
    ) -> TuneResult<RefreshAction> {
        let store = |e: anyhow::Error| TuneError::store(id, e);
        match &change.new {
            Some(Target::Value { operator, value }) => {
                let Some(adapter) = self.adapters.get(&change.section) else {
                    return Ok(RefreshAction::Unsupported);
                };
                let current = adapter
                    .read_current(&change.key)
                    .map_err(|e| TuneError::adapter(id, e))?;
                let Reading::Value(live) = &current else {
                    return Ok(RefreshAction::Unsupported);
                };
                let wanted = adapter
                    .compute_optimum(&change.key, *operator, value, &current)
                    .map_err(|e| TuneError::adapter(id, e))?;
                let key = change.key.as_str();
                let (placement, chain) = self.placement(id, key)?;
                let goes_live = |pending: &mut Vec<PendingWrite>| {
                    if !values_match(live, &wanted) {
                        pending.push(PendingWrite {
                            section: change.section.clone(),
                            key: key.to_string(),
                            value: wanted.clone(),
                            revert: false,
                        });
                    }
                };
                match placement {
                    Placement::Unmanaged => {
                        self.chains.start_value(key, live).map_err(store)?;
                        self.chains.append(key, id, &wanted).map_err(store)?;
                        saved.values.insert(key.to_string(), live.clone());
                        goes_live(pending);
                        Ok(RefreshAction::Appended)
                    }
                    Placement::Absent => {
                        let index = insertion_index(id, self.apply_order, &chain);
                        if index == 0 {
                            self.chains.append(key, id, &wanted).map_err(store)?;
                            saved.values.insert(key.to_string(), live.clone());
                            goes_live(pending);
                            return Ok(RefreshAction::Appended);
                        }
                        let pre_value = chain.entries[index - 1].value.clone();
                        let successor = chain.entries[index].note_id.clone();
                        self.chains
                            .insert_before(key, id, &wanted, index)
                            .map_err(store)?;
                        self.states.set_value(&successor, key, &wanted).map_err(store)?;
                        saved.values.insert(key.to_string(), pre_value);
                        Ok(RefreshAction::Inserted { before: successor })
                    }
                    Placement::Tail => {
                        self.chains.replace(key, id, &wanted).map_err(store)?;
                        if !saved.values.contains_key(key) {
                            let pos = chain.position_of(id);
                            saved
                                .values
                                .insert(key.to_string(), chain.entries[pos - 1].value.clone());
                        }
                        goes_live(pending);
                        Ok(RefreshAction::Replaced)
                    }
                    Placement::Shadowed { successor } => {
                        self.chains.replace(key, id, &wanted).map_err(store)?;
                        self.states.set_value(&successor, key, &wanted).map_err(store)?;
                        Ok(RefreshAction::ReplacedShadowed { successor })
                    }
                }
            }
            Some(Target::Untouched) | None => {
                let key = change.key.as_str();
                saved.values.remove(key);
                if change.kind == ChangeKind::Deleted && change.old == Some(Target::Untouched) {
                    // never a chain member; nothing to repair
                    return Ok(RefreshAction::Noop);
                }
                if change.kind == ChangeKind::New {
                    return Ok(RefreshAction::Noop);
                }
                match self.chains.revert(key, id).map_err(store)? {
                    ChainRevert::Tail { value, .. } => {
                        pending.push(PendingWrite {
                            section: change.section.clone(),
                            key: key.to_string(),
                            value,
                            revert: true,
                        });
                        Ok(RefreshAction::Released)
                    }
                    ChainRevert::Shadowed {
                        successor,
                        predecessor_value,
                    } => {
                        self.states
                            .set_value(&successor, key, &predecessor_value)
                            .map_err(store)?;
                        Ok(RefreshAction::ReleasedShadowed { successor })
                    }
                    ChainRevert::Unmanaged | ChainRevert::NotPresent => {
                        if change.kind == ChangeKind::Deleted {
                            tracing::warn!(
                                note = id,
                                key,
                                "deleted parameter has no chain entry for this note, nothing reverted"
                            );
                            Ok(RefreshAction::Mismatch)
                        } else {
                            Ok(RefreshAction::Noop)
                        }
                    }
                }
            }
        }
    }
}
