// src/services/adapters.rs
//! Section adapters: read / compute optimum / write for one parameter family.
//!
//! - `SysctlAdapter`: `[sysctl]`, files under `/proc/sys`.
//! - `SysfsAdapter`: `[sys]`, files under `/sys`.
//! - `MemorySystem`: in-memory values with a write log (tests, embedding).
//!
//! The engine only ever talks to the `SectionAdapter` trait.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use notedefs::{Operator, Section};

use crate::config::SystemConfig;
use crate::error::AdapterError;
use crate::services::optimum::calculate_optimum;

/// Live value of a parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reading {
    Value(String),
    /// The parameter does not exist on this system.
    Unsupported,
}

impl Reading {
    pub fn value(&self) -> Option<&str> {
        match self {
            Reading::Value(v) => Some(v.as_str()),
            Reading::Unsupported => None,
        }
    }
}

pub trait SectionAdapter: Send + Sync {
    fn read_current(&self, key: &str) -> Result<Reading, AdapterError>;

    fn compute_optimum(
        &self,
        key: &str,
        operator: Operator,
        declared: &str,
        current: &Reading,
    ) -> Result<String, AdapterError> {
        calculate_optimum(key, operator, current.value(), declared)
    }

    /// `revert` is set when the value restores an earlier state.
    fn write_value(&self, key: &str, value: &str, revert: bool) -> Result<(), AdapterError>;

    /// Parameters that must be written even when they already match.
    fn forced(&self, _key: &str) -> bool {
        false
    }
}

/// Maps each section to the adapter that handles it.
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: BTreeMap<Section, Arc<dyn SectionAdapter>>,
}

impl AdapterRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_defaults(system: &SystemConfig) -> Self {
        let mut reg = Self::empty();
        reg.register(Section::Sysctl, SysctlAdapter::new(system.proc_sys_root.clone()));
        reg.register(Section::Sys, SysfsAdapter::new(system.sys_root.clone()));
        reg
    }

    pub fn register(&mut self, section: Section, adapter: impl SectionAdapter + 'static) {
        self.adapters.insert(section, Arc::new(adapter));
    }

    pub fn get(&self, section: &Section) -> Option<&dyn SectionAdapter> {
        self.adapters.get(section).map(|a| a.as_ref())
    }

    pub fn sections(&self) -> impl Iterator<Item = &Section> {
        self.adapters.keys()
    }
}

impl std::fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("sections", &self.adapters.keys().collect::<Vec<_>>())
            .finish()
    }
}

// ---------- value-file adapters ----------

/// `vm.swappiness` -> `<root>/vm/swappiness`.
#[derive(Debug, Clone)]
pub struct SysctlAdapter {
    root: PathBuf,
}

impl SysctlAdapter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path(&self, key: &str) -> PathBuf {
        self.root.join(key.replace('.', "/"))
    }
}

impl SectionAdapter for SysctlAdapter {
    fn read_current(&self, key: &str) -> Result<Reading, AdapterError> {
        read_value_file(key, &self.path(key)).map(|r| match r {
            Reading::Value(v) => Reading::Value(v.split_whitespace().collect::<Vec<_>>().join("\t")),
            other => other,
        })
    }

    fn write_value(&self, key: &str, value: &str, revert: bool) -> Result<(), AdapterError> {
        write_value_file(key, &self.path(key), value, revert)
    }
}

/// `kernel/mm/transparent_hugepage/enabled` -> `<root>/kernel/mm/...`.
/// Choice files (`always madvise [never]`) read as the bracketed word.
#[derive(Debug, Clone)]
pub struct SysfsAdapter {
    root: PathBuf,
}

impl SysfsAdapter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path(&self, key: &str) -> PathBuf {
        self.root.join(key.trim_start_matches('/'))
    }
}

impl SectionAdapter for SysfsAdapter {
    fn read_current(&self, key: &str) -> Result<Reading, AdapterError> {
        read_value_file(key, &self.path(key)).map(|r| match r {
            Reading::Value(v) => Reading::Value(selected_choice(&v).unwrap_or(v)),
            other => other,
        })
    }

    fn write_value(&self, key: &str, value: &str, revert: bool) -> Result<(), AdapterError> {
        write_value_file(key, &self.path(key), value, revert)
    }
}

fn selected_choice(raw: &str) -> Option<String> {
    let start = raw.find('[')?;
    let end = raw[start..].find(']')? + start;
    Some(raw[start + 1..end].to_string())
}

fn read_value_file(key: &str, path: &std::path::Path) -> Result<Reading, AdapterError> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(Reading::Value(text.trim().to_string())),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(Reading::Unsupported),
        Err(source) => Err(AdapterError::Read {
            key: key.to_string(),
            source,
        }),
    }
}

fn write_value_file(
    key: &str,
    path: &std::path::Path,
    value: &str,
    revert: bool,
) -> Result<(), AdapterError> {
    if !path.exists() {
        return Err(AdapterError::Unsupported {
            key: key.to_string(),
        });
    }
    tracing::debug!(key, value, revert, "writing parameter");
    fs::write(path, value).map_err(|source| AdapterError::Write {
        key: key.to_string(),
        value: value.to_string(),
        source,
    })
}

// ---------- in-memory system ----------

#[derive(Debug, Default)]
struct MemoryInner {
    values: BTreeMap<String, String>,
    writes: Vec<(String, String)>,
    failing: BTreeSet<String>,
    forced: BTreeSet<String>,
}

/// In-memory parameter space. Clones share state, so a handle kept by the
/// caller observes writes made through the registry.
#[derive(Debug, Clone, Default)]
pub struct MemorySystem {
    inner: Arc<Mutex<MemoryInner>>,
}

impl MemorySystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_values<I, K, V>(values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let sys = Self::new();
        for (k, v) in values {
            sys.set(k, v);
        }
        sys
    }

    fn lock(&self) -> MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        self.lock().values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.lock().values.get(key).cloned()
    }

    /// Every successful write, in order.
    pub fn writes(&self) -> Vec<(String, String)> {
        self.lock().writes.clone()
    }

    pub fn writes_to(&self, key: &str) -> Vec<String> {
        self.lock()
            .writes
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
            .collect()
    }

    pub fn clear_writes(&self) {
        self.lock().writes.clear();
    }

    /// Make writes to `key` fail.
    pub fn fail_writes_for(&self, key: impl Into<String>) {
        self.lock().failing.insert(key.into());
    }

    pub fn force(&self, key: impl Into<String>) {
        self.lock().forced.insert(key.into());
    }
}

impl SectionAdapter for MemorySystem {
    fn read_current(&self, key: &str) -> Result<Reading, AdapterError> {
        Ok(match self.lock().values.get(key) {
            Some(v) => Reading::Value(v.clone()),
            None => Reading::Unsupported,
        })
    }

    fn write_value(&self, key: &str, value: &str, _revert: bool) -> Result<(), AdapterError> {
        let mut inner = self.lock();
        if inner.failing.contains(key) {
            return Err(AdapterError::Write {
                key: key.to_string(),
                value: value.to_string(),
                source: std::io::Error::new(ErrorKind::PermissionDenied, "write rejected"),
            });
        }
        if !inner.values.contains_key(key) {
            return Err(AdapterError::Unsupported {
                key: key.to_string(),
            });
        }
        inner.values.insert(key.to_string(), value.to_string());
        inner.writes.push((key.to_string(), value.to_string()));
        Ok(())
    }

    fn forced(&self, key: &str) -> bool {
        self.lock().forced.contains(key)
    }
}
