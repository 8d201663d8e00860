// tests/common/mod.rs
// Shared fixture: a throwaway installation root with an in-memory [sysctl].
#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use tempfile::TempDir;

use notedefs::Section;
use saptune_core::services::{AdapterRegistry, ChainStore, MemorySystem, SavedStateStore};
use saptune_core::App;

pub struct Fixture {
    pub tmp: TempDir,
    pub sys: MemorySystem,
}

impl Fixture {
    pub fn new<I, K, V>(live: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Ok(Self {
            tmp: tempfile::tempdir()?,
            sys: MemorySystem::with_values(live),
        })
    }

    pub fn root(&self) -> &Path {
        self.tmp.path()
    }

    fn write(&self, rel: &str, text: &str) -> Result<PathBuf> {
        let path = self.root().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, text)?;
        Ok(path)
    }

    /// Shipped note definition with `[sysctl]` parameters.
    pub fn note(&self, id: &str, params: &[(&str, &str)]) -> Result<PathBuf> {
        let mut text = format!("[version]\nVERSION=1\nDESCRIPTION=Test note {id}\n\n[sysctl]\n");
        for (k, v) in params {
            text.push_str(&format!("{k} = {v}\n"));
        }
        self.write(&format!("usr/share/saptune/notes/{id}"), &text)
    }

    pub fn remove_note(&self, id: &str) -> Result<()> {
        fs::remove_file(self.root().join("usr/share/saptune/notes").join(id))?;
        Ok(())
    }

    pub fn override_file(&self, id: &str, params: &[(&str, &str)]) -> Result<PathBuf> {
        let mut text = String::from("[sysctl]\n");
        for (k, v) in params {
            text.push_str(&format!("{k} = {v}\n"));
        }
        self.write(&format!("etc/saptune/override/{id}"), &text)
    }

    pub fn solution(&self, name: &str, notes: &[&str]) -> Result<PathBuf> {
        self.write(
            &format!("usr/share/saptune/solutions/{name}.sol"),
            &format!("{}\n", notes.join(" ")),
        )
    }

    pub fn sysconfig(&self, text: &str) -> Result<PathBuf> {
        self.write("etc/sysconfig/saptune", text)
    }

    /// Open an app whose `[sysctl]` section talks to `self.sys`.
    pub fn app(&self) -> Result<App> {
        let mut adapters = AdapterRegistry::empty();
        adapters.register(Section::Sysctl, self.sys.clone());
        Ok(App::open(self.root())?.with_adapters(adapters))
    }

    pub fn chains(&self) -> Result<ChainStore> {
        ChainStore::open(self.root().join("run/saptune/parameter"))
    }

    pub fn states(&self) -> Result<SavedStateStore> {
        SavedStateStore::open(self.root().join("run/saptune/saved_state"))
    }

    /// `(note, value)` pairs of a chain, `"start"` included.
    pub fn chain(&self, key: &str) -> Result<Vec<(String, String)>> {
        Ok(self
            .chains()?
            .load(key)?
            .entries
            .into_iter()
            .map(|c| (c.note_id, c.value))
            .collect())
    }

    /// Drop the runtime stores, as a reboot does.
    pub fn reboot(&self) -> Result<()> {
        fs::remove_dir_all(self.root().join("run"))?;
        Ok(())
    }
}

pub fn entries(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
    pairs
        .iter()
        .map(|(n, v)| (n.to_string(), v.to_string()))
        .collect()
}
