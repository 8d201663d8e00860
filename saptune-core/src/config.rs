use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing;

/// Engine configuration, read from `<root>/etc/saptune/saptune.toml`.
/// Every path is relative to the installation root until `load` absolutises it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CoreConfig {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub system: SystemConfig,
    #[serde(default)]
    pub logbook: LogbookConfig,
    #[serde(default)]
    pub log: LogConfig,
}

impl CoreConfig {
    pub const FILE: &'static str = "etc/saptune/saptune.toml";

    pub fn load(root: &Path) -> Result<Self> {
        let path = root.join(Self::FILE);
        let mut cfg = if path.exists() {
            let text = fs::read_to_string(&path)
                .with_context(|| format!("reading config file {}", path.display()))?;
            toml::from_str::<CoreConfig>(&text)
                .with_context(|| format!("parsing config file {}", path.display()))?
        } else {
            tracing::debug!(
                "No config file found at {}. Using CoreConfig::default().",
                path.display()
            );
            CoreConfig::default()
        };
        cfg.resolve_paths(root);
        Ok(cfg)
    }

    fn resolve_paths(&mut self, root: &Path) {
        let p = &mut self.paths;
        p.sysconfig_file = absolutize(root, &p.sysconfig_file);
        p.notes_dir = absolutize(root, &p.notes_dir);
        p.extra_dir = absolutize(root, &p.extra_dir);
        p.override_dir = absolutize(root, &p.override_dir);
        p.solutions_dir = absolutize(root, &p.solutions_dir);
        p.saved_state_dir = absolutize(root, &p.saved_state_dir);
        p.parameter_dir = absolutize(root, &p.parameter_dir);
        p.sections_dir = absolutize(root, &p.sections_dir);
        self.system.proc_sys_root = absolutize(root, &self.system.proc_sys_root);
        self.system.sys_root = absolutize(root, &self.system.sys_root);
        self.logbook.path = absolutize(root, &self.logbook.path);
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "PathsConfig::default_sysconfig_file")]
    pub sysconfig_file: PathBuf,
    #[serde(default = "PathsConfig::default_notes_dir")]
    pub notes_dir: PathBuf,
    #[serde(default = "PathsConfig::default_extra_dir")]
    pub extra_dir: PathBuf,
    #[serde(default = "PathsConfig::default_override_dir")]
    pub override_dir: PathBuf,
    #[serde(default = "PathsConfig::default_solutions_dir")]
    pub solutions_dir: PathBuf,
    #[serde(default = "PathsConfig::default_saved_state_dir")]
    pub saved_state_dir: PathBuf,
    #[serde(default = "PathsConfig::default_parameter_dir")]
    pub parameter_dir: PathBuf,
    #[serde(default = "PathsConfig::default_sections_dir")]
    pub sections_dir: PathBuf,
}

impl PathsConfig {
    fn default_sysconfig_file() -> PathBuf {
        PathBuf::from("etc/sysconfig/saptune")
    }

    fn default_notes_dir() -> PathBuf {
        PathBuf::from("usr/share/saptune/notes")
    }

    fn default_extra_dir() -> PathBuf {
        PathBuf::from("etc/saptune/extra")
    }

    fn default_override_dir() -> PathBuf {
        PathBuf::from("etc/saptune/override")
    }

    fn default_solutions_dir() -> PathBuf {
        PathBuf::from("usr/share/saptune/solutions")
    }

    fn default_saved_state_dir() -> PathBuf {
        PathBuf::from("run/saptune/saved_state")
    }

    fn default_parameter_dir() -> PathBuf {
        PathBuf::from("run/saptune/parameter")
    }

    fn default_sections_dir() -> PathBuf {
        PathBuf::from("run/saptune/sections")
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            sysconfig_file: Self::default_sysconfig_file(),
            notes_dir: Self::default_notes_dir(),
            extra_dir: Self::default_extra_dir(),
            override_dir: Self::default_override_dir(),
            solutions_dir: Self::default_solutions_dir(),
            saved_state_dir: Self::default_saved_state_dir(),
            parameter_dir: Self::default_parameter_dir(),
            sections_dir: Self::default_sections_dir(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SystemConfig {
    #[serde(default = "SystemConfig::default_proc_sys_root")]
    pub proc_sys_root: PathBuf,
    #[serde(default = "SystemConfig::default_sys_root")]
    pub sys_root: PathBuf,
    /// Solution architecture section; derived from the build target if unset.
    #[serde(default)]
    pub arch: Option<String>,
}

impl SystemConfig {
    fn default_proc_sys_root() -> PathBuf {
        PathBuf::from("proc/sys")
    }

    fn default_sys_root() -> PathBuf {
        PathBuf::from("sys")
    }

    pub fn arch_section(&self) -> String {
        match &self.arch {
            Some(a) => a.clone(),
            None => notedefs::current_arch_section().to_string(),
        }
    }
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            proc_sys_root: Self::default_proc_sys_root(),
            sys_root: Self::default_sys_root(),
            arch: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogbookConfig {
    #[serde(default = "LogbookConfig::default_enabled")]
    pub enabled: bool,
    #[serde(default = "LogbookConfig::default_path")]
    pub path: PathBuf,
}

impl LogbookConfig {
    fn default_enabled() -> bool {
        true
    }

    fn default_path() -> PathBuf {
        PathBuf::from("var/log/saptune/journal.jsonl")
    }
}

impl Default for LogbookConfig {
    fn default() -> Self {
        Self {
            enabled: Self::default_enabled(),
            path: Self::default_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogConfig {
    #[serde(default)]
    pub level: LogLevel,
}

fn absolutize(root: &Path, p: &Path) -> PathBuf {
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        root.join(p)
    }
}
