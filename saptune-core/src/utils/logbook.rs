// src/utils/logbook.rs
use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use std::{fs, io::Write, path::PathBuf};

use crate::config::LogbookConfig;

#[derive(Serialize)]
struct JournalLine<'a> {
    ts: String,
    event: &'a str,
    data: Value,
}

/// Append-only JSONL journal of state-changing operations.
#[derive(Debug, Clone, Default)]
pub struct Logbook {
    path: Option<PathBuf>,
}

impl Logbook {
    pub fn open(cfg: &LogbookConfig) -> Self {
        Self {
            path: cfg.enabled.then(|| cfg.path.clone()),
        }
    }

    pub fn disabled() -> Self {
        Self { path: None }
    }

    /// Record one event. Journal failures never fail the caller's operation.
    pub fn record(&self, event: &str, data: Value) {
        if let Err(err) = self.append(event, data) {
            tracing::warn!(event, error = %err, "failed to write journal line");
        }
    }

    fn append(&self, event: &str, data: Value) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let line = JournalLine {
            ts: Utc::now().to_rfc3339(),
            event,
            data,
        };
        let json = serde_json::to_string(&line)?;
        let mut f = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        writeln!(f, "{}", json)?;
        Ok(())
    }
}
