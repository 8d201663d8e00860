use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Failure of one section adapter call. Always names the parameter.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("reading {key}: {source}")]
    Read {
        key: String,
        #[source]
        source: std::io::Error,
    },
    #[error("writing {value:?} to {key}: {source}")]
    Write {
        key: String,
        value: String,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot compute optimum for {key}: {reason}")]
    Compute { key: String, reason: String },
    #[error("parameter {key} is not supported by this system")]
    Unsupported { key: String },
}

/// Errors surfaced by the tuning engine.
#[derive(Debug, Error)]
pub enum TuneError {
    #[error("the note ID \"{0}\" is not recognised")]
    NoteNotFound(String),

    #[error("the solution name \"{0}\" is not recognised")]
    SolutionNotFound(String),

    #[error("note {note}: {source}")]
    Adapter {
        note: String,
        #[source]
        source: AdapterError,
    },

    #[error("failed to persist {path}: {source}")]
    ConfigPersist {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("note {0} has saved state but is not in the apply order; run a sanity check or revert it first")]
    Mismatch(String),

    #[error("note {note}: store failure: {source:#}")]
    Store {
        note: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("{scope}: {}", Failures(.failures))]
    Aggregate {
        scope: String,
        failures: Vec<TuneError>,
    },
}

impl TuneError {
    pub(crate) fn store(note: &str, source: anyhow::Error) -> Self {
        TuneError::Store {
            note: note.to_string(),
            source,
        }
    }

    pub(crate) fn adapter(note: &str, source: AdapterError) -> Self {
        TuneError::Adapter {
            note: note.to_string(),
            source,
        }
    }

    /// Collapse collected failures: none is success, one is returned as-is.
    pub fn aggregate(scope: impl Into<String>, mut failures: Vec<TuneError>) -> Result<(), TuneError> {
        match failures.len() {
            0 => Ok(()),
            1 => Err(failures.remove(0)),
            _ => Err(TuneError::Aggregate {
                scope: scope.into(),
                failures,
            }),
        }
    }
}

struct Failures<'a>(&'a [TuneError]);

impl fmt::Display for Failures<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failure(s)", self.0.len())?;
        for err in self.0 {
            write!(f, "; {err}")?;
        }
        Ok(())
    }
}

pub type TuneResult<T> = Result<T, TuneError>;
