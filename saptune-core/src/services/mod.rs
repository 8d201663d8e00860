// src/services/mod.rs

pub mod adapters;    // section adapters + registry
pub mod appconfig;   // desired state (sysconfig file)
pub mod chain;       // per-parameter contribution chains
pub mod note;        // initialise / optimise / compare / apply / revert
pub mod optimum;
pub mod overrides;   // override merge + override files
pub mod refresh;     // definition drift reconciliation
pub mod sections;    // section snapshots
pub mod state;       // saved state per note

// Public API
pub use adapters::{AdapterRegistry, MemorySystem, Reading, SectionAdapter, SysctlAdapter, SysfsAdapter};
pub use appconfig::AppConfig;
pub use chain::{insertion_index, ChainRevert, ChainStore, Contribution, ParameterChain, START};
pub use note::{
    Comparison, FieldComparison, NoteEngine, NoteSnapshot, ParamValue, RevertReport, TuneReport,
    VerifyReport,
};
pub use overrides::{merge, Declaration, MergedNote, OverrideStore, Target, UNTOUCHED};
pub use refresh::{diff, ChangeKind, ChangeRecord, ParamChange, RefreshAction, RefreshReport};
pub use sections::SectionStore;
pub use state::{SavedState, SavedStateStore};
