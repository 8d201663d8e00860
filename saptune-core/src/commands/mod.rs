// src/commands/mod.rs
pub mod init;
mod api;

pub use api::{
    App, NoteListing, NoteStatus, RefreshOutcome, SanityReport, SolutionListing, SolutionReport,
    SolutionRevertReport, SolutionStatus, SolutionVerifyReport,
};

pub use init::{ensure_initialized, ensure_initialized_once, saptune_root, InitReport};
