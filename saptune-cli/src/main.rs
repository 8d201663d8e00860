use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::Level;

use saptune_core::commands::{saptune_root, NoteStatus, RefreshOutcome, SolutionStatus};
use saptune_core::config::LogLevel;
use saptune_core::services::{ParamValue, VerifyReport};
use saptune_core::{App, CoreConfig};

#[derive(Parser)]
#[command(name = "saptune", about = "Apply, verify and revert SAP tuning notes and solutions")]
struct Cli {
    /// Installation root (defaults to $SAPTUNE_ROOT or /)
    #[arg(long, global = true)]
    root: Option<PathBuf>,
    /// Print reports as JSON
    #[arg(long, global = true)]
    json: bool,
    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Note operations
    Note {
        #[command(subcommand)]
        action: NoteCmd,
    },
    /// Solution operations
    Solution {
        #[command(subcommand)]
        action: SolutionCmd,
    },
    /// Apply every enabled note that is not applied yet
    TuneAll,
    /// Revert every applied note
    RevertAll {
        /// Also clear the enabled solutions, notes and apply order
        #[arg(long)]
        permanent: bool,
    },
    /// Repair desired state against saved state and known notes
    SanityCheck,
}

#[derive(Subcommand)]
enum NoteCmd {
    /// All known notes
    List,
    /// Enabled notes, explicit and through solutions
    Enabled,
    /// Applied notes in apply order
    Applied,
    Apply { id: String },
    Revert { id: String },
    /// Verify one note, or every note of the apply order
    Verify { id: Option<String> },
    /// Reconcile an applied note with its edited definition or override
    Refresh { id: String },
}

#[derive(Subcommand)]
enum SolutionCmd {
    List,
    Enabled,
    Apply { name: String },
    Revert { name: String },
    Verify { name: String },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let root = cli.root.clone().unwrap_or_else(saptune_root);
    let cfg = CoreConfig::load(&root)?;
    init_tracing(cli.verbose, &cfg.log.level);

    let mut app = App::open(&root)?;
    let out = Output { json: cli.json };
    match cli.cmd {
        Cmd::Note { action } => note(&mut app, &out, action),
        Cmd::Solution { action } => solution(&mut app, &out, action),
        Cmd::TuneAll => {
            let reports = app.tune_all()?;
            out.emit(&reports, || {
                for r in &reports {
                    println!("{}: {} parameter(s) written", r.note, r.written.len());
                }
            })
        }
        Cmd::RevertAll { permanent } => {
            let reports = app.revert_all(permanent)?;
            out.emit(&reports, || {
                for r in reports.iter().filter(|r| r.was_applied) {
                    println!("{}: reverted", r.note);
                }
            })
        }
        Cmd::SanityCheck => {
            let report = app.note_sanity_check()?;
            out.emit(&report, || {
                for id in &report.removed_unknown {
                    println!("removed unknown note {id}");
                }
                for id in &report.dropped_empty_states {
                    println!("dropped empty saved state of {id}");
                }
                for id in &report.repaired_order {
                    println!("added {id} to the apply order");
                }
            })
        }
    }
}

fn init_tracing(verbose: u8, configured: &LogLevel) {
    let level = match verbose {
        0 => match configured {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Trace => Level::TRACE,
        },
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level)
        .with_ansi(false)
        .with_target(false)
        .init();
}

struct Output {
    json: bool,
}

impl Output {
    fn emit<T: Serialize>(&self, value: &T, text: impl FnOnce()) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
        } else {
            text();
        }
        Ok(())
    }
}

fn note(app: &mut App, out: &Output, action: NoteCmd) -> Result<()> {
    match action {
        NoteCmd::List => {
            let notes = app.list_notes();
            out.emit(&notes, || {
                for n in &notes {
                    let mark = match (n.enabled, n.status) {
                        (_, NoteStatus::Mismatch) => "!",
                        (true, NoteStatus::Applied) => "*",
                        (true, NoteStatus::NotApplied) => "+",
                        (false, NoteStatus::Applied) => "-",
                        (false, NoteStatus::NotApplied) => " ",
                    };
                    println!("{mark} {:<12} {}", n.id, n.description);
                }
            })
        }
        NoteCmd::Enabled => {
            let ids = app.enabled_notes();
            out.emit(&ids, || println!("{}", ids.join(" ")))
        }
        NoteCmd::Applied => {
            let ids = app.applied_notes()?;
            out.emit(&ids, || println!("{}", ids.join(" ")))
        }
        NoteCmd::Apply { id } => {
            let report = app.tune_note(&id)?;
            out.emit(&report, || {
                if report.written.is_empty() {
                    println!("note {id} applied, system already conforms");
                } else {
                    println!("note {id} applied, written: {}", report.written.join(", "));
                }
                if !report.shadowed.is_empty() {
                    println!("shadowed by later notes: {}", report.shadowed.join(", "));
                }
            })
        }
        NoteCmd::Revert { id } => {
            let report = app.revert_note(&id, true)?;
            out.emit(&report, || {
                if report.was_applied {
                    println!("note {id} reverted");
                } else {
                    println!("note {id} was not applied");
                }
            })
        }
        NoteCmd::Verify { id: Some(id) } => {
            let report = app.verify_note(&id)?;
            out.emit(&report, || print_verify(&report))?;
            conforming(std::slice::from_ref(&report))
        }
        NoteCmd::Verify { id: None } => {
            let reports = app.verify_all()?;
            out.emit(&reports, || reports.iter().for_each(print_verify))?;
            conforming(&reports)
        }
        NoteCmd::Refresh { id } => {
            let outcome = app.refresh_note(&id)?;
            out.emit(&outcome, || match &outcome {
                RefreshOutcome::Applied(r) => {
                    println!("note {} was not applied, applied it ({} written)", r.note, r.written.len())
                }
                RefreshOutcome::Refreshed(r) => {
                    for c in &r.changes {
                        println!("{:<40} {:?} -> {:?}", c.key, c.kind, c.action);
                    }
                    println!("note {} refreshed, {} parameter(s) written", r.note, r.written.len());
                }
            })
        }
    }
}

fn solution(app: &mut App, out: &Output, action: SolutionCmd) -> Result<()> {
    match action {
        SolutionCmd::List => {
            let sols = app.list_solutions();
            out.emit(&sols, || {
                for s in &sols {
                    let mark = match (s.enabled, s.status) {
                        (true, SolutionStatus::Fully) => "*",
                        (true, _) => "+",
                        (false, _) => " ",
                    };
                    println!("{mark} {:<20} {}", s.name, s.notes.join(" "));
                }
            })
        }
        SolutionCmd::Enabled => {
            let sols = app.applied_solutions();
            out.emit(&sols, || {
                for (name, status) in &sols {
                    println!("{name} ({status:?})");
                }
            })
        }
        SolutionCmd::Apply { name } => {
            let report = app.tune_solution(&name)?;
            out.emit(&report, || {
                for r in &report.tuned {
                    println!("note {}: {} parameter(s) written", r.note, r.written.len());
                }
                if !report.skipped.is_empty() {
                    println!("already applied: {}", report.skipped.join(" "));
                }
                println!("solution {name} applied");
            })
        }
        SolutionCmd::Revert { name } => {
            let report = app.revert_solution(&name)?;
            out.emit(&report, || {
                if !report.kept.is_empty() {
                    println!("still enabled elsewhere: {}", report.kept.join(" "));
                }
                println!("solution {name} reverted");
            })
        }
        SolutionCmd::Verify { name } => {
            let report = app.verify_solution(&name)?;
            out.emit(&report, || report.notes.iter().for_each(print_verify))?;
            conforming(&report.notes)
        }
    }
}

fn print_verify(report: &VerifyReport) {
    println!("note {}:", report.note);
    for c in &report.comparisons {
        println!(
            "  {:<4} {:<40} expected {:<16} actual {}",
            if c.matches { "ok" } else { "FAIL" },
            c.key,
            show(&c.expected),
            show(&c.actual)
        );
    }
    if !report.skipped_sections.is_empty() {
        println!("  not verified: [{}]", report.skipped_sections.join("] ["));
    }
}

fn show(v: &ParamValue) -> String {
    match v {
        ParamValue::Value(s) => s.replace('\t', " "),
        ParamValue::Unsupported => "(unsupported)".to_string(),
        ParamValue::Untouched => "(untouched)".to_string(),
    }
}

fn conforming(reports: &[VerifyReport]) -> Result<()> {
    let failing: Vec<&str> = reports
        .iter()
        .filter(|r| !r.conforming)
        .map(|r| r.note.as_str())
        .collect();
    if !failing.is_empty() {
        bail!("system does not conform to note(s): {}", failing.join(" "));
    }
    Ok(())
}
