// tests/refresh_tests.rs
// Refresh: reconcile an applied note with its edited definition / override.

mod common;

use anyhow::Result;

use common::{entries, Fixture};
use notedefs::parse_ini;
use saptune_core::commands::{NoteStatus, RefreshOutcome};
use saptune_core::services::{diff, merge, ChangeKind, RefreshAction, RefreshReport};
use saptune_core::TuneError;

const P: &str = "vm.dirty_bytes";
const Q: &str = "kernel.shmmni";

fn refreshed(outcome: RefreshOutcome) -> RefreshReport {
    match outcome {
        RefreshOutcome::Refreshed(r) => r,
        RefreshOutcome::Applied(r) => panic!("expected a refresh, note {} was tuned", r.note),
    }
}

fn action_for<'a>(report: &'a RefreshReport, key: &str) -> Option<(ChangeKind, &'a RefreshAction)> {
    report
        .changes
        .iter()
        .find(|c| c.key == key)
        .map(|c| (c.kind, &c.action))
}

#[test]
fn changed_value_of_tail_note_is_written_once() -> Result<()> {
    let fx = Fixture::new([(P, "5")])?;
    fx.note("N1", &[(P, "10")])?;
    let mut app = fx.app()?;
    app.tune_note("N1")?;
    fx.sys.clear_writes();

    fx.note("N1", &[(P, "15")])?;
    let report = refreshed(app.refresh_note("N1")?);

    assert_eq!(action_for(&report, P), Some((ChangeKind::Changed, &RefreshAction::Replaced)));
    assert_eq!(report.written, vec![P]);
    assert_eq!(fx.sys.writes_to(P), vec!["15"]);
    assert_eq!(fx.chain(P)?, entries(&[("start", "5"), ("N1", "15")]));

    // pre-value is untouched by a refresh
    let saved = fx.states()?.retrieve("N1")?.expect("saved state");
    assert_eq!(saved.values.get(P).map(String::as_str), Some("5"));

    // revert still goes back to the pristine value
    app.revert_note("N1", true)?;
    assert_eq!(fx.sys.get(P).as_deref(), Some("5"));
    Ok(())
}

#[test]
fn unchanged_definition_refreshes_to_nothing() -> Result<()> {
    let fx = Fixture::new([(P, "5")])?;
    fx.note("N1", &[(P, "10")])?;
    let mut app = fx.app()?;
    app.tune_note("N1")?;
    fx.sys.clear_writes();

    let report = refreshed(app.refresh_note("N1")?);
    assert!(report.changes.is_empty());
    assert!(report.written.is_empty());
    assert!(fx.sys.writes().is_empty());
    Ok(())
}

#[test]
fn added_and_deleted_parameters() -> Result<()> {
    let fx = Fixture::new([(P, "5"), (Q, "4096")])?;
    fx.note("N1", &[(P, "10")])?;
    let mut app = fx.app()?;
    app.tune_note("N1")?;

    fx.note("N1", &[(P, "10"), (Q, "8192")])?;
    let added = refreshed(app.refresh_note("N1")?);
    assert_eq!(action_for(&added, Q), Some((ChangeKind::New, &RefreshAction::Appended)));
    assert_eq!(fx.sys.get(Q).as_deref(), Some("8192"));
    assert_eq!(fx.chain(Q)?, entries(&[("start", "4096"), ("N1", "8192")]));
    let saved = fx.states()?.retrieve("N1")?.expect("saved state");
    assert_eq!(saved.values.get(Q).map(String::as_str), Some("4096"));

    fx.note("N1", &[(P, "10")])?;
    let deleted = refreshed(app.refresh_note("N1")?);
    assert_eq!(action_for(&deleted, Q), Some((ChangeKind::Deleted, &RefreshAction::Released)));
    assert_eq!(fx.sys.get(Q).as_deref(), Some("4096"));
    assert!(fx.chain(Q)?.is_empty());
    let saved = fx.states()?.retrieve("N1")?.expect("saved state");
    assert!(!saved.values.contains_key(Q));
    Ok(())
}

#[test]
fn override_to_untouched_releases_the_parameter() -> Result<()> {
    let fx = Fixture::new([(P, "5"), (Q, "4096")])?;
    fx.note("N1", &[(P, "10"), (Q, "8192")])?;
    let mut app = fx.app()?;
    app.tune_note("N1")?;

    fx.override_file("N1", &[(Q, "untouched")])?;
    let report = refreshed(app.refresh_note("N1")?);
    assert_eq!(action_for(&report, Q), Some((ChangeKind::Changed, &RefreshAction::Released)));
    assert_eq!(action_for(&report, P), None);
    assert_eq!(fx.sys.get(Q).as_deref(), Some("4096"));
    assert_eq!(fx.sys.get(P).as_deref(), Some("10"));

    let saved = fx.states()?.retrieve("N1")?.expect("saved state");
    assert_eq!(saved.override_params.get(Q).map(String::as_str), Some("untouched"));

    // and back under management
    std::fs::remove_file(fx.root().join("etc/saptune/override/N1"))?;
    let report = refreshed(app.refresh_note("N1")?);
    assert_eq!(action_for(&report, Q), Some((ChangeKind::Changed, &RefreshAction::Appended)));
    assert_eq!(fx.sys.get(Q).as_deref(), Some("8192"));
    Ok(())
}

#[test]
fn deleting_an_untouched_parameter_is_a_no_op() -> Result<()> {
    let fx = Fixture::new([(P, "5"), (Q, "4096")])?;
    fx.note("N1", &[(P, "10"), (Q, "8192")])?;
    fx.override_file("N1", &[(Q, "untouched")])?;
    let mut app = fx.app()?;
    app.tune_note("N1")?;
    fx.sys.clear_writes();

    fx.note("N1", &[(P, "10")])?;
    let report = refreshed(app.refresh_note("N1")?);
    assert_eq!(action_for(&report, Q), Some((ChangeKind::Deleted, &RefreshAction::Noop)));
    assert!(fx.sys.writes().is_empty());
    assert!(fx.chain(Q)?.is_empty());
    Ok(())
}

#[test]
fn new_parameter_goes_below_a_later_note() -> Result<()> {
    let fx = Fixture::new([(P, "5"), (Q, "100")])?;
    fx.note("N1", &[(P, "10")])?;
    fx.note("N2", &[(P, "20"), (Q, "300")])?;
    let mut app = fx.app()?;
    app.tune_note("N1")?;
    app.tune_note("N2")?;
    fx.sys.clear_writes();

    fx.note("N1", &[(P, "10"), (Q, "250")])?;
    let report = refreshed(app.refresh_note("N1")?);
    assert_eq!(
        action_for(&report, Q),
        Some((
            ChangeKind::New,
            &RefreshAction::Inserted {
                before: "N2".to_string()
            }
        ))
    );
    assert!(report.written.is_empty());
    assert!(fx.sys.writes().is_empty());
    assert_eq!(fx.chain(Q)?, entries(&[("start", "100"), ("N1", "250"), ("N2", "300")]));

    let states = fx.states()?;
    let n1 = states.retrieve("N1")?.expect("N1 state");
    let n2 = states.retrieve("N2")?.expect("N2 state");
    assert_eq!(n1.values.get(Q).map(String::as_str), Some("100"));
    assert_eq!(n2.values.get(Q).map(String::as_str), Some("250"));

    app.revert_note("N2", true)?;
    assert_eq!(fx.sys.get(Q).as_deref(), Some("250"));
    app.revert_note("N1", true)?;
    assert_eq!(fx.sys.get(Q).as_deref(), Some("100"));
    assert_eq!(fx.sys.get(P).as_deref(), Some("5"));
    Ok(())
}

#[test]
fn shadowed_change_only_updates_storage() -> Result<()> {
    let fx = Fixture::new([(P, "5")])?;
    fx.note("N1", &[(P, "10")])?;
    fx.note("N2", &[(P, "20")])?;
    let mut app = fx.app()?;
    app.tune_note("N1")?;
    app.tune_note("N2")?;
    fx.sys.clear_writes();

    fx.note("N1", &[(P, "12")])?;
    let report = refreshed(app.refresh_note("N1")?);
    assert_eq!(
        action_for(&report, P),
        Some((
            ChangeKind::Changed,
            &RefreshAction::ReplacedShadowed {
                successor: "N2".to_string()
            }
        ))
    );
    assert!(fx.sys.writes().is_empty());
    assert_eq!(fx.chain(P)?, entries(&[("start", "5"), ("N1", "12"), ("N2", "20")]));
    let n2 = fx.states()?.retrieve("N2")?.expect("N2 state");
    assert_eq!(n2.values.get(P).map(String::as_str), Some("12"));
    Ok(())
}

#[test]
fn refresh_of_unapplied_note_tunes_it() -> Result<()> {
    let fx = Fixture::new([(P, "5")])?;
    fx.note("N1", &[(P, "10")])?;
    let mut app = fx.app()?;

    match app.refresh_note("N1")? {
        RefreshOutcome::Applied(r) => assert!(r.first_apply),
        RefreshOutcome::Refreshed(_) => panic!("note was not applied, expected a tune"),
    }
    assert_eq!(app.note_status("N1"), NoteStatus::Applied);
    assert_eq!(fx.sys.get(P).as_deref(), Some("10"));
    Ok(())
}

#[test]
fn refresh_of_removed_definition_fails() -> Result<()> {
    let fx = Fixture::new([(P, "5")])?;
    fx.note("N1", &[(P, "10")])?;
    let mut app = fx.app()?;
    app.tune_note("N1")?;

    fx.remove_note("N1")?;
    assert!(matches!(app.refresh_note("N1"), Err(TuneError::NoteNotFound(id)) if id == "N1"));
    Ok(())
}

#[test]
fn diff_classifies_transitions() {
    let old = parse_ini("[sysctl]\na = 1\nb = untouched\nc = 3\n").ini;
    let new = parse_ini("[sysctl]\na = 2\nb = 5\nd = 4\n").ini;
    let changes = diff(&merge(&old, None), &merge(&new, None));

    let kinds: Vec<(&str, ChangeKind)> = changes.iter().map(|c| (c.key.as_str(), c.kind)).collect();
    assert_eq!(
        kinds,
        vec![
            ("a", ChangeKind::Changed),
            ("b", ChangeKind::Changed),
            ("d", ChangeKind::New),
            ("c", ChangeKind::Deleted),
        ]
    );
}

#[test]
fn change_records_serialise_flat() -> Result<()> {
    let fx = Fixture::new([(P, "5")])?;
    fx.note("N1", &[(P, "10")])?;
    let mut app = fx.app()?;
    app.tune_note("N1")?;
    fx.note("N1", &[(P, "15")])?;

    let report = refreshed(app.refresh_note("N1")?);
    let json = serde_json::to_value(&report.changes[0])?;
    assert_eq!(
        json,
        serde_json::json!({ "key": P, "kind": "changed", "action": "replaced" })
    );
    Ok(())
}
