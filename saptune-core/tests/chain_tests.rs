// tests/chain_tests.rs
use std::fs;

use anyhow::Result;

use saptune_core::services::{insertion_index, ChainRevert, ChainStore, ParameterChain, SavedStateStore};

fn order(ids: &[&str]) -> Vec<String> {
    ids.iter().map(|s| s.to_string()).collect()
}

#[test]
fn start_append_and_layout() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let store = ChainStore::open(tmp.path())?;

    assert!(store.start_value("vm.swappiness", "60")?);
    assert!(!store.start_value("vm.swappiness", "1")?, "start is recorded once");
    store.append("vm.swappiness", "N1", "10")?;
    assert!(store.append("vm.swappiness", "N1", "11").is_err());

    let raw = fs::read_to_string(tmp.path().join("vm.swappiness"))?;
    let json: serde_json::Value = serde_json::from_str(&raw)?;
    assert_eq!(
        json,
        serde_json::json!({
            "AllNotes": [
                { "NoteID": "start", "Value": "60" },
                { "NoteID": "N1", "Value": "10" }
            ]
        })
    );

    let chain = store.load("vm.swappiness")?;
    assert_eq!(chain.start_value(), Some("60"));
    assert_eq!(chain.effective_value(), Some("10"));
    assert!(chain.is_tail("N1"));
    assert_eq!(store.keys()?, vec!["vm.swappiness"]);
    Ok(())
}

#[test]
fn append_needs_a_start_value() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let store = ChainStore::open(tmp.path())?;
    assert!(store.append("kernel.shmmni", "N1", "4096").is_err());
    Ok(())
}

#[test]
fn position_zero_means_absent() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let store = ChainStore::open(tmp.path())?;
    store.start_value("p", "1")?;
    assert_eq!(store.position_of("p", "start")?, 0);
    assert_eq!(store.position_of("p", "N1")?, 0);
    store.append("p", "N1", "2")?;
    store.append("p", "N2", "3")?;
    assert_eq!(store.position_of("p", "N1")?, 1);
    assert_eq!(store.position_of("p", "N2")?, 2);
    assert_eq!(store.position_of("p", "N9")?, 0);
    Ok(())
}

#[test]
fn insertion_index_follows_apply_order() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let store = ChainStore::open(tmp.path())?;
    store.start_value("p", "0")?;
    store.append("p", "A", "1")?;
    store.append("p", "C", "3")?;
    let chain = store.load("p")?;
    let apply = order(&["A", "B", "C"]);

    assert_eq!(insertion_index("B", &apply, &chain), 2);
    // nothing later in the chain: append
    assert_eq!(insertion_index("D", &order(&["A", "C", "D"]), &chain), 0);
    // not in the order at all: append
    assert_eq!(insertion_index("X", &apply, &chain), 0);

    store.insert_before("p", "B", "2", 2)?;
    assert_eq!(
        store.load("p")?.note_ids().collect::<Vec<_>>(),
        vec!["A", "B", "C"]
    );
    assert!(store.insert_before("p", "Z", "9", 0).is_err());
    assert!(store.insert_before("p", "Z", "9", 9).is_err());
    Ok(())
}

#[test]
fn revert_outcomes() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let store = ChainStore::open(tmp.path())?;

    assert_eq!(store.revert("p", "N1")?, ChainRevert::Unmanaged);
    store.start_value("p", "0")?;
    assert_eq!(store.revert("p", "N1")?, ChainRevert::Unmanaged);
    assert!(!tmp.path().join("p").exists(), "a start-only chain is released");

    store.start_value("p", "0")?;
    store.append("p", "N1", "10")?;
    store.append("p", "N2", "20")?;
    store.append("p", "N3", "30")?;
    assert_eq!(store.revert("p", "N9")?, ChainRevert::NotPresent);

    assert_eq!(
        store.revert("p", "N2")?,
        ChainRevert::Shadowed {
            successor: "N3".into(),
            predecessor_value: "10".into()
        }
    );
    assert_eq!(
        store.revert("p", "N3")?,
        ChainRevert::Tail {
            value: "10".into(),
            owner: "N1".into(),
            collapsed: false
        }
    );
    assert_eq!(
        store.revert("p", "N1")?,
        ChainRevert::Tail {
            value: "0".into(),
            owner: "start".into(),
            collapsed: true
        }
    );
    assert!(!tmp.path().join("p").exists());
    Ok(())
}

#[test]
fn replace_updates_in_place() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let store = ChainStore::open(tmp.path())?;
    store.start_value("p", "0")?;
    store.append("p", "N1", "10")?;
    store.append("p", "N2", "20")?;
    store.replace("p", "N1", "15")?;
    assert_eq!(store.load("p")?.value_of("N1"), Some("15"));
    assert_eq!(store.load("p")?.effective_value(), Some("20"));
    assert!(store.replace("p", "N9", "1").is_err());
    Ok(())
}

#[test]
fn corrupt_or_null_chain_files_read_as_empty() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let store = ChainStore::open(tmp.path())?;
    fs::write(tmp.path().join("broken"), "{ not json")?;
    fs::write(tmp.path().join("legacy"), r#"{"AllNotes":null}"#)?;
    fs::write(tmp.path().join("empty"), "")?;

    assert_eq!(store.load("broken")?, ParameterChain::default());
    assert_eq!(store.load("legacy")?, ParameterChain::default());
    assert_eq!(store.load("empty")?, ParameterChain::default());
    assert_eq!(store.revert("broken", "N1")?, ChainRevert::Unmanaged);
    Ok(())
}

#[test]
fn keys_with_slashes_are_escaped_on_disk() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let store = ChainStore::open(tmp.path())?;
    store.start_value("kernel/mm/ksm/run", "0")?;
    assert!(tmp.path().join("kernel%2Fmm%2Fksm%2Frun").exists());
    assert_eq!(store.keys()?, vec!["kernel/mm/ksm/run"]);
    Ok(())
}

#[test]
fn saved_state_uses_legacy_field_names() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let states = SavedStateStore::open(tmp.path())?;
    fs::write(
        tmp.path().join("1410736"),
        r#"{"ConfFilePath":"/usr/share/saptune/notes/1410736","ID":"1410736",
            "DescriptiveName":"TCP keepalive","SysctlParams":{"net.ipv4.tcp_keepalive_time":"7200"},
            "ValuesToApply":null,"OverrideParams":null,"Inform":null}"#,
    )?;

    let state = states.retrieve("1410736")?.expect("state");
    assert_eq!(state.id, "1410736");
    assert_eq!(state.values.get("net.ipv4.tcp_keepalive_time").map(String::as_str), Some("7200"));
    assert!(state.override_params.is_empty());

    assert!(states.set_value("1410736", "net.ipv4.tcp_keepalive_time", "300")?);
    assert!(!states.set_value("other", "x", "1")?);
    assert!(!states.store_if_absent("1410736", &state)?);
    let state = states.retrieve("1410736")?.expect("state");
    assert_eq!(state.values.get("net.ipv4.tcp_keepalive_time").map(String::as_str), Some("300"));
    assert_eq!(states.list()?, vec!["1410736"]);
    Ok(())
}
