use std::fs;

use notedefs::{arch_section, parse_solution, NoteCatalog, Sysconfig};

#[test]
fn solution_picks_architecture_section() {
    let text = "[ArchX86]\n941735 1771258\n1980196\n[ArchPPC64LE]\n941735\n";
    assert_eq!(
        parse_solution(text, "ArchX86"),
        vec!["941735", "1771258", "1980196"]
    );
    assert_eq!(parse_solution(text, "ArchPPC64LE"), vec!["941735"]);
    assert_eq!(arch_section("powerpc64"), "ArchPPC64LE");
    assert_eq!(arch_section("x86_64"), "ArchX86");
}

#[test]
fn solution_without_sections_applies_everywhere() {
    assert_eq!(parse_solution("N1 N2 N1\n", "ArchX86"), vec!["N1", "N2"]);
}

#[test]
fn catalog_reads_notes_extras_and_solutions() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let notes = tmp.path().join("notes");
    let extra = tmp.path().join("extra");
    let sols = tmp.path().join("solutions");
    fs::create_dir_all(&notes)?;
    fs::create_dir_all(&extra)?;
    fs::create_dir_all(&sols)?;

    fs::write(
        notes.join("1000"),
        "[version]\nDESCRIPTION=shipped\n[sysctl]\nvm.swappiness = 10\n",
    )?;
    fs::write(
        notes.join("2000"),
        "[version]\nDESCRIPTION=second\n[sysctl]\nkernel.shmmni = 4096\n",
    )?;
    fs::write(
        extra.join("2000.conf"),
        "[version]\nDESCRIPTION=local\n[sysctl]\nkernel.shmmni = 8192\n",
    )?;
    fs::write(extra.join("README"), "not a note")?;
    fs::write(sols.join("HANA.sol"), "[ArchX86]\n1000 2000\n")?;

    let catalog = NoteCatalog::load(&notes, &extra, &sols, "ArchX86")?;
    assert_eq!(catalog.notes().count(), 2);
    assert_eq!(catalog.note("1000").map(|n| n.description.as_str()), Some("shipped"));
    // extra shadows shipped
    assert_eq!(catalog.note("2000").map(|n| n.description.as_str()), Some("local"));
    assert_eq!(
        catalog.solution("HANA").map(|s| s.to_vec()),
        Some(vec!["1000".to_string(), "2000".to_string()])
    );

    // reload sees on-disk edits, and a removed file reports None
    fs::write(notes.join("1000"), "[sysctl]\nvm.swappiness = 15\n")?;
    let fresh = catalog.reload_note("1000")?.expect("still present");
    assert_eq!(fresh.ini.entries().next().map(|e| e.value.as_str()), Some("15"));
    fs::remove_file(notes.join("1000"))?;
    assert!(catalog.reload_note("1000")?.is_none());
    Ok(())
}

#[test]
fn missing_directories_give_empty_catalog() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let nowhere = tmp.path().join("nowhere");
    let catalog = NoteCatalog::load(&nowhere, &nowhere, &nowhere, "ArchX86")?;
    assert_eq!(catalog.notes().count(), 0);
    Ok(())
}

#[test]
fn sysconfig_preserves_comments_and_unknown_keys() {
    let text = "## Type: string\n# enabled solutions\nTUNE_FOR_SOLUTIONS=\"HANA\"\nOTHER='x y'\nNOTE_APPLY_ORDER=\"\"\n";
    let mut cfg = Sysconfig::parse(text);
    assert_eq!(cfg.get_list("TUNE_FOR_SOLUTIONS"), vec!["HANA"]);
    assert_eq!(cfg.get("OTHER"), Some("x y"));
    assert!(cfg.get_list("NOTE_APPLY_ORDER").is_empty());

    cfg.set_list("NOTE_APPLY_ORDER", &["3".to_string(), "1".to_string()]);
    cfg.set("TUNE_FOR_NOTES", "");
    let out = cfg.to_text();
    assert!(out.starts_with("## Type: string\n# enabled solutions\n"));
    assert!(out.contains("NOTE_APPLY_ORDER=\"3 1\"\n"));
    assert!(out.contains("OTHER=\"x y\"\n"));
    assert!(out.ends_with("TUNE_FOR_NOTES=\"\"\n"));
    assert_eq!(Sysconfig::parse(&out).get_list("NOTE_APPLY_ORDER"), vec!["3", "1"]);
}
