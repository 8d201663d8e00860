use notedefs::{parse_ini, IniEntry, IniFile, Operator, Section};

const NOTE_TEXT: &str = r#"
# SAP Note 1234567
[version]
VERSION=3
DATE=01.02.2024
DESCRIPTION=Linux: example tuning

[sysctl]
vm.swappiness = 10
kernel.shmmni >= 32768
kernel.sem = "32000 1024000000 500 32000"
net.ipv4.tcp_rmem='4096 87380 6291456'
not a declaration

[sys]
kernel/mm/transparent_hugepage/enabled = never

[reminder]
# check the page cache limit manually
# after every kernel update
"#;

#[test]
fn parses_sections_operators_and_metadata() {
    let parsed = parse_ini(NOTE_TEXT);
    let ini = &parsed.ini;

    let swap = ini.get(&Section::Sysctl, "vm.swappiness").expect("swappiness");
    assert_eq!(swap.operator, Operator::Equal);
    assert_eq!(swap.value, "10");

    let shm = ini.get(&Section::Sysctl, "kernel.shmmni").expect("shmmni");
    assert_eq!(shm.operator, Operator::MoreThanEqual);
    assert_eq!(shm.value, "32768");

    let desc = ini.get(&Section::Version, "DESCRIPTION").expect("description");
    assert_eq!(desc.value, "Linux: example tuning");

    let thp = ini
        .get(&Section::Sys, "kernel/mm/transparent_hugepage/enabled")
        .expect("thp");
    assert_eq!(thp.value, "never");

    assert_eq!(parsed.skipped, vec!["not a declaration".to_string()]);
}

#[test]
fn multi_field_values_are_unquoted_and_tab_separated() {
    let parsed = parse_ini(NOTE_TEXT);
    let sem = parsed.ini.get(&Section::Sysctl, "kernel.sem").expect("sem");
    assert_eq!(sem.value, "32000\t1024000000\t500\t32000");
    let rmem = parsed
        .ini
        .get(&Section::Sysctl, "net.ipv4.tcp_rmem")
        .expect("rmem");
    assert_eq!(rmem.value, "4096\t87380\t6291456");
}

#[test]
fn reminder_lines_collapse_into_one_entry() {
    let parsed = parse_ini(NOTE_TEXT);
    let reminder = parsed
        .ini
        .get(&Section::Reminder, "reminder")
        .expect("reminder");
    assert_eq!(reminder.operator, Operator::None);
    assert!(reminder.value.contains("page cache limit"));
    assert!(reminder.value.contains("after every kernel update"));
}

#[test]
fn duplicate_keys_keep_later_value_and_are_reported() {
    let parsed = parse_ini("[sysctl]\nvm.swappiness = 10\nvm.swappiness = 30\n");
    assert_eq!(parsed.ini.len(), 1);
    assert_eq!(
        parsed.ini.get(&Section::Sysctl, "vm.swappiness").map(|e| e.value.as_str()),
        Some("30")
    );
    assert_eq!(
        parsed.duplicates,
        vec![(Section::Sysctl, "vm.swappiness".to_string())]
    );
}

#[test]
fn empty_override_value_is_kept_as_empty_string() {
    let parsed = parse_ini("[sysctl]\nvm.swappiness =\nkernel.shmmni = untouched\n");
    assert_eq!(
        parsed.ini.get(&Section::Sysctl, "vm.swappiness").map(|e| e.value.as_str()),
        Some("")
    );
    assert_eq!(
        parsed.ini.get(&Section::Sysctl, "kernel.shmmni").map(|e| e.value.as_str()),
        Some("untouched")
    );
}

#[test]
fn rpm_and_grub_lines_are_free_text() {
    let parsed = parse_ini("[rpm]\nglibc all 2.22-51.6\n[grub]\nnuma_balancing=disable\n");
    let rpm = parsed.ini.get(&Section::Rpm, "rpm:glibc").expect("rpm");
    assert_eq!(rpm.operator, Operator::None);
    assert_eq!(rpm.value, "all 2.22-51.6");
    assert!(parsed.ini.get(&Section::Grub, "grub:numa_balancing").is_some());
}

#[test]
fn unknown_sections_are_preserved_by_name() {
    let parsed = parse_ini("[frobnicate]\nknob = 1\n");
    let entry = parsed.ini.entries().next().expect("entry");
    assert_eq!(entry.section, Section::Other("frobnicate".into()));
    assert_eq!(entry.section.as_str(), "frobnicate");
}

#[test]
fn ini_file_serialises_with_persisted_field_names() {
    let mut ini = IniFile::new();
    ini.push(IniEntry::new(Section::Sysctl, "vm.swappiness", Operator::LessThanEqual, "10"));
    let json = serde_json::to_value(&ini).expect("serialise");
    assert_eq!(json["AllValues"][0]["Section"], "sysctl");
    assert_eq!(json["AllValues"][0]["Operator"], "<=");
    assert_eq!(json["KeyValue"]["sysctl"]["vm.swappiness"]["Value"], "10");

    let legacy = r#"{"AllValues":null,"KeyValue":null}"#;
    let back: IniFile = serde_json::from_str(legacy).expect("null collections");
    assert!(back.is_empty());
}

#[test]
fn remove_keeps_both_views_in_step() {
    let mut ini = IniFile::new();
    ini.push(IniEntry::new(Section::Sysctl, "a", Operator::Equal, "1"));
    ini.push(IniEntry::new(Section::Sysctl, "b", Operator::Equal, "2"));
    assert!(ini.remove(&Section::Sysctl, "a").is_some());
    assert!(ini.get(&Section::Sysctl, "a").is_none());
    assert_eq!(ini.len(), 1);
    assert!(ini.remove(&Section::Sysctl, "b").is_some());
    assert!(ini.key_value.is_empty());
}
