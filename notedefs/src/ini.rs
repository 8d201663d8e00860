//! Note-definition and override text format.
//!
//! - `[section]` headers switch the current section.
//! - Key sections hold `key <op> value` lines; `op` is one of `=`, `<`, `<=`,
//!   `>`, `>=`. Quotes around the value are dropped and inner whitespace of
//!   multi-field values becomes a single tab.
//! - `reminder` collects every line (comments included) into one entry.
//! - `rpm` and `grub` lines are kept with an empty operator.
//! - A key repeated within one section keeps the later value; the repeat is
//!   reported in [`ParsedIni::duplicates`].

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

use crate::types::{IniEntry, IniFile, Operator, Section};

/// Parse result plus the keys that were declared more than once.
#[derive(Debug, Clone, Default)]
pub struct ParsedIni {
    pub ini: IniFile,
    pub duplicates: Vec<(Section, String)>,
    /// Lines that could not be split into key/operator/value.
    pub skipped: Vec<String>,
}

pub fn parse_ini(input: &str) -> ParsedIni {
    let mut out = ParsedIni::default();
    let mut current: Option<Section> = None;
    let mut reminder = String::new();

    for raw in input.lines() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        if line.starts_with('[') && line.ends_with(']') {
            current = Some(Section::from(line[1..line.len() - 1].trim()));
            continue;
        }
        let Some(section) = current.clone() else {
            continue;
        };
        if section == Section::Reminder {
            reminder.push_str(line);
            reminder.push('\n');
            continue;
        }
        if line.starts_with('#') {
            continue;
        }

        let entry = match section {
            Section::Rpm => {
                let fields: Vec<&str> = line.split_whitespace().collect();
                if fields.len() < 2 {
                    out.skipped.push(line.to_string());
                    continue;
                }
                let value = fields[1..].join(" ");
                IniEntry::new(section, format!("rpm:{}", fields[0]), Operator::None, value)
            }
            _ => match split_key_operator_value(line) {
                Some((key, op, value)) => {
                    let key = if section == Section::Grub {
                        format!("grub:{key}")
                    } else {
                        key.to_string()
                    };
                    let value = if section == Section::Version {
                        value.to_string()
                    } else {
                        value.split_whitespace().collect::<Vec<_>>().join("\t")
                    };
                    IniEntry::new(section, key, op, value)
                }
                None => {
                    out.skipped.push(line.to_string());
                    continue;
                }
            },
        };

        if let Some(previous) = out.ini.push(entry) {
            tracing::debug!(
                section = %previous.section,
                key = %previous.key,
                "duplicate declaration, later value wins"
            );
            out.duplicates.push((previous.section, previous.key));
        }
    }

    if !reminder.is_empty() {
        out.ini.push(IniEntry::new(
            Section::Reminder,
            "reminder",
            Operator::None,
            reminder,
        ));
    }
    out
}

/// Read and parse a file. A missing file is an error; callers that treat an
/// absent file as "no declarations" check existence first.
pub fn parse_ini_file(path: &Path) -> Result<ParsedIni> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    Ok(parse_ini(&text))
}

/// Split `key <op> value`. Keys are word characters plus `.`, `+`, `_`, `-`
/// (and `/` for sysfs paths); the operator is the run of `<`, `=`, `>`.
fn split_key_operator_value(line: &str) -> Option<(&str, Operator, &str)> {
    let key_end = line
        .find(|c: char| !(c.is_alphanumeric() || matches!(c, '.' | '+' | '_' | '-' | '/' | ':')))
        .unwrap_or(line.len());
    if key_end == 0 {
        return None;
    }
    let key = &line[..key_end];
    let rest = line[key_end..].trim_start();
    let op_end = rest
        .find(|c: char| !matches!(c, '<' | '=' | '>'))
        .unwrap_or(rest.len());
    let op = Operator::parse(&rest[..op_end])?;
    if op == Operator::None {
        return None;
    }
    let value = rest[op_end..]
        .trim()
        .trim_matches(|c| c == '"' || c == '\'');
    Some((key, op, value))
}
