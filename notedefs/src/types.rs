use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Parameter family a declaration belongs to. Serialised as the bare section
/// name so persisted snapshots stay readable by older tooling.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Section {
    Version,
    Sysctl,
    Sys,
    Vm,
    Block,
    Cpu,
    Mem,
    Limits,
    Login,
    Service,
    Pagecache,
    Rpm,
    Grub,
    Reminder,
    Other(String),
}

impl Section {
    pub fn as_str(&self) -> &str {
        match self {
            Section::Version => "version",
            Section::Sysctl => "sysctl",
            Section::Sys => "sys",
            Section::Vm => "vm",
            Section::Block => "block",
            Section::Cpu => "cpu",
            Section::Mem => "mem",
            Section::Limits => "limits",
            Section::Login => "login",
            Section::Service => "service",
            Section::Pagecache => "pagecache",
            Section::Rpm => "rpm",
            Section::Grub => "grub",
            Section::Reminder => "reminder",
            Section::Other(name) => name.as_str(),
        }
    }

    /// Sections that carry metadata or prose, never a tunable value.
    pub fn is_informational(&self) -> bool {
        matches!(self, Section::Version | Section::Reminder)
    }

    /// Sections whose lines are not `key <op> value` triples.
    pub fn is_free_text(&self) -> bool {
        matches!(self, Section::Reminder | Section::Rpm | Section::Grub)
    }
}

impl From<&str> for Section {
    fn from(s: &str) -> Self {
        match s {
            "version" => Section::Version,
            "sysctl" => Section::Sysctl,
            "sys" => Section::Sys,
            "vm" => Section::Vm,
            "block" => Section::Block,
            "cpu" => Section::Cpu,
            "mem" => Section::Mem,
            "limits" => Section::Limits,
            "login" => Section::Login,
            "service" => Section::Service,
            "pagecache" => Section::Pagecache,
            "rpm" => Section::Rpm,
            "grub" => Section::Grub,
            "reminder" => Section::Reminder,
            other => Section::Other(other.to_string()),
        }
    }
}

impl From<String> for Section {
    fn from(s: String) -> Self {
        Section::from(s.as_str())
    }
}

impl From<Section> for String {
    fn from(s: Section) -> Self {
        s.as_str().to_string()
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Comparison operator of a declaration (`key <op> value`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Operator {
    #[default]
    #[serde(rename = "=")]
    Equal,
    #[serde(rename = "<")]
    LessThan,
    #[serde(rename = "<=")]
    LessThanEqual,
    #[serde(rename = ">")]
    MoreThan,
    #[serde(rename = ">=")]
    MoreThanEqual,
    /// Free-text lines (reminder, rpm, grub) have no operator.
    #[serde(rename = "")]
    None,
}

impl Operator {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "=" => Some(Operator::Equal),
            "<" => Some(Operator::LessThan),
            "<=" => Some(Operator::LessThanEqual),
            ">" => Some(Operator::MoreThan),
            ">=" => Some(Operator::MoreThanEqual),
            "" => Some(Operator::None),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Equal => "=",
            Operator::LessThan => "<",
            Operator::LessThanEqual => "<=",
            Operator::MoreThan => ">",
            Operator::MoreThanEqual => ">=",
            Operator::None => "",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One declaration: `[section] key <operator> value`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct IniEntry {
    pub section: Section,
    pub key: String,
    pub operator: Operator,
    pub value: String,
}

impl IniEntry {
    pub fn new(
        section: impl Into<Section>,
        key: impl Into<String>,
        operator: Operator,
        value: impl Into<String>,
    ) -> Self {
        Self {
            section: section.into(),
            key: key.into(),
            operator,
            value: value.into(),
        }
    }
}

/// Ordered list of declarations plus a section/key index over the same data.
///
/// Both views are persisted (`AllValues`, `KeyValue`); `push` and `remove`
/// keep them in step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct IniFile {
    #[serde(default, deserialize_with = "null_as_default")]
    pub all_values: Vec<IniEntry>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub key_value: BTreeMap<String, BTreeMap<String, IniEntry>>,
}

impl IniFile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a declaration. A replaced entry keeps its position
    /// in `all_values`. Returns the previous entry for the same section/key.
    pub fn push(&mut self, entry: IniEntry) -> Option<IniEntry> {
        let previous = self
            .key_value
            .entry(entry.section.as_str().to_string())
            .or_default()
            .insert(entry.key.clone(), entry.clone());
        match self
            .all_values
            .iter_mut()
            .find(|e| e.section == entry.section && e.key == entry.key)
        {
            Some(slot) => *slot = entry,
            None => self.all_values.push(entry),
        }
        previous
    }

    pub fn get(&self, section: &Section, key: &str) -> Option<&IniEntry> {
        self.key_value.get(section.as_str()).and_then(|m| m.get(key))
    }

    /// Find a declaration by key alone, whatever its section.
    pub fn find_key(&self, key: &str) -> Option<&IniEntry> {
        self.all_values.iter().find(|e| e.key == key)
    }

    pub fn remove(&mut self, section: &Section, key: &str) -> Option<IniEntry> {
        let removed = self
            .key_value
            .get_mut(section.as_str())
            .and_then(|m| m.remove(key));
        if self
            .key_value
            .get(section.as_str())
            .is_some_and(|m| m.is_empty())
        {
            self.key_value.remove(section.as_str());
        }
        self.all_values
            .retain(|e| !(e.section == *section && e.key == key));
        removed
    }

    pub fn entries(&self) -> impl Iterator<Item = &IniEntry> {
        self.all_values.iter()
    }

    pub fn section(&self, section: &Section) -> impl Iterator<Item = &IniEntry> {
        let wanted = section.clone();
        self.all_values.iter().filter(move |e| e.section == wanted)
    }

    pub fn len(&self) -> usize {
        self.all_values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.all_values.is_empty()
    }
}

/// Go-era writers emitted `null` for empty collections.
pub fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
