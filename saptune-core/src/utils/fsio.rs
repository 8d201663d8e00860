use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Component, Path};

/// Write through a sibling temp file and rename over the target.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create_dir_all({:?})", parent))?;
    }
    let mut tmp_name = path
        .file_name()
        .map(|n| n.to_os_string())
        .ok_or_else(|| anyhow::anyhow!("invalid path: no file name: {:?}", path))?;
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);
    {
        let mut f = fs::File::create(&tmp).with_context(|| format!("open temp file {:?}", tmp))?;
        f.write_all(bytes)?;
        f.sync_all()?;
    }
    fs::rename(&tmp, path).with_context(|| format!("rename {:?} -> {:?}", tmp, path))?;
    Ok(())
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec(value).with_context(|| format!("serialise {:?}", path))?;
    write_atomic(path, &bytes)
}

/// Read a JSON store file.
///
/// # Returns
/// * `Ok(None)` when the file is missing, empty or unparsable. Unparsable
///   content is logged as corruption and otherwise ignored.
/// * `Err` only for I/O failures other than "not found".
pub fn read_json_lenient<T: DeserializeOwned>(path: &Path, what: &str) -> Result<Option<T>> {
    let bytes = match fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("reading {what} {}", path.display())),
    };
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    match serde_json::from_slice::<T>(&bytes) {
        Ok(v) => Ok(Some(v)),
        Err(err) => {
            tracing::warn!(
                file = %path.display(),
                error = %err,
                "corrupt {what}, treating it as empty"
            );
            Ok(None)
        }
    }
}

/// Remove a file; a missing file is not an error.
pub fn remove_if_exists(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e).with_context(|| format!("remove {}", path.display())),
    }
}

/// Map a note ID or parameter key to a single file name.
/// - Forbids empty names and `.`/`..`.
/// - `/` (sysfs-style keys) is stored as `%2F`.
pub fn store_file_name(name: &str) -> Result<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        anyhow::bail!("empty store key");
    }
    for c in Path::new(trimmed).components() {
        if matches!(c, Component::ParentDir | Component::CurDir) {
            anyhow::bail!("parent paths not allowed in store key {trimmed:?}");
        }
    }
    Ok(trimmed.replace('%', "%25").replace('/', "%2F"))
}

pub fn key_from_file_name(file: &str) -> String {
    file.replace("%2F", "/").replace("%25", "%")
}

/// File names directly inside `dir`, sorted; a missing directory is empty.
pub fn list_file_names(dir: &Path) -> Result<Vec<String>> {
    let rd = match fs::read_dir(dir) {
        Ok(rd) => rd,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e).with_context(|| format!("read_dir {}", dir.display())),
    };
    let mut out = Vec::new();
    for entry in rd {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            if name.ends_with(".tmp") {
                continue;
            }
            out.push(name.to_string());
        }
    }
    out.sort();
    Ok(out)
}
