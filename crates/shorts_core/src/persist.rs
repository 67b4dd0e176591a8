//! Whole-file JSON persistence shared by the status store and dedup records.
//!
//! Writes go to a sibling temp file that is flushed and then renamed over
//! the target, so a concurrent reader sees either the old or the new file.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Outcome of reading a persisted JSON document.
#[derive(Debug)]
pub(crate) enum Loaded<T> {
    /// The file parsed successfully.
    Present(T),
    /// No file exists yet.
    Missing,
    /// The file exists but is not valid for `T`.
    Corrupt(String),
}

/// Read and parse a JSON document.
///
/// Missing and unparsable files are reported as values, only real I/O
/// failures (permissions, unreadable device) come back as `Err`.
pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> io::Result<Loaded<T>> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Loaded::Missing),
        Err(e) if e.kind() == io::ErrorKind::InvalidData => {
            return Ok(Loaded::Corrupt(e.to_string()))
        }
        Err(e) => return Err(e),
    };

    match serde_json::from_str::<T>(&content) {
        Ok(value) => Ok(Loaded::Present(value)),
        Err(e) => Ok(Loaded::Corrupt(e.to_string())),
    }
}

/// Serialize `value` as pretty JSON and atomically replace `path` with it.
pub(crate) fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> io::Result<()> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
    atomic_write(path, json.as_bytes())
}

/// Atomically replace `path` with `content`.
pub(crate) fn atomic_write(path: &Path, content: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let temp_path = temp_path_for(path);
    {
        let mut file = fs::File::create(&temp_path)?;
        file.write_all(content)?;
        file.sync_all()?;
    }

    if let Err(e) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(e);
    }
    Ok(())
}

/// Temp file next to `path` (same directory, so rename stays atomic).
fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::tempdir;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Doc {
        value: u32,
    }

    #[test]
    fn missing_file_is_not_an_error() {
        let dir = tempdir().unwrap();
        let loaded = read_json::<Doc>(&dir.path().join("nope.json")).unwrap();
        assert!(matches!(loaded, Loaded::Missing));
    }

    #[test]
    fn corrupt_file_is_reported() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("doc.json");
        fs::write(&path, "{ not json").unwrap();

        let loaded = read_json::<Doc>(&path).unwrap();
        assert!(matches!(loaded, Loaded::Corrupt(_)));
    }

    #[test]
    fn write_then_read() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("doc.json");

        write_json_atomic(&path, &Doc { value: 7 }).unwrap();

        match read_json::<Doc>(&path).unwrap() {
            Loaded::Present(doc) => assert_eq!(doc, Doc { value: 7 }),
            other => panic!("unexpected {:?}", other),
        }
        assert!(!temp_path_for(&path).exists());
    }
}
