//! Atomic file writes
//!
//! Reports are rewritten many times during a batch. Each write goes to a
//! sibling temp file which is then renamed over the target, so a reader (or a
//! killed process) never observes a half-written file.

use crate::Result;
use serde::Serialize;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Temp file used while writing `target`
fn temp_path_for(target: &Path) -> PathBuf {
    let mut name = target
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    target.with_file_name(name)
}

/// Write `contents` to `target` via temp file + rename
pub fn write_atomic(target: &Path, contents: &[u8]) -> std::io::Result<()> {
    let temp = temp_path_for(target);
    {
        let mut file = File::create(&temp)?;
        file.write_all(contents)?;
        file.sync_all()?;
    }
    if let Err(e) = fs::rename(&temp, target) {
        let _ = fs::remove_file(&temp);
        return Err(e);
    }
    Ok(())
}

/// Serialize `value` as pretty JSON and write it atomically
pub fn write_json_atomic<T: Serialize + ?Sized>(target: &Path, value: &T) -> Result<()> {
    let mut json = serde_json::to_vec_pretty(value)?;
    json.push(b'\n');
    write_atomic(target, &json)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_atomic_write_replaces_target_and_removes_temp() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("report.json");

        write_atomic(&target, b"first").unwrap();
        write_atomic(&target, b"second").unwrap();

        assert_eq!(fs::read(&target).unwrap(), b"second");
        assert!(!dir.path().join("report.json.tmp").exists());
    }

    #[test]
    fn test_json_write_is_parseable() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("out.json");
        let mut map = std::collections::BTreeMap::new();
        map.insert("a", 1.5);

        write_json_atomic(&target, &map).unwrap();

        let back: serde_json::Value =
            serde_json::from_slice(&fs::read(&target).unwrap()).unwrap();
        assert_eq!(back["a"], 1.5);
    }

    #[test]
    fn test_write_into_missing_directory_fails() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("missing").join("out.json");
        assert!(write_atomic(&target, b"x").is_err());
    }
}
