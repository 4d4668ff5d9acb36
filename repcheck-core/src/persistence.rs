//! Atomic file writes for checkpoints and reports.
//!
//! Data goes to a `<name>.tmp` sibling first and is renamed into place, so a
//! reader never observes a half-written checkpoint or report.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Atomically write pretty-printed JSON to `path`.
///
/// Creates parent directories if they don't exist.
pub fn atomic_write_json<T: serde::Serialize>(path: &Path, data: &T) -> io::Result<()> {
    let mut json = serde_json::to_vec_pretty(data).map_err(io::Error::other)?;
    json.push(b'\n');
    atomic_write(path, &json)
}

/// Atomically write raw bytes to `path`.
pub fn atomic_write(path: &Path, data: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = tmp_sibling(path);
    let written = write_and_sync(&tmp, data).and_then(|()| std::fs::rename(&tmp, path));
    if written.is_err() {
        let _ = std::fs::remove_file(&tmp);
    }
    written
}

fn write_and_sync(path: &Path, data: &[u8]) -> io::Result<()> {
    let mut file = std::fs::File::create(path)?;
    file.write_all(data)?;
    file.sync_all()
}

/// `ckpt.json` -> `ckpt.json.tmp`, keeping the original extension intact.
fn tmp_sibling(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use tempfile::TempDir;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        name: String,
        values: Vec<f64>,
    }

    #[test]
    fn test_atomic_write_json_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("report.json");
        let data = Sample {
            name: "w1".into(),
            values: vec![1.0, 2.5],
        };

        atomic_write_json(&path, &data).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.ends_with('\n'));
        let loaded: Sample = serde_json::from_str(&content).unwrap();
        assert_eq!(loaded, data);
    }

    #[test]
    fn test_atomic_write_creates_parent_dirs() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("runs").join("a").join("ckpt.json");
        atomic_write(&path, b"{}").unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_no_tmp_file_left_behind() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ckpt.json");
        atomic_write(&path, b"first").unwrap();
        atomic_write(&path, b"second").unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"second");
        assert!(!dir.path().join("ckpt.json.tmp").exists());
    }

    #[test]
    fn test_failed_rename_removes_tmp_file() {
        let dir = TempDir::new().unwrap();
        // A non-empty directory at the target makes the final rename fail.
        let path = dir.path().join("report.json");
        std::fs::create_dir(&path).unwrap();
        std::fs::write(path.join("keep"), b"x").unwrap();

        assert!(atomic_write(&path, b"{}").is_err());
        assert!(!dir.path().join("report.json.tmp").exists());
        assert!(path.is_dir());
    }

    #[test]
    fn test_tmp_sibling_keeps_extension() {
        assert_eq!(
            tmp_sibling(Path::new("/runs/ckpt.json")),
            PathBuf::from("/runs/ckpt.json.tmp")
        );
    }
}
