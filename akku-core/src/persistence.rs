//! File output helpers shared by the cleaning, analysis and visualization stages.

use std::io;
use std::path::{Path, PathBuf};

/// Atomically write JSON data to a file.
///
/// Serializes `data` to pretty-printed JSON, writes a `.tmp` sibling, then
/// renames it over `path`. Creates parent directories if they don't exist.
pub fn atomic_write_json<T: serde::Serialize>(path: &Path, data: &T) -> io::Result<()> {
    let json = serde_json::to_string_pretty(data).map_err(io::Error::other)?;
    atomic_write(path, json.as_bytes())
}

/// Atomically write raw bytes to a file.
pub fn atomic_write(path: &Path, data: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, data)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Make a column or dataset name usable as part of a file name.
///
/// Spaces and path separators become `_`.
pub fn file_stem_for(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            ' ' | '/' | '\\' => '_',
            other => other,
        })
        .collect()
}

/// List files in `dir` with the given extension, sorted by name.
///
/// A missing directory yields an empty list.
pub fn list_files_with_extension(dir: &Path, extension: &str) -> io::Result<Vec<PathBuf>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == extension) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_atomic_write_json_creates_parent_dirs() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("analysis_outputs").join("report.json");

        atomic_write_json(&path, &serde_json::json!({"records": 3})).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("\"records\": 3"));
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn test_atomic_write_overwrites() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.csv");
        atomic_write(&path, b"first").unwrap();
        atomic_write(&path, b"second").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "second");
    }

    #[test]
    fn test_file_stem_for() {
        assert_eq!(file_stem_for("Model Year"), "Model_Year");
        assert_eq!(
            file_stem_for("Clean Alternative Fuel Vehicle (CAFV) Eligibility"),
            "Clean_Alternative_Fuel_Vehicle_(CAFV)_Eligibility"
        );
        assert_eq!(file_stem_for("Make/Model"), "Make_Model");
    }

    #[test]
    fn test_list_files_with_extension() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("b.svg"), "").unwrap();
        std::fs::write(dir.path().join("a.svg"), "").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "").unwrap();

        let files = list_files_with_extension(dir.path(), "svg").unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.svg", "b.svg"]);
    }

    #[test]
    fn test_list_files_missing_dir() {
        let files = list_files_with_extension(Path::new("/nonexistent/charts"), "svg").unwrap();
        assert!(files.is_empty());
    }
}
