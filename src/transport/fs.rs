use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::constants::tsv::TABULAR_EXTENSIONS;

/// Lower-cased file extension, if any.
pub fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
}

/// True if the path has a tab-separated extension (case-insensitive).
pub fn is_tabular_file(path: &Path) -> bool {
    extension_of(path)
        .map(|ext| TABULAR_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

/// Create `dir` (and parents) when missing. Returns true if it was created.
pub fn ensure_dir(dir: &Path) -> io::Result<bool> {
    if dir.is_dir() {
        return Ok(false);
    }
    fs::create_dir_all(dir)?;
    Ok(true)
}

/// Number of directory entries directly under `dir`.
pub fn count_entries(dir: &Path) -> io::Result<usize> {
    let mut count = 0;
    for entry in fs::read_dir(dir)? {
        entry?;
        count += 1;
    }
    Ok(count)
}

/// Parent directory used for sibling outputs; `.` when `path` has no parent.
pub fn sibling_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn tabular_detection_is_case_insensitive() {
        assert!(is_tabular_file(Path::new("meta.TSV")));
        assert!(is_tabular_file(Path::new("dir/journals.txt")));
        assert!(!is_tabular_file(Path::new("meta.npy")));
        assert!(!is_tabular_file(Path::new("meta")));
    }

    #[test]
    fn ensure_dir_creates_once_and_counts_entries() {
        let temp = tempdir().unwrap();
        let out = temp.path().join("nested/out");
        assert!(ensure_dir(&out).unwrap());
        assert!(!ensure_dir(&out).unwrap());
        fs::write(out.join("a.tsv"), "x\n").unwrap();
        fs::write(out.join("b.tsv"), "y\n").unwrap();
        assert_eq!(count_entries(&out).unwrap(), 2);
    }

    #[test]
    fn sibling_dir_falls_back_to_current_directory() {
        assert_eq!(sibling_dir(Path::new("runs/bst")), PathBuf::from("runs"));
        assert_eq!(sibling_dir(Path::new("bst")), PathBuf::from("."));
    }
}
