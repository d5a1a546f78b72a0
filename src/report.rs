//! Output sinks for per-category samples and the detection summary.

use indexmap::{IndexMap, IndexSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::data::Table;
use crate::errors::PrepError;
use crate::transport::fs::{count_entries, ensure_dir};
use crate::transport::tsv::{render_table, write_table};

/// Destination for tabular outputs. Writes overwrite existing destinations.
pub trait ReportWriter: Send + Sync {
    /// Make sure `dir` can receive files.
    fn ensure_dir(&self, dir: &Path) -> Result<(), PrepError>;
    /// Persist `table` at `destination`.
    fn write(&self, table: &Table, destination: &Path) -> Result<(), PrepError>;
    /// Number of entries currently under `dir`.
    fn entries(&self, dir: &Path) -> Result<usize, PrepError>;
}

/// Writes tab-separated files to the local filesystem.
#[derive(Clone, Copy, Debug, Default)]
pub struct TsvReportWriter;

impl ReportWriter for TsvReportWriter {
    fn ensure_dir(&self, dir: &Path) -> Result<(), PrepError> {
        ensure_dir(dir)?;
        Ok(())
    }

    fn write(&self, table: &Table, destination: &Path) -> Result<(), PrepError> {
        write_table(table, destination)
    }

    fn entries(&self, dir: &Path) -> Result<usize, PrepError> {
        Ok(count_entries(dir)?)
    }
}

/// Keeps written tables in memory, keyed by destination path.
#[derive(Debug, Default)]
pub struct MemoryReportWriter {
    files: Mutex<IndexMap<PathBuf, Table>>,
    dirs: Mutex<IndexSet<PathBuf>>,
}

impl MemoryReportWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table written at `path`, if any.
    pub fn table(&self, path: &Path) -> Option<Table> {
        self.files.lock().ok()?.get(path).cloned()
    }

    /// Exact bytes the filesystem writer would have produced for `path`.
    pub fn rendered(&self, path: &Path) -> Option<String> {
        self.table(path).map(|table| render_table(&table))
    }

    /// Destinations in first-write order.
    pub fn paths(&self) -> Vec<PathBuf> {
        self.files
            .lock()
            .map(|files| files.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// True when `ensure_dir` was called for `dir`.
    pub fn has_dir(&self, dir: &Path) -> bool {
        self.dirs
            .lock()
            .map(|dirs| dirs.contains(dir))
            .unwrap_or(false)
    }
}

impl ReportWriter for MemoryReportWriter {
    fn ensure_dir(&self, dir: &Path) -> Result<(), PrepError> {
        self.dirs
            .lock()
            .map_err(|_| PrepError::Configuration("memory writer lock poisoned".into()))?
            .insert(dir.to_path_buf());
        Ok(())
    }

    fn write(&self, table: &Table, destination: &Path) -> Result<(), PrepError> {
        self.files
            .lock()
            .map_err(|_| PrepError::Configuration("memory writer lock poisoned".into()))?
            .insert(destination.to_path_buf(), table.clone());
        Ok(())
    }

    fn entries(&self, dir: &Path) -> Result<usize, PrepError> {
        let files = self
            .files
            .lock()
            .map_err(|_| PrepError::Configuration("memory writer lock poisoned".into()))?;
        Ok(files
            .keys()
            .filter(|path| path.parent() == Some(dir))
            .count())
    }
}
