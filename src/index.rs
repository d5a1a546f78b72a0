//! Inverted index over a multi-valued delimited column.
//!
//! Each mapping row such as `BroadSubjectTerms = "Neoplasms; Oncology"`,
//! `JournalTitle = "J Onc"` fans its value out to every category token.
//! Category order is first-encounter order; each category's values keep row
//! order and may repeat.

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use tracing::debug;

use crate::audit::{AuditSink, emit};
use crate::constants::index::{DEFAULT_DELIMITER, DEFAULT_KEY_COLUMN, DEFAULT_VALUE_COLUMN};
use crate::constants::tsv::MISSING_TOKEN;
use crate::data::Table;
use crate::errors::PrepError;
use crate::types::{CategoryId, ColumnName, MappedValue};

/// Category → mapped values, plus per-category frequency.
///
/// `frequency(c) == values(c).len()` for every category. There is no mutating
/// API; build a new index instead.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvertedIndex {
    values: IndexMap<CategoryId, Vec<MappedValue>>,
    frequencies: IndexMap<CategoryId, usize>,
}

impl InvertedIndex {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Categories in first-encounter order.
    pub fn categories(&self) -> impl Iterator<Item = &CategoryId> {
        self.values.keys()
    }

    /// Values associated with `category`, in row order.
    pub fn values(&self, category: &str) -> Option<&[MappedValue]> {
        self.values.get(category).map(Vec::as_slice)
    }

    /// Distinct values associated with `category` (membership view).
    pub fn value_set(&self, category: &str) -> IndexSet<&str> {
        self.values(category)
            .unwrap_or_default()
            .iter()
            .map(String::as_str)
            .collect()
    }

    /// Number of contributions recorded for `category` (0 when unknown).
    pub fn frequency(&self, category: &str) -> usize {
        self.frequencies.get(category).copied().unwrap_or(0)
    }

    /// (category, values) pairs in first-encounter order.
    pub fn iter(&self) -> impl Iterator<Item = (&CategoryId, &[MappedValue])> {
        self.values
            .iter()
            .map(|(category, values)| (category, values.as_slice()))
    }

    /// Categories by descending frequency; ties keep first-encounter order.
    pub fn frequency_report(&self) -> Vec<(CategoryId, usize)> {
        let mut report: Vec<(CategoryId, usize)> = self
            .frequencies
            .iter()
            .map(|(category, count)| (category.clone(), *count))
            .collect();
        report.sort_by(|a, b| b.1.cmp(&a.1));
        report
    }

    /// Persist as JSON.
    pub fn save_json(&self, path: &Path) -> Result<(), PrepError> {
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }

    /// Load a JSON index written by `save_json`.
    pub fn load_json(path: &Path) -> Result<Self, PrepError> {
        let reader = BufReader::new(File::open(path)?);
        let index: Self = serde_json::from_reader(reader)?;
        if let Some((category, _)) = index
            .values
            .iter()
            .find(|(category, values)| index.frequency(category) != values.len())
        {
            return Err(PrepError::schema(
                path,
                format!("frequency of category '{category}' does not match its values"),
            ));
        }
        Ok(index)
    }

    fn push(&mut self, category: &str, value: &str) {
        self.values
            .entry(category.to_string())
            .or_default()
            .push(value.to_string());
        *self.frequencies.entry(category.to_string()).or_insert(0) += 1;
    }
}

/// Result of one index build, with the audit counts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexBuild {
    pub index: InvertedIndex,
    /// Rows read from the mapping table.
    pub rows: usize,
    /// Rows skipped because the key column was missing.
    pub skipped_rows: usize,
}

/// Builds an `InvertedIndex` from a mapping table.
pub struct DelimitedIndexBuilder<'a> {
    key_column: ColumnName,
    value_column: ColumnName,
    delimiter: char,
    sink: Option<&'a dyn AuditSink>,
}

impl Default for DelimitedIndexBuilder<'_> {
    fn default() -> Self {
        Self::new(DEFAULT_KEY_COLUMN, DEFAULT_VALUE_COLUMN)
    }
}

impl<'a> DelimitedIndexBuilder<'a> {
    /// Builder reading categories from `key_column` and values from `value_column`.
    pub fn new(key_column: impl Into<ColumnName>, value_column: impl Into<ColumnName>) -> Self {
        Self {
            key_column: key_column.into(),
            value_column: value_column.into(),
            delimiter: DEFAULT_DELIMITER,
            sink: None,
        }
    }

    /// Override the separator inside the key column.
    pub fn with_delimiter(mut self, delimiter: char) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Route audit messages to `sink` instead of stdout.
    pub fn with_sink(mut self, sink: &'a dyn AuditSink) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Build the index from `table`.
    ///
    /// Rows with a missing key are skipped and counted. Empty tokens (after
    /// trimming) are ignored. A missing value in a kept row is recorded as the
    /// missing token so frequencies still equal sequence lengths.
    pub fn build(&self, table: &Table) -> Result<IndexBuild, PrepError> {
        let key_idx = self.require_column(table, &self.key_column)?;
        let value_idx = self.require_column(table, &self.value_column)?;

        let mut index = InvertedIndex::default();
        let mut skipped_rows = 0usize;
        for row in 0..table.len() {
            let Some(keys) = table.cell(row, key_idx) else {
                skipped_rows += 1;
                continue;
            };
            let value = table.cell(row, value_idx).unwrap_or(MISSING_TOKEN);
            for token in keys.split(self.delimiter) {
                let category = token.trim();
                if category.is_empty() {
                    continue;
                }
                index.push(category, value);
            }
        }

        for (category, count) in index.frequency_report() {
            emit(self.sink, format!("  {category}: {count}"));
        }
        if skipped_rows > 0 {
            emit(
                self.sink,
                format!(
                    "* skipped {skipped_rows} rows with missing {}",
                    self.key_column
                ),
            );
        }
        emit(
            self.sink,
            format!(
                "* extracted {} keys for {} values!",
                index.len(),
                table.len()
            ),
        );
        debug!(
            categories = index.len(),
            rows = table.len(),
            skipped_rows,
            "inverted index built"
        );

        Ok(IndexBuild {
            index,
            rows: table.len(),
            skipped_rows,
        })
    }

    fn require_column(&self, table: &Table, column: &str) -> Result<usize, PrepError> {
        table.column_index(column).ok_or_else(|| {
            PrepError::Configuration(format!("mapping table has no column '{column}'"))
        })
    }
}
