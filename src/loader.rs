//! Tabular loading into typed records.
//!
//! Policies enforced here:
//! - identifier and auxiliary key columns are always read as text;
//! - a legacy `pubdate` column becomes `year` when `year` is absent;
//! - metadata rows missing any required value are dropped, text-source rows
//!   missing any value at all are dropped;
//! - duplicate identifiers keep their first occurrence.

use std::path::Path;

use tracing::debug;

use crate::audit::{AuditSink, emit};
use crate::config::ColumnConfig;
use crate::constants::loader::{LEGACY_YEAR_COLUMN, PMC_COLUMN, TITLE_COLUMN, YEAR_COLUMN};
use crate::data::{FieldValue, RecordSet, Table};
use crate::errors::PrepError;
use crate::transport::fs::{extension_of, is_tabular_file};
use crate::transport::tsv;
use crate::types::ColumnName;

/// Loads tab-separated sources into `Table`s and `RecordSet`s.
pub struct RecordLoader<'a> {
    id_column: ColumnName,
    text_columns: Vec<ColumnName>,
    sink: Option<&'a dyn AuditSink>,
}

impl<'a> RecordLoader<'a> {
    /// Loader keyed by `id_column`; `id_column` and `pmc` are read as text.
    pub fn new(id_column: impl Into<ColumnName>) -> Self {
        let id_column = id_column.into();
        Self {
            text_columns: vec![id_column.clone(), PMC_COLUMN.to_string()],
            id_column,
            sink: None,
        }
    }

    /// Loader configured from the pipeline's column names.
    pub fn from_columns(columns: &ColumnConfig) -> Self {
        Self {
            id_column: columns.id_column.clone(),
            text_columns: columns
                .text_column_refs()
                .into_iter()
                .map(str::to_string)
                .collect(),
            sink: None,
        }
    }

    /// Replace the set of columns forced to text (the identifier is always kept).
    pub fn with_text_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<ColumnName>,
    {
        self.text_columns = columns.into_iter().map(Into::into).collect();
        if !self.text_columns.contains(&self.id_column) {
            self.text_columns.push(self.id_column.clone());
        }
        self
    }

    /// Route audit messages to `sink` instead of stdout.
    pub fn with_sink(mut self, sink: &'a dyn AuditSink) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Identifier column this loader keys on.
    pub fn id_column(&self) -> &str {
        &self.id_column
    }

    /// Load a raw table after checking the file format.
    pub fn load_table(&self, path: &Path) -> Result<Table, PrepError> {
        check_format(path)?;
        let table = tsv::read_table(path)?;
        emit(
            self.sink,
            format!("* loaded {} rows from {}!", table.len(), path.display()),
        );
        Ok(table)
    }

    /// Load bibliographic metadata.
    ///
    /// Fails with `Parse` for unknown extensions and with `Schema` when none of
    /// the required columns (identifier, `year`, `title`) is present, when the
    /// identifier column is missing, or when a `year` value is not integral.
    pub fn load_metadata(&self, path: &Path) -> Result<RecordSet, PrepError> {
        check_format(path)?;
        let mut table = tsv::read_table(path)?;
        emit(
            self.sink,
            format!("* loaded {} lines from {}", table.len(), path.display()),
        );

        if !table.has_column(YEAR_COLUMN) && table.rename_column(LEGACY_YEAR_COLUMN, YEAR_COLUMN)
        {
            debug!(path = %path.display(), "renamed legacy publication date column to year");
        }

        let required = [self.id_column.as_str(), YEAR_COLUMN, TITLE_COLUMN];
        let present: Vec<&str> = required
            .iter()
            .copied()
            .filter(|column| table.has_column(column))
            .collect();
        if present.is_empty() {
            return Err(PrepError::schema(
                path,
                format!("none of the required columns {required:?} are present"),
            ));
        }
        if !table.has_column(&self.id_column) {
            return Err(PrepError::schema(
                path,
                format!("identifier column '{}' not found", self.id_column),
            ));
        }

        let mut records = RecordSet::from_table(&table, &self.id_column, &self.text_refs());
        records.drop_nulls_in(&present);
        emit(
            self.sink,
            format!(
                "* found {} lines after drop na in {}",
                records.len(),
                present.join(", ")
            ),
        );

        if records.has_column(YEAR_COLUMN) {
            for record in &mut records.records {
                let Some(slot) = record.fields.get_mut(YEAR_COLUMN) else {
                    continue;
                };
                let Some(value) = slot.as_ref() else {
                    continue;
                };
                let year = value.as_integer().ok_or_else(|| {
                    PrepError::schema(
                        path,
                        format!("year '{value}' of record '{}' is not an integer", record.id),
                    )
                })?;
                *slot = Some(FieldValue::Integer(year));
            }
        }

        let before = records.len();
        records.dedup_first();
        if records.len() < before {
            emit(
                self.sink,
                format!(
                    "* dropped {} duplicated {} values",
                    before - records.len(),
                    self.id_column
                ),
            );
        }
        Ok(records)
    }

    /// Load a text source (e.g. extracted conclusions).
    ///
    /// Every row with any missing value is dropped, then duplicate identifiers
    /// keep their first occurrence.
    pub fn load_text_source(&self, path: &Path) -> Result<RecordSet, PrepError> {
        check_format(path)?;
        let table = tsv::read_table(path)?;
        if !table.has_column(&self.id_column) {
            return Err(PrepError::schema(
                path,
                format!("identifier column '{}' not found", self.id_column),
            ));
        }

        let mut records = RecordSet::from_table(&table, &self.id_column, &self.text_refs());
        let unique_ids = records
            .records
            .iter()
            .filter(|record| record.field(&self.id_column).is_some())
            .map(|record| record.id.as_str())
            .collect::<indexmap::IndexSet<_>>()
            .len();
        records.drop_any_nulls();
        records.dedup_first();

        emit(
            self.sink,
            format!(
                "* loaded {}/{} records with conclusions from {}!",
                records.len(),
                unique_ids,
                path.display()
            ),
        );
        Ok(records)
    }

    fn text_refs(&self) -> Vec<&str> {
        self.text_columns.iter().map(String::as_str).collect()
    }
}

fn check_format(path: &Path) -> Result<(), PrepError> {
    if is_tabular_file(path) {
        return Ok(());
    }
    let reason = match extension_of(path) {
        Some(ext) => format!("unrecognized file extension '.{ext}'"),
        None => "missing file extension".to_string(),
    };
    Err(PrepError::parse(path, reason))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemorySink;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn metadata_keeps_leading_zero_ids_and_casts_year() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("meta.tsv");
        fs::write(
            &path,
            "pmid\tyear\ttitle\tjournal\n00123\t2001.0\tAlpha\tJ1\n00124\t\tBeta\tJ2\n",
        )
        .unwrap();

        let sink = MemorySink::new();
        let records = RecordLoader::new("pmid")
            .with_sink(&sink)
            .load_metadata(&path)
            .unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records.records[0].id, "00123");
        assert_eq!(
            records.records[0].field("year"),
            Some(&FieldValue::Integer(2001))
        );
        assert!(sink.contains("* loaded 2 lines from"));
        assert!(sink.contains("* found 1 lines after drop na in pmid, year, title"));
    }

    #[test]
    fn metadata_renames_pubdate_only_when_year_is_absent() {
        let temp = tempdir().unwrap();
        let legacy = temp.path().join("legacy.tsv");
        fs::write(&legacy, "pmid\tpubdate\ttitle\n1\t1999\tT\n").unwrap();
        let sink = MemorySink::new();
        let records = RecordLoader::new("pmid")
            .with_sink(&sink)
            .load_metadata(&legacy)
            .unwrap();
        assert!(records.has_column("year"));
        assert!(!records.has_column("pubdate"));

        let both = temp.path().join("both.tsv");
        fs::write(&both, "pmid\tyear\tpubdate\ttitle\n1\t2000\t1999\tT\n").unwrap();
        let records = RecordLoader::new("pmid")
            .with_sink(&sink)
            .load_metadata(&both)
            .unwrap();
        assert!(records.has_column("pubdate"));
        assert_eq!(
            records.records[0].field("year"),
            Some(&FieldValue::Integer(2000))
        );
    }

    #[test]
    fn metadata_rejects_unknown_extension_and_missing_schema() {
        let temp = tempdir().unwrap();
        let npy = temp.path().join("meta.npy");
        fs::write(&npy, "binary").unwrap();
        let sink = MemorySink::new();
        let loader = RecordLoader::new("pmid").with_sink(&sink);
        assert!(matches!(
            loader.load_metadata(&npy),
            Err(PrepError::Parse { .. })
        ));

        let bare = temp.path().join("bare.tsv");
        fs::write(&bare, "journal\tabstract\nJ\tA\n").unwrap();
        assert!(matches!(
            loader.load_metadata(&bare),
            Err(PrepError::Schema { .. })
        ));
    }

    #[test]
    fn metadata_deduplicates_keeping_first() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("dups.tsv");
        fs::write(
            &path,
            "pmid\tyear\ttitle\n7\t2000\tfirst\n8\t2001\tother\n7\t2002\tsecond\n",
        )
        .unwrap();
        let sink = MemorySink::new();
        let records = RecordLoader::new("pmid")
            .with_sink(&sink)
            .load_metadata(&path)
            .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records.get("7").unwrap().text("title").as_deref(), Some("first"));
        assert!(sink.contains("* dropped 1 duplicated pmid values"));
    }

    #[test]
    fn non_integral_year_is_a_schema_error() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("meta.tsv");
        fs::write(&path, "pmid\tyear\ttitle\n1\tspring 2001\tT\n").unwrap();
        let sink = MemorySink::new();
        let err = RecordLoader::new("pmid")
            .with_sink(&sink)
            .load_metadata(&path)
            .unwrap_err();
        assert!(matches!(err, PrepError::Schema { .. }), "{err}");
    }

    #[test]
    fn text_source_drops_any_null_rows_then_dedups() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("conclusions.tsv");
        fs::write(
            &path,
            "pmid\tpmc\tconclusions\n1\t007\tA novel result\n2\t008\t\n1\t009\tLater duplicate\n3\t010\tPlain\n",
        )
        .unwrap();
        let sink = MemorySink::new();
        let records = RecordLoader::new("pmid")
            .with_sink(&sink)
            .load_text_source(&path)
            .unwrap();
        let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "3"]);
        assert_eq!(
            records.records[0].field("pmc"),
            Some(&FieldValue::Text("007".into()))
        );
        assert!(sink.contains("* loaded 2/3 records with conclusions from"));
    }
}
