//! Record linkage between sources sharing an identifier domain.
//!
//! `combine` is a priority merge that first filters each side to fully
//! populated, deduplicated rows and only then fills gaps, so the secondary
//! source contributes whole records for identifiers the primary lacks rather
//! than individual fields of partially populated rows.

use indexmap::{IndexMap, IndexSet};
use std::path::Path;

use tracing::debug;

use crate::audit::{AuditSink, emit};
use crate::data::{FieldValue, Record, RecordSet};
use crate::errors::PrepError;
use crate::loader::RecordLoader;
use crate::types::{ColumnName, RecordId};

const LEFT_SUFFIX: &str = "_x";
const RIGHT_SUFFIX: &str = "_y";

/// Merges and joins `RecordSet`s on their identifier.
#[derive(Default)]
pub struct RecordMerger<'a> {
    sink: Option<&'a dyn AuditSink>,
}

impl<'a> RecordMerger<'a> {
    pub fn new() -> Self {
        Self { sink: None }
    }

    /// Route audit messages to `sink` instead of stdout.
    pub fn with_sink(mut self, sink: &'a dyn AuditSink) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Priority merge of `primary` over `secondary`.
    ///
    /// Each input independently drops rows with any null field and keeps the
    /// first row per identifier. The result holds one record per identifier in
    /// either filtered input, sorted by identifier; each field takes the
    /// primary value when non-null, else the secondary value, else null.
    /// Columns are the primary's followed by the secondary-only ones.
    pub fn combine(&self, primary: &RecordSet, secondary: &RecordSet) -> RecordSet {
        let primary = fully_populated(primary);
        let secondary = fully_populated(secondary);

        let mut columns: IndexSet<ColumnName> = primary.columns.iter().cloned().collect();
        columns.extend(secondary.columns.iter().cloned());
        let columns: Vec<ColumnName> = columns.into_iter().collect();

        let primary_by_id: IndexMap<&str, &Record> =
            primary.iter().map(|r| (r.id.as_str(), r)).collect();
        let secondary_by_id: IndexMap<&str, &Record> =
            secondary.iter().map(|r| (r.id.as_str(), r)).collect();

        let mut ids: Vec<&str> = primary_by_id
            .keys()
            .chain(secondary_by_id.keys())
            .copied()
            .collect::<IndexSet<_>>()
            .into_iter()
            .collect();
        ids.sort_unstable();

        let records = ids
            .into_iter()
            .map(|id| {
                let first = primary_by_id.get(id).copied();
                let second = secondary_by_id.get(id).copied();
                let fields = columns
                    .iter()
                    .map(|column| {
                        let value = first
                            .and_then(|record| record.field(column))
                            .or_else(|| second.and_then(|record| record.field(column)))
                            .cloned();
                        (column.clone(), value)
                    })
                    .collect();
                Record {
                    id: id.to_string(),
                    fields,
                    novelty_mention: first
                        .and_then(|record| record.novelty_mention)
                        .or_else(|| second.and_then(|record| record.novelty_mention)),
                }
            })
            .collect();

        let merged = RecordSet {
            id_column: primary.id_column.clone(),
            columns,
            records,
        };
        debug!(
            primary = primary.len(),
            secondary = secondary.len(),
            merged = merged.len(),
            "priority merge completed"
        );
        emit(
            self.sink,
            format!("* combined {} records with conclusions!", merged.len()),
        );
        merged
    }

    /// Load two text sources with `loader` and priority-merge them.
    pub fn combine_files(
        &self,
        loader: &RecordLoader<'_>,
        primary: &Path,
        secondary: &Path,
    ) -> Result<RecordSet, PrepError> {
        let primary = loader.load_text_source(primary)?;
        let secondary = loader.load_text_source(secondary)?;
        Ok(self.combine(&primary, &secondary))
    }

    /// Inner join on the identifier, in `left` order.
    ///
    /// Non-identifier columns present on both sides are suffixed `_x` (left)
    /// and `_y` (right).
    pub fn inner_join(&self, left: &RecordSet, right: &RecordSet) -> RecordSet {
        let id_column = left.id_column.clone();
        let shared: IndexSet<&str> = left
            .columns
            .iter()
            .filter(|column| **column != id_column && right.has_column(column))
            .map(String::as_str)
            .collect();

        let left_names: Vec<(ColumnName, ColumnName)> = left
            .columns
            .iter()
            .map(|column| (column.clone(), output_name(column, &shared, LEFT_SUFFIX)))
            .collect();
        let right_names: Vec<(ColumnName, ColumnName)> = right
            .columns
            .iter()
            .filter(|column| **column != right.id_column && **column != id_column)
            .map(|column| (column.clone(), output_name(column, &shared, RIGHT_SUFFIX)))
            .collect();

        let mut right_by_id: IndexMap<&RecordId, Vec<&Record>> = IndexMap::new();
        for record in right.iter() {
            right_by_id.entry(&record.id).or_default().push(record);
        }

        let mut records = Vec::new();
        for left_record in left.iter() {
            let Some(matches) = right_by_id.get(&left_record.id) else {
                continue;
            };
            for right_record in matches {
                let mut fields: IndexMap<ColumnName, Option<FieldValue>> = IndexMap::new();
                for (source, target) in &left_names {
                    fields.insert(target.clone(), left_record.field(source).cloned());
                }
                for (source, target) in &right_names {
                    fields.insert(target.clone(), right_record.field(source).cloned());
                }
                records.push(Record {
                    id: left_record.id.clone(),
                    fields,
                    novelty_mention: left_record
                        .novelty_mention
                        .or(right_record.novelty_mention),
                });
            }
        }

        let columns = left_names
            .into_iter()
            .chain(right_names)
            .map(|(_, target)| target)
            .collect();
        let joined = RecordSet {
            id_column,
            columns,
            records,
        };
        emit(
            self.sink,
            format!(
                "* found {} records with meta and conclusions!",
                joined.len()
            ),
        );
        joined
    }
}

fn fully_populated(records: &RecordSet) -> RecordSet {
    let mut filtered = records.clone();
    filtered.drop_any_nulls();
    filtered.dedup_first();
    filtered
}

fn output_name(column: &str, shared: &IndexSet<&str>, suffix: &str) -> ColumnName {
    if shared.contains(column) {
        format!("{column}{suffix}")
    } else {
        column.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemorySink;

    fn text(value: &str) -> Option<FieldValue> {
        Some(FieldValue::Text(value.to_string()))
    }

    fn record(id: &str, title: Option<FieldValue>, year: i64) -> Record {
        Record::new(
            id,
            [
                ("pmid", text(id)),
                ("title", title),
                ("year", Some(FieldValue::Integer(year))),
            ],
        )
    }

    fn set(records: Vec<Record>) -> RecordSet {
        RecordSet {
            id_column: "pmid".into(),
            columns: vec!["pmid".into(), "title".into(), "year".into()],
            records,
        }
    }

    #[test]
    fn combine_filters_each_side_before_filling_gaps() {
        let a = set(vec![record("1", text("T"), 2000)]);
        let b = set(vec![record("1", None, 2000), record("2", text("U"), 2001)]);
        let sink = MemorySink::new();
        let merged = RecordMerger::new().with_sink(&sink).combine(&a, &b);

        assert_eq!(merged.len(), 2);
        assert_eq!(merged.records[0].id, "1");
        assert_eq!(merged.records[0].text("title").as_deref(), Some("T"));
        assert_eq!(merged.records[1].id, "2");
        assert_eq!(merged.records[1].text("title").as_deref(), Some("U"));
        assert!(sink.contains("* combined 2 records with conclusions!"));
    }

    #[test]
    fn combine_drops_partial_rows_instead_of_field_filling() {
        let a = set(vec![record("5", None, 2010)]);
        let b = set(vec![record("5", None, 2011)]);
        let sink = MemorySink::new();
        let merged = RecordMerger::new().with_sink(&sink).combine(&a, &b);
        assert!(merged.is_empty());
    }

    #[test]
    fn combine_prefers_primary_and_sorts_ids() {
        let a = set(vec![record("9", text("primary"), 2000)]);
        let b = set(vec![
            record("9", text("secondary"), 1990),
            record("10", text("only-b"), 1991),
        ]);
        let sink = MemorySink::new();
        let merged = RecordMerger::new().with_sink(&sink).combine(&a, &b);
        let ids: Vec<&str> = merged.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["10", "9"]);
        assert_eq!(merged.get("9").unwrap().text("title").as_deref(), Some("primary"));
    }

    #[test]
    fn combine_unions_differing_schemas_with_nulls() {
        let a = set(vec![record("1", text("T"), 2000)]);
        let b = RecordSet {
            id_column: "pmid".into(),
            columns: vec!["pmid".into(), "conclusions".into()],
            records: vec![Record::new(
                "2",
                [("pmid", text("2")), ("conclusions", text("C"))],
            )],
        };
        let sink = MemorySink::new();
        let merged = RecordMerger::new().with_sink(&sink).combine(&a, &b);
        assert_eq!(merged.columns, vec!["pmid", "title", "year", "conclusions"]);
        assert_eq!(merged.get("1").unwrap().field("conclusions"), None);
        assert_eq!(merged.get("2").unwrap().field("title"), None);
    }

    #[test]
    fn inner_join_keeps_left_order_and_suffixes_shared_columns() {
        let meta = set(vec![
            record("3", text("Gamma"), 2003),
            record("1", text("Alpha"), 2001),
            record("2", text("Beta"), 2002),
        ]);
        let conclusions = RecordSet {
            id_column: "pmid".into(),
            columns: vec!["pmid".into(), "title".into(), "conclusions".into()],
            records: vec![
                Record::new(
                    "1",
                    [("pmid", text("1")), ("title", text("a")), ("conclusions", text("c1"))],
                ),
                Record::new(
                    "3",
                    [("pmid", text("3")), ("title", text("g")), ("conclusions", text("c3"))],
                ),
            ],
        };
        let sink = MemorySink::new();
        let joined = RecordMerger::new()
            .with_sink(&sink)
            .inner_join(&meta, &conclusions);

        let ids: Vec<&str> = joined.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["3", "1"]);
        assert_eq!(
            joined.columns,
            vec!["pmid", "title_x", "year", "title_y", "conclusions"]
        );
        assert_eq!(joined.records[0].text("title_x").as_deref(), Some("Gamma"));
        assert_eq!(joined.records[0].text("conclusions").as_deref(), Some("c3"));
        assert!(sink.contains("* found 2 records with meta and conclusions!"));
    }
}
