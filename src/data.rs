use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;

use crate::constants::annotate::ANNOTATION_COLUMN;
use crate::constants::tsv::MISSING_TOKEN;

pub use crate::types::{ColumnName, RecordId};

/// Typed cell value. A missing cell is represented as `None` around this type.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    Text(String),
    Integer(i64),
    Float(f64),
}

impl FieldValue {
    /// Borrow the text payload, if this is a text value.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Integer view; floats with no fractional part convert losslessly.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(value) => Some(*value),
            FieldValue::Float(value) if value.fract() == 0.0 && value.is_finite() => {
                Some(*value as i64)
            }
            FieldValue::Text(text) => text.trim().parse::<i64>().ok().or_else(|| {
                text.trim()
                    .parse::<f64>()
                    .ok()
                    .filter(|value| value.fract() == 0.0 && value.is_finite())
                    .map(|value| value as i64)
            }),
            FieldValue::Float(_) => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Text(text) => f.write_str(text),
            FieldValue::Integer(value) => write!(f, "{value}"),
            FieldValue::Float(value) => f.write_str(&format_float(*value)),
        }
    }
}

/// Column type chosen for a whole column during inference.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ColumnKind {
    Text,
    Integer,
    Float,
}

/// Untyped tabular payload: header plus rows of optional cells.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub columns: Vec<ColumnName>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl Table {
    /// Create an empty table with the given header.
    pub fn with_columns<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<ColumnName>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of `name` in the header.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column == name)
    }

    /// True when `name` is part of the header.
    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Rename a column in place. Returns false when `from` is absent.
    pub fn rename_column(&mut self, from: &str, to: &str) -> bool {
        match self.column_index(from) {
            Some(idx) => {
                self.columns[idx] = to.to_string();
                true
            }
            None => false,
        }
    }

    /// Cell at (`row`, `column`), `None` when missing or out of range.
    pub fn cell(&self, row: usize, column: usize) -> Option<&str> {
        self.rows
            .get(row)
            .and_then(|cells| cells.get(column))
            .and_then(|cell| cell.as_deref())
    }

    /// Append a row, padding or truncating to the header width.
    pub fn push_row(&mut self, mut cells: Vec<Option<String>>) {
        cells.resize(self.columns.len(), None);
        self.rows.push(cells);
    }
}

/// One bibliographic entry: identifier, named typed fields, and the novelty flag.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Identifier (always text, unique within a deduplicated set).
    pub id: RecordId,
    /// Named fields in column order, identifier column included.
    pub fields: IndexMap<ColumnName, Option<FieldValue>>,
    /// Keyword annotation; `None` until annotated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub novelty_mention: Option<bool>,
}

impl Record {
    /// Build a record from an identifier and (name, value) pairs.
    ///
    /// The identifier is not inserted into `fields`; callers that need it as a
    /// column include it explicitly.
    pub fn new<I, K>(id: impl Into<RecordId>, fields: I) -> Self
    where
        I: IntoIterator<Item = (K, Option<FieldValue>)>,
        K: Into<ColumnName>,
    {
        Self {
            id: id.into(),
            fields: fields
                .into_iter()
                .map(|(key, value)| (key.into(), value))
                .collect(),
            novelty_mention: None,
        }
    }

    /// Non-null value of `name`.
    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name).and_then(Option::as_ref)
    }

    /// Text rendering of `name`, `None` when missing.
    pub fn text(&self, name: &str) -> Option<Cow<'_, str>> {
        self.field(name).map(|value| match value.as_text() {
            Some(text) => Cow::Borrowed(text),
            None => Cow::Owned(value.to_string()),
        })
    }

    /// True when any field is null (absent columns do not count).
    pub fn has_null(&self) -> bool {
        self.fields.values().any(Option::is_none)
    }

    /// True when any of `columns` is null or absent on this record.
    pub fn has_null_in(&self, columns: &[&str]) -> bool {
        columns.iter().any(|column| self.field(column).is_none())
    }
}

/// Ordered set of records sharing one identifier column.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordSet {
    /// Identifier column name.
    pub id_column: ColumnName,
    /// Column order used when rendering back to a table.
    pub columns: Vec<ColumnName>,
    /// Records in input order.
    pub records: Vec<Record>,
}

impl RecordSet {
    /// Create an empty record set.
    pub fn new(id_column: impl Into<ColumnName>, columns: Vec<ColumnName>) -> Self {
        Self {
            id_column: id_column.into(),
            columns,
            records: Vec::new(),
        }
    }

    /// Convert a raw table into typed records.
    ///
    /// `text_columns` are kept as text regardless of content; every other column
    /// becomes integer or float when all of its non-null cells parse as such.
    /// Rows whose identifier cell is missing keep an empty id and a null
    /// identifier field so null-dropping can remove them.
    pub fn from_table(table: &Table, id_column: &str, text_columns: &[&str]) -> Self {
        let kinds: Vec<ColumnKind> = (0..table.columns.len())
            .map(|idx| {
                if text_columns.contains(&table.columns[idx].as_str())
                    || table.columns[idx] == id_column
                {
                    ColumnKind::Text
                } else {
                    infer_column_kind(table, idx)
                }
            })
            .collect();
        let id_idx = table.column_index(id_column);

        let records = table
            .rows
            .iter()
            .map(|cells| {
                let fields: IndexMap<ColumnName, Option<FieldValue>> = table
                    .columns
                    .iter()
                    .enumerate()
                    .map(|(idx, column)| {
                        let value = cells
                            .get(idx)
                            .and_then(|cell| cell.as_deref())
                            .map(|cell| typed_cell(cell, kinds[idx]));
                        (column.clone(), value)
                    })
                    .collect();
                let id = id_idx
                    .and_then(|idx| cells.get(idx))
                    .and_then(|cell| cell.clone())
                    .unwrap_or_default();
                Record {
                    id,
                    fields,
                    novelty_mention: None,
                }
            })
            .collect();

        Self {
            id_column: id_column.to_string(),
            columns: table.columns.clone(),
            records,
        }
    }

    /// Render the set as a table; appends the annotation column when any record carries one.
    pub fn to_table(&self) -> Table {
        self.table_of(&self.records)
    }

    /// Render a subset of records with this set's header.
    pub fn table_of<'a>(&self, records: impl IntoIterator<Item = &'a Record>) -> Table {
        let annotated = self.is_annotated();
        let mut columns = self.columns.clone();
        if annotated && !self.has_column(ANNOTATION_COLUMN) {
            columns.push(ANNOTATION_COLUMN.to_string());
        }
        let mut table = Table::with_columns(columns);
        for record in records {
            table.push_row(record_cells(record, &self.columns, annotated));
        }
        table
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Record> {
        self.records.iter()
    }

    /// True when any record carries the keyword annotation.
    pub fn is_annotated(&self) -> bool {
        self.records
            .iter()
            .any(|record| record.novelty_mention.is_some())
    }

    /// True when `name` is part of the column set.
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|column| column == name)
    }

    /// Number of distinct identifiers.
    pub fn unique_ids(&self) -> usize {
        self.records
            .iter()
            .map(|record| record.id.as_str())
            .collect::<IndexSet<_>>()
            .len()
    }

    /// Keep the first record per identifier, preserving input order.
    pub fn dedup_first(&mut self) {
        let mut seen = IndexSet::new();
        self.records.retain(|record| seen.insert(record.id.clone()));
    }

    /// Drop records with a null in any of `columns` (absent columns ignored).
    pub fn drop_nulls_in(&mut self, columns: &[&str]) {
        let present: Vec<&str> = columns
            .iter()
            .copied()
            .filter(|column| self.has_column(column))
            .collect();
        self.records.retain(|record| !record.has_null_in(&present));
    }

    /// Drop records with a null in any field.
    pub fn drop_any_nulls(&mut self) {
        self.records.retain(|record| !record.has_null());
    }

    /// Lookup by identifier (first match).
    pub fn get(&self, id: &str) -> Option<&Record> {
        self.records.iter().find(|record| record.id == id)
    }
}

fn record_cells(record: &Record, columns: &[ColumnName], annotated: bool) -> Vec<Option<String>> {
    let mut cells: Vec<Option<String>> = columns
        .iter()
        .map(|column| record.field(column).map(ToString::to_string))
        .collect();
    if annotated && !columns.iter().any(|column| column == ANNOTATION_COLUMN) {
        cells.push(record.novelty_mention.map(render_flag));
    }
    cells
}

/// Render a boolean flag the way downstream readers expect (`True` / `False`).
pub fn render_flag(flag: bool) -> String {
    if flag { "True" } else { "False" }.to_string()
}

/// Render a float cell. Integral values keep a trailing `.0` (`1.0`, not `1`)
/// so float columns stay distinguishable from integer ones.
pub fn format_float(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e16 {
        format!("{value:.1}")
    } else {
        value.to_string()
    }
}

/// Text form of a possibly-missing value, with the missing token for `None`.
pub fn text_or_missing(value: Option<Cow<'_, str>>) -> Cow<'_, str> {
    value.unwrap_or(Cow::Borrowed(MISSING_TOKEN))
}

fn infer_column_kind(table: &Table, idx: usize) -> ColumnKind {
    let mut kind = ColumnKind::Integer;
    let mut seen_any = false;
    for row in 0..table.len() {
        let Some(cell) = table.cell(row, idx) else {
            continue;
        };
        seen_any = true;
        let trimmed = cell.trim();
        if kind == ColumnKind::Integer && trimmed.parse::<i64>().is_err() {
            kind = ColumnKind::Float;
        }
        if kind == ColumnKind::Float && trimmed.parse::<f64>().is_err() {
            return ColumnKind::Text;
        }
    }
    if seen_any { kind } else { ColumnKind::Text }
}

fn typed_cell(cell: &str, kind: ColumnKind) -> FieldValue {
    match kind {
        ColumnKind::Integer => cell
            .trim()
            .parse::<i64>()
            .map(FieldValue::Integer)
            .unwrap_or_else(|_| FieldValue::Text(cell.to_string())),
        ColumnKind::Float => cell
            .trim()
            .parse::<f64>()
            .map(FieldValue::Float)
            .unwrap_or_else(|_| FieldValue::Text(cell.to_string())),
        ColumnKind::Text => FieldValue::Text(cell.to_string()),
    }
}
