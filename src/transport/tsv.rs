//! Tab-separated codec.
//!
//! Reading follows the conventions of the upstream tooling that produces the
//! input files: the first line is the header, blank lines are skipped, quoted
//! cells may contain delimiters, doubled quotes, and newlines, and any cell
//! matching one of `NULL_TOKENS` is read as missing. `read_table_verbatim`
//! keeps every present cell as written. Writing quotes only the cells that
//! need it and renders missing cells as empty strings.

use std::borrow::Cow;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::constants::tsv::{FIELD_DELIMITER, NULL_TOKENS, QUOTE};
use crate::data::Table;
use crate::errors::PrepError;

/// Read a tab-separated file into a `Table`.
pub fn read_table(path: &Path) -> Result<Table, PrepError> {
    let content = std::fs::read_to_string(path)?;
    parse_table(&content, path)
}

/// Read a tab-separated file without null-token detection. Only cells absent
/// from a short row are missing; `NA` or an empty cell stays text.
pub fn read_table_verbatim(path: &Path) -> Result<Table, PrepError> {
    let content = std::fs::read_to_string(path)?;
    parse_cells(&content, path, Some)
}

/// Parse tab-separated `content`; `origin` is only used in error messages.
pub fn parse_table(content: &str, origin: &Path) -> Result<Table, PrepError> {
    parse_cells(content, origin, null_filter)
}

fn parse_cells(
    content: &str,
    origin: &Path,
    cell_value: fn(String) -> Option<String>,
) -> Result<Table, PrepError> {
    let mut lines = split_lines(content).map_err(|reason| PrepError::parse(origin, reason))?;
    lines.retain(|line| !line.is_blank());
    let mut lines = lines.into_iter();
    let header = lines
        .next()
        .ok_or_else(|| PrepError::parse(origin, "no columns to parse from file"))?;
    let mut table = Table::with_columns(header.cells);

    for line in lines {
        if line.cells.len() > table.columns.len() {
            return Err(PrepError::parse(
                origin,
                format!(
                    "expected {} fields in line {}, saw {}",
                    table.columns.len(),
                    line.number,
                    line.cells.len()
                ),
            ));
        }
        table.push_row(line.cells.into_iter().map(cell_value).collect());
    }
    Ok(table)
}

/// Write `table` to `path`, replacing any existing file.
pub fn write_table(table: &Table, path: &Path) -> Result<(), PrepError> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    write_line(&mut writer, table.columns.iter().map(|c| Some(c.as_str())))?;
    for row in &table.rows {
        write_line(&mut writer, row.iter().map(|cell| cell.as_deref()))?;
    }
    writer.flush()?;
    Ok(())
}

/// Render `table` as tab-separated text (same bytes `write_table` produces).
pub fn render_table(table: &Table) -> String {
    let mut out = Vec::new();
    // Writing into a Vec cannot fail.
    let _ = write_line(&mut out, table.columns.iter().map(|c| Some(c.as_str())));
    for row in &table.rows {
        let _ = write_line(&mut out, row.iter().map(|cell| cell.as_deref()));
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn write_line<'a, W: Write>(
    writer: &mut W,
    cells: impl Iterator<Item = Option<&'a str>>,
) -> std::io::Result<()> {
    for (idx, cell) in cells.enumerate() {
        if idx > 0 {
            write!(writer, "{FIELD_DELIMITER}")?;
        }
        if let Some(cell) = cell {
            writer.write_all(quote_cell(cell).as_bytes())?;
        }
    }
    writeln!(writer)
}

fn quote_cell(cell: &str) -> Cow<'_, str> {
    let needs_quotes = cell
        .chars()
        .any(|ch| ch == FIELD_DELIMITER || ch == QUOTE || ch == '\n' || ch == '\r');
    if !needs_quotes {
        return Cow::Borrowed(cell);
    }
    let doubled = cell.replace(QUOTE, "\"\"");
    Cow::Owned(format!("{QUOTE}{doubled}{QUOTE}"))
}

fn null_filter(cell: String) -> Option<String> {
    if NULL_TOKENS.contains(&cell.as_str()) {
        None
    } else {
        Some(cell)
    }
}

struct RawLine {
    number: usize,
    cells: Vec<String>,
}

impl RawLine {
    fn is_blank(&self) -> bool {
        self.cells.len() == 1 && self.cells[0].is_empty()
    }
}

fn split_lines(content: &str) -> Result<Vec<RawLine>, String> {
    let mut lines = Vec::new();
    let mut cells = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut line_no = 1usize;
    let mut start_line = 1usize;
    let mut chars = content.chars().peekable();

    while let Some(ch) = chars.next() {
        if in_quotes {
            match ch {
                QUOTE if chars.peek() == Some(&QUOTE) => {
                    chars.next();
                    field.push(QUOTE);
                }
                QUOTE => in_quotes = false,
                '\n' => {
                    line_no += 1;
                    field.push(ch);
                }
                _ => field.push(ch),
            }
            continue;
        }
        match ch {
            QUOTE if field.is_empty() => in_quotes = true,
            FIELD_DELIMITER => cells.push(std::mem::take(&mut field)),
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' => {
                cells.push(std::mem::take(&mut field));
                lines.push(RawLine {
                    number: start_line,
                    cells: std::mem::take(&mut cells),
                });
                line_no += 1;
                start_line = line_no;
            }
            _ => field.push(ch),
        }
    }

    if in_quotes {
        return Err(format!(
            "unterminated quoted field starting in line {start_line}"
        ));
    }
    if !field.is_empty() || !cells.is_empty() {
        cells.push(field);
        lines.push(RawLine {
            number: start_line,
            cells,
        });
    }
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn origin() -> &'static Path {
        Path::new("inline.tsv")
    }

    #[test]
    fn parses_header_rows_and_null_tokens() {
        let table = parse_table("pmid\ttitle\tyear\n001\tAlpha\t2001\n002\tNA\t\n", origin())
            .unwrap();
        assert_eq!(table.columns, vec!["pmid", "title", "year"]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.cell(0, 0), Some("001"));
        assert_eq!(table.cell(1, 1), None);
        assert_eq!(table.cell(1, 2), None);
    }

    #[test]
    fn verbatim_reader_keeps_null_tokens_as_text() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("conclusions.tsv");
        std::fs::write(&path, "pmid\tconclusions\nNA\tNone\n2\t\n3\n").unwrap();

        let table = read_table_verbatim(&path).unwrap();
        assert_eq!(table.cell(0, 0), Some("NA"));
        assert_eq!(table.cell(0, 1), Some("None"));
        assert_eq!(table.cell(1, 1), Some(""));
        assert_eq!(table.cell(2, 1), None);

        let filtered = read_table(&path).unwrap();
        assert_eq!(filtered.cell(0, 0), None);
    }

    #[test]
    fn short_rows_are_padded_and_blank_lines_skipped() {
        let table = parse_table("a\tb\tc\n\n1\t2\n\r\n", origin()).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.rows[0], vec![Some("1".into()), Some("2".into()), None]);
    }

    #[test]
    fn overlong_rows_are_rejected_with_line_number() {
        let err = parse_table("a\tb\n1\t2\t3\n", origin()).unwrap_err();
        match err {
            PrepError::Parse { reason, .. } => assert!(reason.contains("line 2"), "{reason}"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn quoted_cells_keep_delimiters_quotes_and_newlines() {
        let content = "id\ttext\n1\t\"tab\there \"\"quoted\"\"\nnext line\"\n";
        let table = parse_table(content, origin()).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.cell(0, 1), Some("tab\there \"quoted\"\nnext line"));
    }

    #[test]
    fn unterminated_quote_is_a_parse_error() {
        let err = parse_table("id\ttext\n1\t\"open\n", origin()).unwrap_err();
        assert!(matches!(err, PrepError::Parse { .. }));
    }

    #[test]
    fn empty_content_is_a_parse_error() {
        assert!(matches!(
            parse_table("", origin()),
            Err(PrepError::Parse { .. })
        ));
    }

    #[test]
    fn written_tables_read_back_identically() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("out.tsv");
        let mut table = Table::with_columns(["id", "text"]);
        table.push_row(vec![Some("007".into()), Some("has\ttab and \"quote\"".into())]);
        table.push_row(vec![Some("008".into()), None]);

        write_table(&table, &path).unwrap();
        let raw = std::fs::read_to_string(&path).unwrap();
        assert_eq!(raw, render_table(&table));
        assert!(raw.ends_with("008\t\n"));
        assert_eq!(read_table(&path).unwrap(), table);
    }
}
