/// Unique record identifier (stable across runs, always text).
/// Example: `31452104`
pub type RecordId = String;
/// Column name in a tabular source.
/// Examples: `pmid`, `year`, `conclusions`, `BroadSubjectTerms`
pub type ColumnName = String;
/// Grouping label derived from a multi-valued delimited field.
/// Examples: `Neoplasms`, `Cardiology`, `Public Health`
pub type CategoryId = String;
/// Value mapped onto a category by the inverted index.
/// Example: `The Lancet. Oncology`
pub type MappedValue = String;
/// Keyword substring scanned by the novelty annotator.
/// Examples: `novel`, `innovat`
pub type Keyword = String;
/// Audit/log message text.
/// Examples: `* loaded 120 lines from meta.tsv`, `* found 3/10 papers with self novelty mention!`
pub type LogMessage = String;
/// Free-text classification label extracted from a batch response.
/// Examples: `new finding`, `incremental/confirmatory`
pub type Label = String;
