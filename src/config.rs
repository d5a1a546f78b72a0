use std::path::PathBuf;

use crate::constants::annotate::{DEFAULT_KEYWORDS, DEFAULT_TEXT_FIELD};
use crate::constants::index::{DEFAULT_DELIMITER, DEFAULT_KEY_COLUMN, DEFAULT_VALUE_COLUMN};
use crate::constants::loader::{ID_COLUMN, PMC_COLUMN};
use crate::constants::sampler::{DEFAULT_GROUP_FIELD, DEFAULT_SAMPLE_SIZE, DEFAULT_SEED};
use crate::errors::PrepError;
use crate::types::{ColumnName, Keyword};

/// Column names the pipeline reads from its inputs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColumnConfig {
    /// Identifier column shared by metadata and text sources.
    pub id_column: ColumnName,
    /// Columns always read as text (identifiers and auxiliary keys).
    pub text_columns: Vec<ColumnName>,
    /// Text field scanned by the keyword annotator.
    pub text_field: ColumnName,
    /// Record field matched against the inverted index values.
    pub group_field: ColumnName,
    /// Multi-valued delimited column of the category mapping source.
    pub mapping_key_column: ColumnName,
    /// Single-valued column of the category mapping source.
    pub mapping_value_column: ColumnName,
}

impl Default for ColumnConfig {
    fn default() -> Self {
        Self {
            id_column: ID_COLUMN.to_string(),
            text_columns: vec![ID_COLUMN.to_string(), PMC_COLUMN.to_string()],
            text_field: DEFAULT_TEXT_FIELD.to_string(),
            group_field: DEFAULT_GROUP_FIELD.to_string(),
            mapping_key_column: DEFAULT_KEY_COLUMN.to_string(),
            mapping_value_column: DEFAULT_VALUE_COLUMN.to_string(),
        }
    }
}

impl ColumnConfig {
    /// Text-column names as borrowed slices, identifier column included.
    pub fn text_column_refs(&self) -> Vec<&str> {
        let mut refs: Vec<&str> = self.text_columns.iter().map(String::as_str).collect();
        if !refs.contains(&self.id_column.as_str()) {
            refs.push(&self.id_column);
        }
        refs
    }
}

/// Input and output locations for one pipeline run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PipelinePaths {
    /// Bibliographic metadata table.
    pub metadata: PathBuf,
    /// Primary (structured abstract) conclusions table.
    pub structured_text: PathBuf,
    /// Secondary (unstructured abstract) conclusions table.
    pub unstructured_text: PathBuf,
    /// Journal → broad subject term mapping table.
    pub category_mapping: PathBuf,
    /// Directory receiving one sample file per category.
    pub output_dir: PathBuf,
}

/// Tunable settings for one pipeline run.
#[derive(Clone, Debug, PartialEq)]
pub struct PipelineConfig {
    /// Seed for every per-category draw.
    pub seed: u64,
    /// Upper bound on records sampled per category.
    pub sample_size: usize,
    /// Keyword substrings flagging a novelty mention (case-insensitive).
    pub keywords: Vec<Keyword>,
    /// Separator inside the mapping source's multi-valued column.
    pub delimiter: char,
    /// Column names used across stages.
    pub columns: ColumnConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            seed: DEFAULT_SEED,
            sample_size: DEFAULT_SAMPLE_SIZE,
            keywords: DEFAULT_KEYWORDS.iter().map(|k| k.to_string()).collect(),
            delimiter: DEFAULT_DELIMITER,
            columns: ColumnConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Override the sampling seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Override the per-category sample bound.
    pub fn with_sample_size(mut self, sample_size: usize) -> Self {
        self.sample_size = sample_size;
        self
    }

    /// Replace the keyword set.
    pub fn with_keywords<I, K>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<Keyword>,
    {
        self.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    /// Override the mapping delimiter.
    pub fn with_delimiter(mut self, delimiter: char) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Override the column names.
    pub fn with_columns(mut self, columns: ColumnConfig) -> Self {
        self.columns = columns;
        self
    }

    /// Reject settings that would silently flag everything or nothing.
    pub fn validated(self) -> Result<Self, PrepError> {
        if self.keywords.is_empty() {
            return Err(PrepError::Configuration(
                "at least one keyword is required".to_string(),
            ));
        }
        if self.keywords.iter().any(|keyword| keyword.trim().is_empty()) {
            return Err(PrepError::Configuration(
                "keywords must not be blank".to_string(),
            ));
        }
        if self.delimiter.is_whitespace() {
            return Err(PrepError::Configuration(
                "mapping delimiter must not be whitespace".to_string(),
            ));
        }
        Ok(self)
    }
}
