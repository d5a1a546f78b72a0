//! Per-category detection rates and seeded positive-record samples.
//!
//! Every category of the inverted index selects the records whose grouping
//! field is one of the category's values. Each category draws from a fresh
//! `DeterministicRng` seeded with the configured seed, so a category's sample
//! depends only on its own group and not on the categories drawn before it.

use indexmap::{IndexMap, IndexSet};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::audit::{AuditSink, emit};
use crate::config::PipelineConfig;
use crate::constants::sampler::{
    DEFAULT_GROUP_FIELD, DEFAULT_SAMPLE_SIZE, DEFAULT_SEED, RATE_DECIMALS, SUMMARY_COLUMNS,
    SUMMARY_FILENAME,
};
use crate::constants::tsv::{MISSING_TOKEN, OUTPUT_EXTENSION};
use crate::data::{Record, RecordSet, Table, format_float};
use crate::errors::PrepError;
use crate::index::InvertedIndex;
use crate::report::ReportWriter;
use crate::transport::fs::sibling_dir;
use crate::types::{CategoryId, ColumnName};

/// SplitMix64 generator. The same seed always yields the same stream,
/// independent of platform and of any other generator in the process.
#[derive(Clone, Debug)]
pub struct DeterministicRng {
    state: u64,
}

impl DeterministicRng {
    pub fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    pub fn state(&self) -> u64 {
        self.state
    }

    fn next_u64_internal(&mut self) -> u64 {
        let mut z = self.state.wrapping_add(0x9E3779B97F4A7C15);
        self.state = z;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
        z ^ (z >> 31)
    }
}

impl rand::RngCore for DeterministicRng {
    fn next_u32(&mut self) -> u32 {
        self.next_u64_internal() as u32
    }

    fn next_u64(&mut self) -> u64 {
        self.next_u64_internal()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        let mut offset = 0;
        while offset < dest.len() {
            let bytes = self.next_u64_internal().to_le_bytes();
            let copy_len = (dest.len() - offset).min(bytes.len());
            dest[offset..offset + copy_len].copy_from_slice(&bytes[..copy_len]);
            offset += copy_len;
        }
    }
}

/// One summary row per category.
#[derive(Clone, Debug, PartialEq)]
pub struct DetectionRow {
    /// Category name.
    pub bst: CategoryId,
    /// Group size.
    pub n: usize,
    /// Annotation-positive records in the group.
    pub n_detected: usize,
    /// `"n_detected/n"`.
    pub detected_rate_str: String,
    /// `n_detected / n` rounded to four decimals; exactly `0.0` when `n == 0`.
    pub detected_rate_num: f64,
}

impl DetectionRow {
    pub fn new(bst: impl Into<CategoryId>, n: usize, n_detected: usize) -> Self {
        let detected_rate_num = if n == 0 {
            0.0
        } else {
            round_to(n_detected as f64 / n as f64, RATE_DECIMALS)
        };
        Self {
            bst: bst.into(),
            n,
            n_detected,
            detected_rate_str: format!("{n_detected}/{n}"),
            detected_rate_num,
        }
    }

    fn cells(&self) -> Vec<Option<String>> {
        vec![
            Some(self.bst.clone()),
            Some(self.n.to_string()),
            Some(self.n_detected.to_string()),
            Some(self.detected_rate_str.clone()),
            Some(format_float(self.detected_rate_num)),
        ]
    }
}

/// Render summary rows with the fixed summary header.
pub fn detection_table(rows: &[DetectionRow]) -> Table {
    let mut table = Table::with_columns(SUMMARY_COLUMNS);
    for row in rows {
        table.push_row(row.cells());
    }
    table
}

/// Group, positives count, and drawn sample for one category.
#[derive(Clone, Debug)]
pub struct CategorySample<'r> {
    pub category: CategoryId,
    pub group_size: usize,
    pub detected: usize,
    /// Sampled positive records in draw order.
    pub sample: Vec<&'r Record>,
}

impl CategorySample<'_> {
    pub fn detection_row(&self) -> DetectionRow {
        DetectionRow::new(self.category.clone(), self.group_size, self.detected)
    }
}

/// Outcome of a full sampling run.
#[derive(Clone, Debug, PartialEq)]
pub struct SamplingReport {
    /// Summary rows in index category order.
    pub rows: Vec<DetectionRow>,
    /// Group size per category, for balance metrics.
    pub group_sizes: IndexMap<CategoryId, usize>,
    /// Per-category files written by this run.
    pub files_written: usize,
    /// Location of the summary table.
    pub summary_path: PathBuf,
}

/// Draws bounded, seeded samples of positive records per category.
pub struct StratifiedSampler<'a> {
    sample_size: usize,
    seed: u64,
    group_field: ColumnName,
    sink: Option<&'a dyn AuditSink>,
}

impl Default for StratifiedSampler<'_> {
    fn default() -> Self {
        Self {
            sample_size: DEFAULT_SAMPLE_SIZE,
            seed: DEFAULT_SEED,
            group_field: DEFAULT_GROUP_FIELD.to_string(),
            sink: None,
        }
    }
}

impl<'a> StratifiedSampler<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sampler using the seed, sample bound, and grouping field of `config`.
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::default()
            .with_seed(config.seed)
            .with_sample_size(config.sample_size)
            .with_group_field(config.columns.group_field.clone())
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Upper bound on records drawn per category.
    pub fn with_sample_size(mut self, sample_size: usize) -> Self {
        self.sample_size = sample_size;
        self
    }

    /// Record field matched against the index values.
    pub fn with_group_field(mut self, group_field: impl Into<ColumnName>) -> Self {
        self.group_field = group_field.into();
        self
    }

    /// Route audit messages to `sink` instead of stdout.
    pub fn with_sink(mut self, sink: &'a dyn AuditSink) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Records whose grouping field is in `values`, in record order.
    ///
    /// A null or absent grouping field matches the missing token, which is
    /// how the index records a mapping row with a null value.
    pub fn group<'r>(&self, records: &'r RecordSet, values: &IndexSet<&str>) -> Vec<&'r Record> {
        records
            .iter()
            .filter(|record| match record.text(&self.group_field) {
                Some(value) => values.contains(value.as_ref()),
                None => values.contains(MISSING_TOKEN),
            })
            .collect()
    }

    /// Draw `min(positives.len(), sample_size)` records with a fresh seeded generator.
    pub fn draw<'r>(&self, positives: &[&'r Record]) -> Vec<&'r Record> {
        let amount = positives.len().min(self.sample_size);
        let mut rng = DeterministicRng::new(self.seed);
        rand::seq::index::sample(&mut rng, positives.len(), amount)
            .into_iter()
            .map(|idx| positives[idx])
            .collect()
    }

    /// Group, count, and sample one category. Unknown categories yield an empty group.
    pub fn sample_category<'r>(
        &self,
        records: &'r RecordSet,
        index: &InvertedIndex,
        category: &str,
    ) -> CategorySample<'r> {
        let group = self.group(records, &index.value_set(category));
        let positives: Vec<&Record> = group
            .iter()
            .copied()
            .filter(|record| record.novelty_mention == Some(true))
            .collect();
        let sample = self.draw(&positives);
        debug!(
            category,
            group_size = group.len(),
            detected = positives.len(),
            sampled = sample.len(),
            "category sampled"
        );
        CategorySample {
            category: category.to_string(),
            group_size: group.len(),
            detected: positives.len(),
            sample,
        }
    }

    /// Sample every category, write `<category>.tsv` files into `output_dir`,
    /// and write the summary table next to `output_dir`.
    ///
    /// Files written before a failing write stay on disk.
    pub fn run(
        &self,
        records: &RecordSet,
        index: &InvertedIndex,
        output_dir: &Path,
        writer: &dyn ReportWriter,
    ) -> Result<SamplingReport, PrepError> {
        writer.ensure_dir(output_dir)?;

        let mut rows = Vec::with_capacity(index.len());
        let mut group_sizes = IndexMap::with_capacity(index.len());
        let mut files_written = 0usize;
        for category in index.categories() {
            let sampled = self.sample_category(records, index, category);
            let destination = output_dir.join(category_file_name(category));
            let table = records.table_of(sampled.sample.iter().copied());
            writer.write(&table, &destination)?;
            files_written += 1;
            emit(
                self.sink,
                format!("* saved {} rows to {}!", table.len(), destination.display()),
            );
            group_sizes.insert(category.clone(), sampled.group_size);
            rows.push(sampled.detection_row());
        }
        emit(
            self.sink,
            format!(
                "* saved {} BST files in {}!",
                writer.entries(output_dir)?,
                output_dir.display()
            ),
        );

        let summary_path = sibling_dir(output_dir).join(SUMMARY_FILENAME);
        let summary = detection_table(&rows);
        writer.write(&summary, &summary_path)?;
        emit(
            self.sink,
            format!(
                "* saved {} rows to {}!",
                summary.len(),
                summary_path.display()
            ),
        );

        Ok(SamplingReport {
            rows,
            group_sizes,
            files_written,
            summary_path,
        })
    }
}

/// `<category>.tsv`, with path separators replaced so the file stays inside the output directory.
pub fn category_file_name(category: &str) -> String {
    let stem: String = category
        .chars()
        .map(|ch| if matches!(ch, '/' | '\\') { '_' } else { ch })
        .collect();
    format!("{stem}.{OUTPUT_EXTENSION}")
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round_ties_even() / factor
}
