//! End-to-end annotation preparation run.
//!
//! Stage order: load metadata, merge the two conclusion sources, join them
//! onto the metadata, flag novelty keywords, build the category index from
//! the mapping source, then sample and report per category. Each stage fully
//! consumes its input before the next one starts.

use tracing::{debug, info};

use crate::annotate::{AnnotationSummary, KeywordAnnotator, summarize};
use crate::audit::{AuditSink, StdoutSink, emit, timed};
use crate::config::{PipelineConfig, PipelinePaths};
use crate::errors::PrepError;
use crate::index::DelimitedIndexBuilder;
use crate::loader::RecordLoader;
use crate::merge::RecordMerger;
use crate::metrics::{GroupSkew, group_skew};
use crate::report::{ReportWriter, TsvReportWriter};
use crate::sampler::{SamplingReport, StratifiedSampler};

/// Counts and reports produced by one run.
#[derive(Clone, Debug, PartialEq)]
pub struct PipelineOutcome {
    /// Metadata records kept after null-dropping and deduplication.
    pub metadata_records: usize,
    /// Records in the merged conclusion set.
    pub combined_records: usize,
    /// Records with both metadata and conclusions.
    pub joined_records: usize,
    pub annotation: AnnotationSummary,
    /// Categories in the inverted index.
    pub categories: usize,
    pub sampling: SamplingReport,
    /// Balance of group sizes; `None` when the index is empty.
    pub skew: Option<GroupSkew>,
}

/// Wires the stages together with one audit sink and one report writer.
pub struct Pipeline<'a> {
    config: PipelineConfig,
    sink: &'a dyn AuditSink,
    writer: &'a dyn ReportWriter,
}

impl<'a> Pipeline<'a> {
    /// Pipeline over a validated `config`, auditing to stdout and writing TSV files.
    pub fn new(config: PipelineConfig) -> Result<Self, PrepError> {
        Ok(Self {
            config: config.validated()?,
            sink: &StdoutSink,
            writer: &TsvReportWriter,
        })
    }

    pub fn with_sink(mut self, sink: &'a dyn AuditSink) -> Self {
        self.sink = sink;
        self
    }

    /// Replace the destination of samples and the summary.
    pub fn with_writer(mut self, writer: &'a dyn ReportWriter) -> Self {
        self.writer = writer;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run every stage against `paths`.
    ///
    /// A failing stage aborts the run; per-category files already written stay.
    pub fn run(&self, paths: &PipelinePaths) -> Result<PipelineOutcome, PrepError> {
        info!(
            metadata = %paths.metadata.display(),
            output_dir = %paths.output_dir.display(),
            seed = self.config.seed,
            sample_size = self.config.sample_size,
            "annotation preparation started"
        );
        let outcome = timed(Some(self.sink), "run", || self.run_stages(paths))?;
        info!(
            joined = outcome.joined_records,
            flagged = outcome.annotation.flagged,
            categories = outcome.categories,
            "annotation preparation finished"
        );
        Ok(outcome)
    }

    fn run_stages(&self, paths: &PipelinePaths) -> Result<PipelineOutcome, PrepError> {
        let sink = Some(self.sink);
        let columns = &self.config.columns;
        let loader = RecordLoader::from_columns(columns).with_sink(self.sink);
        let merger = RecordMerger::new().with_sink(self.sink);

        let metadata = timed(sink, "load_metadata", || {
            loader.load_metadata(&paths.metadata)
        })?;
        let conclusions = timed(sink, "combine_text_sources", || {
            merger.combine_files(&loader, &paths.structured_text, &paths.unstructured_text)
        })?;
        let joined = merger.inner_join(&metadata, &conclusions);
        if !joined.has_column(&columns.text_field) {
            return Err(PrepError::Configuration(format!(
                "joined records have no text column '{}'",
                columns.text_field
            )));
        }

        emit(sink, format!("* keyword: {:?}", self.config.keywords));
        let annotator = KeywordAnnotator::new(&self.config.keywords).with_sink(self.sink);
        let annotated = timed(sink, "annotate", || {
            annotator.annotate(joined, &columns.text_field)
        });
        let annotation = summarize(&annotated);

        let mapping = timed(sink, "load_category_mapping", || {
            loader.load_table(&paths.category_mapping)
        })?;
        let build = timed(sink, "build_index", || {
            DelimitedIndexBuilder::new(
                columns.mapping_key_column.clone(),
                columns.mapping_value_column.clone(),
            )
            .with_delimiter(self.config.delimiter)
            .with_sink(self.sink)
            .build(&mapping)
        })?;

        let sampler = StratifiedSampler::from_config(&self.config).with_sink(self.sink);
        let sampling = timed(sink, "sample_categories", || {
            sampler.run(&annotated, &build.index, &paths.output_dir, self.writer)
        })?;

        let skew = group_skew(&sampling.group_sizes);
        if let Some(skew) = &skew {
            emit(
                sink,
                format!(
                    "* group sizes: min {}, max {}, mean {:.2}, empty {}/{}",
                    skew.min, skew.max, skew.mean, skew.empty_groups, skew.groups
                ),
            );
            debug!(ratio = skew.ratio, max_share = skew.max_share, "group balance");
        }

        Ok(PipelineOutcome {
            metadata_records: metadata.len(),
            combined_records: conclusions.len(),
            joined_records: annotated.len(),
            annotation,
            categories: build.index.len(),
            sampling,
            skew,
        })
    }
}
