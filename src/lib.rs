#![doc = include_str!("../README.md")]

/// Annotation stage: keyword-based novelty flagging.
pub mod annotate;
/// CLI runners shared by the binary.
pub mod apps;
/// Injected audit sinks and stage timing.
pub mod audit;
/// Batch-classification request and response files.
pub mod batch;
/// Pipeline configuration types.
pub mod config;
/// Centralized constants used across stages.
pub mod constants;
/// Tables, records, and record sets.
pub mod data;
/// Inverted category index over a delimited mapping column.
pub mod index;
/// Tabular loading into typed records.
pub mod loader;
/// Priority merge and identifier join.
pub mod merge;
/// Aggregate metrics helpers.
pub mod metrics;
/// End-to-end pipeline orchestration.
pub mod pipeline;
/// Output writers for samples and summaries.
pub mod report;
/// Seeded stratified sampling and detection rates.
pub mod sampler;
/// Input/output transports (filesystem and TSV codec).
pub mod transport;
/// Shared type aliases.
pub mod types;

mod errors;

pub use annotate::{AnnotationSummary, KeywordAnnotator};
pub use audit::{AuditSink, MemorySink, StdoutSink, TracingSink};
pub use config::{ColumnConfig, PipelineConfig, PipelinePaths};
pub use data::{FieldValue, Record, RecordSet, Table};
pub use errors::PrepError;
pub use index::{DelimitedIndexBuilder, IndexBuild, InvertedIndex};
pub use loader::RecordLoader;
pub use merge::RecordMerger;
pub use pipeline::{Pipeline, PipelineOutcome};
pub use report::{MemoryReportWriter, ReportWriter, TsvReportWriter};
pub use sampler::{DetectionRow, DeterministicRng, SamplingReport, StratifiedSampler};
pub use types::{CategoryId, ColumnName, Keyword, Label, LogMessage, MappedValue, RecordId};
