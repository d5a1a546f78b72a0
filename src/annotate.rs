//! Keyword-based novelty flagging.
//!
//! Matching is a case-insensitive substring test (`"renewal"` matches `new`),
//! not a whole-word match. A missing text value is scanned as the missing
//! token (`nan`), which none of the default keywords match.

use indexmap::IndexSet;
use std::borrow::Cow;

use crate::audit::{AuditSink, emit};
use crate::constants::annotate::{
    COST_DOLLARS_PER_UNIT, COST_RECORDS_PER_UNIT, DEFAULT_KEYWORDS,
};
use crate::data::{RecordSet, text_or_missing};
use crate::types::Keyword;

/// Counts produced by one annotation pass.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AnnotationSummary {
    /// Distinct identifiers flagged positive.
    pub flagged: usize,
    /// Distinct identifiers scanned.
    pub total: usize,
    /// Estimated downstream classification cost in dollars for the flagged records.
    pub estimated_cost: f64,
}

/// Flags text that contains any configured keyword.
#[derive(Clone)]
pub struct KeywordAnnotator<'a> {
    keywords: Vec<Keyword>,
    sink: Option<&'a dyn AuditSink>,
}

impl Default for KeywordAnnotator<'_> {
    fn default() -> Self {
        Self::new(DEFAULT_KEYWORDS)
    }
}

impl<'a> KeywordAnnotator<'a> {
    /// Annotator over `keywords` (lower-cased on construction).
    pub fn new<I, K>(keywords: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        Self {
            keywords: keywords
                .into_iter()
                .map(|keyword| keyword.as_ref().to_lowercase())
                .collect(),
            sink: None,
        }
    }

    /// Route audit messages to `sink` instead of stdout.
    pub fn with_sink(mut self, sink: &'a dyn AuditSink) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn keywords(&self) -> &[Keyword] {
        &self.keywords
    }

    /// True when the lower-cased `text` contains any keyword.
    pub fn detect(&self, text: &str) -> bool {
        let lowered = text.to_lowercase();
        self.keywords
            .iter()
            .any(|keyword| lowered.contains(keyword.as_str()))
    }

    /// `detect` over a possibly-missing value.
    pub fn detect_optional(&self, text: Option<Cow<'_, str>>) -> bool {
        self.detect(&text_or_missing(text))
    }

    /// Flag each item of any shape through a text extractor.
    pub fn annotate_with<T, F>(&self, items: &[T], extract: F) -> Vec<bool>
    where
        F: for<'t> Fn(&'t T) -> Option<Cow<'t, str>>,
    {
        items
            .iter()
            .map(|item| self.detect_optional(extract(item)))
            .collect()
    }

    /// Set `novelty_mention` on every record from `field`; no records are added or removed.
    pub fn annotate(&self, mut records: RecordSet, field: &str) -> RecordSet {
        let flags = self.annotate_with(&records.records, |record| record.text(field));
        for (record, flag) in records.records.iter_mut().zip(flags) {
            record.novelty_mention = Some(flag);
        }

        let summary = summarize(&records);
        emit(
            self.sink,
            format!(
                "* found {}/{} papers with self novelty mention!",
                summary.flagged, summary.total
            ),
        );
        emit(
            self.sink,
            format!(
                "*** keyword: {:?}, conclusion_detected_papers: {}/{}, estimated cost: {:.2} dollars!",
                self.keywords, summary.flagged, summary.total, summary.estimated_cost
            ),
        );
        records
    }
}

/// Distinct flagged/total identifier counts of an annotated set.
pub fn summarize(records: &RecordSet) -> AnnotationSummary {
    let total = records.unique_ids();
    let flagged = records
        .iter()
        .filter(|record| record.novelty_mention == Some(true))
        .map(|record| record.id.as_str())
        .collect::<IndexSet<_>>()
        .len();
    AnnotationSummary {
        flagged,
        total,
        estimated_cost: flagged as f64 / COST_RECORDS_PER_UNIT * COST_DOLLARS_PER_UNIT,
    }
}
