//! Audit sinks for progress and data-integrity messages.
//!
//! Every pipeline stage takes an optional `&dyn AuditSink` instead of reaching
//! for a process-wide logger. When no sink is supplied, messages go to stdout.

use std::sync::Mutex;
use std::time::Instant;

use tracing::info;

use crate::types::LogMessage;

/// Destination for plain-text audit messages.
pub trait AuditSink: Send + Sync {
    /// Record one message.
    fn record(&self, message: &str);
}

/// Writes each message as a line on stdout.
#[derive(Clone, Copy, Debug, Default)]
pub struct StdoutSink;

impl AuditSink for StdoutSink {
    fn record(&self, message: &str) {
        println!("{message}");
    }
}

/// Forwards each message to `tracing` at INFO level.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;

impl AuditSink for TracingSink {
    fn record(&self, message: &str) {
        info!(target: "annotation_prep::audit", "{message}");
    }
}

/// Captures messages in memory (tests and dry runs).
#[derive(Debug, Default)]
pub struct MemorySink {
    messages: Mutex<Vec<LogMessage>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the captured messages, oldest first.
    pub fn messages(&self) -> Vec<LogMessage> {
        self.messages
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    /// True when any captured message contains `needle`.
    pub fn contains(&self, needle: &str) -> bool {
        self.messages()
            .iter()
            .any(|message| message.contains(needle))
    }
}

impl AuditSink for MemorySink {
    fn record(&self, message: &str) {
        if let Ok(mut guard) = self.messages.lock() {
            guard.push(message.to_string());
        }
    }
}

/// Sends each message to both sinks, first then second.
impl<A: AuditSink, B: AuditSink> AuditSink for (A, B) {
    fn record(&self, message: &str) {
        self.0.record(message);
        self.1.record(message);
    }
}

/// Send `message` to `sink`, or to stdout when no sink was injected.
pub fn emit(sink: Option<&dyn AuditSink>, message: impl AsRef<str>) {
    match sink {
        Some(sink) => sink.record(message.as_ref()),
        None => StdoutSink.record(message.as_ref()),
    }
}

/// Run `stage`, then audit how long it took in minutes.
pub fn timed<T>(sink: Option<&dyn AuditSink>, name: &str, stage: impl FnOnce() -> T) -> T {
    let started = Instant::now();
    let result = stage();
    emit(
        sink,
        format!(
            "*** {name} took {:.4} mins to run.",
            started.elapsed().as_secs_f64() / 60.0
        ),
    );
    result
}
