//! Recent log lines kept in memory for the dashboard's log viewer.
//!
//! [`LogCaptureLayer`] sits in the global subscriber next to the formatter,
//! so it sees exactly the events that pass `RUST_LOG`. Library records
//! arriving through the `log` bridge keep their original target.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::{
    collections::VecDeque,
    fmt::{self, Write as _},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};
use tracing::{
    Event, Subscriber,
    field::{Field, Visit},
};
use tracing_subscriber::{Layer, layer::Context};

/// Oldest lines are dropped beyond this many
pub const MAX_LOG_ENTRIES: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    /// Lowercase level name: `error`, `warn`, `info`, `debug` or `trace`
    pub level: String,
    pub target: String,
    pub message: String,
}

/// Bounded FIFO of captured lines, shared between the layer and handlers
#[derive(Clone)]
pub struct LogBuffer {
    entries: Arc<Mutex<VecDeque<LogEntry>>>,
    capacity: usize,
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::with_capacity(MAX_LOG_ENTRIES)
    }
}

impl LogBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    pub fn push(&self, entry: LogEntry) {
        if self.capacity == 0 {
            return;
        }
        let mut entries = self.lock();
        while entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// Captured lines, oldest first; `limit` keeps only the newest ones
    pub fn entries(&self, limit: Option<usize>) -> Vec<LogEntry> {
        let entries = self.lock();
        let skip = limit.map_or(0, |limit| entries.len().saturating_sub(limit));
        entries.iter().skip(skip).cloned().collect()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Layer feeding this buffer
    pub fn layer(&self) -> LogCaptureLayer {
        LogCaptureLayer {
            buffer: self.clone(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<LogEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Tracing layer copying every enabled event into a [`LogBuffer`]
pub struct LogCaptureLayer {
    buffer: LogBuffer,
}

impl<S: Subscriber> Layer<S> for LogCaptureLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        let mut visitor = LineVisitor::default();
        event.record(&mut visitor);
        let (message, log_target) = visitor.finish();

        self.buffer.push(LogEntry {
            timestamp: Utc::now(),
            level: metadata.level().as_str().to_ascii_lowercase(),
            target: log_target.unwrap_or_else(|| metadata.target().to_string()),
            message,
        });
    }
}

/// Message first, then `key=value` for the remaining fields
#[derive(Default)]
struct LineVisitor {
    line: String,
    fields: String,
    log_target: Option<String>,
}

impl LineVisitor {
    fn push_field(&mut self, name: &str, value: fmt::Arguments<'_>) {
        let _ = write!(self.fields, " {}={}", name, value);
    }

    /// Rendered line and the original `log` target, if any
    fn finish(self) -> (String, Option<String>) {
        (self.line + &self.fields, self.log_target)
    }
}

impl Visit for LineVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        match field.name() {
            "message" => self.line.push_str(value),
            "log.target" => self.log_target = Some(value.to_string()),
            name if name.starts_with("log.") => {}
            name => self.push_field(name, format_args!("{}", value)),
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        match field.name() {
            "message" => {
                let _ = write!(self.line, "{:?}", value);
            }
            name if name.starts_with("log.") => {}
            name => self.push_field(name, format_args!("{:?}", value)),
        }
    }
}
