//! Operator-facing work log.
//!
//! Severity-tagged events about what the rig did (cooling started, leak
//! detected, ...), distinct from developer logging. Every event is mirrored
//! to the log facade; the sink decides where else it goes (MQTT uplink on
//! the rig, an in-memory list in tests).

use log::{error, info, warn};
use std::fmt;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warn,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "INFO"),
            Self::Warn => write!(f, "WARN"),
            Self::Error => write!(f, "ERROR"),
        }
    }
}

/// Destination of work-log events.
pub trait WorkLogSink: Send + Sync {
    fn emit(&self, message: &str, severity: Severity);
}

/// Shared handle the controllers log through.
#[derive(Clone)]
pub struct WorkLog {
    sink: Arc<dyn WorkLogSink>,
}

impl WorkLog {
    pub fn new(sink: Arc<dyn WorkLogSink>) -> Self {
        Self { sink }
    }

    pub fn add(&self, message: &str, severity: Severity) {
        match severity {
            Severity::Info => info!("{message}"),
            Severity::Warn => warn!("{message}"),
            Severity::Error => error!("{message}"),
        }
        self.sink.emit(message, severity);
    }

    pub fn info(&self, message: &str) {
        self.add(message, Severity::Info);
    }

    pub fn warn(&self, message: &str) {
        self.add(message, Severity::Warn);
    }

    pub fn error(&self, message: &str) {
        self.add(message, Severity::Error);
    }
}

/// Sink that relies on the log mirror alone.
pub struct LogOnlySink;

impl WorkLogSink for LogOnlySink {
    fn emit(&self, _message: &str, _severity: Severity) {}
}

/// Recording sink for tests and the simulated rig.
#[derive(Default)]
pub struct MemorySink {
    entries: Mutex<Vec<(Severity, String)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<(Severity, String)> {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Count of entries at `severity` whose message contains `needle`.
    pub fn count_matching(&self, severity: Severity, needle: &str) -> usize {
        self.entries()
            .iter()
            .filter(|(s, m)| *s == severity && m.contains(needle))
            .count()
    }
}

impl WorkLogSink for MemorySink {
    fn emit(&self, message: &str, severity: Severity) {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push((severity, message.to_string()));
    }
}
