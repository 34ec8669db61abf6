//! Audit log sink for deployments.
//!
//! Every deployer records what it did as `(tag, payload)` pairs. Where those
//! go is up to the caller: nowhere, memory, or `tracing`.

use crate::types::LogEntry;
use serde_json::Value;
use std::sync::Mutex;

pub trait DeployLogger: Send + Sync {
    fn log(&self, tag: &str, payload: Option<&Value>);
}

/// Drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NilLogger;

impl DeployLogger for NilLogger {
    fn log(&self, _tag: &str, _payload: Option<&Value>) {}
}

/// Keeps every entry in memory. Handy in tests.
#[derive(Debug, Default)]
pub struct MemoryLogger {
    entries: Mutex<Vec<LogEntry>>,
}

impl MemoryLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        match self.entries.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn tags(&self) -> Vec<String> {
        self.entries().into_iter().map(|e| e.tag).collect()
    }
}

impl DeployLogger for MemoryLogger {
    fn log(&self, tag: &str, payload: Option<&Value>) {
        let entry = LogEntry {
            tag: tag.to_string(),
            payload: payload.cloned(),
        };
        match self.entries.lock() {
            Ok(mut guard) => guard.push(entry),
            Err(poisoned) => poisoned.into_inner().push(entry),
        }
    }
}

/// Forwards entries to `tracing` at INFO.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl DeployLogger for TracingLogger {
    fn log(&self, tag: &str, payload: Option<&Value>) {
        match payload {
            Some(payload) => tracing::info!(target: "cert_deploy::audit", tag, %payload),
            None => tracing::info!(target: "cert_deploy::audit", tag),
        }
    }
}

/// Collects one run's entries while mirroring them to a sink.
pub(crate) struct AuditTrail<'a> {
    sink: &'a dyn DeployLogger,
    entries: Vec<LogEntry>,
}

impl<'a> AuditTrail<'a> {
    pub(crate) fn new(sink: &'a dyn DeployLogger) -> Self {
        Self {
            sink,
            entries: Vec::new(),
        }
    }

    pub(crate) fn record(&mut self, tag: &str, payload: Option<Value>) {
        self.sink.log(tag, payload.as_ref());
        self.entries.push(LogEntry {
            tag: tag.to_string(),
            payload,
        });
    }

    pub(crate) fn into_entries(self) -> Vec<LogEntry> {
        self.entries
    }
}

/// Entries of the most recent run, readable through `&self`.
#[derive(Debug, Default)]
pub(crate) struct LastRun(Mutex<Vec<LogEntry>>);

impl LastRun {
    pub(crate) fn replace(&self, entries: Vec<LogEntry>) {
        match self.0.lock() {
            Ok(mut guard) => *guard = entries,
            Err(poisoned) => *poisoned.into_inner() = entries,
        }
    }

    pub(crate) fn get(&self) -> Vec<LogEntry> {
        match self.0.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}
