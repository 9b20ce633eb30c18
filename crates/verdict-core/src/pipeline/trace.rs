//! Execution trace: one entry per phase, append-only.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::state::RunStatus;

/// What one phase did and how long it took.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionLogEntry {
    pub phase: RunStatus,
    pub node: String,
    pub duration_ms: u64,
    #[serde(default)]
    pub counts: BTreeMap<String, u64>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub error: Option<String>,
}

impl ExecutionLogEntry {
    pub fn new(phase: RunStatus, node: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            phase,
            node: node.into(),
            duration_ms,
            counts: BTreeMap::new(),
            timestamp: Utc::now(),
            error: None,
        }
    }

    pub fn with_count(mut self, name: &str, value: u64) -> Self {
        self.counts.insert(name.to_string(), value);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn count(&self, name: &str) -> Option<u64> {
        self.counts.get(name).copied()
    }
}

/// Ordered execution log. Entries can be appended but never removed or
/// reordered.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionLog(Vec<ExecutionLogEntry>);

impl ExecutionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, entry: ExecutionLogEntry) {
        self.0.push(entry);
    }

    pub fn entries(&self) -> &[ExecutionLogEntry] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
