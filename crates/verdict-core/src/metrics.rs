//! Global atomic counters for orchestrator observability.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (e.g. at the end of an evaluation).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lightweight atomic counters, lock-free.
pub struct Metrics {
    agent_calls: AtomicU64,
    agent_failures: AtomicU64,
    remediations: AtomicU64,
    evaluations_completed: AtomicU64,
    evaluations_failed: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            agent_calls: AtomicU64::new(0),
            agent_failures: AtomicU64::new(0),
            remediations: AtomicU64::new(0),
            evaluations_completed: AtomicU64::new(0),
            evaluations_failed: AtomicU64::new(0),
        }
    }

    /// Count one remote agent call (any role).
    pub fn inc_agent_calls(&self) {
        self.agent_calls.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "agent_calls", "counter incremented");
    }

    /// Count one agent call that ended in a classified failure.
    pub fn inc_agent_failures(&self) {
        self.agent_failures.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "agent_failures", "counter incremented");
    }

    /// Count remediation calls dispatched by a collaboration round.
    pub fn add_remediations(&self, n: u64) {
        self.remediations.fetch_add(n, Ordering::Relaxed);
        tracing::trace!(metric = "remediations", n, "counter incremented");
    }

    /// Count one evaluation reaching a terminal status.
    pub fn inc_evaluations(&self, completed: bool) {
        if completed {
            self.evaluations_completed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.evaluations_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Emit all current counter values as a single `info!` event.
    ///
    /// Call this at natural boundaries (end of an evaluation, CLI exit)
    /// rather than on every increment.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            agent_calls = self.agent_calls(),
            agent_failures = self.agent_failures(),
            remediations = self.remediations(),
            evaluations_completed = self.evaluations_completed(),
            evaluations_failed = self.evaluations_failed(),
        );
    }

    pub fn agent_calls(&self) -> u64 {
        self.agent_calls.load(Ordering::Relaxed)
    }

    pub fn agent_failures(&self) -> u64 {
        self.agent_failures.load(Ordering::Relaxed)
    }

    pub fn remediations(&self) -> u64 {
        self.remediations.load(Ordering::Relaxed)
    }

    pub fn evaluations_completed(&self) -> u64 {
        self.evaluations_completed.load(Ordering::Relaxed)
    }

    pub fn evaluations_failed(&self) -> u64 {
        self.evaluations_failed.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.agent_calls.store(0, Ordering::Relaxed);
        self.agent_failures.store(0, Ordering::Relaxed);
        self.remediations.store(0, Ordering::Relaxed);
        self.evaluations_completed.store(0, Ordering::Relaxed);
        self.evaluations_failed.store(0, Ordering::Relaxed);
    }
}
