//! Global atomic counters for pipeline observability.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (the executor does so when a run reaches `Done`).
//!
//! [`METRICS`] lives for the whole process and is never reset by a run, so
//! every flush reports totals across all runs so far, including runs that
//! overlap. Per-run figures are on the `run.finished` event and the report.

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lightweight atomic counters.
pub struct Metrics {
    stage_attempts: AtomicU64,
    stage_retries: AtomicU64,
    stage_failures: AtomicU64,
    degraded_routes: AtomicU64,
    verdicts_issued: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            stage_attempts: AtomicU64::new(0),
            stage_retries: AtomicU64::new(0),
            stage_failures: AtomicU64::new(0),
            degraded_routes: AtomicU64::new(0),
            verdicts_issued: AtomicU64::new(0),
        }
    }

    /// One stage attempt started.
    pub fn inc_stage_attempts(&self) {
        self.stage_attempts.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "stage_attempts", "counter incremented");
    }

    /// A failed attempt is about to be retried.
    pub fn inc_stage_retries(&self) {
        self.stage_retries.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "stage_retries", "counter incremented");
    }

    /// A stage exhausted its attempts.
    pub fn inc_stage_failures(&self) {
        self.stage_failures.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "stage_failures", "counter incremented");
    }

    pub fn inc_degraded_routes(&self) {
        self.degraded_routes.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "degraded_routes", "counter incremented");
    }

    pub fn add_verdicts(&self, n: u64) {
        self.verdicts_issued.fetch_add(n, Ordering::Relaxed);
        tracing::trace!(metric = "verdicts_issued", n, "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event, tagged
    /// `scope = "process"`.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            scope = "process",
            stage_attempts = self.stage_attempts(),
            stage_retries = self.stage_retries(),
            stage_failures = self.stage_failures(),
            degraded_routes = self.degraded_routes(),
            verdicts_issued = self.verdicts_issued(),
        );
    }

    pub fn stage_attempts(&self) -> u64 {
        self.stage_attempts.load(Ordering::Relaxed)
    }

    pub fn stage_retries(&self) -> u64 {
        self.stage_retries.load(Ordering::Relaxed)
    }

    pub fn stage_failures(&self) -> u64 {
        self.stage_failures.load(Ordering::Relaxed)
    }

    pub fn degraded_routes(&self) -> u64 {
        self.degraded_routes.load(Ordering::Relaxed)
    }

    pub fn verdicts_issued(&self) -> u64 {
        self.verdicts_issued.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.stage_attempts.store(0, Ordering::Relaxed);
        self.stage_retries.store(0, Ordering::Relaxed);
        self.stage_failures.store(0, Ordering::Relaxed);
        self.degraded_routes.store(0, Ordering::Relaxed);
        self.verdicts_issued.store(0, Ordering::Relaxed);
    }
}
