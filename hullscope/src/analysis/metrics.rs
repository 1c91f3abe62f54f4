//! Pipeline counters.
//!
//! Lock-free counters updated by the driver and chain tasks. Read them
//! through [`AnalysisMetrics::snapshot`].

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for one pipeline.
#[derive(Debug, Default)]
pub struct AnalysisMetrics {
    inputs_received: AtomicU64,
    requests_issued: AtomicU64,
    committed: AtomicU64,
    superseded: AtomicU64,
    cancelled: AtomicU64,
    failed: AtomicU64,
    no_feature_data: AtomicU64,
}

/// Point-in-time copy of [`AnalysisMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    /// Raw slider values that reached the trigger stage.
    pub inputs_received: u64,
    /// Values that survived debounce and dedup.
    pub requests_issued: u64,
    /// Chains whose result was committed.
    pub committed: u64,
    /// Chains that finished after a newer request was issued.
    pub superseded: u64,
    /// Chains cancelled before finishing.
    pub cancelled: u64,
    /// Chains aborted by a geometry error.
    pub failed: u64,
    /// Chains that ran before feature data was available.
    pub no_feature_data: u64,
}

impl MetricsSnapshot {
    /// Chains that reached a terminal state.
    pub fn settled(&self) -> u64 {
        self.committed + self.superseded + self.cancelled + self.failed + self.no_feature_data
    }
}

impl AnalysisMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn input_received(&self) {
        self.inputs_received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn request_issued(&self) {
        self.requests_issued.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn chain_committed(&self) {
        self.committed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn chain_superseded(&self) {
        self.superseded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn chain_cancelled(&self) {
        self.cancelled.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn chain_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn chain_without_data(&self) {
        self.no_feature_data.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            inputs_received: self.inputs_received.load(Ordering::Relaxed),
            requests_issued: self.requests_issued.load(Ordering::Relaxed),
            committed: self.committed.load(Ordering::Relaxed),
            superseded: self.superseded.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            no_feature_data: self.no_feature_data.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_metrics_are_zero() {
        assert_eq!(AnalysisMetrics::new().snapshot(), MetricsSnapshot::default());
    }

    #[test]
    fn test_settled_counts_terminal_states() {
        let metrics = AnalysisMetrics::new();
        metrics.input_received();
        metrics.request_issued();
        metrics.request_issued();
        metrics.chain_committed();
        metrics.chain_failed();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.requests_issued, 2);
        assert_eq!(snapshot.settled(), 2);
        assert_eq!(snapshot.inputs_received, 1);
    }
}
