//! Pipeline counters
//!
//! Handed to every task as an `Arc`, so tests and the host process can
//! observe progress without global state.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct PipelineMetrics {
    blocks_dispatched: AtomicU64,
    blocks_completed: AtomicU64,
    fetch_failures: AtomicU64,
    retries_scheduled: AtomicU64,
    messages_published: AtomicU64,
    checkpoints_saved: AtomicU64,
    checkpoint_failures: AtomicU64,
    head_failures: AtomicU64,
    buffered_completions: AtomicU64,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub blocks_dispatched: u64,
    pub blocks_completed: u64,
    pub fetch_failures: u64,
    pub retries_scheduled: u64,
    pub messages_published: u64,
    pub checkpoints_saved: u64,
    pub checkpoint_failures: u64,
    pub head_failures: u64,
    /// Completions waiting above the watermark gap (gauge).
    pub buffered_completions: u64,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn block_dispatched(&self) {
        self.blocks_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn block_completed(&self) {
        self.blocks_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn fetch_failed(&self) {
        self.fetch_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn retry_scheduled(&self) {
        self.retries_scheduled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn messages_published(&self, count: usize) {
        self.messages_published
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn checkpoint_saved(&self) {
        self.checkpoints_saved.fetch_add(1, Ordering::Relaxed);
    }

    pub fn checkpoint_failed(&self) {
        self.checkpoint_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn head_failed(&self) {
        self.head_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_buffered_completions(&self, count: u64) {
        self.buffered_completions.store(count, Ordering::Relaxed);
    }

    pub fn blocks_dispatched(&self) -> u64 {
        self.blocks_dispatched.load(Ordering::Relaxed)
    }

    pub fn blocks_completed(&self) -> u64 {
        self.blocks_completed.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            blocks_dispatched: self.blocks_dispatched.load(Ordering::Relaxed),
            blocks_completed: self.blocks_completed.load(Ordering::Relaxed),
            fetch_failures: self.fetch_failures.load(Ordering::Relaxed),
            retries_scheduled: self.retries_scheduled.load(Ordering::Relaxed),
            messages_published: self.messages_published.load(Ordering::Relaxed),
            checkpoints_saved: self.checkpoints_saved.load(Ordering::Relaxed),
            checkpoint_failures: self.checkpoint_failures.load(Ordering::Relaxed),
            head_failures: self.head_failures.load(Ordering::Relaxed),
            buffered_completions: self.buffered_completions.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_counters() {
        let metrics = PipelineMetrics::new();
        metrics.block_completed();
        metrics.block_completed();
        metrics.messages_published(3);
        metrics.fetch_failed();
        metrics.set_buffered_completions(7);
        metrics.set_buffered_completions(4);

        let snap = metrics.snapshot();
        assert_eq!(snap.blocks_completed, 2);
        assert_eq!(snap.messages_published, 3);
        assert_eq!(snap.fetch_failures, 1);
        assert_eq!(snap.checkpoints_saved, 0);
        assert_eq!(snap.buffered_completions, 4);
    }
}
