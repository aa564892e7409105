//! Contiguous completion tracking
//!
//! Workers finish blocks in any order. The tracker reconstructs the
//! contiguous prefix and decides when the watermark is worth persisting.

use std::collections::BTreeMap;

/// Tracks acknowledged blocks and yields watermarks safe to persist.
///
/// Invariant: every block in `..next_expected` (from the starting point) has
/// been acknowledged, and `ahead` only holds blocks above `next_expected`.
///
/// Completions above the gap are kept as disjoint inclusive runs
/// (`start -> end`), so a block stuck in retry costs one entry no matter how
/// many blocks finish behind it.
#[derive(Debug)]
pub struct AckTracker {
    next_expected: u64,
    interval: u64,
    ahead: BTreeMap<u64, u64>,
    processed: u64,
}

impl AckTracker {
    /// Start expecting `next_expected`; persist every `interval` blocks.
    pub fn new(next_expected: u64, interval: u64) -> Self {
        Self {
            next_expected,
            interval: interval.max(1),
            ahead: BTreeMap::new(),
            processed: 0,
        }
    }

    /// Record a completion. Returns the watermark to persist, if any.
    pub fn ack(&mut self, block: u64) -> Option<u64> {
        self.processed += 1;

        if block < self.next_expected {
            // Already covered (duplicate delivery or pre-clamp dispatch).
            return None;
        }
        if block > self.next_expected {
            self.buffer(block);
            return None;
        }

        let mut top = block;
        self.next_expected = block.saturating_add(1);
        if let Some(end) = self.ahead.remove(&self.next_expected) {
            top = end;
            self.next_expected = end.saturating_add(1);
        }

        // Highest multiple of the interval among the watermarks just passed.
        let candidate = top - top % self.interval;
        (candidate >= block).then_some(candidate)
    }

    fn buffer(&mut self, block: u64) {
        let mut start = block;
        let mut end = block;

        if let Some((&s, &e)) = self.ahead.range(..=block).next_back() {
            if e >= block {
                return;
            }
            if e + 1 == block {
                start = s;
            }
        }
        if let Some(next) = block.checked_add(1) {
            if let Some(e) = self.ahead.remove(&next) {
                end = e;
            }
        }
        self.ahead.insert(start, end);
    }

    /// Next block the contiguous prefix is waiting on.
    pub fn next_expected(&self) -> u64 {
        self.next_expected
    }

    /// Highest contiguously completed block.
    pub fn watermark(&self) -> u64 {
        self.next_expected.saturating_sub(1)
    }

    /// Every completion seen, in or out of order.
    pub fn processed(&self) -> u64 {
        self.processed
    }

    /// Completions parked above the gap.
    pub fn pending_ahead(&self) -> u64 {
        self.ahead.iter().map(|(s, e)| e - s + 1).sum()
    }

    /// Disjoint runs held above the gap; what the buffer actually stores.
    pub fn buffered_runs(&self) -> usize {
        self.ahead.len()
    }
}
