//! Vote tally.
//!
//! Counters are independent atomics so concurrent `record` calls never lose
//! updates, and accumulation is commutative: the final counts depend only on
//! the set of verdicts, not their arrival order.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use super::types::{Pair, ProgressCursor, Verdict};

#[derive(Debug)]
pub struct VoteTally {
    wins: Vec<AtomicU64>,
    participations: Vec<AtomicU64>,
    /// One flag per scheduled slot; a slot is counted at most once.
    recorded: Vec<AtomicBool>,
    processed: AtomicUsize,
    neither: AtomicUsize,
}

/// Immutable view of a completed tally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TallySnapshot {
    pub wins: Vec<u64>,
    pub participations: Vec<u64>,
    pub verdicts: usize,
    pub neither: usize,
}

impl VoteTally {
    pub fn new(num_candidates: usize, scheduled_pairs: usize) -> Self {
        Self {
            wins: (0..num_candidates).map(|_| AtomicU64::new(0)).collect(),
            participations: (0..num_candidates).map(|_| AtomicU64::new(0)).collect(),
            recorded: (0..scheduled_pairs).map(|_| AtomicBool::new(false)).collect(),
            processed: AtomicUsize::new(0),
            neither: AtomicUsize::new(0),
        }
    }

    /// Record the verdict for a scheduled pair.
    ///
    /// Returns `false` (and changes nothing) if this slot was already recorded,
    /// so a retried pair can never be double-counted.
    pub fn record(&self, pair: &Pair, verdict: Verdict) -> bool {
        assert!(
            pair.slot < self.recorded.len(),
            "slot {} outside schedule of {}",
            pair.slot,
            self.recorded.len()
        );
        assert!(
            pair.first < self.wins.len() && pair.second < self.wins.len(),
            "pair ({}, {}) outside candidate range {}",
            pair.first,
            pair.second,
            self.wins.len()
        );

        if self.recorded[pair.slot].swap(true, Ordering::AcqRel) {
            return false;
        }

        match verdict {
            Verdict::FirstWins => {
                self.wins[pair.first].fetch_add(1, Ordering::Relaxed);
            }
            Verdict::SecondWins => {
                self.wins[pair.second].fetch_add(1, Ordering::Relaxed);
            }
            Verdict::Neither => {
                self.neither.fetch_add(1, Ordering::Relaxed);
            }
        }
        self.participations[pair.first].fetch_add(1, Ordering::Relaxed);
        self.participations[pair.second].fetch_add(1, Ordering::Relaxed);
        self.processed.fetch_add(1, Ordering::AcqRel);
        true
    }

    pub fn cursor(&self) -> ProgressCursor {
        ProgressCursor {
            scheduled: self.recorded.len(),
            processed: self.processed.load(Ordering::Acquire),
        }
    }

    pub fn neither_count(&self) -> usize {
        self.neither.load(Ordering::Acquire)
    }

    /// Consume the tally once every scheduled slot has been recorded.
    ///
    /// Panics if the schedule is incomplete: extracting an order from a partial
    /// tally would bias the result.
    pub fn finish(self) -> TallySnapshot {
        let cursor = self.cursor();
        assert!(
            cursor.is_complete(),
            "tally finished at {} of {} scheduled pairs",
            cursor.processed,
            cursor.scheduled
        );

        TallySnapshot {
            wins: self.wins.into_iter().map(AtomicU64::into_inner).collect(),
            participations: self
                .participations
                .into_iter()
                .map(AtomicU64::into_inner)
                .collect(),
            verdicts: cursor.processed,
            neither: self.neither.into_inner(),
        }
    }
}
