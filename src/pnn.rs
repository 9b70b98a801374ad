//! Pairwise nearest-neighbor reduction.
//!
//! Every active bin caches its cheapest forward merge partner. The heap orders bins by
//! that cached cost, and the cache is refreshed lazily: a merge only bumps counters, and
//! a bin is re-scanned when it reaches the heap top with a stale entry. Merge costs obey
//! the Ward reducibility property (a merged bin is never cheaper to pair than the
//! cheaper of its parts), so a stale cost can only be too low and never hides the
//! true minimum.

use crate::bins::BinArena;
use crate::heap::MergeHeap;

/// Where a reducer is in its run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Merging { remaining: usize },
    Done,
}

/// One performed merge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Merge {
    /// Bin that stays active and takes the combined centroid.
    pub survivor: usize,
    /// Bin that was unlinked.
    pub absorbed: usize,
    /// Increase in total weighted squared error.
    pub cost: f64,
}

/// Drives merges over a [`BinArena`] until `target` bins remain.
#[derive(Debug, Clone)]
pub struct ClusterReducer {
    arena: BinArena,
    heap: MergeHeap,
    merges: u32,
    phase: Phase,
}

impl ClusterReducer {
    /// Compute every bin's nearest neighbor and build the heap.
    ///
    /// If the arena already holds `target` bins or fewer the reducer starts out done.
    pub fn new(mut arena: BinArena, target: usize) -> Self {
        let count = arena.bins().len();
        let mut heap = MergeHeap::with_capacity(count);
        for handle in 0..count {
            arena.find_nearest(handle);
            heap.push(handle, &arena);
        }

        let remaining = count.saturating_sub(target);
        log::debug!("pnn: {count} active bins, {remaining} merges to reach {target}");

        Self {
            arena,
            heap,
            merges: 0,
            phase: if remaining == 0 {
                Phase::Done
            } else {
                Phase::Merging { remaining }
            },
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn arena(&self) -> &BinArena {
        &self.arena
    }

    pub fn into_arena(self) -> BinArena {
        self.arena
    }

    /// Perform the cheapest available merge. Returns `None` once done.
    pub fn step(&mut self) -> Option<Merge> {
        let Phase::Merging { remaining } = self.phase else {
            return None;
        };

        let Some(survivor) = self.extract_min() else {
            log::warn!("pnn: no mergeable pair left with {remaining} merges outstanding");
            self.phase = Phase::Done;
            return None;
        };
        let bin = &self.arena.bins()[survivor];
        let (absorbed, cost) = match bin.nearest {
            Some(nearest) if bin.err.is_finite() => (nearest, bin.err),
            _ => {
                log::warn!("pnn: no mergeable pair left with {remaining} merges outstanding");
                self.phase = Phase::Done;
                return None;
            }
        };

        self.merges += 1;
        self.arena.absorb(survivor, absorbed, self.merges);
        log::trace!("pnn: merge #{} {absorbed} -> {survivor} cost {cost:.3}", self.merges);

        self.phase = match remaining - 1 {
            0 => Phase::Done,
            remaining => Phase::Merging { remaining },
        };

        Some(Merge {
            survivor,
            absorbed,
            cost,
        })
    }

    /// Merge until done and hand back the arena holding the surviving bins.
    pub fn run(mut self) -> BinArena {
        while self.step().is_some() {}
        log::debug!(
            "pnn: {} merges performed, {} bins remain",
            self.merges,
            self.arena.active_count()
        );
        self.arena
    }

    /// Surface a heap top whose cached cost and partner are current.
    fn extract_min(&mut self) -> Option<usize> {
        loop {
            let top = self.heap.top()?;
            let bin = &self.arena.bins()[top];

            let partner_current = bin
                .nearest
                .is_none_or(|n| self.arena.bins()[n].invalidated_at <= bin.validated_at);
            if bin.validated_at >= bin.invalidated_at && partner_current {
                return Some(top);
            }

            if bin.is_absorbed() {
                self.heap.replace_top_with_last();
            } else {
                self.arena.find_nearest(top);
                self.arena.bin_mut(top).validated_at = self.merges;
            }
            self.heap.sift_down_top(&self.arena);
        }
    }
}
