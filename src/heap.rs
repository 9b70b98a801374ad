//! Binary min-heap of bin handles.
//!
//! The heap stores handles only. Keys live in an external [`CostTable`] and may go stale
//! while a handle sits in the heap; the reducer re-validates the top before trusting it
//! and calls [`MergeHeap::sift_down_top`] after refreshing or replacing it.

extern crate alloc;
use alloc::vec;
use alloc::vec::Vec;

use crate::bins::BinArena;

/// Authoritative current cost for each handle.
pub trait CostTable {
    fn cost(&self, handle: usize) -> f64;
}

impl CostTable for BinArena {
    fn cost(&self, handle: usize) -> f64 {
        self.bins()[handle].err
    }
}

impl CostTable for [f64] {
    fn cost(&self, handle: usize) -> f64 {
        self[handle]
    }
}

/// Fixed-capacity heap with a 1-indexed body: slot 0 is unused, children of `l` are
/// `2l` and `2l + 1`.
#[derive(Debug, Clone)]
pub struct MergeHeap {
    slots: Vec<usize>,
    len: usize,
}

impl MergeHeap {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: vec![0; capacity + 1],
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn top(&self) -> Option<usize> {
        (self.len > 0).then(|| self.slots[1])
    }

    /// Insert `handle`, sifting it up by its current cost.
    pub fn push<T: CostTable + ?Sized>(&mut self, handle: usize, table: &T) {
        self.len += 1;
        if self.len >= self.slots.len() {
            self.slots.push(0);
        }
        let err = table.cost(handle);
        let mut l = self.len;
        while l > 1 {
            let parent = l >> 1;
            let h = self.slots[parent];
            if table.cost(h) <= err {
                break;
            }
            self.slots[l] = h;
            l = parent;
        }
        self.slots[l] = handle;
    }

    /// Drop the top entry by moving the last entry into its place. The caller must sift
    /// the new top down afterwards.
    pub fn replace_top_with_last(&mut self) -> Option<usize> {
        if self.len == 0 {
            return None;
        }
        let removed = self.slots[1];
        self.slots[1] = self.slots[self.len];
        self.len -= 1;
        Some(removed)
    }

    /// Restore heap order after the top entry's cost changed or was replaced.
    pub fn sift_down_top<T: CostTable + ?Sized>(&mut self, table: &T) {
        if self.len == 0 {
            return;
        }
        let handle = self.slots[1];
        let err = table.cost(handle);
        let mut l = 1;
        loop {
            let mut child = l + l;
            if child > self.len {
                break;
            }
            if child < self.len && table.cost(self.slots[child]) > table.cost(self.slots[child + 1])
            {
                child += 1;
            }
            let h = self.slots[child];
            if err <= table.cost(h) {
                break;
            }
            self.slots[l] = h;
            l = child;
        }
        self.slots[l] = handle;
    }

    #[cfg(test)]
    fn pop<T: CostTable + ?Sized>(&mut self, table: &T) -> Option<usize> {
        let top = self.replace_top_with_last()?;
        self.sift_down_top(table);
        Some(top)
    }
}
