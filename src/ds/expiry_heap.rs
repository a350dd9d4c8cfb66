//! Binary min-heap of items ordered by deadline, with index back-pointers.
//!
//! Every stored item caches its slot in `queue_index`, so removal and
//! reposition at an arbitrary node are O(log n) instead of a scan. Items
//! without a deadline are never stored here.
//!
//! ## Architecture
//!
//! ```text
//!   slots (Vec<NonNull<Item>>)          item.queue_index
//!   ┌───┬───────────────┐
//!   │ 0 │ deadline 10s  │ ◄──root────── Some(0)
//!   │ 1 │ deadline 25s  │               Some(1)
//!   │ 2 │ deadline 12s  │               Some(2)
//!   └───┴───────────────┘
//!
//!   every swap rewrites both back-pointers
//! ```
//!
//! ## Operations
//! - `push`: O(log n)
//! - `remove` / `fix` at a known node: O(log n)
//! - `peek` / `root_deadline`: O(1)
//!
//! Removal at an arbitrary slot swaps with the last element, pops, then
//! sifts the displaced node up or down from the vacated slot as needed.
//!
//! `debug_validate` is available in debug/test builds.

use std::ptr::NonNull;
use std::time::Instant;

use crate::item::Item;

pub(crate) struct ExpiryHeap<K, V> {
    slots: Vec<NonNull<Item<K, V>>>,
}

impl<K, V> ExpiryHeap<K, V> {
    pub(crate) fn new() -> Self {
        ExpiryHeap { slots: Vec::new() }
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// The item with the earliest deadline.
    pub(crate) fn peek(&self) -> Option<NonNull<Item<K, V>>> {
        self.slots.first().copied()
    }

    /// The earliest deadline currently scheduled.
    pub(crate) fn root_deadline(&self) -> Option<Instant> {
        self.peek().map(|ptr| Self::deadline(ptr))
    }

    /// Adds an item that carries a deadline. The item must not already be
    /// in the heap.
    pub(crate) fn push(&mut self, node_ptr: NonNull<Item<K, V>>) {
        debug_assert!(unsafe { (*node_ptr.as_ptr()).expires_at.is_some() });
        debug_assert!(unsafe { (*node_ptr.as_ptr()).queue_index.is_none() });

        let idx = self.slots.len();
        self.slots.push(node_ptr);
        unsafe {
            (*node_ptr.as_ptr()).queue_index = Some(idx);
        }
        self.sift_up(idx);
    }

    /// Removes the item from its cached slot. Returns `false` if the item
    /// was not enqueued.
    pub(crate) fn remove(&mut self, node_ptr: NonNull<Item<K, V>>) -> bool {
        let idx = match unsafe { (*node_ptr.as_ptr()).queue_index } {
            Some(idx) => idx,
            None => return false,
        };
        debug_assert_eq!(self.slots[idx], node_ptr);

        let last = self.slots.len() - 1;
        if idx != last {
            self.swap(idx, last);
        }
        self.slots.pop();
        unsafe {
            (*node_ptr.as_ptr()).queue_index = None;
        }

        if idx < self.slots.len() {
            self.resift(idx);
        }
        true
    }

    /// Restores heap order after the item's deadline changed in place.
    pub(crate) fn fix(&mut self, node_ptr: NonNull<Item<K, V>>) {
        if let Some(idx) = unsafe { (*node_ptr.as_ptr()).queue_index } {
            debug_assert_eq!(self.slots[idx], node_ptr);
            self.resift(idx);
        }
    }

    fn deadline(ptr: NonNull<Item<K, V>>) -> Instant {
        // Enqueued items always carry a deadline; the index enforces this
        // before pushing.
        unsafe { (*ptr.as_ptr()).expires_at }.expect("enqueued item lost its deadline")
    }

    fn swap(&mut self, i: usize, j: usize) {
        self.slots.swap(i, j);
        unsafe {
            (*self.slots[i].as_ptr()).queue_index = Some(i);
            (*self.slots[j].as_ptr()).queue_index = Some(j);
        }
    }

    fn resift(&mut self, idx: usize) {
        if !self.sift_up(idx) {
            self.sift_down(idx);
        }
    }

    /// Returns `true` if the node moved.
    fn sift_up(&mut self, mut idx: usize) -> bool {
        let mut moved = false;
        while idx > 0 {
            let parent = (idx - 1) / 2;
            if Self::deadline(self.slots[idx]) >= Self::deadline(self.slots[parent]) {
                break;
            }
            self.swap(idx, parent);
            idx = parent;
            moved = true;
        }
        moved
    }

    fn sift_down(&mut self, mut idx: usize) {
        let len = self.slots.len();
        loop {
            let left = 2 * idx + 1;
            if left >= len {
                break;
            }
            let right = left + 1;
            let mut smallest = left;
            if right < len
                && Self::deadline(self.slots[right]) < Self::deadline(self.slots[left])
            {
                smallest = right;
            }
            if Self::deadline(self.slots[idx]) <= Self::deadline(self.slots[smallest]) {
                break;
            }
            self.swap(idx, smallest);
            idx = smallest;
        }
    }

    /// Checks the heap property and back-pointer agreement for every slot.
    #[cfg(debug_assertions)]
    pub(crate) fn debug_validate(&self) {
        for (idx, &ptr) in self.slots.iter().enumerate() {
            debug_assert_eq!(unsafe { (*ptr.as_ptr()).queue_index }, Some(idx));
            if idx > 0 {
                let parent = (idx - 1) / 2;
                debug_assert!(
                    Self::deadline(self.slots[parent]) <= Self::deadline(ptr),
                    "heap order violated at slot {idx}"
                );
            }
        }
    }
}
