//! Doubly-linked recency list over `NonNull` item pointers.
//!
//! Front is the most recently used item, back the least. The list links
//! nodes but does not own them; the item index allocates and frees.
//!
//! ```text
//!   front ──► [MRU] ◄──► [ .. ] ◄──► [LRU] ◄── back
//! ```
//!
//! ## Operations
//! - `attach_front` / `detach`: O(1)
//! - `move_to_front`: O(1) given the node handle
//! - `pop_back`: O(1), eviction order
//!
//! `debug_validate` is available in debug/test builds.

use std::ptr::NonNull;

use crate::item::Item;

pub(crate) struct LruList<K, V> {
    head: Option<NonNull<Item<K, V>>>,
    tail: Option<NonNull<Item<K, V>>>,
    len: usize,
}

impl<K, V> LruList<K, V> {
    pub(crate) fn new() -> Self {
        LruList {
            head: None,
            tail: None,
            len: 0,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Most recently used item.
    pub(crate) fn front(&self) -> Option<NonNull<Item<K, V>>> {
        self.head
    }

    /// Least recently used item.
    pub(crate) fn back(&self) -> Option<NonNull<Item<K, V>>> {
        self.tail
    }

    /// Links a node at the front (MRU position). The node must not already
    /// be linked.
    pub(crate) fn attach_front(&mut self, node_ptr: NonNull<Item<K, V>>) {
        unsafe {
            let node = &mut *node_ptr.as_ptr();
            node.prev = None;
            node.next = self.head;

            match self.head {
                Some(h) => (*h.as_ptr()).prev = Some(node_ptr),
                None => self.tail = Some(node_ptr),
            }
        }
        self.head = Some(node_ptr);
        self.len += 1;
    }

    /// Unlinks a node without freeing it.
    pub(crate) fn detach(&mut self, node_ptr: NonNull<Item<K, V>>) {
        unsafe {
            let node = &mut *node_ptr.as_ptr();
            let prev = node.prev;
            let next = node.next;

            match prev {
                Some(p) => (*p.as_ptr()).next = next,
                None => self.head = next,
            }

            match next {
                Some(n) => (*n.as_ptr()).prev = prev,
                None => self.tail = prev,
            }

            node.prev = None;
            node.next = None;
        }
        self.len -= 1;
    }

    pub(crate) fn move_to_front(&mut self, node_ptr: NonNull<Item<K, V>>) {
        if self.head == Some(node_ptr) {
            return;
        }
        self.detach(node_ptr);
        self.attach_front(node_ptr);
    }

    /// Unlinks and returns the LRU node. The caller takes over the
    /// allocation.
    pub(crate) fn pop_back(&mut self) -> Option<NonNull<Item<K, V>>> {
        let tail = self.tail?;
        self.detach(tail);
        Some(tail)
    }

    /// Walks the list front-to-back, checking link symmetry and the cached
    /// length. Panics on a cycle.
    #[cfg(debug_assertions)]
    pub(crate) fn debug_validate(&self) {
        if self.len == 0 {
            debug_assert!(self.head.is_none());
            debug_assert!(self.tail.is_none());
            return;
        }

        let mut count = 0usize;
        let mut prev: Option<NonNull<Item<K, V>>> = None;
        let mut current = self.head;
        while let Some(ptr) = current {
            count += 1;
            if count > self.len {
                panic!("cycle detected in recency list");
            }
            unsafe {
                debug_assert_eq!((*ptr.as_ptr()).prev, prev);
                prev = Some(ptr);
                current = (*ptr.as_ptr()).next;
            }
        }

        debug_assert_eq!(count, self.len);
        debug_assert_eq!(self.tail, prev);
    }
}
