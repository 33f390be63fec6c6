//! Indexed binary max-heap keyed by node contribution.
//!
//! Keeps a node -> slot map next to the array so a node's key can be raised
//! or lowered in place (`update`) with a single sift from its slot.
//!
//! Ordering: higher key first; equal keys extract the smaller node id first.

use rustc_hash::FxHashMap;

use crate::graph::NodeId;

#[derive(Clone, Copy, Debug)]
struct Entry {
    key: i64,
    id: NodeId,
}

impl Entry {
    #[inline]
    fn outranks(&self, other: &Entry) -> bool {
        self.key > other.key || (self.key == other.key && self.id < other.id)
    }
}

#[derive(Debug, Default)]
pub struct IndexedMaxHeap {
    entries: Vec<Entry>,
    slots: FxHashMap<NodeId, usize>,
}

impl IndexedMaxHeap {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            slots: FxHashMap::with_capacity_and_hasher(capacity, Default::default()),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.slots.contains_key(&id)
    }

    pub fn key(&self, id: NodeId) -> Option<i64> {
        self.slots.get(&id).map(|&slot| self.entries[slot].key)
    }

    /// Insert `id` with `key`, or re-key it if already present.
    pub fn push(&mut self, id: NodeId, key: i64) {
        if self.update(id, key) {
            return;
        }
        let slot = self.entries.len();
        self.entries.push(Entry { key, id });
        self.slots.insert(id, slot);
        self.sift_up(slot);
    }

    /// Highest-ranked node without removing it.
    pub fn peek(&self) -> Option<(NodeId, i64)> {
        self.entries.first().map(|e| (e.id, e.key))
    }

    /// Remove and return the highest-ranked node.
    pub fn pop(&mut self) -> Option<(NodeId, i64)> {
        if self.entries.is_empty() {
            return None;
        }
        let last = self.entries.len() - 1;
        self.swap(0, last);
        let top = self.entries.pop()?;
        self.slots.remove(&top.id);
        if !self.entries.is_empty() {
            self.sift_down(0);
        }
        Some((top.id, top.key))
    }

    /// Set the key of `id`, restoring heap order from its slot. Returns
    /// `false` if `id` is not in the heap.
    pub fn update(&mut self, id: NodeId, key: i64) -> bool {
        let Some(&slot) = self.slots.get(&id) else {
            return false;
        };
        let old = self.entries[slot].key;
        self.entries[slot].key = key;
        if key > old {
            self.sift_up(slot);
        } else if key < old {
            self.sift_down(slot);
        }
        true
    }

    /// Add `delta` to the key of `id`. Returns `false` if `id` is absent.
    pub fn adjust(&mut self, id: NodeId, delta: i64) -> bool {
        match self.key(id) {
            Some(key) => self.update(id, key.saturating_add(delta)),
            None => false,
        }
    }

    fn sift_up(&mut self, mut slot: usize) {
        while slot > 0 {
            let parent = (slot - 1) / 2;
            if !self.entries[slot].outranks(&self.entries[parent]) {
                break;
            }
            self.swap(slot, parent);
            slot = parent;
        }
    }

    fn sift_down(&mut self, mut slot: usize) {
        let len = self.entries.len();
        loop {
            let left = 2 * slot + 1;
            let right = left + 1;
            let mut best = slot;
            if left < len && self.entries[left].outranks(&self.entries[best]) {
                best = left;
            }
            if right < len && self.entries[right].outranks(&self.entries[best]) {
                best = right;
            }
            if best == slot {
                break;
            }
            self.swap(slot, best);
            slot = best;
        }
    }

    fn swap(&mut self, a: usize, b: usize) {
        if a == b {
            return;
        }
        self.entries.swap(a, b);
        self.slots.insert(self.entries[a].id, a);
        self.slots.insert(self.entries[b].id, b);
    }
}
