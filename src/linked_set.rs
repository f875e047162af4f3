//! Insertion-ordered set backed by an index-linked arena.
//!
//! Slot 0 is the sentinel node: it is both head and tail of a closed ring, so
//! an empty set is the sentinel pointing at itself. Removed slots are recycled
//! through a free list. A hash index maps each member to its slot, which keeps
//! `add`, `remove` and `contains` O(1).

use alloy::primitives::FixedBytes;
use std::collections::HashMap;
use std::hash::Hash;
use thiserror::Error;

const SENTINEL_SLOT: usize = 0;

/// A fixed-width value that can live in a [`LinkedSet`].
///
/// `SENTINEL` marks the ring's head and can never be stored.
pub trait SetValue: Copy + Eq + Hash + std::fmt::Debug {
    const SENTINEL: Self;
}

impl<const N: usize> SetValue for FixedBytes<N> {
    const SENTINEL: Self = FixedBytes::ZERO;
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkedSetError {
    #[error("the sentinel value cannot be stored")]
    SentinelValue,
    #[error("value already present")]
    AlreadyPresent,
}

#[derive(Debug, Clone)]
struct Node<T> {
    value: T,
    prev: usize,
    next: usize,
}

#[derive(Debug, Clone)]
pub struct LinkedSet<T: SetValue> {
    nodes: Vec<Node<T>>,
    index: HashMap<T, usize>,
    free: Vec<usize>,
}

impl<T: SetValue> Default for LinkedSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: SetValue> LinkedSet<T> {
    pub fn new() -> Self {
        Self {
            nodes: vec![Node {
                value: T::SENTINEL,
                prev: SENTINEL_SLOT,
                next: SENTINEL_SLOT,
            }],
            index: HashMap::new(),
            free: Vec::new(),
        }
    }

    /// Appends `value`, rejecting the sentinel and duplicates.
    pub fn try_add(&mut self, value: T) -> Result<(), LinkedSetError> {
        if value == T::SENTINEL {
            return Err(LinkedSetError::SentinelValue);
        }
        if self.index.contains_key(&value) {
            return Err(LinkedSetError::AlreadyPresent);
        }

        let tail = self.nodes[SENTINEL_SLOT].prev;
        let node = Node {
            value,
            prev: tail,
            next: SENTINEL_SLOT,
        };
        let slot = match self.free.pop() {
            Some(slot) => {
                self.nodes[slot] = node;
                slot
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        };
        self.nodes[tail].next = slot;
        self.nodes[SENTINEL_SLOT].prev = slot;
        self.index.insert(value, slot);
        Ok(())
    }

    /// Returns false if `value` was already present or is the sentinel.
    pub fn add(&mut self, value: T) -> bool {
        self.try_add(value).is_ok()
    }

    /// Returns false if `value` was absent.
    pub fn remove(&mut self, value: T) -> bool {
        let Some(slot) = self.index.remove(&value) else {
            return false;
        };
        let (prev, next) = (self.nodes[slot].prev, self.nodes[slot].next);
        self.nodes[prev].next = next;
        self.nodes[next].prev = prev;

        // Tombstone the slot so a stale walk can never reach a live value.
        let node = &mut self.nodes[slot];
        node.value = T::SENTINEL;
        node.prev = slot;
        node.next = slot;
        self.free.push(slot);
        true
    }

    pub fn contains(&self, value: T) -> bool {
        self.index.contains_key(&value)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Removes every member and releases the arena.
    pub fn clear(&mut self) {
        self.nodes.truncate(1);
        self.nodes[SENTINEL_SLOT].prev = SENTINEL_SLOT;
        self.nodes[SENTINEL_SLOT].next = SENTINEL_SLOT;
        self.index.clear();
        self.free.clear();
    }

    /// Members in insertion order. The borrow keeps the set frozen while iterating.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            set: self,
            cursor: self.nodes[SENTINEL_SLOT].next,
        }
    }

    /// Snapshot of the members in insertion order.
    pub fn get_all(&self) -> Vec<T> {
        self.iter().collect()
    }
}

pub struct Iter<'a, T: SetValue> {
    set: &'a LinkedSet<T>,
    cursor: usize,
}

impl<T: SetValue> Iterator for Iter<'_, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        if self.cursor == SENTINEL_SLOT {
            return None;
        }
        let node = &self.set.nodes[self.cursor];
        self.cursor = node.next;
        Some(node.value)
    }
}

impl<'a, T: SetValue> IntoIterator for &'a LinkedSet<T> {
    type Item = T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Sel = FixedBytes<4>;

    fn sel(n: u8) -> Sel {
        FixedBytes([0, 0, 0, n])
    }

    #[test]
    fn test_insertion_order() {
        let mut set = LinkedSet::new();
        for n in [3, 1, 2] {
            assert!(set.add(sel(n)));
        }
        assert_eq!(set.get_all(), vec![sel(3), sel(1), sel(2)]);
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn test_sentinel_rejected() {
        let mut set: LinkedSet<Sel> = LinkedSet::new();
        assert_eq!(set.try_add(Sel::ZERO), Err(LinkedSetError::SentinelValue));
        assert!(!set.add(Sel::ZERO));
        assert!(!set.contains(Sel::ZERO));
        assert!(set.is_empty());
    }

    #[test]
    fn test_duplicates_rejected() {
        let mut set = LinkedSet::new();
        set.try_add(sel(1)).unwrap();
        assert_eq!(set.try_add(sel(1)), Err(LinkedSetError::AlreadyPresent));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_remove_middle_head_and_tail() {
        let mut set = LinkedSet::new();
        for n in 1..=5 {
            set.add(sel(n));
        }
        assert!(set.remove(sel(3)));
        assert!(set.remove(sel(1)));
        assert!(set.remove(sel(5)));
        assert!(!set.remove(sel(5)));
        assert_eq!(set.get_all(), vec![sel(2), sel(4)]);
        assert!(!set.contains(sel(3)));
    }

    #[test]
    fn test_slot_reuse_keeps_order() {
        let mut set = LinkedSet::new();
        set.add(sel(1));
        set.add(sel(2));
        set.remove(sel(1));
        set.add(sel(3));
        set.add(sel(1));
        assert_eq!(set.get_all(), vec![sel(2), sel(3), sel(1)]);
        // one removal, one recycled slot: arena is sentinel + 3 members
        assert_eq!(set.nodes.len(), 4);
    }

    #[test]
    fn test_clear() {
        let mut set = LinkedSet::new();
        set.add(sel(1));
        set.add(sel(2));
        set.clear();
        assert!(set.is_empty());
        assert_eq!(set.get_all(), Vec::<Sel>::new());
        assert!(set.add(sel(1)));
        assert_eq!(set.get_all(), vec![sel(1)]);
    }
}
