//! Generational slot arena.
//!
//! Each slot carries a generation counter that is bumped when its value is
//! removed. A [`SlotKey`] names a slot index and the generation it was
//! issued under, so a key that outlived its value never matches again.
//!
//! Entries are also threaded in allocation order, which is the order the
//! registries expose through their `get_first` / `get_next` iteration.

use std::collections::{BTreeMap, VecDeque};
use thiserror::Error;

/// Largest generation a slot can carry before wrapping back to 1.
///
/// Handles store 24 bits of generation.
pub const MAX_GENERATION: u32 = (1 << 24) - 1;

/// Error type for arena operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArenaError {
    #[error("arena full (capacity {capacity})")]
    Full { capacity: usize },

    #[error("stale or unknown key: slot {index} generation {generation}")]
    StaleKey { index: u32, generation: u32 },
}

/// Slot index plus the generation the key was issued under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotKey {
    pub index: u32,
    pub generation: u32,
}

impl SlotKey {
    pub const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }
}

#[derive(Debug)]
struct Slot<T> {
    generation: u32,
    alloc_seq: u64,
    value: Option<T>,
}

/// Bounded arena of `T` addressed by generational keys.
///
/// Insert, lookup, remove and count are O(1); stepping to the next entry in
/// allocation order is O(log n).
#[derive(Debug)]
pub struct SlotArena<T> {
    slots: Vec<Slot<T>>,
    free: VecDeque<u32>,
    order: BTreeMap<u64, u32>,
    next_seq: u64,
    capacity: usize,
    len: usize,
}

fn next_generation(generation: u32) -> u32 {
    if generation >= MAX_GENERATION {
        1
    } else {
        generation + 1
    }
}

impl<T> SlotArena<T> {
    /// Creates an empty arena that holds at most `capacity` live values.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::new(),
            free: VecDeque::new(),
            order: BTreeMap::new(),
            next_seq: 0,
            capacity,
            len: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len >= self.capacity
    }

    /// Stores `value` and returns its key.
    ///
    /// Fresh slots are used before freed ones, and freed slots are reused
    /// oldest first, which keeps a just-destroyed key from being reissued
    /// with the next generation straight away.
    pub fn insert(&mut self, value: T) -> Result<SlotKey, ArenaError> {
        if self.is_full() {
            return Err(ArenaError::Full {
                capacity: self.capacity,
            });
        }
        let seq = self.next_seq;
        self.next_seq += 1;

        let index = if self.slots.len() < self.capacity {
            self.slots.push(Slot {
                generation: 1,
                alloc_seq: seq,
                value: Some(value),
            });
            (self.slots.len() - 1) as u32
        } else {
            let index = self.free.pop_front().ok_or(ArenaError::Full {
                capacity: self.capacity,
            })?;
            let slot = &mut self.slots[index as usize];
            slot.alloc_seq = seq;
            slot.value = Some(value);
            index
        };

        self.order.insert(seq, index);
        self.len += 1;
        Ok(SlotKey::new(index, self.slots[index as usize].generation))
    }

    fn slot(&self, key: SlotKey) -> Option<&Slot<T>> {
        self.slots
            .get(key.index as usize)
            .filter(|s| s.generation == key.generation && s.value.is_some())
    }

    pub fn contains(&self, key: SlotKey) -> bool {
        self.slot(key).is_some()
    }

    pub fn get(&self, key: SlotKey) -> Option<&T> {
        self.slot(key).and_then(|s| s.value.as_ref())
    }

    pub fn get_mut(&mut self, key: SlotKey) -> Option<&mut T> {
        self.slots
            .get_mut(key.index as usize)
            .filter(|s| s.generation == key.generation)
            .and_then(|s| s.value.as_mut())
    }

    /// Removes and returns the value; the key and every copy of it become stale.
    pub fn remove(&mut self, key: SlotKey) -> Option<T> {
        let slot = self
            .slots
            .get_mut(key.index as usize)
            .filter(|s| s.generation == key.generation)?;
        let value = slot.value.take()?;
        slot.generation = next_generation(slot.generation);
        self.order.remove(&slot.alloc_seq);
        self.free.push_back(key.index);
        self.len -= 1;
        Some(value)
    }

    fn key_at(&self, index: u32) -> SlotKey {
        SlotKey::new(index, self.slots[index as usize].generation)
    }

    /// Oldest live entry.
    pub fn first(&self) -> Option<SlotKey> {
        self.order.values().next().map(|&i| self.key_at(i))
    }

    /// Entry allocated right after `key`, or `None` past the last one.
    pub fn next_after(&self, key: SlotKey) -> Result<Option<SlotKey>, ArenaError> {
        let slot = self.slot(key).ok_or(ArenaError::StaleKey {
            index: key.index,
            generation: key.generation,
        })?;
        Ok(self
            .order
            .range(slot.alloc_seq + 1..)
            .next()
            .map(|(_, &i)| self.key_at(i)))
    }

    /// Live entries in allocation order.
    pub fn iter(&self) -> impl Iterator<Item = (SlotKey, &T)> + '_ {
        self.order.values().filter_map(move |&i| {
            let slot = &self.slots[i as usize];
            slot.value
                .as_ref()
                .map(|v| (SlotKey::new(i, slot.generation), v))
        })
    }

    pub fn keys(&self) -> Vec<SlotKey> {
        self.iter().map(|(k, _)| k).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashSet;

    #[test]
    fn test_insert_get_remove() {
        let mut arena = SlotArena::with_capacity(4);
        let a = arena.insert("a").unwrap();
        let b = arena.insert("b").unwrap();
        assert_eq!(arena.len(), 2);
        assert_eq!(arena.get(a), Some(&"a"));
        assert_eq!(arena.remove(a), Some("a"));
        assert_eq!(arena.get(a), None);
        assert_eq!(arena.remove(a), None);
        assert_eq!(arena.get(b), Some(&"b"));
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn test_full() {
        let mut arena = SlotArena::with_capacity(2);
        arena.insert(1).unwrap();
        let k = arena.insert(2).unwrap();
        assert_eq!(arena.insert(3), Err(ArenaError::Full { capacity: 2 }));
        arena.remove(k);
        assert!(arena.insert(3).is_ok());
    }

    #[test]
    fn test_reused_slot_gets_new_generation() {
        let mut arena = SlotArena::with_capacity(1);
        let old = arena.insert(1).unwrap();
        arena.remove(old);
        let new = arena.insert(2).unwrap();
        assert_eq!(old.index, new.index);
        assert_ne!(old.generation, new.generation);
        assert_eq!(arena.get(old), None);
        assert_eq!(arena.get_mut(old), None);
        assert_eq!(arena.get(new), Some(&2));
    }

    #[test]
    fn test_live_keys_never_collide() {
        let mut arena = SlotArena::with_capacity(8);
        let mut live = Vec::new();
        for round in 0..50u32 {
            if round % 3 == 2 && !live.is_empty() {
                let k = live.remove((round as usize * 7) % live.len());
                arena.remove(k);
            } else if !arena.is_full() {
                live.push(arena.insert(round).unwrap());
            }
            let unique: HashSet<_> = live.iter().collect();
            assert_eq!(unique.len(), live.len());
            assert_eq!(arena.len(), live.len());
        }
    }

    #[test]
    fn test_allocation_order_iteration() {
        let mut arena = SlotArena::with_capacity(4);
        let a = arena.insert('a').unwrap();
        let b = arena.insert('b').unwrap();
        let c = arena.insert('c').unwrap();
        arena.remove(a);
        let d = arena.insert('d').unwrap();

        assert_eq!(arena.first(), Some(b));
        assert_eq!(arena.next_after(b), Ok(Some(c)));
        assert_eq!(arena.next_after(c), Ok(Some(d)));
        assert_eq!(arena.next_after(d), Ok(None));
        let values: Vec<_> = arena.iter().map(|(_, v)| *v).collect();
        assert_eq!(values, vec!['b', 'c', 'd']);
    }

    #[test]
    fn test_next_after_stale_key() {
        let mut arena = SlotArena::with_capacity(4);
        let a = arena.insert(1).unwrap();
        arena.insert(2).unwrap();
        arena.remove(a);
        assert_eq!(
            arena.next_after(a),
            Err(ArenaError::StaleKey {
                index: a.index,
                generation: a.generation
            })
        );
    }

    #[test]
    fn test_generation_wraps_to_one() {
        assert_eq!(next_generation(MAX_GENERATION), 1);
        assert_eq!(next_generation(1), 2);
    }

    #[test]
    fn test_empty_arena() {
        let arena: SlotArena<u8> = SlotArena::with_capacity(0);
        assert!(arena.is_empty());
        assert!(arena.is_full());
        assert_eq!(arena.first(), None);
    }
}
