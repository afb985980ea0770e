//! Bounded store of previously built list item sub-trees.
//!
//! Items carrying an identity are stored by key, the rest in an unordered
//! pool. Both stores evict their least recently stored entry once they grow
//! past `capacity`: `put` re-inserts keyed entries at the back of an
//! insertion-ordered map, and the pool is a FIFO queue.

use crate::value::ItemIdentity;
use indexmap::IndexMap;
use std::collections::VecDeque;

pub trait Reusable {
    /// Identity of the model item this instance last displayed.
    fn identity(&self) -> Option<ItemIdentity>;
}

#[derive(Debug)]
pub struct ReusableItemCache<T> {
    capacity: usize,
    keyed: IndexMap<ItemIdentity, T>,
    pool: VecDeque<T>,
}

impl<T: Reusable> ReusableItemCache<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            keyed: IndexMap::new(),
            pool: VecDeque::new(),
        }
    }

    /// Removes and returns the entry stored under `key`, or else the oldest
    /// pooled entry. A returned item is no longer tracked by the cache.
    pub fn take(&mut self, key: Option<&ItemIdentity>) -> Option<T> {
        if let Some(item) = key.and_then(|key| self.keyed.shift_remove(key)) {
            return Some(item);
        }
        self.pool.pop_front()
    }

    pub fn put(&mut self, item: T) {
        match item.identity() {
            Some(key) => {
                self.keyed.shift_remove(&key);
                self.keyed.insert(key, item);
            }
            None => self.pool.push_back(item),
        }
        self.evict();
    }

    fn evict(&mut self) {
        while self.keyed.len() > self.capacity {
            if let Some((key, _)) = self.keyed.shift_remove_index(0) {
                log::trace!("evicted cached item {key:?}");
            }
        }
        while self.pool.len() > self.capacity {
            self.pool.pop_front();
            log::trace!("evicted pooled item");
        }
    }

    pub fn keyed_len(&self) -> usize {
        self.keyed.len()
    }

    pub fn pooled_len(&self) -> usize {
        self.pool.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
