//! Byte-budgeted LRU shard
//!
//! Recency is tracked with a monotonically increasing tick; the oldest tick
//! in `order` is the next eviction victim.

use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;

#[derive(Debug)]
struct Entry<V> {
    value: V,
    size: usize,
    tick: u64,
}

#[derive(Debug)]
pub struct LruShard<K, V> {
    map: HashMap<K, Entry<V>>,
    order: BTreeMap<u64, K>,
    used: usize,
    budget: usize,
    tick: u64,
}

impl<K, V> LruShard<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    #[must_use]
    pub fn new(budget: usize) -> Self {
        Self {
            map: HashMap::new(),
            order: BTreeMap::new(),
            used: 0,
            budget,
            tick: 0,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Bytes currently charged against the budget.
    #[must_use]
    pub fn used(&self) -> usize {
        self.used
    }

    #[must_use]
    pub fn budget(&self) -> usize {
        self.budget
    }

    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    /// Returns a clone of the value and marks it most recently used.
    pub fn get(&mut self, key: &K) -> Option<V> {
        let tick = self.next_tick();
        let entry = self.map.get_mut(key)?;
        self.order.remove(&entry.tick);
        entry.tick = tick;
        self.order.insert(tick, key.clone());
        Some(entry.value.clone())
    }

    /// Insert `value` charged at `size` bytes, evicting least recently used
    /// entries until it fits. Returns the number of evicted entries, or
    /// `None` when the value can never fit.
    pub fn put(&mut self, key: K, value: V, size: usize) -> Option<usize> {
        if size > self.budget {
            return None;
        }
        self.remove(&key);
        let mut evicted = 0;
        while self.used + size > self.budget && self.evict_oldest() {
            evicted += 1;
        }
        let tick = self.next_tick();
        self.order.insert(tick, key.clone());
        self.map.insert(key, Entry { value, size, tick });
        self.used += size;
        Some(evicted)
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        let entry = self.map.remove(key)?;
        self.order.remove(&entry.tick);
        self.used -= entry.size;
        Some(entry.value)
    }

    fn evict_oldest(&mut self) -> bool {
        let Some((_, key)) = self.order.pop_first() else {
            return false;
        };
        if let Some(entry) = self.map.remove(&key) {
            self.used -= entry.size;
        }
        true
    }

    pub fn clear(&mut self) {
        self.map.clear();
        self.order.clear();
        self.used = 0;
    }
}
