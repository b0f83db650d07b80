//! A small LRU cache bounded by both entry count and total byte cost.
//!
//! Eviction order under either bound is least-recently-used first; the
//! exact tie-breaking is an implementation detail, not a contract.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;

struct Slot<V> {
    value: V,
    cost: usize,
}

pub struct LruCache<K, V> {
    max_entries: usize,
    max_cost: usize,
    slots: HashMap<K, Slot<V>>,
    // Front = coldest. Touched keys move to the back.
    order: VecDeque<K>,
    total_cost: usize,
}

impl<K: Eq + Hash + Clone, V> LruCache<K, V> {
    pub fn new(max_entries: usize, max_cost: usize) -> Self {
        Self {
            max_entries,
            max_cost,
            slots: HashMap::new(),
            order: VecDeque::new(),
            total_cost: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn total_cost(&self) -> usize {
        self.total_cost
    }

    pub fn contains(&self, key: &K) -> bool {
        self.slots.contains_key(key)
    }

    pub fn get(&mut self, key: &K) -> Option<&V> {
        if !self.slots.contains_key(key) {
            return None;
        }
        self.touch(key);
        self.slots.get(key).map(|slot| &slot.value)
    }

    /// Inserts `value` at the given cost, evicting cold entries as needed.
    /// A value that alone exceeds the cost bound is not cached at all.
    pub fn insert(&mut self, key: K, value: V, cost: usize) {
        if cost > self.max_cost || self.max_entries == 0 {
            self.remove(&key);
            return;
        }

        if let Some(old) = self.slots.remove(&key) {
            self.total_cost -= old.cost;
            self.order.retain(|k| k != &key);
        }

        self.slots.insert(key.clone(), Slot { value, cost });
        self.order.push_back(key);
        self.total_cost += cost;

        while self.slots.len() > self.max_entries || self.total_cost > self.max_cost {
            let Some(cold) = self.order.pop_front() else {
                break;
            };
            if let Some(slot) = self.slots.remove(&cold) {
                self.total_cost -= slot.cost;
            }
        }
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        let slot = self.slots.remove(key)?;
        self.total_cost -= slot.cost;
        self.order.retain(|k| k != key);
        Some(slot.value)
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.order.clear();
        self.total_cost = 0;
    }

    pub fn retain(&mut self, mut keep: impl FnMut(&K) -> bool) {
        let mut removed_cost = 0;
        self.slots.retain(|key, slot| {
            if keep(key) {
                true
            } else {
                removed_cost += slot.cost;
                false
            }
        });
        let slots = &self.slots;
        self.order.retain(|key| slots.contains_key(key));
        self.total_cost -= removed_cost;
    }

    fn touch(&mut self, key: &K) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            let k = self.order.remove(pos).expect("position valid");
            self.order.push_back(k);
        }
    }
}
