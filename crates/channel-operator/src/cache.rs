//! Capacity-bounded map with least-recently-used eviction.
//!
//! Every entry carries the tick of its last access; `order` indexes entries by
//! that tick so the oldest one is found in `O(log n)`.

use std::borrow::Borrow;
use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;

pub struct LruCache<K, V> {
    capacity: usize,
    tick: u64,
    entries: HashMap<K, (V, u64)>,
    order: BTreeMap<u64, K>,
}

impl<K, V> LruCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// A capacity of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            tick: 0,
            entries: HashMap::new(),
            order: BTreeMap::new(),
        }
    }

    /// Look up `key` and mark it as most recently used.
    pub fn get<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        let tick = self.next_tick();
        let (value, last_used) = self.entries.get_mut(key)?;
        let previous = *last_used;
        *last_used = tick;
        let value = value.clone();
        if let Some(owned) = self.order.remove(&previous) {
            self.order.insert(tick, owned);
        }
        Some(value)
    }

    /// Insert or replace `key`, evicting the least recently used entry when full.
    pub fn insert(&mut self, key: K, value: V) {
        let tick = self.next_tick();
        if let Some((_, old_tick)) = self.entries.remove(&key) {
            self.order.remove(&old_tick);
        } else if self.entries.len() >= self.capacity {
            if let Some((_, oldest)) = self.order.pop_first() {
                self.entries.remove(&oldest);
            }
        }
        self.order.insert(tick, key.clone());
        self.entries.insert(key, (value, tick));
    }

    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_least_recently_used() {
        let mut cache = LruCache::new(2);
        cache.insert("a", 1);
        cache.insert("b", 2);
        assert_eq!(cache.get(&"a"), Some(1));

        cache.insert("c", 3);
        assert!(cache.contains(&"a"));
        assert!(!cache.contains(&"b"));
        assert!(cache.contains(&"c"));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn replacing_a_key_does_not_evict() {
        let mut cache = LruCache::new(2);
        cache.insert("a", 1);
        cache.insert("b", 2);
        cache.insert("a", 10);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&"a"), Some(10));
        assert_eq!(cache.get(&"b"), Some(2));
    }

    #[test]
    fn zero_capacity_holds_one_entry() {
        let mut cache = LruCache::new(0);
        assert_eq!(cache.capacity(), 1);
        cache.insert(1, "x");
        cache.insert(2, "y");
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&2), Some("y"));
        assert_eq!(cache.get(&1), None);
    }

    #[test]
    fn borrowed_lookups_refresh_recency() {
        let mut cache: LruCache<String, u32> = LruCache::new(2);
        cache.insert("U1".to_string(), 1);
        cache.insert("U2".to_string(), 2);
        assert_eq!(cache.get("U1"), Some(1));

        cache.insert("U3".to_string(), 3);
        assert!(cache.contains("U1"));
        assert!(!cache.contains("U2"));
        assert_eq!(cache.get("U3"), Some(3));
    }

    #[test]
    fn never_grows_past_capacity() {
        let mut cache = LruCache::new(16);
        for i in 0..1_000 {
            cache.insert(i, i * 2);
            assert!(cache.len() <= 16);
        }
        assert_eq!(cache.get(&999), Some(1998));
        assert_eq!(cache.get(&0), None);
        assert!(!cache.is_empty());
    }
}
