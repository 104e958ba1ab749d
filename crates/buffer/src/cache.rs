//! Capacity-bounded LRU store that reports what it evicts.

use std::hash::Hash;
use std::num::NonZeroUsize;

use lru::LruCache;

/// Capacity used when the configured one is zero.
pub const DEFAULT_CAPACITY: usize = 1000;

/// An LRU mapping where overflow evicts exactly one entry, the least
/// recently used, and hands its value back to the caller.
#[derive(Debug)]
pub struct Lru<K: Eq + Hash, V> {
    inner: LruCache<K, V>,
}

impl<K: Eq + Hash, V> Lru<K, V> {
    pub fn with_capacity(capacity: usize) -> Lru<K, V> {
        let capacity = if capacity == 0 {
            DEFAULT_CAPACITY
        } else {
            capacity
        };
        let capacity = NonZeroUsize::new(capacity).expect("capacity is positive");
        Lru {
            inner: LruCache::new(capacity),
        }
    }

    /// Looks up a value; a hit becomes the most recently used entry.
    pub fn get(&mut self, key: &K) -> Option<&mut V> {
        self.inner.get_mut(key)
    }

    /// Inserts or replaces as the most recently used entry. Returns
    /// the value evicted to make room, if the insert overflowed the
    /// capacity; replacement of an existing key reports nothing.
    pub fn set(&mut self, key: K, value: V) -> Option<V> {
        let replacing = self.inner.contains(&key);
        match self.inner.push(key, value) {
            Some((_, old)) if !replacing => Some(old),
            _ => None,
        }
    }

    /// Every resident value, in no particular order.
    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.inner.iter().map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
