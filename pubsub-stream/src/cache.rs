//! Bounded cache of recently delivered events.

use std::collections::VecDeque;

/// Capacity used by subscription sessions.
pub const MESSAGE_CACHE_CAPACITY: usize = 100;

/// FIFO set of the most recently delivered items.
///
/// Holds at most `capacity` items. Inserting into a full cache evicts the
/// oldest item first.
#[derive(Debug, Clone)]
pub struct MessageCache<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T: PartialEq> MessageCache<T> {
    pub fn new() -> Self {
        Self::with_capacity(MESSAGE_CACHE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    pub fn contains(&self, item: &T) -> bool {
        self.items.contains(item)
    }

    /// Record `item` unless it is already cached.
    ///
    /// Returns `false` for a duplicate, which leaves the cache untouched.
    pub fn insert(&mut self, item: T) -> bool {
        if self.contains(&item) {
            return false;
        }
        if self.items.len() >= self.capacity {
            self.items.pop_front();
        }
        self.items.push_back(item);
        true
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Cached items, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

impl<T: PartialEq> Default for MessageCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_keeps_most_recent_hundred_in_order() {
        let mut cache = MessageCache::new();
        for id in 0..150u32 {
            assert!(cache.insert(id));
        }

        assert_eq!(cache.len(), 100);
        let kept: Vec<u32> = cache.iter().copied().collect();
        assert_eq!(kept, (50..150).collect::<Vec<_>>());
    }

    #[test]
    fn test_duplicate_is_rejected_without_growth() {
        let mut cache = MessageCache::new();
        assert!(cache.insert("a"));
        assert!(cache.insert("b"));
        assert!(!cache.insert("a"));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_evicted_item_can_be_inserted_again() {
        let mut cache = MessageCache::with_capacity(2);
        cache.insert(1);
        cache.insert(2);
        cache.insert(3);
        assert!(!cache.contains(&1));
        assert!(cache.insert(1));
        assert_eq!(cache.iter().copied().collect::<Vec<_>>(), vec![3, 1]);
    }

    proptest! {
        #[test]
        fn prop_never_exceeds_capacity(items in proptest::collection::vec(0u16..500, 0..400)) {
            let mut cache = MessageCache::new();
            for item in items {
                cache.insert(item);
                prop_assert!(cache.len() <= MESSAGE_CACHE_CAPACITY);
            }
        }
    }
}
