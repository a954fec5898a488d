use std::collections::{HashSet, VecDeque};

/// Bounded fingerprint set with FIFO eviction.
///
/// `insert_and_check` answers "is this the first time I see this key?".
/// Once capacity turns over, an evicted fingerprint will read as new again;
/// that is tolerated because the tallies downstream are idempotent per
/// voter, so a re-admitted duplicate can never be counted twice.
#[derive(Debug)]
pub struct DuplicateFilter {
    capacity: usize,
    order: VecDeque<Vec<u8>>,
    seen: HashSet<Vec<u8>>,
}

impl DuplicateFilter {
    pub const DEFAULT_CAPACITY: usize = 512;

    pub fn new() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            order: VecDeque::with_capacity(capacity),
            seen: HashSet::with_capacity(capacity),
        }
    }

    /// Returns true if the key was newly inserted, false if already present.
    pub fn insert_and_check(&mut self, key: &[u8]) -> bool {
        if self.seen.contains(key) {
            return false;
        }
        if self.order.len() == self.capacity
            && let Some(oldest) = self.order.pop_front()
        {
            self.seen.remove(&oldest);
        }
        self.order.push_back(key.to_vec());
        self.seen.insert(key.to_vec());
        true
    }

    /// Forget a key so a later re-delivery reads as new again.
    pub fn remove(&mut self, key: &[u8]) -> bool {
        if !self.seen.remove(key) {
            return false;
        }
        self.order.retain(|k| k.as_slice() != key);
        true
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for DuplicateFilter {
    fn default() -> Self {
        Self::new()
    }
}
