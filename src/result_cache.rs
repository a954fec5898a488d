use std::collections::{HashMap, VecDeque};

use crate::types::{BlockHash, VoteResultMessage};

/// FIFO cache of finalized vote results, insertion order + lookup map.
///
/// Serves late re-delivery requests for a result without recomputing the
/// tally. Size never exceeds the capacity; inserting past it evicts the
/// oldest-inserted hash.
#[derive(Debug)]
pub struct VoteResultCache {
    capacity: usize,
    order: VecDeque<BlockHash>,
    results: HashMap<BlockHash, VoteResultMessage>,
}

impl VoteResultCache {
    pub const DEFAULT_CAPACITY: usize = 50;

    pub fn new() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            order: VecDeque::with_capacity(capacity),
            results: HashMap::with_capacity(capacity),
        }
    }

    pub fn insert(&mut self, hash: BlockHash, result: VoteResultMessage) {
        if self.results.insert(hash.clone(), result).is_some() {
            // Re-insert of a cached hash keeps its original slot in the
            // eviction order.
            return;
        }
        self.order.push_back(hash);
        while self.results.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.results.remove(&oldest);
            }
        }
    }

    pub fn get(&self, hash: &[u8]) -> Option<&VoteResultMessage> {
        self.results.get(hash)
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

impl Default for VoteResultCache {
    fn default() -> Self {
        Self::new()
    }
}
