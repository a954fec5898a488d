use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Notify;

use crate::types::{Block, BlockHash};

#[derive(Debug)]
enum ResolveState {
    Pending,
    Fulfilled(Block),
    Cancelled,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<ResolveState>,
    notify: Notify,
}

/// Single-fulfillment future for an orphan-block fetch.
///
/// States: pending, fulfilled, cancelled. The transition out of pending
/// happens at most once; a completion racing a cancellation resolves with
/// exactly one winner and the loser is a no-op.
#[derive(Debug, Clone)]
pub struct BlockFuture {
    shared: Arc<Shared>,
}

impl BlockFuture {
    fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(ResolveState::Pending),
                notify: Notify::new(),
            }),
        }
    }

    fn fulfill(&self, block: Block) -> bool {
        let mut state = self.shared.state.lock();
        if matches!(*state, ResolveState::Pending) {
            *state = ResolveState::Fulfilled(block);
            drop(state);
            self.shared.notify.notify_waiters();
            true
        } else {
            false
        }
    }

    fn cancel(&self) -> bool {
        let mut state = self.shared.state.lock();
        if matches!(*state, ResolveState::Pending) {
            *state = ResolveState::Cancelled;
            drop(state);
            self.shared.notify.notify_waiters();
            true
        } else {
            false
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(*self.shared.state.lock(), ResolveState::Pending)
    }

    /// Two handles returned for the same outstanding hash share one
    /// registration.
    pub fn same_request(&self, other: &BlockFuture) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    /// Non-blocking peek at the resolution.
    pub fn try_get(&self) -> Option<Block> {
        match &*self.shared.state.lock() {
            ResolveState::Fulfilled(block) => Some(block.clone()),
            _ => None,
        }
    }

    /// Wait until the request resolves. `None` means it was cancelled.
    pub async fn wait(&self) -> Option<Block> {
        loop {
            let notified = self.shared.notify.notified();
            match &*self.shared.state.lock() {
                ResolveState::Pending => {}
                ResolveState::Fulfilled(block) => return Some(block.clone()),
                ResolveState::Cancelled => return None,
            }
            notified.await;
        }
    }
}

/// Per-chain registry of outstanding orphan-block requests, one future per
/// hash. Used while resolving missing ancestors: the fetch side registers a
/// request, the network side fulfills it when the block arrives.
#[derive(Debug, Default)]
pub struct FutureRequestCache {
    requests: Mutex<HashMap<BlockHash, BlockFuture>>,
}

impl FutureRequestCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the existing future when one is already outstanding for the
    /// hash; never registers a duplicate.
    pub fn add_request(&self, hash: BlockHash) -> BlockFuture {
        let mut requests = self.requests.lock();
        requests.entry(hash).or_insert_with(BlockFuture::new).clone()
    }

    /// Fulfill and deregister. Idempotent: completing an unknown or already
    /// resolved hash is a no-op, never an error.
    pub fn complete(&self, hash: &[u8], block: Block) -> bool {
        let future = self.requests.lock().remove(hash);
        match future {
            Some(future) => future.fulfill(block),
            None => false,
        }
    }

    /// Cancel without fulfilling (timeout path). Waiters observe `None`.
    pub fn remove_request(&self, hash: &[u8]) -> bool {
        let future = self.requests.lock().remove(hash);
        match future {
            Some(future) => future.cancel(),
            None => false,
        }
    }

    pub fn pending_count(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn is_pending(&self, hash: &[u8]) -> bool {
        self.requests.lock().contains_key(hash)
    }
}
