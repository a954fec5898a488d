use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

use credit_consensus::{
    block_requests::FutureRequestCache,
    types::{Block, BlockHeader},
};

const WAIT_TIMEOUT: Duration = Duration::from_secs(2);

fn block(id: u8, height: u64) -> Block {
    Block {
        header: BlockHeader {
            hash: vec![id],
            parent_hash: vec![id.wrapping_sub(1)],
            height,
            producer: vec![0x0A],
            timestamp: 0,
        },
        body: vec![1, 2, 3],
    }
}

#[tokio::test]
async fn re_request_returns_existing_future() {
    let cache = FutureRequestCache::new();
    let first = cache.add_request(vec![1]);
    let second = cache.add_request(vec![1]);
    assert!(first.same_request(&second));
    assert_eq!(cache.pending_count(), 1);
}

#[tokio::test]
async fn completion_wakes_all_waiters() {
    let cache = Arc::new(FutureRequestCache::new());
    let future = cache.add_request(vec![2]);

    let mut waiters = Vec::new();
    for _ in 0..4 {
        let handle = future.clone();
        waiters.push(tokio::spawn(async move { handle.wait().await }));
    }

    assert!(cache.complete(&[2], block(2, 42)));
    for waiter in waiters {
        let resolved = timeout(WAIT_TIMEOUT, waiter).await.unwrap().unwrap();
        assert_eq!(resolved.unwrap().header.height, 42);
    }
    assert_eq!(cache.pending_count(), 0);
}

#[tokio::test]
async fn complete_after_remove_is_a_noop() {
    let cache = FutureRequestCache::new();
    let future = cache.add_request(vec![3]);

    assert!(cache.remove_request(&[3]));
    assert!(!cache.complete(&[3], block(3, 1)));

    let resolved = timeout(WAIT_TIMEOUT, future.wait()).await.unwrap();
    assert!(resolved.is_none(), "cancelled request must resolve to None");
}

#[tokio::test]
async fn completion_and_cancellation_have_one_winner() {
    // Run the race repeatedly; whatever the interleaving, the future must
    // resolve exactly once and both calls must agree on the winner.
    for _ in 0..50 {
        let cache = Arc::new(FutureRequestCache::new());
        let future = cache.add_request(vec![4]);

        let completer = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move { cache.complete(&[4], block(4, 4)) })
        };
        let canceller = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move { cache.remove_request(&[4]) })
        };

        let completed = completer.await.unwrap();
        let cancelled = canceller.await.unwrap();
        assert!(completed ^ cancelled, "exactly one side must win");

        let resolved = timeout(WAIT_TIMEOUT, future.wait()).await.unwrap();
        assert_eq!(resolved.is_some(), completed);
        assert_eq!(cache.pending_count(), 0);
    }
}

#[tokio::test]
async fn try_get_reports_fulfilled_state() {
    let cache = FutureRequestCache::new();
    let future = cache.add_request(vec![5]);
    assert!(future.is_pending());
    assert!(future.try_get().is_none());

    cache.complete(&[5], block(5, 9));
    assert!(!future.is_pending());
    assert_eq!(future.try_get().unwrap().header.hash, vec![5]);
}

#[tokio::test]
async fn independent_hashes_do_not_share_futures() {
    let cache = FutureRequestCache::new();
    let a = cache.add_request(vec![6]);
    let b = cache.add_request(vec![7]);
    assert!(!a.same_request(&b));

    cache.complete(&[6], block(6, 1));
    assert!(a.try_get().is_some());
    assert!(b.is_pending());
}
