use alloy::signers::local::PrivateKeySigner;
use futures::future::join_all;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Barrier;
use tokio::time::timeout;

use credit_consensus::{
    agent::Agent,
    aggregator::VoteOutcome,
    config::ChainConfig,
    error::ConsensusError,
    rewards::{IntervalSettlement, RewardLedger},
    service::DefaultConsensusService,
    types::{Block, BlockHeader, ChainId, VoteStage},
    utils::create_vote,
};

const CHAIN: &str = "main";

struct DiscardLedger;

impl RewardLedger for DiscardLedger {
    fn settle(&self, _chain: &ChainId, _header: &BlockHeader) -> Result<(), ConsensusError> {
        Ok(())
    }
}

fn setup(deposit: u128, count: usize) -> (Arc<DefaultConsensusService>, Vec<PrivateKeySigner>) {
    let signers: Vec<PrivateKeySigner> = (0..count).map(|_| PrivateKeySigner::random()).collect();
    let agents = signers
        .iter()
        .enumerate()
        .map(|(i, s)| Agent {
            address: s.address().as_slice().to_vec(),
            deposit,
            registered_height: i as u64 + 1,
            registered_at: i as u64 + 1,
            identity_tx_hash: s.address().as_slice().to_vec(),
        })
        .collect();

    let genesis = BlockHeader {
        hash: vec![0x01],
        parent_hash: Vec::new(),
        height: 0,
        producer: Vec::new(),
        timestamp: 0,
    };
    let service = Arc::new(DefaultConsensusService::new());
    service
        .register_chain(
            CHAIN.to_string(),
            ChainConfig::default(),
            genesis,
            agents,
            1000,
            IntervalSettlement::new(10),
            DiscardLedger,
        )
        .expect("chain registers");
    (service, signers)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn identical_vote_counts_exactly_once() {
    let (service, signers) = setup(25, 4);
    let vote = create_vote(VoteStage::One, vec![0xAA], 1, 1, 0, &signers[0])
        .await
        .unwrap();

    let tasks = 8;
    let barrier = Arc::new(Barrier::new(tasks));
    let outcomes = Arc::new(Mutex::new(Vec::new()));

    let handles: Vec<_> = (0..tasks)
        .map(|_| {
            let service = Arc::clone(&service);
            let vote = vote.clone();
            let barrier = Arc::clone(&barrier);
            let outcomes = Arc::clone(&outcomes);
            tokio::spawn(async move {
                barrier.wait().await;
                let outcome = service.submit_vote(CHAIN, vote).await.unwrap();
                outcomes.lock().push(outcome);
            })
        })
        .collect();
    join_all(handles).await;

    let outcomes = outcomes.lock();
    let counted = outcomes
        .iter()
        .filter(|o| matches!(o, VoteOutcome::Counted))
        .count();
    let duplicates = outcomes
        .iter()
        .filter(|o| matches!(o, VoteOutcome::Duplicate))
        .count();
    assert_eq!(counted, 1, "one delivery tallies, the rest are duplicates");
    assert_eq!(duplicates, tasks - 1);
    service.shutdown();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_stage_one_votes_lock_once() {
    // 13 equal agents; the threshold lands on the ninth vote whatever order
    // the deliveries interleave in.
    let (service, signers) = setup(25, 13);
    let mut votes = Vec::new();
    for signer in &signers {
        votes.push(
            create_vote(VoteStage::One, vec![0xBB], 1, 1, 0, signer)
                .await
                .unwrap(),
        );
    }

    let barrier = Arc::new(Barrier::new(votes.len()));
    let handles: Vec<_> = votes
        .into_iter()
        .map(|vote| {
            let service = Arc::clone(&service);
            let barrier = Arc::clone(&barrier);
            tokio::spawn(async move {
                barrier.wait().await;
                service.submit_vote(CHAIN, vote).await.unwrap()
            })
        })
        .collect();

    let outcomes: Vec<VoteOutcome> = join_all(handles)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    let lock_ins = outcomes
        .iter()
        .filter(|o| matches!(o, VoteOutcome::StageOnePassed(_)))
        .count();
    assert_eq!(lock_ins, 1);
    service.shutdown();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_requests_share_one_future() {
    let (service, _signers) = setup(25, 4);
    let hash = vec![0x77; 4];

    let tasks = 8;
    let barrier = Arc::new(Barrier::new(tasks));
    let handles: Vec<_> = (0..tasks)
        .map(|_| {
            let service = Arc::clone(&service);
            let hash = hash.clone();
            let barrier = Arc::clone(&barrier);
            tokio::spawn(async move {
                barrier.wait().await;
                service.request_block(CHAIN, hash).unwrap()
            })
        })
        .collect();
    let futures: Vec<_> = join_all(handles)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    for future in &futures[1..] {
        assert!(futures[0].same_request(future));
    }

    let block = Block {
        header: BlockHeader {
            hash: hash.clone(),
            parent_hash: vec![0x01],
            height: 3,
            producer: Vec::new(),
            timestamp: 0,
        },
        body: Vec::new(),
    };
    assert!(service.on_block_received(CHAIN, &hash, block).unwrap());
    for future in futures {
        let resolved = timeout(Duration::from_secs(2), future.wait())
            .await
            .unwrap();
        assert_eq!(resolved.unwrap().header.height, 3);
    }
    service.shutdown();
}
