use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use tokio::sync::mpsc;

use crate::{
    aggregator::VoteAggregator,
    block_requests::FutureRequestCache,
    candidates::CandidateStore,
    config::ChainConfig,
    result_cache::VoteResultCache,
    round::Round,
    types::{BlockHeader, ChainId, PackingSignal},
};

/// Everything one chain owns: aggregator, caches, round snapshot, queues.
///
/// Constructed once per chain and passed around by `Arc`; there are no
/// process-wide lookup tables. No lock in here is ever held while touching
/// another chain's context.
pub struct ChainContext {
    pub(crate) id: ChainId,
    pub(crate) config: ChainConfig,
    pub(crate) aggregator: Mutex<VoteAggregator>,
    pub(crate) round: RwLock<Round>,
    /// Latest confirmed header this node actually holds.
    pub(crate) best_block: RwLock<BlockHeader>,
    pub(crate) result_cache: Mutex<VoteResultCache>,
    pub(crate) candidates: CandidateStore,
    pub(crate) block_requests: FutureRequestCache,
    pub(crate) reward_tx: mpsc::UnboundedSender<BlockHeader>,
    pub(crate) packing_tx: mpsc::UnboundedSender<PackingSignal>,
    /// Highest height for which a packing signal was already emitted.
    last_signaled_height: AtomicU64,
    /// Slot currently allowed to pack; advanced by the slot watchdog.
    pub(crate) current_slot: AtomicU32,
}

impl ChainContext {
    pub(crate) fn new(
        id: ChainId,
        config: ChainConfig,
        genesis: BlockHeader,
        round: Round,
        reward_tx: mpsc::UnboundedSender<BlockHeader>,
        packing_tx: mpsc::UnboundedSender<PackingSignal>,
    ) -> Self {
        let aggregator = VoteAggregator::with_capacities(
            genesis.height + 1,
            round.total_weight(),
            config.dedup_capacity,
            config.future_vote_capacity,
        );
        let result_cache = VoteResultCache::with_capacity(config.result_cache_capacity);
        let candidates = CandidateStore::new(
            config.candidate_sweep_threshold,
            std::time::Duration::from_secs(config.candidate_max_age_secs),
        );
        let last_signaled_height = AtomicU64::new(genesis.height);
        Self {
            id,
            config,
            aggregator: Mutex::new(aggregator),
            round: RwLock::new(round),
            best_block: RwLock::new(genesis),
            result_cache: Mutex::new(result_cache),
            candidates,
            block_requests: FutureRequestCache::new(),
            reward_tx,
            packing_tx,
            last_signaled_height,
            current_slot: AtomicU32::new(0),
        }
    }

    /// Height whose two-stage vote has completed.
    pub(crate) fn confirmed_height(&self) -> u64 {
        self.aggregator.lock().current_height().saturating_sub(1)
    }

    /// Emit the packing signal for a height at most once. Returns false if
    /// a signal for this or a later height already went out.
    pub(crate) fn signal_packing(&self, height: u64) -> bool {
        let prev = self.last_signaled_height.fetch_max(height, Ordering::SeqCst);
        if prev >= height {
            return false;
        }
        let round = self.round.read();
        let (slot, packer) = round.packer_for_height(height);
        self.current_slot.store(slot, Ordering::SeqCst);
        let _ = self.packing_tx.send(PackingSignal {
            height,
            slot_index: slot,
            packer: packer.address.clone(),
        });
        true
    }
}
