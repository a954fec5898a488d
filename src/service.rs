use alloy_signer::Signer;
use parking_lot::RwLock;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, watch};
use tokio::time::{Duration, interval};
use tracing::{debug, info, warn};

use crate::{
    agent::Agent,
    aggregator::VoteOutcome,
    block_requests::BlockFuture,
    candidates::BasicVerdict,
    chain::ChainContext,
    config::ChainConfig,
    error::ConsensusError,
    events::{BroadcastEventBus, ConsensusEvent, ConsensusEventBus},
    rewards::{RewardLedger, RewardProcessor, SettlementPolicy},
    round::Round,
    types::{Block, BlockHash, BlockHeader, ChainId, VoteMessage, VoteResultMessage, VoteStage},
    utils::{create_vote, validate_vote},
};

/// The transport collaborator. Messages handed over here are in-memory
/// structs; framing, wire encoding and peer selection are its business.
pub trait NetworkDispatcher: Send + Sync + 'static {
    fn broadcast_vote(&self, chain: &ChainId, vote: &VoteMessage);
    fn broadcast_result(&self, chain: &ChainId, result: &VoteResultMessage);
    /// Solicit a missing ancestor from peers.
    fn request_block(&self, chain: &ChainId, hash: &BlockHash);
}

/// Dispatcher that drops everything. Useful for tests and for nodes that
/// wire broadcasting up through the event bus instead.
pub struct NullDispatcher;

impl NetworkDispatcher for NullDispatcher {
    fn broadcast_vote(&self, _chain: &ChainId, _vote: &VoteMessage) {}
    fn broadcast_result(&self, _chain: &ChainId, _result: &VoteResultMessage) {}
    fn request_block(&self, _chain: &ChainId, _hash: &BlockHash) {}
}

/// The consensus engine: one instance per node, one [`ChainContext`] per
/// chain. Inbound message handling runs synchronously on the caller's
/// thread; the only spawned work is the per-chain loops (reward consumer,
/// packing listener, sweeper, height monitor, slot watchdog).
pub struct ConsensusService<E>
where
    E: ConsensusEventBus,
{
    chains: RwLock<HashMap<ChainId, Arc<ChainContext>>>,
    event_bus: E,
    dispatcher: Arc<dyn NetworkDispatcher>,
    /// Present on validating nodes; observers have none and never cast the
    /// self stage-two vote.
    local_signer: Option<Arc<dyn Signer + Send + Sync>>,
    shutdown: watch::Sender<bool>,
}

pub type DefaultConsensusService = ConsensusService<BroadcastEventBus>;

impl DefaultConsensusService {
    pub fn new() -> Self {
        Self::new_with_components(Arc::new(NullDispatcher), BroadcastEventBus::default(), None)
    }
}

impl Default for DefaultConsensusService {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> ConsensusService<E>
where
    E: ConsensusEventBus,
{
    pub fn new_with_components(
        dispatcher: Arc<dyn NetworkDispatcher>,
        event_bus: E,
        local_signer: Option<Arc<dyn Signer + Send + Sync>>,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            chains: RwLock::new(HashMap::new()),
            event_bus,
            dispatcher,
            local_signer,
            shutdown,
        }
    }

    pub fn subscribe_to_events(&self) -> E::Receiver {
        self.event_bus.subscribe()
    }

    /// Stop every spawned per-chain loop. Idempotent.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Bring a chain under consensus management and start its loops.
    ///
    /// Must run inside a tokio runtime. The agent snapshot is sorted into
    /// the first round; the first packing signal goes out immediately for
    /// the height after `genesis`.
    pub fn register_chain<P, L>(
        &self,
        id: ChainId,
        config: ChainConfig,
        genesis: BlockHeader,
        agents: Vec<Agent>,
        round_started_at: u64,
        policy: P,
        ledger: L,
    ) -> Result<(), ConsensusError>
    where
        P: SettlementPolicy,
        L: RewardLedger,
    {
        config.validate()?;
        let round = Round::build(agents, round_started_at, config.block_interval_secs)?;

        let (reward_tx, reward_rx) = mpsc::unbounded_channel();
        let (packing_tx, packing_rx) = mpsc::unbounded_channel();
        let first_height = genesis.height + 1;
        let ctx = Arc::new(ChainContext::new(
            id.clone(),
            config,
            genesis,
            round,
            reward_tx,
            packing_tx,
        ));

        {
            let mut chains = self.chains.write();
            if chains.contains_key(&id) {
                return Err(ConsensusError::ChainAlreadyRegistered(id));
            }
            chains.insert(id.clone(), Arc::clone(&ctx));
        }

        let processor = RewardProcessor::new(id.clone(), policy, ledger);
        tokio::spawn(processor.run(reward_rx, self.shutdown.subscribe()));
        self.spawn_packing_listener(Arc::clone(&ctx), packing_rx);
        self.spawn_sweeper(Arc::clone(&ctx));
        self.spawn_height_monitor(Arc::clone(&ctx));
        self.spawn_slot_watchdog(Arc::clone(&ctx));

        info!(chain = %id, members = ctx.round.read().member_count(), "chain registered");
        ctx.signal_packing(first_height);
        Ok(())
    }

    /// Entry point for inbound votes, local and gossiped alike.
    ///
    /// Returns the outcome for the submitted vote itself; any follow-up
    /// work it triggers (the self stage-two vote on lock-in, replay of
    /// queued votes after finalization) is handled internally.
    pub async fn submit_vote(
        &self,
        chain: &str,
        vote: VoteMessage,
    ) -> Result<VoteOutcome, ConsensusError> {
        let ctx = self.chain(chain)?;
        validate_vote(&vote)?;
        if !ctx.round.read().contains(&vote.voter) {
            return Err(ConsensusError::UnknownVoter);
        }

        // Worklist instead of recursion: a self stage-two vote can itself
        // finalize, and finalization can make queued votes current.
        let mut work: VecDeque<(VoteMessage, bool)> = VecDeque::new();
        work.push_back((vote, false));
        let mut first: Option<VoteOutcome> = None;

        while let Some((vote, is_replay)) = work.pop_front() {
            let weight = match ctx.round.read().weight_of(&vote.voter) {
                Some(weight) => weight,
                None => {
                    // A replayed voter may have left at a round boundary.
                    debug!(chain = %ctx.id, "skipping vote from departed agent");
                    continue;
                }
            };

            let outcome = {
                let mut aggregator = ctx.aggregator.lock();
                if is_replay {
                    aggregator.resubmit(vote.clone(), weight)
                } else {
                    aggregator.submit_vote(vote.clone(), weight)
                }
            };

            match &outcome {
                VoteOutcome::StageOnePassed(hash) => {
                    info!(chain = %ctx.id, height = vote.height, "stage one locked in");
                    self.event_bus.publish(
                        ctx.id.clone(),
                        ConsensusEvent::StageOneLocked {
                            height: vote.height,
                            hash: hash.clone(),
                        },
                    );
                    match self
                        .cast_self_commit(&ctx, hash.clone(), vote.height, vote.round_index)
                        .await
                    {
                        Ok(Some(self_vote)) => {
                            self.dispatcher.broadcast_vote(&ctx.id, &self_vote);
                            work.push_back((self_vote, false));
                        }
                        Ok(None) => {}
                        Err(e) => {
                            warn!(chain = %ctx.id, error = %e, "failed to cast self stage-two vote");
                        }
                    }
                }
                VoteOutcome::Finalized(result) => {
                    self.finalize(&ctx, result);
                    let ready = ctx.aggregator.lock().take_replayable();
                    for queued in ready {
                        work.push_back((queued, true));
                    }
                }
                _ => {}
            }

            if first.is_none() {
                first = Some(outcome);
            }
        }

        Ok(first.unwrap_or(VoteOutcome::Discarded))
    }

    /// Sign this node's own stage-two commit for the locked-in hash.
    async fn cast_self_commit(
        &self,
        ctx: &ChainContext,
        hash: BlockHash,
        height: u64,
        round_index: u64,
    ) -> Result<Option<VoteMessage>, ConsensusError> {
        let Some(signer) = &self.local_signer else {
            return Ok(None);
        };
        let slot_index = {
            let round = ctx.round.read();
            round
                .slot_of(signer.address().as_slice())
                .unwrap_or_default()
        };
        let vote = create_vote(
            VoteStage::Two,
            hash,
            height,
            round_index,
            slot_index,
            signer.as_ref(),
        )
        .await?;
        Ok(Some(vote))
    }

    /// Everything that happens when stage two passes: result cache write,
    /// result broadcast, best-block update, reward enqueue, packing signal,
    /// finalization event.
    fn finalize(&self, ctx: &Arc<ChainContext>, result: &VoteResultMessage) {
        info!(
            chain = %ctx.id,
            height = result.height,
            weight = result.total_weight,
            "block finalized"
        );
        ctx.result_cache
            .lock()
            .insert(result.candidate_hash.clone(), result.clone());
        self.dispatcher.broadcast_result(&ctx.id, result);

        match ctx.candidates.take(&result.candidate_hash) {
            Some(block) => {
                let _ = ctx.reward_tx.send(block.header.clone());
                *ctx.best_block.write() = block.header;
            }
            None => {
                // Confirmed a block we never held; orphan resolution will
                // fetch it before it can become the best block.
                warn!(chain = %ctx.id, height = result.height, "finalized block not locally held");
            }
        }

        ctx.signal_packing(result.height + 1);
        self.event_bus.publish(
            ctx.id.clone(),
            ConsensusEvent::BlockFinalized {
                height: result.height,
                hash: result.candidate_hash.clone(),
            },
        );
    }

    /// Entry for blocks that already went through the basic validity
    /// verifier; only passing blocks reach the awaiting-confirmation map.
    pub fn submit_candidate(
        &self,
        chain: &str,
        block: Block,
        verdict: BasicVerdict,
    ) -> Result<(), ConsensusError> {
        let ctx = self.chain(chain)?;
        ctx.candidates.insert(block, verdict)
    }

    /// Register interest in a missing ancestor. Re-requesting an already
    /// pending hash returns the existing future; the dispatcher is asked to
    /// solicit the block either way.
    pub fn request_block(&self, chain: &str, hash: BlockHash) -> Result<BlockFuture, ConsensusError> {
        let ctx = self.chain(chain)?;
        let future = ctx.block_requests.add_request(hash.clone());
        self.dispatcher.request_block(&ctx.id, &hash);
        Ok(future)
    }

    /// A block arrived from the network; fulfill its pending request, if
    /// any. Idempotent.
    pub fn on_block_received(&self, chain: &str, hash: &[u8], block: Block) -> Result<bool, ConsensusError> {
        let ctx = self.chain(chain)?;
        Ok(ctx.block_requests.complete(hash, block))
    }

    /// Timeout path: cancel an outstanding request without fulfilling it.
    pub fn cancel_block_request(&self, chain: &str, hash: &[u8]) -> Result<bool, ConsensusError> {
        let ctx = self.chain(chain)?;
        Ok(ctx.block_requests.remove_request(hash))
    }

    pub fn current_round(&self, chain: &str) -> Result<Round, ConsensusError> {
        Ok(self.chain(chain)?.round.read().clone())
    }

    pub fn best_block(&self, chain: &str) -> Result<BlockHeader, ConsensusError> {
        Ok(self.chain(chain)?.best_block.read().clone())
    }

    /// Serve a finalized result to a late peer without recomputation.
    pub fn get_result(&self, chain: &str, hash: &[u8]) -> Result<Option<VoteResultMessage>, ConsensusError> {
        Ok(self.chain(chain)?.result_cache.lock().get(hash).cloned())
    }

    /// Round boundary: snapshot the new agent set and rotate the schedule.
    pub fn start_round(
        &self,
        chain: &str,
        agents: Vec<Agent>,
        started_at: u64,
    ) -> Result<(), ConsensusError> {
        let ctx = self.chain(chain)?;
        let round = Round::build(agents, started_at, ctx.config.block_interval_secs)?;
        let total_weight = round.total_weight();
        info!(chain = %ctx.id, members = round.member_count(), "round rotated");
        *ctx.round.write() = round;
        ctx.aggregator.lock().set_total_weight(total_weight);
        Ok(())
    }

    /// Throw away the current attempt's partial tallies, for coordinators
    /// that drive slot advancement themselves.
    pub fn abandon_attempt(&self, chain: &str) -> Result<(), ConsensusError> {
        let ctx = self.chain(chain)?;
        ctx.aggregator.lock().abandon_attempt();
        Ok(())
    }

    pub(crate) fn chain(&self, chain: &str) -> Result<Arc<ChainContext>, ConsensusError> {
        self.chains
            .read()
            .get(chain)
            .cloned()
            .ok_or_else(|| ConsensusError::UnknownChain(chain.to_string()))
    }

    fn spawn_packing_listener(
        &self,
        ctx: Arc<ChainContext>,
        mut packing_rx: mpsc::UnboundedReceiver<crate::types::PackingSignal>,
    ) {
        let event_bus = self.event_bus.clone();
        let mut shutdown = self.shutdown.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                    signal = packing_rx.recv() => {
                        let Some(signal) = signal else { break };
                        debug!(
                            chain = %ctx.id,
                            height = signal.height,
                            slot = signal.slot_index,
                            "packing slot assigned"
                        );
                        event_bus.publish(
                            ctx.id.clone(),
                            ConsensusEvent::PackingSlot {
                                height: signal.height,
                                slot_index: signal.slot_index,
                                packer: signal.packer,
                            },
                        );
                    }
                }
            }
        });
    }

    fn spawn_sweeper(&self, ctx: Arc<ChainContext>) {
        let mut shutdown = self.shutdown.subscribe();
        let period = Duration::from_secs(ctx.config.sweep_interval_secs);
        tokio::spawn(async move {
            let mut ticker = interval(period);
            loop {
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        let removed = ctx.candidates.sweep(Instant::now());
                        if removed > 0 {
                            info!(chain = %ctx.id, removed, "swept stale candidates");
                        }
                    }
                }
            }
        });
    }

    fn spawn_height_monitor(&self, ctx: Arc<ChainContext>) {
        let event_bus = self.event_bus.clone();
        let mut shutdown = self.shutdown.subscribe();
        let period = Duration::from_secs(ctx.config.height_monitor_interval_secs);
        tokio::spawn(async move {
            let mut ticker = interval(period);
            // The first tick fires immediately; use it to seed the baseline.
            ticker.tick().await;
            let mut last_height = ctx.confirmed_height();
            loop {
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        let height = ctx.confirmed_height();
                        if height == last_height {
                            warn!(
                                chain = %ctx.id,
                                height,
                                "confirmed height unchanged for a full monitor period"
                            );
                            event_bus.publish(
                                ctx.id.clone(),
                                ConsensusEvent::HeightStalled { height },
                            );
                        }
                        last_height = height;
                    }
                }
            }
        });
    }

    /// Advances the packing slot when stage one fails to pass within the
    /// slot time; the abandoned attempt's tallies are not carried forward.
    fn spawn_slot_watchdog(&self, ctx: Arc<ChainContext>) {
        let event_bus = self.event_bus.clone();
        let mut shutdown = self.shutdown.subscribe();
        let period = Duration::from_secs(ctx.config.block_interval_secs);
        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.tick().await;
            let mut last_height = ctx.confirmed_height();
            loop {
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        let height = ctx.confirmed_height();
                        if height != last_height {
                            last_height = height;
                            continue;
                        }
                        ctx.aggregator.lock().abandon_attempt();
                        let round = ctx.round.read();
                        let next_slot = (ctx.current_slot.load(std::sync::atomic::Ordering::SeqCst) + 1)
                            % round.member_count() as u32;
                        ctx.current_slot.store(next_slot, std::sync::atomic::Ordering::SeqCst);
                        if let Some(packer) = round.packer_at(next_slot) {
                            debug!(chain = %ctx.id, slot = next_slot, "slot timed out, advancing packer");
                            event_bus.publish(
                                ctx.id.clone(),
                                ConsensusEvent::PackingSlot {
                                    height: height + 1,
                                    slot_index: next_slot,
                                    packer: packer.address.clone(),
                                },
                            );
                        }
                    }
                }
            }
        });
    }
}
