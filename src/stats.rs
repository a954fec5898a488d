use crate::{
    error::ConsensusError,
    events::ConsensusEventBus,
    service::ConsensusService,
};

/// Read-only counters about one chain's consensus state.
#[derive(Debug, Clone)]
pub struct ChainStats {
    /// Height whose two-stage vote has completed.
    pub confirmed_height: u64,
    /// Members of the current round snapshot.
    pub round_members: usize,
    /// Votes buffered for heights above the current one.
    pub queued_votes: usize,
    /// Blocks awaiting their two-stage confirmation.
    pub pending_candidates: usize,
    /// Outstanding orphan-block requests.
    pub pending_requests: usize,
    /// Finalized results retained for re-delivery.
    pub cached_results: usize,
}

impl<E> ConsensusService<E>
where
    E: ConsensusEventBus,
{
    /// Snapshot counters for monitoring and dashboards. Never exposes
    /// internal tallies or candidate contents.
    pub fn chain_stats(&self, chain: &str) -> Result<ChainStats, ConsensusError> {
        let ctx = self.chain(chain)?;
        let (confirmed_height, queued_votes) = {
            let aggregator = ctx.aggregator.lock();
            (
                aggregator.current_height().saturating_sub(1),
                aggregator.queued_votes(),
            )
        };
        Ok(ChainStats {
            confirmed_height,
            round_members: ctx.round.read().member_count(),
            queued_votes,
            pending_candidates: ctx.candidates.len(),
            pending_requests: ctx.block_requests.pending_count(),
            cached_results: ctx.result_cache.lock().len(),
        })
    }
}
