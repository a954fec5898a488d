use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info};

use crate::{
    error::ConsensusError,
    types::{BlockHeader, ChainId},
};

/// Decides whether a finalized header crosses a settlement boundary. The
/// formula behind the boundary is reward economics, parameterized from
/// outside this crate.
pub trait SettlementPolicy: Send + Sync + 'static {
    fn is_settlement_boundary(&self, header: &BlockHeader) -> bool;
}

/// Settle once every fixed number of heights.
#[derive(Debug, Clone, Copy)]
pub struct IntervalSettlement {
    every: u64,
}

impl IntervalSettlement {
    pub fn new(every: u64) -> Self {
        Self { every: every.max(1) }
    }
}

impl SettlementPolicy for IntervalSettlement {
    fn is_settlement_boundary(&self, header: &BlockHeader) -> bool {
        header.height % self.every == 0
    }
}

/// Ledger collaborator that computes and persists a settlement.
pub trait RewardLedger: Send + Sync + 'static {
    fn settle(&self, chain: &ChainId, header: &BlockHeader) -> Result<(), ConsensusError>;
}

/// Single consumer of one chain's finalized headers, decoupled from the
/// voting hot path by a queue.
///
/// The loop's only suspension point is the queue read. A failing settlement
/// is logged and skipped; the loop itself must never die, since nothing
/// restarts it.
pub struct RewardProcessor<P, L>
where
    P: SettlementPolicy,
    L: RewardLedger,
{
    chain: ChainId,
    policy: P,
    ledger: L,
}

impl<P, L> RewardProcessor<P, L>
where
    P: SettlementPolicy,
    L: RewardLedger,
{
    pub fn new(chain: ChainId, policy: P, ledger: L) -> Self {
        Self {
            chain,
            policy,
            ledger,
        }
    }

    pub async fn run(
        self,
        mut headers: mpsc::UnboundedReceiver<BlockHeader>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!(chain = %self.chain, "reward processor started");
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                header = headers.recv() => {
                    match header {
                        Some(header) => self.process(header),
                        None => break,
                    }
                }
            }
        }
        info!(chain = %self.chain, "reward processor stopped");
    }

    fn process(&self, header: BlockHeader) {
        if !self.policy.is_settlement_boundary(&header) {
            debug!(
                chain = %self.chain,
                height = header.height,
                "no settlement boundary at this height"
            );
            return;
        }
        if let Err(e) = self.ledger.settle(&self.chain, &header) {
            error!(
                chain = %self.chain,
                height = header.height,
                error = %e,
                "reward settlement failed, skipping header"
            );
        }
    }
}
