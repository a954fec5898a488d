use tokio::sync::broadcast;

use crate::types::{AgentAddress, BlockHash, ChainId};

#[derive(Debug, Clone)]
pub enum ConsensusEvent {
    /// Stage one locked in a candidate; stage two is collecting for it.
    StageOneLocked { height: u64, hash: BlockHash },
    /// The block finished its two-stage vote sequence and is canonical.
    BlockFinalized { height: u64, hash: BlockHash },
    /// It is this agent's turn to pack a block. The embedding node's block
    /// producer listens for these.
    PackingSlot {
        height: u64,
        slot_index: u32,
        packer: AgentAddress,
    },
    /// The confirmed height has not moved for a full monitor period.
    /// Operator attention required; nothing restarts automatically.
    HeightStalled { height: u64 },
}

pub trait ConsensusEventBus: Clone + Send + Sync + 'static {
    /// Type returned to consumers that subscribe to consensus events.
    type Receiver;

    fn subscribe(&self) -> Self::Receiver;
    fn publish(&self, chain: ChainId, event: ConsensusEvent);
}

#[derive(Clone)]
pub struct BroadcastEventBus {
    sender: broadcast::Sender<(ChainId, ConsensusEvent)>,
}

impl BroadcastEventBus {
    pub fn new(buffer: usize) -> Self {
        let (sender, _) = broadcast::channel(buffer);
        Self { sender }
    }
}

impl Default for BroadcastEventBus {
    fn default() -> Self {
        Self::new(1000)
    }
}

impl ConsensusEventBus for BroadcastEventBus {
    type Receiver = broadcast::Receiver<(ChainId, ConsensusEvent)>;

    fn subscribe(&self) -> Self::Receiver {
        self.sender.subscribe()
    }

    fn publish(&self, chain: ChainId, event: ConsensusEvent) {
        let _ = self.sender.send((chain, event));
    }
}
