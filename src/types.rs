/// Identifies one chain managed by the consensus service. Every piece of
/// mutable consensus state is partitioned by this key.
pub type ChainId = String;

/// Raw block hash bytes, as produced by the external block verifier.
pub type BlockHash = Vec<u8>;

/// An agent's identity: its address / public key bytes.
pub type AgentAddress = Vec<u8>;

/// Which of the two sequential weighted-majority votes a message belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VoteStage {
    /// Pre-vote: agents vote for the candidate they saw first.
    One,
    /// Commit: agents vote only for the hash locked in by stage one.
    Two,
}

impl VoteStage {
    pub fn as_u8(self) -> u8 {
        match self {
            VoteStage::One => 1,
            VoteStage::Two => 2,
        }
    }
}

/// A single weighted vote from one agent for one candidate block.
///
/// Consumed immediately by the aggregator; the transport delivers these
/// already deserialized and this crate never re-encodes them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteMessage {
    pub voter: AgentAddress,
    pub round_index: u64,
    pub slot_index: u32,
    pub stage: VoteStage,
    pub candidate_hash: BlockHash,
    pub height: u64,
    pub timestamp: u64,
    /// Hash over all fields above, signed by the voter.
    pub vote_hash: Vec<u8>,
    pub signature: Vec<u8>,
}

/// The finalized aggregate for a confirmed block: the full stage-two
/// evidence set plus a digest over it. Cached so late re-deliveries can be
/// answered without recomputation. Producing an aggregate signature over the
/// digest belongs to the external signature library.
#[derive(Debug, Clone)]
pub struct VoteResultMessage {
    pub candidate_hash: BlockHash,
    pub height: u64,
    pub round_index: u64,
    /// Sum of distinct-voter weight behind the stage-two tally.
    pub total_weight: u128,
    pub evidence: Vec<VoteMessage>,
    pub evidence_digest: Vec<u8>,
}

/// Parsed block header as returned by the external block verifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockHeader {
    pub hash: BlockHash,
    pub parent_hash: BlockHash,
    pub height: u64,
    pub producer: AgentAddress,
    pub timestamp: u64,
}

/// A block with an opaque body. Body validation and execution are the
/// verifier's and ledger's business, never this crate's.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub header: BlockHeader,
    pub body: Vec<u8>,
}

/// Emitted once per confirmed height: the next eligible packer's turn.
#[derive(Debug, Clone)]
pub struct PackingSignal {
    pub height: u64,
    pub slot_index: u32,
    pub packer: AgentAddress,
}
