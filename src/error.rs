#[derive(Debug, thiserror::Error)]
pub enum ConsensusError {
    #[error("Mismatched length: expected {expect}, actual {actual}")]
    MismatchedLength { expect: usize, actual: usize },
    #[error("Invalid vote signature")]
    InvalidVoteSignature,
    #[error("Duplicate vote")]
    DuplicateVote,
    #[error("Empty voter address")]
    EmptyVoter,
    #[error("Empty candidate hash")]
    EmptyCandidateHash,
    #[error("Invalid vote hash")]
    InvalidVoteHash,
    #[error("Invalid vote timestamp")]
    InvalidVoteTimestamp,
    #[error("Vote height {height} below confirmed height {confirmed}")]
    StaleVote { height: u64, confirmed: u64 },
    #[error("Voter is not a member of the current round")]
    UnknownVoter,

    #[error("Unknown chain: {0}")]
    UnknownChain(String),
    #[error("Chain already registered: {0}")]
    ChainAlreadyRegistered(String),
    #[error("Round has no members")]
    EmptyRound,

    #[error("Block failed basic validity: {0}")]
    InvalidBlock(String),
    #[error("Block header hash does not match the submitted block")]
    HeaderHashMismatch,

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Empty signature")]
    EmptySignature,
    #[error("Invalid signature: {0}")]
    InvalidSignature(String),
    #[error("Failed to sign message: {0}")]
    FailedToSignMessage(#[from] alloy_signer::Error),
    #[error("No local signer configured for this node")]
    NoLocalSigner,

    #[error("Failed to get current time")]
    FailedToGetCurrentTime(#[from] std::time::SystemTimeError),
}
