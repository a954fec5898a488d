use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::{
    error::ConsensusError,
    types::{Block, BlockHash, BlockHeader},
};

/// Verdict from the external block validity verifier. Basic validation
/// (structure, signatures, parent linkage) happens outside this crate; only
/// blocks that passed may enter the awaiting-confirmation map.
#[derive(Debug, Clone)]
pub enum BasicVerdict {
    Passed(BlockHeader),
    Failed(String),
}

/// External collaborator performing basic block validation.
pub trait BlockVerifier: Send + Sync + 'static {
    fn basic_verify(&self, block: &Block) -> BasicVerdict;
}

struct PendingCandidate {
    block: Block,
    arrived: Instant,
}

/// Per-chain map of basic-validity-passed blocks awaiting their two-stage
/// confirmation, keyed by hash.
///
/// Synchronization lives at the map, not at the sweeper: a sweep and an
/// in-flight insert serialize on the same lock, so a sweep can never corrupt
/// a concurrent write.
pub struct CandidateStore {
    entries: Mutex<HashMap<BlockHash, PendingCandidate>>,
    /// Sweeping only kicks in above this size, to avoid lock contention
    /// under normal load.
    sweep_threshold: usize,
    max_age: Duration,
}

impl CandidateStore {
    pub const DEFAULT_SWEEP_THRESHOLD: usize = 200;
    pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(120);

    pub fn new(sweep_threshold: usize, max_age: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            sweep_threshold,
            max_age,
        }
    }

    /// Admit a verifier-passed block. The verdict header must describe the
    /// block being submitted.
    pub fn insert(&self, block: Block, verdict: BasicVerdict) -> Result<(), ConsensusError> {
        let header = match verdict {
            BasicVerdict::Passed(header) => header,
            BasicVerdict::Failed(reason) => return Err(ConsensusError::InvalidBlock(reason)),
        };
        if header.hash != block.header.hash {
            return Err(ConsensusError::HeaderHashMismatch);
        }
        self.insert_arrived(block, Instant::now());
        Ok(())
    }

    pub(crate) fn insert_arrived(&self, block: Block, arrived: Instant) {
        let hash = block.header.hash.clone();
        self.entries
            .lock()
            .insert(hash, PendingCandidate { block, arrived });
    }

    /// Remove and return a candidate, used when its confirmation finalizes.
    pub fn take(&self, hash: &[u8]) -> Option<Block> {
        self.entries.lock().remove(hash).map(|c| c.block)
    }

    pub fn get(&self, hash: &[u8]) -> Option<Block> {
        self.entries.lock().get(hash).map(|c| c.block.clone())
    }

    pub fn contains(&self, hash: &[u8]) -> bool {
        self.entries.lock().contains_key(hash)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// One sweeper pass: when the map has grown past the size trigger,
    /// drop every entry older than the age limit; below the trigger the
    /// sweep does nothing at all. Returns the number of removed entries.
    pub fn sweep(&self, now: Instant) -> usize {
        let mut entries = self.entries.lock();
        if entries.len() <= self.sweep_threshold {
            return 0;
        }
        let before = entries.len();
        entries.retain(|hash, candidate| {
            let stale = now.saturating_duration_since(candidate.arrived) > self.max_age;
            if stale {
                debug!(hash = ?hash, "dropping stale awaiting-confirmation candidate");
            }
            !stale
        });
        before - entries.len()
    }
}

impl Default for CandidateStore {
    fn default() -> Self {
        Self::new(Self::DEFAULT_SWEEP_THRESHOLD, Self::DEFAULT_MAX_AGE)
    }
}
