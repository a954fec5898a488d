use std::collections::{HashMap, HashSet, VecDeque};
use tracing::debug;

use crate::{
    dedup::DuplicateFilter,
    types::{AgentAddress, BlockHash, VoteMessage, VoteResultMessage, VoteStage},
    utils::{evidence_digest, passing_weight, vote_fingerprint},
};

/// What the aggregator did with one submitted vote.
///
/// Mirrors the state transitions of the two-stage machine; the caller turns
/// these into side effects (broadcasting the self stage-two vote on lock-in,
/// caching and signalling on finalization).
#[derive(Debug, Clone)]
pub enum VoteOutcome {
    /// Fingerprint already seen, or this voter already counted for the tally.
    Duplicate,
    /// Height below the current attempt; dropped.
    Stale,
    /// Height above the current attempt; buffered for replay.
    Queued,
    /// Ignorable by design: wrong stage for the phase, or a hash other than
    /// the locked-in candidate.
    Discarded,
    /// Weight added, threshold not reached yet.
    Counted,
    /// Stage one locked in this hash; the node must now cast its own
    /// stage-two vote for it.
    StageOnePassed(BlockHash),
    /// Stage two passed; the block is confirmed.
    Finalized(VoteResultMessage),
}

/// Per (round, height, hash, stage) accumulator of distinct-voter weight.
#[derive(Debug, Default)]
struct VoteTally {
    voters: HashSet<AgentAddress>,
    weight: u128,
    votes: Vec<VoteMessage>,
}

impl VoteTally {
    /// Returns false when this voter was already counted.
    fn record(&mut self, vote: VoteMessage, weight: u128) -> bool {
        if !self.voters.insert(vote.voter.clone()) {
            return false;
        }
        self.weight += weight;
        self.votes.push(vote);
        true
    }
}

/// Phase of the current height's attempt. Finalization is represented by
/// the height advancing and the phase resetting to stage-one collection.
#[derive(Debug, Clone, PartialEq, Eq)]
enum AttemptPhase {
    StageOneCollecting,
    /// Lock-in round and hash; stage two counts only votes matching both.
    StageTwoCollecting(u64, BlockHash),
}

/// The two-stage voting state machine for one chain.
///
/// Stage one collects pre-votes per candidate hash; the first hash whose
/// distinct-voter weight passes the threshold is locked in for the attempt.
/// Stage two then counts commits for that hash only. Everything here is
/// synchronous and non-blocking; it runs directly on the caller's thread.
#[derive(Debug)]
pub struct VoteAggregator {
    /// Height currently being voted on. Heights below are confirmed.
    current_height: u64,
    /// Total active weight of the round snapshot, set at round boundaries.
    total_weight: u128,
    phase: AttemptPhase,
    /// Stage-one tallies keyed by (round, hash); rounds never merge.
    stage_one: HashMap<(u64, BlockHash), VoteTally>,
    stage_two: VoteTally,
    dedup: DuplicateFilter,
    /// Votes for heights we have not reached yet, oldest dropped first.
    future_votes: VecDeque<VoteMessage>,
    future_capacity: usize,
}

impl VoteAggregator {
    pub const DEFAULT_FUTURE_CAPACITY: usize = 256;

    pub fn new(start_height: u64, total_weight: u128) -> Self {
        Self::with_capacities(
            start_height,
            total_weight,
            DuplicateFilter::DEFAULT_CAPACITY,
            Self::DEFAULT_FUTURE_CAPACITY,
        )
    }

    pub fn with_capacities(
        start_height: u64,
        total_weight: u128,
        dedup_capacity: usize,
        future_capacity: usize,
    ) -> Self {
        Self {
            current_height: start_height,
            total_weight,
            phase: AttemptPhase::StageOneCollecting,
            stage_one: HashMap::new(),
            stage_two: VoteTally::default(),
            dedup: DuplicateFilter::with_capacity(dedup_capacity),
            future_votes: VecDeque::new(),
            future_capacity: future_capacity.max(1),
        }
    }

    pub fn current_height(&self) -> u64 {
        self.current_height
    }

    /// The stage-one locked-in candidate, if the attempt has one.
    pub fn locked_candidate(&self) -> Option<&BlockHash> {
        match &self.phase {
            AttemptPhase::StageTwoCollecting(_, hash) => Some(hash),
            AttemptPhase::StageOneCollecting => None,
        }
    }

    pub fn queued_votes(&self) -> usize {
        self.future_votes.len()
    }

    /// New round snapshot, new total weight. Thresholds of the in-flight
    /// attempt adjust immediately.
    pub fn set_total_weight(&mut self, total_weight: u128) {
        self.total_weight = total_weight;
    }

    /// Slot timeout: throw the current attempt away wholesale. Partial
    /// tallies are not carried forward since the next packer may propose a
    /// different hash.
    pub fn abandon_attempt(&mut self) {
        debug!(
            height = self.current_height,
            "abandoning vote attempt, tallies discarded"
        );
        self.phase = AttemptPhase::StageOneCollecting;
        self.stage_one.clear();
        self.stage_two = VoteTally::default();
    }

    pub fn submit_vote(&mut self, vote: VoteMessage, voter_weight: u128) -> VoteOutcome {
        self.ingest(vote, voter_weight, true)
    }

    /// Replay path for votes drained from the future-queue; they passed the
    /// duplicate filter when they were first queued.
    pub(crate) fn resubmit(&mut self, vote: VoteMessage, voter_weight: u128) -> VoteOutcome {
        self.ingest(vote, voter_weight, false)
    }

    /// Drain queued votes that have become current. Entries still in the
    /// future stay queued; entries the height skipped past are dropped.
    pub fn take_replayable(&mut self) -> Vec<VoteMessage> {
        let current = self.current_height;
        let mut ready = Vec::new();
        self.future_votes.retain(|vote| {
            if vote.height == current {
                ready.push(vote.clone());
                false
            } else {
                vote.height > current
            }
        });
        ready
    }

    fn ingest(&mut self, vote: VoteMessage, voter_weight: u128, check_dedup: bool) -> VoteOutcome {
        if check_dedup && !self.dedup.insert_and_check(&vote_fingerprint(&vote)) {
            return VoteOutcome::Duplicate;
        }

        if vote.height < self.current_height {
            debug!(
                height = vote.height,
                current = self.current_height,
                "dropping stale vote"
            );
            return VoteOutcome::Stale;
        }
        if vote.height > self.current_height {
            return self.queue_future_vote(vote);
        }

        match self.phase.clone() {
            AttemptPhase::StageOneCollecting => match vote.stage {
                VoteStage::One => self.tally_stage_one(vote, voter_weight),
                // Stage two is meaningful only after this node's own
                // stage-one lock-in.
                VoteStage::Two => {
                    debug!(height = vote.height, "stage-two vote before lock-in");
                    VoteOutcome::Discarded
                }
            },
            AttemptPhase::StageTwoCollecting(round, locked) => match vote.stage {
                VoteStage::One => {
                    // First hash to pass is canonical for the attempt.
                    debug!(height = vote.height, "stage-one vote after lock-in");
                    VoteOutcome::Discarded
                }
                VoteStage::Two => self.tally_stage_two(vote, voter_weight, round, locked),
            },
        }
    }

    fn queue_future_vote(&mut self, vote: VoteMessage) -> VoteOutcome {
        if self.future_votes.len() == self.future_capacity
            && let Some(oldest) = self.future_votes.pop_front()
        {
            // Safe to drop: the gossip layer above re-solicits votes. The
            // dropped vote's fingerprint must be forgotten too, or the
            // re-solicited copy would bounce off the duplicate filter.
            self.dedup.remove(&vote_fingerprint(&oldest));
            debug!("future-vote queue full, dropped oldest entry");
        }
        self.future_votes.push_back(vote);
        VoteOutcome::Queued
    }

    fn tally_stage_one(&mut self, vote: VoteMessage, voter_weight: u128) -> VoteOutcome {
        let round_index = vote.round_index;
        let hash = vote.candidate_hash.clone();
        let tally = self
            .stage_one
            .entry((round_index, hash.clone()))
            .or_default();
        if !tally.record(vote, voter_weight) {
            return VoteOutcome::Duplicate;
        }

        if tally.weight >= passing_weight(self.total_weight) {
            self.phase = AttemptPhase::StageTwoCollecting(round_index, hash.clone());
            self.stage_one.clear();
            self.stage_two = VoteTally::default();
            debug!(height = self.current_height, hash = ?hash, "stage one passed");
            return VoteOutcome::StageOnePassed(hash);
        }
        VoteOutcome::Counted
    }

    fn tally_stage_two(
        &mut self,
        vote: VoteMessage,
        voter_weight: u128,
        round_index: u64,
        locked: BlockHash,
    ) -> VoteOutcome {
        if vote.candidate_hash != locked || vote.round_index != round_index {
            debug!(height = vote.height, "stage-two vote outside the lock-in");
            return VoteOutcome::Discarded;
        }
        if !self.stage_two.record(vote, voter_weight) {
            return VoteOutcome::Duplicate;
        }

        if self.stage_two.weight < passing_weight(self.total_weight) {
            return VoteOutcome::Counted;
        }

        let tally = std::mem::take(&mut self.stage_two);
        let result = VoteResultMessage {
            candidate_hash: locked,
            height: self.current_height,
            round_index,
            total_weight: tally.weight,
            evidence_digest: evidence_digest(&tally.votes),
            evidence: tally.votes,
        };

        self.current_height += 1;
        self.phase = AttemptPhase::StageOneCollecting;
        self.stage_one.clear();
        VoteOutcome::Finalized(result)
    }

    #[cfg(test)]
    fn stage_one_weight(&self, round_index: u64, hash: &[u8]) -> u128 {
        self.stage_one
            .get(&(round_index, hash.to_vec()))
            .map(|t| t.weight)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::compute_vote_hash;

    fn vote(voter: u8, stage: VoteStage, hash: u8, height: u64) -> VoteMessage {
        vote_in_round(voter, stage, hash, height, 1)
    }

    fn vote_in_round(
        voter: u8,
        stage: VoteStage,
        hash: u8,
        height: u64,
        round_index: u64,
    ) -> VoteMessage {
        let mut vote = VoteMessage {
            voter: vec![voter],
            round_index,
            slot_index: 0,
            stage,
            candidate_hash: vec![hash],
            height,
            timestamp: voter as u64,
            vote_hash: Vec::new(),
            signature: vec![voter, stage.as_u8(), round_index as u8],
        };
        vote.vote_hash = compute_vote_hash(&vote);
        vote
    }

    #[test]
    fn lock_in_then_finalize() {
        // 4 agents of weight 1 each: passing_weight(4) = 3.
        let mut agg = VoteAggregator::new(10, 4);

        assert!(matches!(
            agg.submit_vote(vote(1, VoteStage::One, 7, 10), 1),
            VoteOutcome::Counted
        ));
        assert!(matches!(
            agg.submit_vote(vote(2, VoteStage::One, 7, 10), 1),
            VoteOutcome::Counted
        ));
        let outcome = agg.submit_vote(vote(3, VoteStage::One, 7, 10), 1);
        match outcome {
            VoteOutcome::StageOnePassed(hash) => assert_eq!(hash, vec![7]),
            other => panic!("expected lock-in, got {other:?}"),
        }
        assert_eq!(agg.locked_candidate(), Some(&vec![7]));

        agg.submit_vote(vote(1, VoteStage::Two, 7, 10), 1);
        agg.submit_vote(vote(2, VoteStage::Two, 7, 10), 1);
        let outcome = agg.submit_vote(vote(3, VoteStage::Two, 7, 10), 1);
        match outcome {
            VoteOutcome::Finalized(result) => {
                assert_eq!(result.candidate_hash, vec![7]);
                assert_eq!(result.height, 10);
                assert_eq!(result.total_weight, 3);
                assert_eq!(result.evidence.len(), 3);
            }
            other => panic!("expected finalization, got {other:?}"),
        }
        assert_eq!(agg.current_height(), 11);
        assert_eq!(agg.locked_candidate(), None);
    }

    #[test]
    fn duplicate_voter_counts_once() {
        let mut agg = VoteAggregator::new(0, 3);
        assert!(matches!(
            agg.submit_vote(vote(1, VoteStage::One, 5, 0), 1),
            VoteOutcome::Counted
        ));
        // Same logical vote: caught by the fingerprint filter.
        assert!(matches!(
            agg.submit_vote(vote(1, VoteStage::One, 5, 0), 1),
            VoteOutcome::Duplicate
        ));
        // Differently-signed vote from the same voter: caught by the tally.
        let mut resigned = vote(1, VoteStage::One, 5, 0);
        resigned.signature = vec![0xEE];
        assert!(matches!(
            agg.submit_vote(resigned, 1),
            VoteOutcome::Duplicate
        ));
        assert_eq!(agg.stage_one_weight(1, &[5]), 1);
    }

    #[test]
    fn alternate_hash_after_lock_in_is_discarded() {
        let mut agg = VoteAggregator::new(0, 3);
        agg.submit_vote(vote(1, VoteStage::One, 7, 0), 1);
        agg.submit_vote(vote(2, VoteStage::One, 7, 0), 1);
        assert!(matches!(
            agg.submit_vote(vote(3, VoteStage::One, 7, 0), 1),
            VoteOutcome::StageOnePassed(_)
        ));

        assert!(matches!(
            agg.submit_vote(vote(4, VoteStage::One, 8, 0), 1),
            VoteOutcome::Discarded
        ));
        assert!(matches!(
            agg.submit_vote(vote(4, VoteStage::Two, 8, 0), 1),
            VoteOutcome::Discarded
        ));
        assert_eq!(agg.locked_candidate(), Some(&vec![7]));
    }

    #[test]
    fn stale_and_future_votes() {
        let mut agg = VoteAggregator::new(5, 3);
        assert!(matches!(
            agg.submit_vote(vote(1, VoteStage::One, 1, 4), 1),
            VoteOutcome::Stale
        ));
        assert!(matches!(
            agg.submit_vote(vote(1, VoteStage::One, 1, 6), 1),
            VoteOutcome::Queued
        ));
        assert_eq!(agg.queued_votes(), 1);
        // Nothing replayable until the height advances.
        assert!(agg.take_replayable().is_empty());
        assert_eq!(agg.queued_votes(), 1);
    }

    #[test]
    fn future_queue_drops_oldest_on_overflow() {
        let mut agg = VoteAggregator::with_capacities(0, 3, 512, 2);
        agg.submit_vote(vote(1, VoteStage::One, 1, 5), 1);
        agg.submit_vote(vote(2, VoteStage::One, 1, 5), 1);
        agg.submit_vote(vote(3, VoteStage::One, 1, 5), 1);
        assert_eq!(agg.queued_votes(), 2);
    }

    #[test]
    fn dropped_future_vote_can_be_resolicited() {
        let mut agg = VoteAggregator::with_capacities(0, 3, 512, 1);
        let first = vote(1, VoteStage::One, 1, 2);
        assert!(matches!(
            agg.submit_vote(first.clone(), 1),
            VoteOutcome::Queued
        ));
        // Evicts the first vote from the full queue.
        assert!(matches!(
            agg.submit_vote(vote(2, VoteStage::One, 1, 2), 1),
            VoteOutcome::Queued
        ));
        // The gossip layer re-solicits the dropped vote; its fingerprint
        // must not linger in the duplicate filter.
        assert!(matches!(agg.submit_vote(first, 1), VoteOutcome::Queued));
        assert_eq!(agg.queued_votes(), 1);
    }

    #[test]
    fn round_index_is_part_of_the_tally_key() {
        let mut agg = VoteAggregator::new(0, 3);
        agg.submit_vote(vote_in_round(1, VoteStage::One, 7, 0, 1), 1);
        agg.submit_vote(vote_in_round(2, VoteStage::One, 7, 0, 1), 1);
        // Same hash, different round: counts toward its own tally, never
        // tips the round-1 one.
        assert!(matches!(
            agg.submit_vote(vote_in_round(3, VoteStage::One, 7, 0, 2), 1),
            VoteOutcome::Counted
        ));
        assert_eq!(agg.locked_candidate(), None);
        assert_eq!(agg.stage_one_weight(1, &[7]), 2);
        assert_eq!(agg.stage_one_weight(2, &[7]), 1);

        assert!(matches!(
            agg.submit_vote(vote_in_round(3, VoteStage::One, 7, 0, 1), 1),
            VoteOutcome::StageOnePassed(_)
        ));
    }

    #[test]
    fn stage_two_requires_the_lock_in_round() {
        let mut agg = VoteAggregator::new(0, 3);
        for voter in 1..=3u8 {
            agg.submit_vote(vote_in_round(voter, VoteStage::One, 7, 0, 2), 1);
        }
        assert_eq!(agg.locked_candidate(), Some(&vec![7]));

        // Right hash, wrong round.
        assert!(matches!(
            agg.submit_vote(vote_in_round(1, VoteStage::Two, 7, 0, 3), 1),
            VoteOutcome::Discarded
        ));

        for voter in 1..=2u8 {
            agg.submit_vote(vote_in_round(voter, VoteStage::Two, 7, 0, 2), 1);
        }
        let outcome = agg.submit_vote(vote_in_round(3, VoteStage::Two, 7, 0, 2), 1);
        let VoteOutcome::Finalized(result) = outcome else {
            panic!("expected finalization, got {outcome:?}");
        };
        // Attribution follows the lock-in round, not any later vote.
        assert_eq!(result.round_index, 2);
        assert_eq!(result.evidence.len(), 3);
    }

    #[test]
    fn abandon_attempt_discards_tallies() {
        let mut agg = VoteAggregator::new(0, 3);
        agg.submit_vote(vote(1, VoteStage::One, 7, 0), 1);
        agg.submit_vote(vote(2, VoteStage::One, 7, 0), 1);
        agg.submit_vote(vote(3, VoteStage::One, 7, 0), 1);
        agg.submit_vote(vote(1, VoteStage::Two, 7, 0), 1);
        agg.abandon_attempt();
        assert_eq!(agg.locked_candidate(), None);

        // A fresh attempt at the same height can lock a different hash, but
        // replayed signatures from the old attempt are still fingerprinted.
        assert!(matches!(
            agg.submit_vote(vote(1, VoteStage::One, 7, 0), 1),
            VoteOutcome::Duplicate
        ));
        let mut fresh = vote(1, VoteStage::One, 9, 0);
        fresh.signature = vec![0xBB];
        assert!(matches!(agg.submit_vote(fresh, 1), VoteOutcome::Counted));
    }

    #[test]
    fn thirteen_equal_agents_pass_on_ninth_vote() {
        let mut agg = VoteAggregator::new(0, 13);
        for voter in 1..=8u8 {
            assert!(matches!(
                agg.submit_vote(vote(voter, VoteStage::One, 1, 0), 1),
                VoteOutcome::Counted
            ));
        }
        assert!(matches!(
            agg.submit_vote(vote(9, VoteStage::One, 1, 0), 1),
            VoteOutcome::StageOnePassed(_)
        ));
    }
}
