use alloy_signer::{Signature, Signer};
use sha2::{Digest, Sha256};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::{
    error::ConsensusError,
    types::{BlockHash, VoteMessage, VoteStage},
};

/// Votes older than this are rejected outright (replay protection).
const MAX_VOTE_AGE_SECONDS: u64 = 3600;

pub fn current_timestamp() -> Result<u64, ConsensusError> {
    Ok(SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs())
}

/// Smallest weight T with T > 2·total/3.
///
/// The strict inequality guarantees quorum intersection: two disjoint voter
/// subsets drawn from the same total cannot both reach T, so two conflicting
/// candidates can never both pass a stage.
pub fn passing_weight(total: u128) -> u128 {
    total * 2 / 3 + 1
}

pub fn compute_vote_hash(vote: &VoteMessage) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(&vote.voter);
    hasher.update(vote.round_index.to_le_bytes());
    hasher.update(vote.slot_index.to_le_bytes());
    hasher.update([vote.stage.as_u8()]);
    hasher.update(&vote.candidate_hash);
    hasher.update(vote.height.to_le_bytes());
    hasher.update(vote.timestamp.to_le_bytes());
    hasher.finalize().to_vec()
}

/// Fingerprint used by the duplicate filter. Includes the signature so a
/// re-signed replay of the same logical vote still collapses to one tally
/// entry downstream (tallies dedup by voter).
pub fn vote_fingerprint(vote: &VoteMessage) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(&vote.vote_hash);
    hasher.update(&vote.signature);
    hasher.finalize().to_vec()
}

/// Digest over an ordered stage-two evidence set. The external signature
/// library signs this to produce the aggregate signature for the result.
pub fn evidence_digest(evidence: &[VoteMessage]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    for vote in evidence {
        hasher.update(&vote.vote_hash);
        hasher.update(&vote.signature);
    }
    hasher.finalize().to_vec()
}

/// Build and sign a vote for a candidate block.
pub async fn create_vote<S: Signer + Sync + ?Sized>(
    stage: VoteStage,
    candidate_hash: BlockHash,
    height: u64,
    round_index: u64,
    slot_index: u32,
    signer: &S,
) -> Result<VoteMessage, ConsensusError> {
    let now = current_timestamp()?;

    let mut vote = VoteMessage {
        voter: signer.address().as_slice().to_vec(),
        round_index,
        slot_index,
        stage,
        candidate_hash,
        height,
        timestamp: now,
        vote_hash: Vec::new(),
        signature: Vec::new(),
    };

    vote.vote_hash = compute_vote_hash(&vote);
    let signature = signer.sign_message(&vote.vote_hash).await?;
    vote.signature = signature.as_bytes().to_vec();
    Ok(vote)
}

pub fn verify_vote_signature(
    signature: &[u8],
    voter: &[u8],
    message: &[u8],
) -> Result<bool, ConsensusError> {
    let signature_bytes: [u8; 65] =
        signature
            .try_into()
            .map_err(|_| ConsensusError::MismatchedLength {
                expect: 65,
                actual: signature.len(),
            })?;
    let signature = Signature::from_raw_array(&signature_bytes)
        .map_err(|e| ConsensusError::InvalidSignature(e.to_string()))?;
    let address = signature
        .recover_address_from_msg(message)
        .map_err(|e| ConsensusError::InvalidSignature(e.to_string()))?;
    Ok(address.as_slice() == voter)
}

/// Full structural + cryptographic validation of an inbound vote.
///
/// Everything here is pure computation over the decoded message; transport
/// framing and peer scoring happened before this point.
pub fn validate_vote(vote: &VoteMessage) -> Result<(), ConsensusError> {
    if vote.voter.is_empty() {
        return Err(ConsensusError::EmptyVoter);
    }
    if vote.candidate_hash.is_empty() {
        return Err(ConsensusError::EmptyCandidateHash);
    }
    if vote.signature.is_empty() {
        return Err(ConsensusError::EmptySignature);
    }

    let expected_hash = compute_vote_hash(vote);
    if vote.vote_hash != expected_hash {
        return Err(ConsensusError::InvalidVoteHash);
    }

    if !verify_vote_signature(&vote.signature, &vote.voter, &vote.vote_hash)? {
        return Err(ConsensusError::InvalidVoteSignature);
    }

    let now = current_timestamp()?;
    if vote.timestamp > now {
        return Err(ConsensusError::InvalidVoteTimestamp);
    }
    if now.saturating_sub(vote.timestamp) > MAX_VOTE_AGE_SECONDS {
        return Err(ConsensusError::InvalidVoteTimestamp);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::passing_weight;

    #[test]
    fn passing_weight_is_strictly_above_two_thirds() {
        for total in 1u128..=1000 {
            let t = passing_weight(total);
            // T > 2W/3 and T - 1 <= 2W/3, both checked without division.
            assert!(3 * t > 2 * total, "total={total}");
            assert!(3 * (t - 1) <= 2 * total, "total={total}");
        }
    }

    #[test]
    fn passing_weight_known_values() {
        assert_eq!(passing_weight(3), 3);
        assert_eq!(passing_weight(4), 3);
        assert_eq!(passing_weight(13), 9);
        assert_eq!(passing_weight(100), 67);
        assert_eq!(passing_weight(600), 401);
    }
}
