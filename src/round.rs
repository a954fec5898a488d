use crate::{
    agent::{Agent, compare_agents},
    error::ConsensusError,
    types::AgentAddress,
};

/// One full cycle through the ordered packing schedule.
///
/// Built from an agent snapshot cloned at the round boundary, so live
/// deposit changes never race with an in-flight round. Held until the next
/// round boundary supersedes it.
#[derive(Debug, Clone)]
pub struct Round {
    /// Agents in packing order, slot index = position.
    agents: Vec<Agent>,
    started_at: u64,
    /// Seconds allotted to each packing slot.
    block_interval: u64,
    total_weight: u128,
}

impl Round {
    /// Sort a snapshot into packing order and assign slots.
    pub fn build(
        mut agents: Vec<Agent>,
        started_at: u64,
        block_interval: u64,
    ) -> Result<Self, ConsensusError> {
        if agents.is_empty() {
            return Err(ConsensusError::EmptyRound);
        }
        agents.sort_by(compare_agents);
        let total_weight = agents.iter().map(|a| a.deposit).sum();
        Ok(Self {
            agents,
            started_at,
            block_interval,
            total_weight,
        })
    }

    pub fn member_count(&self) -> usize {
        self.agents.len()
    }

    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    pub fn started_at(&self) -> u64 {
        self.started_at
    }

    pub fn total_weight(&self) -> u128 {
        self.total_weight
    }

    pub fn slot_of(&self, address: &[u8]) -> Option<u32> {
        self.agents
            .iter()
            .position(|a| a.address == address)
            .map(|i| i as u32)
    }

    pub fn packer_at(&self, slot_index: u32) -> Option<&Agent> {
        self.agents.get(slot_index as usize)
    }

    /// Nominal start time of a slot: round start + slot × block interval.
    pub fn slot_start(&self, slot_index: u32) -> u64 {
        self.started_at + u64::from(slot_index) * self.block_interval
    }

    /// Deterministic packer assignment for a height: heights walk the
    /// packing order cyclically within the round.
    pub fn packer_for_height(&self, height: u64) -> (u32, &Agent) {
        let slot = (height % self.agents.len() as u64) as u32;
        (slot, &self.agents[slot as usize])
    }

    pub fn weight_of(&self, address: &[u8]) -> Option<u128> {
        self.agents
            .iter()
            .find(|a| a.address == address)
            .map(|a| a.deposit)
    }

    pub fn contains(&self, address: &[u8]) -> bool {
        self.agents.iter().any(|a| a.address == address)
    }

    pub fn addresses(&self) -> impl Iterator<Item = &AgentAddress> {
        self.agents.iter().map(|a| &a.address)
    }
}
